//! REST API client module for RideNow services.
//!
//! This module provides the `ApiClient` for communicating with the
//! RideNow app API: authentication, profile and document verification,
//! vehicle search and pricing, and bookings.
//!
//! The API uses bearer access tokens with refresh-token rotation; an
//! expired access token is renewed transparently on the first 401.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, AuthEvent, RequestConfig, REFRESH_PATH};
pub use error::{ApiError, RefreshError, GENERIC_ERROR_MESSAGE};
pub use transport::{ApiResponse, FilePart, ReqwestTransport, RequestBody, Transport, TransportError, TransportRequest};
