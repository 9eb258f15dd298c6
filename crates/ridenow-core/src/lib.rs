//! Core library for the RideNow vehicle rental client.
//!
//! The pieces a front end needs to talk to the RideNow REST API:
//!
//! - `api`: the authenticated client (bearer attachment, refresh-on-401 with
//!   request queuing) and one method per upstream endpoint
//! - `auth`: durable credential storage and the process-wide session store
//! - `request`: a reusable loading/error/data slot wrapping any async call
//! - `models`: wire types for the `{success, data, message}` envelope and
//!   the records it carries
//! - `validation`: client-side input checks run before any request is sent

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod request;
pub mod utils;
pub mod validation;

pub use api::{ApiClient, ApiError, AuthEvent};
pub use auth::{CredentialStore, KeyringStore, MemoryStore, Session, SessionStore};
pub use config::Config;
pub use request::{RequestSlot, RequestState};
