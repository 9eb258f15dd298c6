//! Wire models for the RideNow API.
//!
//! Every endpoint answers with the same envelope, `{success, data, message?}`.
//! The records inside are deliberately lenient: fields the client does not
//! read are kept in an `extra` map rather than rejected.
//!
//! - `Envelope`: the response wrapper
//! - `AuthPayload`, `TokenPair`: login and refresh results
//! - `Vehicle`, `VehiclePricing`, `SearchQuery`: browsing and pricing
//! - `Booking`, `BookingRequest`: rentals
//! - `DocumentKind`: identity documents the profile can verify

pub mod booking;
pub mod envelope;
pub mod user;
pub mod vehicle;

pub use booking::{Booking, BookingRequest, BookingStatus};
pub use envelope::Envelope;
pub use user::{AuthPayload, DocumentKind, ProfileUpdate, TokenPair, NOT_UPLOADED};
pub use vehicle::{Host, PricingDetails, SearchQuery, Vehicle, VehiclePricing};
