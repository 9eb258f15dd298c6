use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::utils::format::DATETIME_WIRE_FORMAT;
use crate::validation::{self, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub vehicle_id: String,
    #[serde(default)]
    pub scooty_model: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub booking_status: Option<String>,
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Confirmed,
    Completed,
    Cancelled,
    Other,
}

impl BookingStatus {
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("confirmed") => BookingStatus::Confirmed,
            Some("completed") => BookingStatus::Completed,
            Some("cancelled") | Some("canceled") => BookingStatus::Cancelled,
            _ => BookingStatus::Other,
        }
    }
}

impl Booking {
    pub fn status(&self) -> BookingStatus {
        BookingStatus::parse(self.booking_status.as_deref())
    }

    /// Only confirmed bookings can be ended by the renter
    pub fn is_active(&self) -> bool {
        self.status() == BookingStatus::Confirmed
    }
}

/// Body of a booking request. Build through `BookingRequest::new` so
/// the window and price are validated.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub vehicle_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub total_price: f64,
}

impl BookingRequest {
    pub fn new(
        vehicle_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        total_price: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validation::validate_id(vehicle_id.trim(), "Vehicle id")?;
        validation::validate_window(&start, &end)?;
        let total_price = total_price.ok_or(ValidationError::InvalidPrice)?;
        validation::validate_price(total_price)?;
        Ok(Self {
            vehicle_id: vehicle_id.trim().to_string(),
            start,
            end,
            total_price,
        })
    }

    pub fn to_body(&self) -> Value {
        json!({
            "startDate": self.start.format(DATETIME_WIRE_FORMAT).to_string(),
            "endDate": self.end.format(DATETIME_WIRE_FORMAT).to_string(),
            "totalPrice": self.total_price,
        })
    }
}
