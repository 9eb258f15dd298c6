use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::format::DATETIME_WIRE_FORMAT;
use crate::validation::{self, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub scooty_model: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub host: Option<Host>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vehicle {
    pub fn model_display(&self) -> &str {
        self.scooty_model.as_deref().unwrap_or("Unknown model")
    }

    pub fn host_name(&self) -> &str {
        self.host
            .as_ref()
            .and_then(|h| h.name.as_deref())
            .unwrap_or("Host")
    }

    pub fn cover_photo(&self) -> Option<&str> {
        self.photos.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: Option<Value>,
}

/// `data` of the pricing endpoint: the vehicle plus the server's estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePricing {
    pub vehicle_details: Vehicle,
    #[serde(default)]
    pub pricing_details: Option<PricingDetails>,
}

impl VehiclePricing {
    pub fn total_estimate(&self) -> Option<f64> {
        self.pricing_details
            .as_ref()
            .and_then(|p| p.total_price_estimate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingDetails {
    #[serde(default)]
    pub total_price_estimate: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// City and rental window for a vehicle search. Build through
/// `SearchQuery::new` so the window is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub city: String,
    pub pickup: NaiveDateTime,
    pub drop: NaiveDateTime,
}

impl SearchQuery {
    pub fn new(city: &str, pickup: &str, drop: &str) -> Result<Self, ValidationError> {
        if city.trim().is_empty() {
            return Err(ValidationError::MissingCity);
        }
        let pickup = validation::parse_datetime(pickup)?;
        let drop = validation::parse_datetime(drop)?;
        validation::validate_window(&pickup, &drop)?;
        Ok(Self {
            city: city.trim().to_string(),
            pickup,
            drop,
        })
    }

    /// Query parameters in the order the server documents them
    pub fn to_query(&self) -> Vec<(String, String)> {
        vec![
            ("city".to_string(), self.city.clone()),
            ("pickup".to_string(), self.pickup.format(DATETIME_WIRE_FORMAT).to_string()),
            ("drop".to_string(), self.drop.format(DATETIME_WIRE_FORMAT).to_string()),
        ]
    }
}
