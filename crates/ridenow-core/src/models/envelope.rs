use serde::{Deserialize, Serialize};

use crate::api::ApiError;

/// Response wrapper shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Take the payload, failing when the server sent none.
    pub fn into_data(self) -> Result<T, ApiError> {
        let message = self.message;
        self.data.ok_or_else(|| {
            ApiError::InvalidResponse(match message {
                Some(m) => format!("response carried no data: {}", m),
                None => "response carried no data".to_string(),
            })
        })
    }

    /// Server message, or the given fallback
    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }
}
