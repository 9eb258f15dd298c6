use serde_json::Value;
use thiserror::Error;

use super::transport::TransportError;
use crate::auth::credentials::StoreError;
use crate::validation::ValidationError;

/// Fallback shown when neither the server nor the error itself has anything useful to say
pub const GENERIC_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No response was received (unreachable host, timeout, TLS failure).
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// The server answered with a non-2xx status after refresh handling was exhausted.
    #[error("Request failed with status {status}: {}", summarize_payload(.payload))]
    Http { status: u16, payload: Value },

    /// The access token expired and could not be renewed. Callers treat this as a forced logout.
    #[error("Session expired: {0}")]
    Refresh(#[from] RefreshError),

    /// Input rejected locally; nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Why a token refresh cycle failed. Cloned to every request queued behind the cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh rejected with status {status}")]
    Rejected { status: u16, message: Option<String> },

    #[error("Refresh request failed: {0}")]
    Network(String),

    #[error("Malformed refresh response: {0}")]
    Malformed(String),

    #[error("Failed to persist refreshed tokens: {0}")]
    Storage(String),

    #[error("Refresh was abandoned before completing")]
    Abandoned,
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }
}

fn summarize_payload(payload: &Value) -> String {
    match payload {
        Value::Null => "empty body".to_string(),
        Value::String(text) => text.clone(),
        other => match other.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => truncate_body(&other.to_string()),
        },
    }
}

impl ApiError {
    /// Build an `Http` error from a raw response. JSON bodies are kept as-is so the
    /// server's `message` field stays reachable; anything else is kept as truncated text.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let payload = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(body).unwrap_or_else(|_| {
                Value::String(truncate_body(&String::from_utf8_lossy(body)))
            })
        };
        ApiError::Http { status, payload }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// The `message` field the server put in its error envelope, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Http { payload, .. } => payload
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty()),
            ApiError::Refresh(RefreshError::Rejected { message, .. }) => {
                message.as_deref().filter(|m| !m.trim().is_empty())
            }
            _ => None,
        }
    }

    /// Human-readable message for display: the server's message, then this
    /// error's own description, then a generic fallback.
    pub fn user_message(&self) -> String {
        if let Some(message) = self.server_message() {
            return message.to_string();
        }
        let own = self.to_string();
        if own.trim().is_empty() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            own
        }
    }

    /// True when the session can no longer be used and the user must log in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::Refresh(_))
    }
}
