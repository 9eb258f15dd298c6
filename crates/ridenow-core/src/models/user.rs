use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status shown for a document that was never submitted
pub const NOT_UPLOADED: &str = "Not Uploaded";

/// `data` of a successful login: the user record plus both tokens.
/// The user record is kept opaque; the server owns its shape.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: Value,
    pub access_token: String,
    pub refresh_token: String,
}

// Tokens stay out of logs
impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// `data` of a successful token refresh.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

/// Editable profile fields. Unset fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.dob.is_none()
    }
}

/// Identity documents the profile can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Aadhar,
    DrivingLicence,
}

impl DocumentKind {
    /// `docType` value used in the user's `verifiedDoc` list
    pub fn doc_type(&self) -> &'static str {
        match self {
            DocumentKind::Aadhar => "Aadhar",
            DocumentKind::DrivingLicence => "DL",
        }
    }

    pub fn upload_path(&self) -> &'static str {
        match self {
            DocumentKind::Aadhar => "users/verify-aadhar",
            DocumentKind::DrivingLicence => "users/verify-dl",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Aadhar => "Aadhaar card",
            DocumentKind::DrivingLicence => "Driving licence",
        }
    }

    /// Verification status recorded on a user record, `NOT_UPLOADED` when absent
    pub fn status_in(&self, user: &Value) -> String {
        user.get("verifiedDoc")
            .and_then(Value::as_array)
            .and_then(|docs| {
                docs.iter().find(|doc| {
                    doc.get("docType").and_then(Value::as_str) == Some(self.doc_type())
                })
            })
            .and_then(|doc| doc.get("status"))
            .and_then(Value::as_str)
            .unwrap_or(NOT_UPLOADED)
            .to_string()
    }
}

/// Best available display name on a user record
pub fn display_name(user: &Value) -> Option<&str> {
    ["name", "fullName", "email"]
        .iter()
        .find_map(|key| user.get(*key).and_then(Value::as_str))
        .filter(|name| !name.trim().is_empty())
}

/// Recursively merge `patch` into `base`. Objects merge key by key; any other
/// value in `patch` replaces the one in `base`.
pub fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
