//! Client-side input checks.
//!
//! Everything here runs before a request is built, so a rejected input never
//! reaches the network. Messages are written for direct display.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Number of digits in an emailed one-time password
pub const OTP_LENGTH: usize = 6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Email is required.")]
    MissingEmail,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Password is required.")]
    MissingPassword,

    #[error("Password must be at least {min} characters long.")]
    ShortPassword { min: usize },

    #[error("Please enter a valid {len}-digit OTP.")]
    InvalidOtp { len: usize },

    #[error("City is required.")]
    MissingCity,

    #[error("Could not understand date '{0}'. Use YYYY-MM-DD HH:MM.")]
    InvalidDateTime(String),

    #[error("Drop-off time must be after pick-up time.")]
    EmptyWindow,

    #[error("Cannot book without a price estimate.")]
    InvalidPrice,

    #[error("{0} is required.")]
    MissingField(&'static str),

    #[error("'{0}' is not a valid id.")]
    InvalidId(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Only {expected} files can be uploaded.")]
    UnsupportedFile { expected: &'static str },
}

/// Check an email has the `local@domain.tld` shape with no whitespace
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail),
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        Err(ValidationError::MissingPassword)
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        Err(ValidationError::ShortPassword {
            min: MIN_PASSWORD_LENGTH,
        })
    } else {
        Ok(())
    }
}

/// Login only requires both fields; the length rule applies at registration
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    Ok(())
}

pub fn validate_otp(otp: &str) -> Result<(), ValidationError> {
    if otp.len() == OTP_LENGTH && otp.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidOtp { len: OTP_LENGTH })
    }
}

pub fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Ids are interpolated into URL paths, so only plain id characters pass
pub fn validate_id(id: &str, field: &'static str) -> Result<(), ValidationError> {
    require(id, field)?;
    if id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::InvalidId(id.to_string()))
    }
}

/// Check an upload exists and, when `extensions` is non-empty, has one of them
pub fn validate_upload(
    path: &Path,
    extensions: &[&str],
    expected: &'static str,
) -> Result<(), ValidationError> {
    if !path.is_file() {
        return Err(ValidationError::FileNotFound(path.display().to_string()));
    }
    if extensions.is_empty() {
        return Ok(());
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extensions.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFile { expected })
    }
}

/// Parse a user-entered date-time. RFC 3339 input is converted to UTC.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, ValidationError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ValidationError::InvalidDateTime(input.to_string()))
}

pub fn validate_window(pickup: &NaiveDateTime, drop: &NaiveDateTime) -> Result<(), ValidationError> {
    if drop > pickup {
        Ok(())
    } else {
        Err(ValidationError::EmptyWindow)
    }
}

pub fn validate_price(price: f64) -> Result<(), ValidationError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidPrice)
    }
}
