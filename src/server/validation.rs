//! Request validation utilities.
//!
//! Handlers check their inputs here before calling into the core, so
//! malformed requests are rejected with a field-level message and never
//! reach the store.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::keys::{validate_key_format, KeyFormat};

/// Longest domain accepted before normalization.
pub const MAX_DOMAIN_LENGTH: usize = 255;

static APP_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("app id pattern compiles")
});

/// Validation error type.
#[derive(Debug, Clone, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use domain_auth::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("", "name").is_err());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate a raw domain as submitted by a client.
///
/// Only the envelope is checked: non-empty, bounded length, no whitespace or
/// control characters inside. Scheme, `www.` and trailing slashes are left
/// for normalization.
pub fn validate_domain(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    let trimmed = value.trim();
    if trimmed.len() > MAX_DOMAIN_LENGTH {
        return Err(ValidationError::new(
            field_name,
            format!("must be at most {MAX_DOMAIN_LENGTH} characters"),
        ));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(
            field_name,
            "must not contain whitespace or control characters",
        ));
    }
    Ok(())
}

/// Validate an activation key against the configured format.
///
/// # Example
/// ```
/// use domain_auth::keys::KeyFormat;
/// use domain_auth::server::validation::validate_activation_key;
///
/// let format = KeyFormat::default();
/// assert!(validate_activation_key("AB12-CD34-EF56-GH78", &format, "key").is_ok());
/// assert!(validate_activation_key("invalid", &format, "key").is_err());
/// ```
pub fn validate_activation_key(
    value: &str,
    format: &KeyFormat,
    field_name: &str,
) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    if validate_key_format(value, format) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            format!(
                "invalid activation key format (expected {} groups of {} characters from A-Z and 0-9)",
                format.segments, format.segment_length
            ),
        ))
    }
}

/// Validate an application id.
///
/// App ids are alphanumeric with `_`, `-` or `.`, starting alphanumeric, 1-64 chars.
pub fn validate_app_id(value: &str, field_name: &str) -> ValidationResult<()> {
    if APP_ID_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field_name,
            "invalid app id (alphanumeric with '_', '-' or '.', max 64 chars)",
        ))
    }
}

/// Validate a batch size for key generation.
pub fn validate_batch_count(value: i64, max: usize, field_name: &str) -> ValidationResult<usize> {
    match usize::try_from(value) {
        Ok(count) if (1..=max).contains(&count) => Ok(count),
        _ => Err(ValidationError::new(
            field_name,
            format!("must be between 1 and {max}"),
        )),
    }
}
