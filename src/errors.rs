//! Error types shared by every layer of the crate.
//!
//! Core operations never panic; they return [`LicenseResult`]. The HTTP layer
//! maps each variant onto a stable error code in `server::api_error`.

use thiserror::Error;

use crate::store::{BindStage, StoreError};

/// Result alias used by all core operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// Malformed or missing input. Callers are expected to check inputs
    /// before invoking the core; the core still refuses obviously bad values.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The activation key does not exist or has already been redeemed.
    /// Both cases are reported identically.
    #[error("activation key is invalid or has already been used")]
    KeyInvalid,

    /// The activation key does not exist or is no longer unused.
    #[error("activation key cannot be deleted")]
    KeyNotDeletable,

    /// The domain already carries an authorization.
    #[error("domain '{0}' is already bound")]
    DomainAlreadyBound(String),

    /// A query targeted a record that does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The persistence layer failed or timed out. Never treated as "absent".
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The key was consumed but the authorization records were not all
    /// written. Requires manual reconciliation.
    #[error(
        "binding of '{domain}' stopped at {stage}; key '{key}' is consumed and needs manual reconciliation"
    )]
    PartialBindFailure {
        key: String,
        domain: String,
        stage: BindStage,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("server error: {0}")]
    ServerError(String),
}

impl LicenseError {
    /// Shorthand for a [`LicenseError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for LicenseError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { field } => {
                LicenseError::ServerError(format!("unexpected unique violation on {field}"))
            }
            other => LicenseError::StoreUnavailable(other.to_string()),
        }
    }
}
