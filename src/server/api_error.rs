//! Standardized API error responses.
//!
//! # Response Format
//!
//! All error responses follow this JSON structure:
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "code": "KEY_INVALID",
//!     "message": "Activation key is invalid or has already been used",
//!     "details": null
//!   }
//! }
//! ```
//!
//! The `details` field is optional and may contain additional context.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;
use crate::server::validation::ValidationError;

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Key Errors (4xx) ===
    /// Activation key does not exist or was already redeemed
    KeyInvalid,
    /// Activation key does not exist or is no longer unused
    KeyNotDeletable,

    // === Binding Errors (4xx) ===
    /// Domain already carries an authorization
    DomainAlreadyBound,

    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// A field value is invalid
    InvalidField,

    // === Resource Errors (404) ===
    /// Requested resource was not found
    NotFound,

    // === Server Errors (5xx) ===
    /// Key consumed but the binding was not fully written
    PartialBindFailure,
    /// Persistence layer failed or timed out
    StoreUnavailable,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::KeyInvalid
            | ErrorCode::InvalidRequest
            | ErrorCode::MissingField
            | ErrorCode::InvalidField => StatusCode::BAD_REQUEST,

            // 404 Not Found
            ErrorCode::KeyNotDeletable | ErrorCode::NotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            ErrorCode::DomainAlreadyBound => StatusCode::CONFLICT,

            // 500 Internal Server Error
            ErrorCode::PartialBindFailure | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 503 Service Unavailable
            ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::KeyInvalid => "Activation key is invalid or has already been used",
            ErrorCode::KeyNotDeletable => "Activation key does not exist or has been used",
            ErrorCode::DomainAlreadyBound => "Domain is already bound",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::PartialBindFailure => "Binding was not completed and needs reconciliation",
            ErrorCode::StoreUnavailable => "Storage is temporarily unavailable",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field name, constraint violated, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`; lets clients branch on one field for every response
    pub success: bool,
    /// The error details
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with the given code.
    ///
    /// Uses the default message for the error code.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    /// Creates a new API error with a custom message and details.
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        let mut err = Self::with_message(code, message);
        err.error.details = Some(details);
        err
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    /// Invalid request error with field details.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
            serde_json::json!({ "field": field }),
        )
    }

    /// Missing required field error.
    pub fn missing_field(field: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
            serde_json::json!({ "field": field }),
        )
    }

    /// Resource not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::with_message(ErrorCode::NotFound, format!("{} not found", resource))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.code.default_message(),
            self.error.message
        )
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::Validation { field, message } => {
                ApiError::invalid_field(&field, &message)
            }
            LicenseError::KeyInvalid => ApiError::new(ErrorCode::KeyInvalid),
            LicenseError::KeyNotDeletable => ApiError::new(ErrorCode::KeyNotDeletable),
            LicenseError::DomainAlreadyBound(domain) => ApiError::with_details(
                ErrorCode::DomainAlreadyBound,
                format!("Domain '{domain}' is already bound"),
                serde_json::json!({ "domain": domain }),
            ),
            LicenseError::NotFound(what) => ApiError::not_found(&what),
            LicenseError::PartialBindFailure { key, domain, stage } => {
                error!(key = %key, domain = %domain, stage = %stage, "Partial binding reported to client");
                ApiError::with_details(
                    ErrorCode::PartialBindFailure,
                    ErrorCode::PartialBindFailure.default_message(),
                    serde_json::json!({ "domain": domain, "stage": stage.to_string() }),
                )
            }
            LicenseError::StoreUnavailable(reason) => {
                error!("Store unavailable: {reason}");
                ApiError::new(ErrorCode::StoreUnavailable)
            }
            LicenseError::ConfigError(msg) => ApiError::with_message(ErrorCode::ConfigError, msg),
            LicenseError::ServerError(msg) => {
                error!("Internal error: {msg}");
                ApiError::new(ErrorCode::InternalError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BindStage;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(ErrorCode::KeyInvalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::KeyNotDeletable.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DomainAlreadyBound.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::PartialBindFailure.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::StoreUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn api_error_serialization() {
        let err = ApiError::from(LicenseError::KeyInvalid);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("KEY_INVALID"));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn validation_error_names_field() {
        let err = ApiError::from(LicenseError::validation("count", "must be between 1 and 100"));
        assert_eq!(err.error.code, ErrorCode::InvalidField);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("count"));
    }

    #[test]
    fn partial_bind_hides_key() {
        let err = ApiError::from(LicenseError::PartialBindFailure {
            key: "AAAA-BBBB-CCCC-DDDD".to_string(),
            domain: "example.com".to_string(),
            stage: BindStage::Certificate,
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("AAAA-BBBB-CCCC-DDDD"));
        assert!(json.contains("certificate"));
    }

    #[test]
    fn store_failure_is_service_unavailable() {
        let err = ApiError::from(LicenseError::StoreUnavailable("timeout".to_string()));
        assert_eq!(err.error.code, ErrorCode::StoreUnavailable);
        assert!(!err.error.message.contains("timeout"));
    }
}
