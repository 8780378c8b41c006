//! Request logging middleware.
//!
//! This module provides structured logging for all API requests including:
//! - Unique request ID tracking
//! - Request timing
//! - Method, path, and status logging
//! - Request ID propagation in response headers
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use domain_auth::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
///
/// This middleware:
/// 1. Generates a unique request ID for each incoming request
/// 2. Creates a tracing span with the request ID
/// 3. Logs the request method and path
/// 4. Measures and logs the response time, at `warn` for 5xx responses
/// 5. Adds the request ID to the response headers
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    span.in_scope(|| {
        if status.is_server_error() {
            warn!(
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                "Request failed"
            );
        } else {
            info!(
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                "Request completed"
            );
        }
    });

    // Add request ID to response headers
    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status ("healthy" or "degraded")
    pub status: String,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Database connectivity status
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    /// Whether the store answered a ping
    pub connected: bool,
    /// Store backend (sqlite, postgres or memory)
    pub db_type: String,
}

impl HealthResponse {
    /// Build the response from the outcome of a store ping.
    pub fn from_ping(db_connected: bool, db_type: &str) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "domain-auth".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn health_response_healthy() {
        let health = HealthResponse::from_ping(true, "sqlite");
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "domain-auth");
        assert!(health.database.connected);
    }

    #[test]
    fn health_response_degraded() {
        let health = HealthResponse::from_ping(false, "postgres");
        assert_eq!(health.status, "degraded");
        assert!(!health.database.connected);
    }
}
