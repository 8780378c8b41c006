use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::handlers::{
    admin_bind_handler, bind_handler, delete_key_handler, generate_keys_handler, health_handler,
    inquire_handler, revoke_handler, stats_handler, unauthorized_handler, verify_handler,
    AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// `main.rs` and tests construct the router with a single call.
///
/// # Routes
///
/// ## Client endpoints
/// - `POST /api/inquire` - Authorization status of a domain
/// - `POST /api/bind` - Redeem an activation key
/// - `POST /api/verify` - Verify a certificate and hash
/// - `POST /api/unauth` - Report unauthorized use
///
/// ## Administrative endpoints
/// - `POST /api/keys/generate` - Mint activation keys
/// - `POST /api/keys/delete` - Delete an unused key
/// - `POST /api/auth/add` - Bind a domain for a customer
/// - `POST /api/auth/revoke` - Revoke a domain
/// - `GET /api/stats` - Aggregate counts
///
/// ## Operations
/// - `GET /health` - Health check
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/inquire", post(inquire_handler))
        .route("/api/bind", post(bind_handler))
        .route("/api/verify", post(verify_handler))
        .route("/api/unauth", post(unauthorized_handler))
        .route("/api/keys/generate", post(generate_keys_handler))
        .route("/api/keys/delete", post(delete_key_handler))
        .route("/api/auth/add", post(admin_bind_handler))
        .route("/api/auth/revoke", post(revoke_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
