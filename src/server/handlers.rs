//! HTTP handlers for the authorization endpoints.
//!
//! # Endpoints
//!
//! - `POST /api/inquire` - Authorization status of a domain
//! - `POST /api/bind` - Redeem an activation key for a domain
//! - `POST /api/verify` - Check a presented certificate and hash
//! - `POST /api/unauth` - Report a domain running without a license
//! - `POST /api/keys/generate` - Mint a batch of activation keys
//! - `POST /api/keys/delete` - Delete an unused activation key
//! - `POST /api/auth/add` - Bind a domain on behalf of a customer
//! - `POST /api/auth/revoke` - Mark a domain's authorization inactive
//! - `GET /api/stats` - Aggregate counts
//! - `GET /health` - Liveness and store connectivity

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::grant::GrantDuration;
use crate::keys::MAX_KEYS_PER_BATCH;
use crate::models::{Authorization, AuthorizationState};
use crate::server::api_error::ApiError;
use crate::server::logging::HealthResponse;
use crate::server::validation::{
    validate_activation_key, validate_app_id, validate_batch_count, validate_domain,
    validate_not_empty,
};
use crate::service::Licensing;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub licensing: Licensing,
    /// Reported by `/health`.
    pub db_type: String,
}

impl AppState {
    pub fn new(licensing: Licensing, db_type: impl Into<String>) -> Self {
        Self {
            licensing,
            db_type: db_type.into(),
        }
    }
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DomainRequest {
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquireResponse {
    pub success: bool,
    pub domain: String,
    /// Grant day code: `-1`, `30` or `365`.
    pub time: GrantDuration,
    pub state: AuthorizationState,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BindRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindResponse {
    pub success: bool,
    pub cert: String,
    pub private_key: String,
    pub token: String,
    pub hash: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub state: AuthorizationState,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateKeysRequest {
    pub count: i64,
    /// Grant day code: `-1`, `30` or `365`.
    pub time: i64,
    #[serde(default)]
    pub appid: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateKeysResponse {
    pub success: bool,
    pub message: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyRequest {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminBindRequest {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub appid: String,
}

#[derive(Debug, Serialize)]
pub struct AdminBindResponse {
    pub success: bool,
    pub data: Authorization,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsData {
    pub active_authorizations: u64,
    pub unauthorized_domains: u64,
    pub total_keys: u64,
    pub unused_keys: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: StatsData,
}

// ============================================================================
// Client endpoints
// ============================================================================

/// Handler for domain inquiries.
///
/// Returns 404 when the domain has never been bound.
pub async fn inquire_handler(
    State(state): State<AppState>,
    Json(req): Json<DomainRequest>,
) -> Result<Json<InquireResponse>, ApiError> {
    validate_domain(&req.domain, "domain")?;

    let inquiry = state.licensing.inquire(&req.domain).await?;
    match inquiry.grant {
        Some(grant) if inquiry.found => Ok(Json(InquireResponse {
            success: true,
            domain: inquiry.domain,
            time: grant,
            state: inquiry.state,
            created_at: inquiry.created_at,
            expires_at: inquiry.expires_at,
        })),
        _ => Err(ApiError::not_found("Authorization")),
    }
}

/// Handler for redeeming an activation key.
pub async fn bind_handler(
    State(state): State<AppState>,
    Json(req): Json<BindRequest>,
) -> Result<Json<BindResponse>, ApiError> {
    validate_activation_key(&req.key, state.licensing.key_format(), "key")?;
    validate_domain(&req.domain, "domain")?;

    info!(domain = %req.domain, "Bind request");
    let bound = state.licensing.redeem_key(&req.key, &req.domain).await?;

    Ok(Json(BindResponse {
        success: true,
        cert: bound.credentials.certificate,
        private_key: bound.credentials.private_key,
        token: bound.credentials.token,
        hash: bound.credentials.hash,
    }))
}

/// Handler for credential verification.
///
/// Always answers 200 for a well-formed request; `success` carries the
/// outcome and a failure never says which check failed.
pub async fn verify_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    validate_domain(&req.domain, "domain")?;
    validate_not_empty(&req.cert, "cert")?;
    validate_not_empty(&req.hash, "hash")?;

    let verification = state
        .licensing
        .verify(&req.domain, &req.cert, &req.hash)
        .await?;

    Ok(Json(VerifyResponse {
        success: verification.valid,
        state: verification.state,
    }))
}

/// Handler for unauthorized-use reports.
pub async fn unauthorized_handler(
    State(state): State<AppState>,
    Json(req): Json<DomainRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_domain(&req.domain, "domain")?;

    state.licensing.report_unauthorized(&req.domain).await?;
    Ok(Json(MessageResponse::ok("Unauthorized domain reported")))
}

// ============================================================================
// Administrative endpoints
// ============================================================================

/// Handler for minting activation keys.
pub async fn generate_keys_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateKeysRequest>,
) -> Result<Json<GenerateKeysResponse>, ApiError> {
    let count = validate_batch_count(req.count, MAX_KEYS_PER_BATCH, "count")?;
    let grant = GrantDuration::from_code(req.time)
        .ok_or_else(|| ApiError::invalid_field("time", "must be -1, 30 or 365"))?;
    validate_app_id(&req.appid, "appid")?;

    let keys = state
        .licensing
        .generate_keys(count, grant, &req.appid)
        .await?;

    Ok(Json(GenerateKeysResponse {
        success: true,
        message: format!("Generated {} activation keys", keys.len()),
        keys,
    }))
}

/// Handler for deleting an unused activation key.
pub async fn delete_key_handler(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_not_empty(&req.key, "key")?;

    state.licensing.delete_unused_key(&req.key).await?;
    Ok(Json(MessageResponse::ok("Activation key deleted")))
}

/// Handler for binding a domain on a customer's behalf.
pub async fn admin_bind_handler(
    State(state): State<AppState>,
    Json(req): Json<AdminBindRequest>,
) -> Result<Json<AdminBindResponse>, ApiError> {
    validate_domain(&req.domain, "domain")?;
    validate_activation_key(&req.key, state.licensing.key_format(), "key")?;
    validate_app_id(&req.appid, "appid")?;

    let authorization = state
        .licensing
        .bind_domain_for_admin(&req.domain, &req.key, &req.appid)
        .await?;

    Ok(Json(AdminBindResponse {
        success: true,
        data: authorization,
    }))
}

/// Handler for revoking a domain's authorization.
pub async fn revoke_handler(
    State(state): State<AppState>,
    Json(req): Json<DomainRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_domain(&req.domain, "domain")?;

    state.licensing.revoke_authorization(&req.domain).await?;
    Ok(Json(MessageResponse::ok("Authorization revoked")))
}

/// Handler for aggregate counts.
pub async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.licensing.stats().await?;
    Ok(Json(StatsResponse {
        success: true,
        data: StatsData {
            active_authorizations: stats.active_authorizations,
            unauthorized_domains: stats.unauthorized_reports,
            total_keys: stats.total_keys,
            unused_keys: stats.unused_keys,
        },
    }))
}

/// Health check. Degraded (503) when the store does not answer.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = match state.licensing.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check failed: {e}");
            false
        }
    };
    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::from_ping(connected, &state.db_type)))
}
