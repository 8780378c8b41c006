//! Integration tests for the HTTP endpoints.
//!
//! These tests require the `server` feature to be enabled.

#![cfg(feature = "server")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use domain_auth::config::AuthConfig;
use domain_auth::server::handlers::AppState;
use domain_auth::server::logging::REQUEST_ID_HEADER;
use domain_auth::server::routes::build_router;
use domain_auth::store::MemoryStore;
use domain_auth::Licensing;

fn setup_test_app() -> axum::Router {
    let licensing = Licensing::new(Arc::new(MemoryStore::new()), &AuthConfig::default());
    build_router(AppState::new(licensing, "memory"))
}

/// Helper to make a JSON request to the app.
async fn json_request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body_bytes = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body_bytes))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, body)
}

async fn generate_key(app: &axum::Router, time: i64) -> String {
    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/keys/generate",
        Some(json!({ "count": 1, "time": time, "appid": "APP1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["keys"][0].as_str().unwrap().to_string()
}

#[tokio::test]
async fn generate_keys_returns_requested_count() {
    let app = setup_test_app();

    let (status, body) = json_request(
        app,
        "POST",
        "/api/keys/generate",
        Some(json!({ "count": 5, "time": 365, "appid": "APP1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["keys"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn generate_keys_rejects_bad_input() {
    let app = setup_test_app();

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/keys/generate",
        Some(json!({ "count": 101, "time": 30, "appid": "APP1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD");
    assert_eq!(body["error"]["details"]["field"], "count");

    let (status, body) = json_request(
        app,
        "POST",
        "/api/keys/generate",
        Some(json!({ "count": 1, "time": 7, "appid": "APP1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "time");
}

#[tokio::test]
async fn bind_then_verify_and_inquire() {
    let app = setup_test_app();
    let key = generate_key(&app, 30).await;

    let (status, bound) = json_request(
        app.clone(),
        "POST",
        "/api/bind",
        Some(json!({ "key": key, "domain": "https://www.example.com/" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bound["success"], true);
    for field in ["cert", "privateKey", "token", "hash"] {
        assert!(bound[field].as_str().is_some_and(|v| !v.is_empty()));
    }

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/verify",
        Some(json!({
            "domain": "example.com",
            "cert": bound["cert"],
            "hash": bound["hash"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["state"], 1);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/inquire",
        Some(json!({ "domain": "www.example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["domain"], "example.com");
    assert_eq!(body["time"], 30);
    assert_eq!(body["state"], 1);
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn bind_with_used_key_is_rejected() {
    let app = setup_test_app();
    let key = generate_key(&app, -1).await;

    let (status, _) = json_request(
        app.clone(),
        "POST",
        "/api/bind",
        Some(json!({ "key": key, "domain": "a.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/bind",
        Some(json!({ "key": key, "domain": "b.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "KEY_INVALID");
}

#[tokio::test]
async fn bind_to_bound_domain_is_conflict() {
    let app = setup_test_app();
    let first = generate_key(&app, -1).await;
    let second = generate_key(&app, -1).await;

    json_request(
        app.clone(),
        "POST",
        "/api/bind",
        Some(json!({ "key": first, "domain": "a.com" })),
    )
    .await;
    let (status, body) = json_request(
        app,
        "POST",
        "/api/bind",
        Some(json!({ "key": second, "domain": "http://a.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DOMAIN_ALREADY_BOUND");
}

#[tokio::test]
async fn bind_rejects_malformed_key() {
    let app = setup_test_app();
    let (status, body) = json_request(
        app,
        "POST",
        "/api/bind",
        Some(json!({ "key": "not-a-key", "domain": "a.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "key");
}

#[tokio::test]
async fn verify_failure_is_uniform() {
    let app = setup_test_app();

    let (status, body) = json_request(
        app,
        "POST",
        "/api/verify",
        Some(json!({ "domain": "unknown.com", "cert": "abc", "hash": "def" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": false, "state": 0 }));
}

#[tokio::test]
async fn inquire_unknown_domain_is_not_found() {
    let app = setup_test_app();
    let (status, body) = json_request(
        app,
        "POST",
        "/api/inquire",
        Some(json!({ "domain": "nobody.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn revoke_then_verify_fails() {
    let app = setup_test_app();
    let key = generate_key(&app, 365).await;
    let (_, bound) = json_request(
        app.clone(),
        "POST",
        "/api/bind",
        Some(json!({ "key": key, "domain": "a.com" })),
    )
    .await;

    let (status, _) = json_request(
        app.clone(),
        "POST",
        "/api/auth/revoke",
        Some(json!({ "domain": "a.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = json_request(
        app.clone(),
        "POST",
        "/api/verify",
        Some(json!({ "domain": "a.com", "cert": bound["cert"], "hash": bound["hash"] })),
    )
    .await;
    assert_eq!(body["success"], false);

    let (status, _) = json_request(
        app,
        "POST",
        "/api/auth/revoke",
        Some(json!({ "domain": "never-bound.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_add_returns_authorization() {
    let app = setup_test_app();
    let key = generate_key(&app, 30).await;

    let (status, body) = json_request(
        app,
        "POST",
        "/api/auth/add",
        Some(json!({ "domain": "www.customer.net", "key": key, "appid": "APP1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["domain"], "customer.net");
    assert_eq!(body["data"]["state"], 1);
    assert_eq!(body["data"]["source_key"], key);
}

#[tokio::test]
async fn delete_key_only_while_unused() {
    let app = setup_test_app();
    let unused = generate_key(&app, 30).await;
    let used = generate_key(&app, 30).await;

    json_request(
        app.clone(),
        "POST",
        "/api/bind",
        Some(json!({ "key": used, "domain": "a.com" })),
    )
    .await;

    let (status, _) = json_request(
        app.clone(),
        "POST",
        "/api/keys/delete",
        Some(json!({ "key": unused })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/keys/delete",
        Some(json!({ "key": used })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "KEY_NOT_DELETABLE");
}

#[tokio::test]
async fn unauthorized_reports_show_in_stats() {
    let app = setup_test_app();
    generate_key(&app, 30).await;

    let (status, body) = json_request(
        app.clone(),
        "POST",
        "/api/unauth",
        Some(json!({ "domain": "pirate.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = json_request(app, "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "activeAuthorizations": 0,
            "unauthorizedDomains": 1,
            "totalKeys": 1,
            "unusedKeys": 1,
        })
    );
}

#[tokio::test]
async fn missing_domain_is_invalid_field() {
    let app = setup_test_app();
    let (status, body) = json_request(app, "POST", "/api/unauth", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "domain");
}

#[tokio::test]
async fn health_reports_store_and_request_id() {
    let app = setup_test_app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["db_type"], "memory");
}
