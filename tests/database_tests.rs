#![cfg(all(feature = "server", feature = "sqlite"))]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use domain_auth::config::AuthConfig;
use domain_auth::errors::{LicenseError, LicenseResult};
use domain_auth::grant::GrantDuration;
use domain_auth::models::{ActivationKey, AuthorizationState, KeyState, UnauthorizedReport};
use domain_auth::server::database::Database;
use domain_auth::store::{Store, StoreError};
use domain_auth::Licensing;

/// Helper: create an in-memory SQLite Database with the schema applied.
async fn setup_in_memory_db() -> LicenseResult<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| LicenseError::ServerError(format!("db connect failed: {e}")))?;

    let db = Database::SQLite(pool);
    db.migrate().await?;
    Ok(db)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
}

fn key(value: &str) -> ActivationKey {
    ActivationKey::new(value, GrantDuration::ThirtyDays, "APP1", t0())
}

#[tokio::test]
async fn migrate_is_idempotent() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    db.migrate().await?;
    db.ping().await?;
    assert_eq!(db.db_type(), "sqlite");
    Ok(())
}

#[tokio::test]
async fn keys_round_trip_with_codes() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_keys(&[key("AAAA-AAAA-AAAA-AAAA")]).await?;

    let stored = db
        .find_key("AAAA-AAAA-AAAA-AAAA")
        .await?
        .expect("key should exist");
    assert_eq!(stored, key("AAAA-AAAA-AAAA-AAAA"));
    assert!(db.find_key("ZZZZ-ZZZZ-ZZZZ-ZZZZ").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn duplicate_in_batch_stores_nothing() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_keys(&[key("AAAA-AAAA-AAAA-AAAA")]).await?;

    let err = db
        .insert_keys(&[key("BBBB-BBBB-BBBB-BBBB"), key("AAAA-AAAA-AAAA-AAAA")])
        .await
        .unwrap_err();
    assert!(err.is_unique_violation_on("key"), "got {err:?}");
    assert!(db.find_key("BBBB-BBBB-BBBB-BBBB").await?.is_none());
    assert_eq!(db.count_keys(None).await?, 1);
    Ok(())
}

#[tokio::test]
async fn mark_key_used_is_conditional() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_keys(&[key("AAAA-AAAA-AAAA-AAAA")]).await?;

    let used = db
        .mark_key_used("AAAA-AAAA-AAAA-AAAA", "example.com")
        .await?
        .expect("first flip succeeds");
    assert_eq!(used.state, KeyState::Used);
    assert_eq!(used.bound_domain.as_deref(), Some("example.com"));

    assert!(db
        .mark_key_used("AAAA-AAAA-AAAA-AAAA", "other.com")
        .await?
        .is_none());
    assert!(db.mark_key_used("NOPE-NOPE-NOPE-NOPE", "x.com").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn delete_only_removes_unused_keys() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    db.insert_keys(&[key("AAAA-AAAA-AAAA-AAAA"), key("BBBB-BBBB-BBBB-BBBB")])
        .await?;
    db.mark_key_used("BBBB-BBBB-BBBB-BBBB", "example.com").await?;

    assert!(db.delete_unused_key("AAAA-AAAA-AAAA-AAAA").await?);
    assert!(!db.delete_unused_key("BBBB-BBBB-BBBB-BBBB").await?);
    assert!(!db.delete_unused_key("AAAA-AAAA-AAAA-AAAA").await?);
    assert_eq!(db.count_keys(Some(KeyState::Used)).await?, 1);
    assert_eq!(db.count_keys(Some(KeyState::Unused)).await?, 0);
    Ok(())
}

#[tokio::test]
async fn unauthorized_reports_are_counted() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    for _ in 0..3 {
        db.insert_unauthorized_report(&UnauthorizedReport {
            domain: "pirate.example".to_string(),
            reported_at: t0(),
        })
        .await?;
    }
    assert_eq!(db.count_unauthorized_reports().await?, 3);
    Ok(())
}

#[tokio::test]
async fn licensing_over_sqlite_end_to_end() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    let licensing = Licensing::new(Arc::new(db.clone()), &AuthConfig::default());

    let keys = licensing
        .generate_keys_at(2, GrantDuration::ThirtyDays, "APP1", t0())
        .await?;
    let bound = licensing
        .redeem_key_at(&keys[0], "https://www.example.com/", t0())
        .await?;

    let stored = db
        .find_authorization("example.com")
        .await?
        .expect("authorization stored");
    assert_eq!(stored, bound.authorization);

    let certificate = db
        .find_certificate("example.com")
        .await?
        .expect("certificate stored");
    assert_eq!(certificate.private_key, bound.credentials.private_key);

    let check = licensing
        .verify_at(
            "example.com",
            &bound.credentials.certificate,
            &bound.credentials.hash,
            t0() + Duration::days(29),
        )
        .await?;
    assert!(check.valid);

    // A second key cannot take the domain, and stays unused.
    let err = licensing
        .redeem_key_at(&keys[1], "example.com", t0())
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::DomainAlreadyBound(_)));
    let second = db.find_key(&keys[1]).await?.expect("key kept");
    assert_eq!(second.state, KeyState::Unused);

    licensing.revoke_authorization("example.com").await?;
    assert_eq!(
        db.count_authorizations(Some(AuthorizationState::Active)).await?,
        0
    );
    assert_eq!(db.count_authorizations(None).await?, 1);
    Ok(())
}

#[tokio::test]
async fn transactional_commit_leaves_key_on_domain_conflict() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    let licensing = Licensing::new(Arc::new(db.clone()), &AuthConfig::default());
    let keys = licensing
        .generate_keys_at(2, GrantDuration::Perpetual, "APP1", t0())
        .await?;
    let first = licensing
        .redeem_key_at(&keys[0], "example.com", t0())
        .await?;

    // Same domain under the second key, fresh token and hash, so only the
    // domain constraint fires inside the transaction.
    let mut authorization = first.authorization.clone();
    authorization.source_key = keys[1].clone();
    authorization.token = "fresh-token".to_string();
    authorization.hash = "fresh-hash".to_string();
    let mut certificate = db
        .find_certificate("example.com")
        .await?
        .expect("certificate stored");
    certificate.token = authorization.token.clone();
    certificate.hash = authorization.hash.clone();
    let binding = domain_auth::store::Binding {
        authorization,
        certificate,
    };

    let err = db.commit_binding(&binding).await.unwrap_err();
    assert!(matches!(err, domain_auth::store::CommitError::DomainTaken));

    let second = db.find_key(&keys[1]).await?.expect("key kept");
    assert_eq!(second.state, KeyState::Unused);
    Ok(())
}

#[tokio::test]
async fn closed_pool_is_unavailable() -> LicenseResult<()> {
    let db = setup_in_memory_db().await?;
    db.close().await;

    let err = db.ping().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
    Ok(())
}
