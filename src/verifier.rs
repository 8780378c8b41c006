//! Read-side checks on authorizations.
//!
//! Expiry is never stored: the effective state is computed at query time from
//! the grant and the creation instant.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::normalize_required;
use crate::errors::LicenseResult;
use crate::grant::GrantDuration;
use crate::logging::{log_authorization_event, AuthorizationEvent};
use crate::models::{AuthorizationState, UnauthorizedReport};
use crate::store::Store;

/// Answer to an inquiry about a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inquiry {
    pub found: bool,
    pub domain: String,
    pub grant: Option<GrantDuration>,
    pub state: AuthorizationState,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Inquiry {
    fn not_found(domain: String) -> Self {
        Self {
            found: false,
            domain,
            grant: None,
            state: AuthorizationState::Inactive,
            created_at: None,
            expires_at: None,
        }
    }
}

/// Outcome of presenting a credential.
///
/// A failed verification carries no reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub state: AuthorizationState,
}

impl Verification {
    const fn invalid() -> Self {
        Self {
            valid: false,
            state: AuthorizationState::Inactive,
        }
    }
}

/// Report the authorization status of `raw_domain` as of `now`.
pub async fn inquire(
    store: &dyn Store,
    raw_domain: &str,
    now: DateTime<Utc>,
) -> LicenseResult<Inquiry> {
    let domain = normalize_required(raw_domain)?;

    let Some(auth) = store.find_authorization(&domain).await? else {
        return Ok(Inquiry::not_found(domain));
    };

    Ok(Inquiry {
        found: true,
        state: auth.effective_state(now),
        grant: Some(auth.grant),
        created_at: Some(auth.created_at),
        expires_at: auth.expires_at(),
        domain: auth.domain,
    })
}

/// Check a presented certificate and hash against the stored authorization.
///
/// Unknown domain, mismatched certificate, mismatched hash, expiry and
/// revocation all produce the same invalid result.
pub async fn verify(
    store: &dyn Store,
    raw_domain: &str,
    certificate: &str,
    hash: &str,
    now: DateTime<Utc>,
) -> LicenseResult<Verification> {
    let domain = normalize_required(raw_domain)?;

    let state = store
        .find_matching_authorization(&domain, certificate, hash)
        .await?
        .map(|auth| auth.effective_state(now));

    match state {
        Some(AuthorizationState::Active) => {
            log_authorization_event(AuthorizationEvent::Verified, &domain, None);
            Ok(Verification {
                valid: true,
                state: AuthorizationState::Active,
            })
        }
        _ => {
            log_authorization_event(AuthorizationEvent::VerificationFailed, &domain, None);
            Ok(Verification::invalid())
        }
    }
}

/// Record that `raw_domain` was seen running without a license.
pub async fn report_unauthorized(
    store: &dyn Store,
    raw_domain: &str,
    now: DateTime<Utc>,
) -> LicenseResult<()> {
    let domain = normalize_required(raw_domain)?;
    store
        .insert_unauthorized_report(&UnauthorizedReport {
            domain: domain.clone(),
            reported_at: now,
        })
        .await?;
    log_authorization_event(AuthorizationEvent::UnauthorizedReported, &domain, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind;
    use crate::config::CertificateConfig;
    use crate::models::ActivationKey;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    async fn bound_store(grant: GrantDuration) -> (MemoryStore, String, String) {
        let store = MemoryStore::new();
        store
            .insert_keys(&[ActivationKey::new("KKKK-KKKK-KKKK-KKKK", grant, "APP1", t0())])
            .await
            .unwrap();
        let bound = bind(
            &store,
            "KKKK-KKKK-KKKK-KKKK",
            "example.com",
            &CertificateConfig::default(),
            t0(),
        )
        .await
        .unwrap();
        (store, bound.credentials.certificate, bound.credentials.hash)
    }

    #[tokio::test]
    async fn inquire_unknown_domain() {
        let store = MemoryStore::new();
        let inquiry = inquire(&store, "https://nobody.com/", t0()).await.unwrap();
        assert!(!inquiry.found);
        assert_eq!(inquiry.domain, "nobody.com");
        assert_eq!(inquiry.state, AuthorizationState::Inactive);
    }

    #[tokio::test]
    async fn inquire_reports_expiry_at_query_time() {
        let (store, _, _) = bound_store(GrantDuration::ThirtyDays).await;

        let fresh = inquire(&store, "www.example.com", t0() + Duration::days(1))
            .await
            .unwrap();
        assert!(fresh.found);
        assert_eq!(fresh.state, AuthorizationState::Active);
        assert_eq!(fresh.grant, Some(GrantDuration::ThirtyDays));
        assert_eq!(fresh.expires_at, Some(t0() + Duration::days(30)));

        let expired = inquire(&store, "example.com", t0() + Duration::days(31))
            .await
            .unwrap();
        assert!(expired.found);
        assert_eq!(expired.state, AuthorizationState::Inactive);
    }

    #[tokio::test]
    async fn verify_round_trip() {
        let (store, cert, hash) = bound_store(GrantDuration::Perpetual).await;

        let ok = verify(&store, "http://www.example.com/", &cert, &hash, t0())
            .await
            .unwrap();
        assert!(ok.valid);
        assert_eq!(ok.state, AuthorizationState::Active);
    }

    #[tokio::test]
    async fn verify_failures_are_indistinguishable() {
        let (store, cert, hash) = bound_store(GrantDuration::ThirtyDays).await;
        let later = t0() + Duration::days(45);

        let results = [
            verify(&store, "unknown.com", &cert, &hash, t0()).await.unwrap(),
            verify(&store, "example.com", "Zm9v", &hash, t0()).await.unwrap(),
            verify(&store, "example.com", &cert, "deadbeef", t0()).await.unwrap(),
            verify(&store, "example.com", &cert, &hash, later).await.unwrap(),
        ];
        for result in results {
            assert_eq!(result, Verification::invalid());
        }
    }

    #[tokio::test]
    async fn reports_are_appended() {
        let store = MemoryStore::new();
        report_unauthorized(&store, "https://pirate.com/", t0()).await.unwrap();
        report_unauthorized(&store, "pirate.com", t0()).await.unwrap();
        assert_eq!(store.count_unauthorized_reports().await.unwrap(), 2);
    }
}
