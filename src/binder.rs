//! Binding domains to activation keys.
//!
//! A binding consumes one unused key and creates exactly one authorization and
//! one certificate record for a normalized domain. The lookups at the start of
//! [`bind`] only fail fast; correctness under concurrency comes from the
//! conditional key write and the domain unique constraint applied by
//! [`Store::commit_binding`].

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::CertificateConfig;
use crate::derivation::{generate_full_certificate_info, CertificateInfo};
use crate::domain::normalize_required;
use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_authorization_event, AuthorizationEvent};
use crate::models::{ActivationKey, Authorization, AuthorizationState, CertificateRecord};
use crate::store::{Binding, CommitError, Store};

/// Result of a successful binding.
///
/// This is the only time the private artifact leaves the service.
#[derive(Debug, Clone)]
pub struct BoundAuthorization {
    pub authorization: Authorization,
    pub credentials: CertificateInfo,
}

/// Look up `key` and make sure it can still be redeemed.
async fn redeemable_key(store: &dyn Store, key: &str) -> LicenseResult<ActivationKey> {
    match store.find_key(key).await? {
        Some(found) if found.is_unused() => Ok(found),
        _ => Err(LicenseError::KeyInvalid),
    }
}

async fn ensure_domain_free(store: &dyn Store, domain: &str) -> LicenseResult<()> {
    if store.find_authorization(domain).await?.is_some() {
        debug!(domain = %domain, "Domain already bound, key left untouched");
        return Err(LicenseError::DomainAlreadyBound(domain.to_string()));
    }
    Ok(())
}

fn build_binding(
    key: &ActivationKey,
    domain: &str,
    credentials: &CertificateInfo,
    now: DateTime<Utc>,
) -> Binding {
    Binding {
        authorization: Authorization {
            domain: domain.to_string(),
            source_key: key.key.clone(),
            grant: key.grant,
            state: AuthorizationState::Active,
            certificate: credentials.certificate.clone(),
            token: credentials.token.clone(),
            hash: credentials.hash.clone(),
            created_at: now,
        },
        certificate: CertificateRecord {
            domain: domain.to_string(),
            certificate: credentials.certificate.clone(),
            private_key: credentials.private_key.clone(),
            token: credentials.token.clone(),
            hash: credentials.hash.clone(),
            created_at: now,
        },
    }
}

async fn commit(
    store: &dyn Store,
    key: &ActivationKey,
    domain: &str,
    credentials: CertificateInfo,
    now: DateTime<Utc>,
) -> LicenseResult<BoundAuthorization> {
    let binding = build_binding(key, domain, &credentials, now);

    match store.commit_binding(&binding).await {
        Ok(_) => Ok(BoundAuthorization {
            authorization: binding.authorization,
            credentials,
        }),
        Err(CommitError::KeyUnavailable) => Err(LicenseError::KeyInvalid),
        Err(CommitError::DomainTaken) => Err(LicenseError::DomainAlreadyBound(domain.to_string())),
        Err(CommitError::Partial { stage, source }) => {
            log_authorization_event(
                AuthorizationEvent::PartialBind,
                domain,
                Some(&format!("key={} stage={stage} error={source}", key.key)),
            );
            Err(LicenseError::PartialBindFailure {
                key: key.key.clone(),
                domain: domain.to_string(),
                stage,
            })
        }
        Err(CommitError::Store(e)) => Err(e.into()),
    }
}

/// Redeem `key` for `raw_domain`.
///
/// The artifact is issued under the key's own application id. The returned
/// authorization is `Active` from `now`.
pub async fn bind(
    store: &dyn Store,
    key: &str,
    raw_domain: &str,
    config: &CertificateConfig,
    now: DateTime<Utc>,
) -> LicenseResult<BoundAuthorization> {
    let domain = normalize_required(raw_domain)?;
    let found = redeemable_key(store, key).await?;
    ensure_domain_free(store, &domain).await?;

    let credentials = generate_full_certificate_info(&domain, &found.key, &found.app_id, now, config);
    let bound = commit(store, &found, &domain, credentials, now).await?;

    log_authorization_event(
        AuthorizationEvent::Bound,
        &domain,
        Some(&format!("key={} grant={}", found.key, found.grant)),
    );
    Ok(bound)
}

/// Administrative binding: like [`bind`] but the artifact is issued under
/// the supplied `app_id`.
pub async fn bind_for_admin(
    store: &dyn Store,
    raw_domain: &str,
    key: &str,
    app_id: &str,
    config: &CertificateConfig,
    now: DateTime<Utc>,
) -> LicenseResult<Authorization> {
    if app_id.trim().is_empty() {
        return Err(LicenseError::validation("appid", "must not be empty"));
    }
    let domain = normalize_required(raw_domain)?;
    let found = redeemable_key(store, key).await?;
    if found.app_id != app_id {
        warn!(
            key = %found.key,
            key_app_id = %found.app_id,
            app_id = %app_id,
            "Administrative binding uses a different application id than the key"
        );
    }
    ensure_domain_free(store, &domain).await?;

    let credentials = generate_full_certificate_info(&domain, &found.key, app_id, now, config);
    let bound = commit(store, &found, &domain, credentials, now).await?;

    log_authorization_event(
        AuthorizationEvent::AdminBound,
        &domain,
        Some(&format!("key={} app_id={app_id}", found.key)),
    );
    Ok(bound.authorization)
}

/// Set the authorization for `raw_domain` inactive. The source key stays used.
pub async fn revoke(store: &dyn Store, raw_domain: &str) -> LicenseResult<()> {
    let domain = normalize_required(raw_domain)?;
    if !store
        .set_authorization_state(&domain, AuthorizationState::Inactive)
        .await?
    {
        return Err(LicenseError::NotFound(format!("authorization for '{domain}'")));
    }
    log_authorization_event(AuthorizationEvent::Revoked, &domain, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::derive_integrity_hash;
    use crate::grant::GrantDuration;
    use crate::models::KeyState;
    use crate::store::MemoryStore;

    async fn seed_key(store: &MemoryStore, key: &str, grant: GrantDuration) {
        store
            .insert_keys(&[ActivationKey::new(key, grant, "APP1", Utc::now())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bind_creates_active_authorization_and_certificate() {
        let store = MemoryStore::new();
        seed_key(&store, "AAAA-BBBB-CCCC-DDDD", GrantDuration::ThirtyDays).await;

        let now = Utc::now();
        let bound = bind(
            &store,
            "AAAA-BBBB-CCCC-DDDD",
            "https://www.Example.com/",
            &CertificateConfig::default(),
            now,
        )
        .await
        .unwrap();

        let auth = &bound.authorization;
        assert_eq!(auth.domain, "Example.com");
        assert_eq!(auth.state, AuthorizationState::Active);
        assert_eq!(auth.grant, GrantDuration::ThirtyDays);
        assert_eq!(auth.created_at, now);
        assert_eq!(
            bound.credentials.hash,
            derive_integrity_hash(&bound.credentials.certificate, &bound.credentials.token)
        );

        let cert = store.find_certificate("Example.com").await.unwrap().unwrap();
        assert_eq!(cert.private_key, bound.credentials.private_key);

        let key = store.find_key("AAAA-BBBB-CCCC-DDDD").await.unwrap().unwrap();
        assert_eq!(key.state, KeyState::Used);
        assert_eq!(key.bound_domain.as_deref(), Some("Example.com"));
    }

    #[tokio::test]
    async fn bound_domain_does_not_consume_second_key() {
        let store = MemoryStore::new();
        seed_key(&store, "AAAA-AAAA-AAAA-AAAA", GrantDuration::Perpetual).await;
        seed_key(&store, "BBBB-BBBB-BBBB-BBBB", GrantDuration::Perpetual).await;
        let config = CertificateConfig::default();

        bind(&store, "AAAA-AAAA-AAAA-AAAA", "example.com", &config, Utc::now())
            .await
            .unwrap();
        let err = bind(&store, "BBBB-BBBB-BBBB-BBBB", "http://example.com", &config, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, LicenseError::DomainAlreadyBound(d) if d == "example.com"));
        let second = store.find_key("BBBB-BBBB-BBBB-BBBB").await.unwrap().unwrap();
        assert!(second.is_unused());
    }

    #[tokio::test]
    async fn used_or_unknown_key_is_rejected() {
        let store = MemoryStore::new();
        seed_key(&store, "AAAA-AAAA-AAAA-AAAA", GrantDuration::Perpetual).await;
        let config = CertificateConfig::default();

        bind(&store, "AAAA-AAAA-AAAA-AAAA", "one.com", &config, Utc::now())
            .await
            .unwrap();

        for key in ["AAAA-AAAA-AAAA-AAAA", "ZZZZ-ZZZZ-ZZZZ-ZZZZ"] {
            let err = bind(&store, key, "two.com", &config, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, LicenseError::KeyInvalid));
        }
        assert!(store.find_authorization("two.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_domain_is_rejected() {
        let store = MemoryStore::new();
        seed_key(&store, "AAAA-AAAA-AAAA-AAAA", GrantDuration::Perpetual).await;

        let err = bind(
            &store,
            "AAAA-AAAA-AAAA-AAAA",
            "https://www.",
            &CertificateConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LicenseError::Validation { .. }));
        assert!(store.find_key("AAAA-AAAA-AAAA-AAAA").await.unwrap().unwrap().is_unused());
    }

    #[tokio::test]
    async fn admin_bind_uses_supplied_app_id() {
        let store = MemoryStore::new();
        seed_key(&store, "AAAA-AAAA-AAAA-AAAA", GrantDuration::ThreeSixtyFiveDays).await;

        let auth = bind_for_admin(
            &store,
            "www.example.org",
            "AAAA-AAAA-AAAA-AAAA",
            "OTHER-APP",
            &CertificateConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(auth.domain, "example.org");
        assert_eq!(auth.state, AuthorizationState::Active);
        let decoded = crate::derivation::decode_artifact(&auth.certificate).unwrap();
        assert!(String::from_utf8(decoded).unwrap().contains("\"O\":\"OTHER-APP\""));
        assert!(store.find_certificate("example.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revoke_keeps_key_used() {
        let store = MemoryStore::new();
        seed_key(&store, "AAAA-AAAA-AAAA-AAAA", GrantDuration::Perpetual).await;
        bind(
            &store,
            "AAAA-AAAA-AAAA-AAAA",
            "example.com",
            &CertificateConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap();

        revoke(&store, "example.com").await.unwrap();
        let auth = store.find_authorization("example.com").await.unwrap().unwrap();
        assert_eq!(auth.state, AuthorizationState::Inactive);
        let key = store.find_key("AAAA-AAAA-AAAA-AAAA").await.unwrap().unwrap();
        assert_eq!(key.state, KeyState::Used);

        assert!(matches!(
            revoke(&store, "missing.com").await,
            Err(LicenseError::NotFound(_))
        ));
    }
}
