//! The licensing facade.
//!
//! [`Licensing`] owns an injected store and the configuration sections the
//! core needs. Every store call it makes is bounded by
//! `store.timeout_secs`; an elapsed call is reported as
//! [`LicenseError::StoreUnavailable`](crate::errors::LicenseError::StoreUnavailable).
//!
//! The `*_at` variants take the current instant explicitly; the plain
//! variants use `Utc::now()`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::binder::{self, BoundAuthorization};
use crate::config::{AuthConfig, CertificateConfig};
use crate::domain;
use crate::errors::LicenseResult;
use crate::grant::GrantDuration;
use crate::keys::{self, KeyFormat};
use crate::models::{Authorization, AuthorizationState, KeyState};
use crate::store::{Store, TimeoutStore};
use crate::verifier::{self, Inquiry, Verification};

/// Aggregate counts for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub active_authorizations: u64,
    pub unauthorized_reports: u64,
    pub total_keys: u64,
    pub unused_keys: u64,
}

#[derive(Clone)]
pub struct Licensing {
    store: Arc<dyn Store>,
    key_format: KeyFormat,
    certificate: CertificateConfig,
}

impl Licensing {
    /// Wrap `store` with the configured timeout and build the facade.
    pub fn new(store: Arc<dyn Store>, config: &AuthConfig) -> Self {
        let limit = Duration::from_secs(config.store.timeout_secs);
        Self {
            store: Arc::new(TimeoutStore::new(store, limit)),
            key_format: KeyFormat::from(&config.keys),
            certificate: config.certificate.clone(),
        }
    }

    pub fn key_format(&self) -> &KeyFormat {
        &self.key_format
    }

    pub async fn ping(&self) -> LicenseResult<()> {
        Ok(self.store.ping().await?)
    }

    pub fn normalize_domain(&self, raw: &str) -> String {
        domain::normalize_domain(raw)
    }

    pub async fn generate_keys(
        &self,
        count: usize,
        grant: GrantDuration,
        app_id: &str,
    ) -> LicenseResult<Vec<String>> {
        self.generate_keys_at(count, grant, app_id, Utc::now()).await
    }

    pub async fn generate_keys_at(
        &self,
        count: usize,
        grant: GrantDuration,
        app_id: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<Vec<String>> {
        let generated =
            keys::generate(self.store.as_ref(), count, grant, app_id, &self.key_format, now)
                .await?;
        Ok(generated.into_iter().map(|k| k.key).collect())
    }

    pub async fn redeem_key(&self, key: &str, domain: &str) -> LicenseResult<BoundAuthorization> {
        self.redeem_key_at(key, domain, Utc::now()).await
    }

    pub async fn redeem_key_at(
        &self,
        key: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<BoundAuthorization> {
        binder::bind(self.store.as_ref(), key, domain, &self.certificate, now).await
    }

    pub async fn delete_unused_key(&self, key: &str) -> LicenseResult<()> {
        keys::delete(self.store.as_ref(), key).await
    }

    pub async fn bind_domain_for_admin(
        &self,
        domain: &str,
        key: &str,
        app_id: &str,
    ) -> LicenseResult<Authorization> {
        self.bind_domain_for_admin_at(domain, key, app_id, Utc::now())
            .await
    }

    pub async fn bind_domain_for_admin_at(
        &self,
        domain: &str,
        key: &str,
        app_id: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<Authorization> {
        binder::bind_for_admin(self.store.as_ref(), domain, key, app_id, &self.certificate, now)
            .await
    }

    pub async fn inquire(&self, domain: &str) -> LicenseResult<Inquiry> {
        self.inquire_at(domain, Utc::now()).await
    }

    pub async fn inquire_at(&self, domain: &str, now: DateTime<Utc>) -> LicenseResult<Inquiry> {
        verifier::inquire(self.store.as_ref(), domain, now).await
    }

    pub async fn verify(
        &self,
        domain: &str,
        certificate: &str,
        hash: &str,
    ) -> LicenseResult<Verification> {
        self.verify_at(domain, certificate, hash, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        domain: &str,
        certificate: &str,
        hash: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<Verification> {
        verifier::verify(self.store.as_ref(), domain, certificate, hash, now).await
    }

    pub async fn report_unauthorized(&self, domain: &str) -> LicenseResult<()> {
        verifier::report_unauthorized(self.store.as_ref(), domain, Utc::now()).await
    }

    pub async fn revoke_authorization(&self, domain: &str) -> LicenseResult<()> {
        binder::revoke(self.store.as_ref(), domain).await
    }

    /// Counts as stored. `active_authorizations` counts the stored state and
    /// does not exclude grants that have run out.
    pub async fn stats(&self) -> LicenseResult<Stats> {
        let store = self.store.as_ref();
        Ok(Stats {
            active_authorizations: store
                .count_authorizations(Some(AuthorizationState::Active))
                .await?,
            unauthorized_reports: store.count_unauthorized_reports().await?,
            total_keys: store.count_keys(None).await?,
            unused_keys: store.count_keys(Some(KeyState::Unused)).await?,
        })
    }
}
