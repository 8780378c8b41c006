use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{BindStage, Binding, CommitError, Store, StoreError, StoreResult};
use crate::models::{
    ActivationKey, Authorization, AuthorizationState, CertificateRecord, KeyState,
    UnauthorizedReport,
};

/// Bounds every call on an inner store.
///
/// An elapsed call surfaces as [`StoreError::Timeout`]. An elapsed
/// [`Store::commit_binding`] is reported as a partial binding at
/// [`BindStage::Commit`], because the inner writes may or may not have landed.
pub struct TimeoutStore {
    inner: Arc<dyn Store>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn Store>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, limit_ms = self.limit.as_millis() as u64, "Store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }
}

#[async_trait]
impl Store for TimeoutStore {
    async fn ping(&self) -> StoreResult<()> {
        self.bounded("ping", self.inner.ping()).await
    }

    async fn find_key(&self, key: &str) -> StoreResult<Option<ActivationKey>> {
        self.bounded("find_key", self.inner.find_key(key)).await
    }

    async fn key_exists(&self, key: &str) -> StoreResult<bool> {
        self.bounded("key_exists", self.inner.key_exists(key)).await
    }

    async fn insert_keys(&self, keys: &[ActivationKey]) -> StoreResult<()> {
        self.bounded("insert_keys", self.inner.insert_keys(keys)).await
    }

    async fn mark_key_used(&self, key: &str, domain: &str) -> StoreResult<Option<ActivationKey>> {
        self.bounded("mark_key_used", self.inner.mark_key_used(key, domain))
            .await
    }

    async fn delete_unused_key(&self, key: &str) -> StoreResult<bool> {
        self.bounded("delete_unused_key", self.inner.delete_unused_key(key))
            .await
    }

    async fn count_keys(&self, state: Option<KeyState>) -> StoreResult<u64> {
        self.bounded("count_keys", self.inner.count_keys(state)).await
    }

    async fn find_authorization(&self, domain: &str) -> StoreResult<Option<Authorization>> {
        self.bounded("find_authorization", self.inner.find_authorization(domain))
            .await
    }

    async fn find_matching_authorization(
        &self,
        domain: &str,
        certificate: &str,
        hash: &str,
    ) -> StoreResult<Option<Authorization>> {
        self.bounded(
            "find_matching_authorization",
            self.inner
                .find_matching_authorization(domain, certificate, hash),
        )
        .await
    }

    async fn insert_authorization(&self, authorization: &Authorization) -> StoreResult<()> {
        self.bounded(
            "insert_authorization",
            self.inner.insert_authorization(authorization),
        )
        .await
    }

    async fn set_authorization_state(
        &self,
        domain: &str,
        state: AuthorizationState,
    ) -> StoreResult<bool> {
        self.bounded(
            "set_authorization_state",
            self.inner.set_authorization_state(domain, state),
        )
        .await
    }

    async fn count_authorizations(&self, state: Option<AuthorizationState>) -> StoreResult<u64> {
        self.bounded(
            "count_authorizations",
            self.inner.count_authorizations(state),
        )
        .await
    }

    async fn find_certificate(&self, domain: &str) -> StoreResult<Option<CertificateRecord>> {
        self.bounded("find_certificate", self.inner.find_certificate(domain))
            .await
    }

    async fn insert_certificate(&self, certificate: &CertificateRecord) -> StoreResult<()> {
        self.bounded(
            "insert_certificate",
            self.inner.insert_certificate(certificate),
        )
        .await
    }

    async fn insert_unauthorized_report(&self, report: &UnauthorizedReport) -> StoreResult<()> {
        self.bounded(
            "insert_unauthorized_report",
            self.inner.insert_unauthorized_report(report),
        )
        .await
    }

    async fn count_unauthorized_reports(&self) -> StoreResult<u64> {
        self.bounded(
            "count_unauthorized_reports",
            self.inner.count_unauthorized_reports(),
        )
        .await
    }

    async fn commit_binding(&self, binding: &Binding) -> Result<ActivationKey, CommitError> {
        match tokio::time::timeout(self.limit, self.inner.commit_binding(binding)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    key = %binding.key(),
                    domain = %binding.domain(),
                    "Binding commit timed out; outcome unknown"
                );
                Err(CommitError::Partial {
                    stage: BindStage::Commit,
                    source: StoreError::Timeout,
                })
            }
        }
    }
}
