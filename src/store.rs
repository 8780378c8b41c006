//! Store abstraction for the four record types.
//!
//! The core never holds records in memory between calls; every read and
//! write goes through a [`Store`]. Correctness under concurrency comes from
//! the store, not from locks in the core:
//!
//! - [`Store::mark_key_used`] is a single conditional write (`Unused` → `Used`).
//! - Authorization and certificate inserts are guarded by unique constraints
//!   on `domain`, `token` and `hash`, reported as [`StoreError::UniqueViolation`].
//! - [`Store::commit_binding`] groups the three binding writes. The default
//!   implementation runs them one after another and is *not* atomic; stores
//!   with transactions override it.
//!
//! Available implementations:
//! - [`MemoryStore`]: in-process, used by tests and embedders
//! - `server::database::Database`: SQLite / PostgreSQL through sqlx
//!   (requires the `server` feature)
//! - [`TimeoutStore`]: wraps another store and bounds every call

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::models::{
    ActivationKey, Authorization, AuthorizationState, CertificateRecord, KeyState,
    UnauthorizedReport,
};

mod memory;
mod timeout;

pub use memory::MemoryStore;
pub use timeout::TimeoutStore;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a store can produce.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. `field` names the column
    /// (`key`, `domain`, `token` or `hash`).
    #[error("unique constraint violated on {field}")]
    UniqueViolation { field: String },

    /// The backend could not be reached or failed internally.
    #[error("{0}")]
    Unavailable(String),

    /// The backend did not answer within the configured bound.
    #[error("store operation timed out")]
    Timeout,

    /// A stored row could not be decoded into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unique(field: impl Into<String>) -> Self {
        StoreError::UniqueViolation {
            field: field.into(),
        }
    }

    pub fn is_unique_violation_on(&self, expected: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { field } if field == expected)
    }
}

/// Which write of a binding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStage {
    /// Flipping the key to `Used`.
    Key,
    /// Inserting the authorization record.
    Authorization,
    /// Inserting the certificate record.
    Certificate,
    /// The commit did not answer in time; the outcome is unknown.
    Commit,
}

impl fmt::Display for BindStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindStage::Key => "key",
            BindStage::Authorization => "authorization",
            BindStage::Certificate => "certificate",
            BindStage::Commit => "commit",
        };
        write!(f, "{s}")
    }
}

/// The three writes that make up a successful binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub authorization: Authorization,
    pub certificate: CertificateRecord,
}

impl Binding {
    pub fn key(&self) -> &str {
        &self.authorization.source_key
    }

    pub fn domain(&self) -> &str {
        &self.authorization.domain
    }
}

/// Why [`Store::commit_binding`] did not complete.
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    /// The key is absent or no longer `Unused`. Nothing was written.
    #[error("activation key is not redeemable")]
    KeyUnavailable,

    /// Another authorization already holds the domain. Nothing was written.
    #[error("domain is already bound")]
    DomainTaken,

    /// The key was consumed but a later write failed.
    #[error("binding stopped at {stage}: {source}")]
    Partial {
        stage: BindStage,
        #[source]
        source: StoreError,
    },

    /// The store failed before anything was written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistence collaborator for the licensing core.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap liveness probe.
    async fn ping(&self) -> StoreResult<()>;

    // --- activation keys ---

    async fn find_key(&self, key: &str) -> StoreResult<Option<ActivationKey>>;

    async fn key_exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.find_key(key).await?.is_some())
    }

    /// Insert a batch of new keys. Either every key is stored or none is; a
    /// duplicate value fails the batch with `UniqueViolation { field: "key" }`.
    async fn insert_keys(&self, keys: &[ActivationKey]) -> StoreResult<()>;

    /// Conditionally flip `key` from `Unused` to `Used`, recording `domain`.
    ///
    /// Returns the updated key, or `None` if the key is absent or was not
    /// `Unused` at the moment of the write.
    async fn mark_key_used(&self, key: &str, domain: &str) -> StoreResult<Option<ActivationKey>>;

    /// Delete `key` only if it is still `Unused`. Returns whether a key was
    /// deleted.
    async fn delete_unused_key(&self, key: &str) -> StoreResult<bool>;

    async fn count_keys(&self, state: Option<KeyState>) -> StoreResult<u64>;

    // --- authorizations ---

    async fn find_authorization(&self, domain: &str) -> StoreResult<Option<Authorization>>;

    /// The authorization whose domain, certificate and hash all match exactly.
    async fn find_matching_authorization(
        &self,
        domain: &str,
        certificate: &str,
        hash: &str,
    ) -> StoreResult<Option<Authorization>>;

    async fn insert_authorization(&self, authorization: &Authorization) -> StoreResult<()>;

    /// Returns whether an authorization for `domain` existed.
    async fn set_authorization_state(
        &self,
        domain: &str,
        state: AuthorizationState,
    ) -> StoreResult<bool>;

    async fn count_authorizations(&self, state: Option<AuthorizationState>) -> StoreResult<u64>;

    // --- certificates ---

    async fn find_certificate(&self, domain: &str) -> StoreResult<Option<CertificateRecord>>;

    async fn insert_certificate(&self, certificate: &CertificateRecord) -> StoreResult<()>;

    // --- unauthorized reports ---

    async fn insert_unauthorized_report(&self, report: &UnauthorizedReport) -> StoreResult<()>;

    async fn count_unauthorized_reports(&self) -> StoreResult<u64>;

    /// Apply the three writes of a binding: flip the key, insert the
    /// authorization, insert the certificate.
    ///
    /// This default runs them in sequence without a transaction. A failure
    /// after the key flip is reported as [`CommitError::Partial`] and left for
    /// manual reconciliation. Stores that support transactions should
    /// override it so that a domain conflict leaves the key untouched.
    async fn commit_binding(&self, binding: &Binding) -> Result<ActivationKey, CommitError> {
        let key = self
            .mark_key_used(binding.key(), binding.domain())
            .await?
            .ok_or(CommitError::KeyUnavailable)?;

        if let Err(source) = self.insert_authorization(&binding.authorization).await {
            error!(
                key = %binding.key(),
                domain = %binding.domain(),
                error = %source,
                "Authorization insert failed after key was consumed"
            );
            return Err(CommitError::Partial {
                stage: BindStage::Authorization,
                source,
            });
        }

        if let Err(source) = self.insert_certificate(&binding.certificate).await {
            error!(
                key = %binding.key(),
                domain = %binding.domain(),
                error = %source,
                "Certificate insert failed after authorization was written"
            );
            return Err(CommitError::Partial {
                stage: BindStage::Certificate,
                source,
            });
        }

        Ok(key)
    }
}
