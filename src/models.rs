//! Persisted record types.
//!
//! These are plain structured records; the store layer decides how they are
//! laid out on disk. Integer codes for the state enums follow the same
//! convention in every store and on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;
use crate::grant::{is_within_grant, GrantDuration};

/// Lifecycle state of an activation key. `Used` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum KeyState {
    Unused,
    Used,
}

impl KeyState {
    pub const fn code(self) -> i64 {
        match self {
            KeyState::Unused => 0,
            KeyState::Used => 1,
        }
    }
}

impl TryFrom<i64> for KeyState {
    type Error = LicenseError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(KeyState::Unused),
            1 => Ok(KeyState::Used),
            other => Err(LicenseError::validation(
                "state",
                format!("unknown key state {other}"),
            )),
        }
    }
}

impl From<KeyState> for i64 {
    fn from(state: KeyState) -> Self {
        state.code()
    }
}

/// Stored state of an authorization.
///
/// The stored state alone does not say whether a domain is licensed; see
/// [`Authorization::effective_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum AuthorizationState {
    Inactive,
    Active,
}

impl AuthorizationState {
    pub const fn code(self) -> i64 {
        match self {
            AuthorizationState::Inactive => 0,
            AuthorizationState::Active => 1,
        }
    }
}

impl TryFrom<i64> for AuthorizationState {
    type Error = LicenseError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AuthorizationState::Inactive),
            1 => Ok(AuthorizationState::Active),
            other => Err(LicenseError::validation(
                "state",
                format!("unknown authorization state {other}"),
            )),
        }
    }
}

impl From<AuthorizationState> for i64 {
    fn from(state: AuthorizationState) -> Self {
        state.code()
    }
}

/// A single-use activation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationKey {
    pub key: String,
    pub grant: GrantDuration,
    pub state: KeyState,
    pub app_id: String,
    /// Always `Some` once the key is `Used`.
    pub bound_domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivationKey {
    /// A freshly generated, unused key.
    pub fn new(
        key: impl Into<String>,
        grant: GrantDuration,
        app_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            grant,
            state: KeyState::Unused,
            app_id: app_id.into(),
            bound_domain: None,
            created_at,
        }
    }

    pub fn is_unused(&self) -> bool {
        self.state == KeyState::Unused
    }
}

/// The record asserting that a domain is licensed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Normalized domain; unique across all authorizations.
    pub domain: String,
    pub source_key: String,
    pub grant: GrantDuration,
    pub state: AuthorizationState,
    /// Base64-encoded certificate artifact.
    pub certificate: String,
    pub token: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl Authorization {
    /// `Active` only if the stored state is active and the grant has not run out.
    pub fn effective_state(&self, now: DateTime<Utc>) -> AuthorizationState {
        if self.state == AuthorizationState::Active
            && is_within_grant(self.grant, self.created_at, now)
        {
            AuthorizationState::Active
        } else {
            AuthorizationState::Inactive
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.grant.expires_at(self.created_at)
    }
}

/// Certificate material kept alongside an authorization, including the
/// private artifact that is returned to the client only once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub domain: String,
    pub certificate: String,
    pub private_key: String,
    pub token: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// A client-reported sighting of an unlicensed domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnauthorizedReport {
    pub domain: String,
    pub reported_at: DateTime<Utc>,
}
