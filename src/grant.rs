//! Grant durations and the expiry policy.
//!
//! [`is_within_grant`] is the only place in the crate that decides whether a
//! grant has run out. Everything that reports an effective state goes through
//! it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::LicenseError;

/// How long a binding stays valid after it is created.
///
/// Persisted and exchanged as an integer day code: `-1` for perpetual,
/// otherwise the number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum GrantDuration {
    Perpetual,
    ThirtyDays,
    ThreeSixtyFiveDays,
}

impl GrantDuration {
    /// Integer code used in storage and on the wire.
    pub const fn code(self) -> i64 {
        match self {
            GrantDuration::Perpetual => -1,
            GrantDuration::ThirtyDays => 30,
            GrantDuration::ThreeSixtyFiveDays => 365,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(GrantDuration::Perpetual),
            30 => Some(GrantDuration::ThirtyDays),
            365 => Some(GrantDuration::ThreeSixtyFiveDays),
            _ => None,
        }
    }

    /// Length of the window in days, `None` for perpetual grants.
    pub const fn days(self) -> Option<i64> {
        match self {
            GrantDuration::Perpetual => None,
            GrantDuration::ThirtyDays => Some(30),
            GrantDuration::ThreeSixtyFiveDays => Some(365),
        }
    }

    /// The first instant at which a grant created at `created_at` is expired.
    pub fn expires_at(self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days().map(|days| created_at + Duration::days(days))
    }
}

impl TryFrom<i64> for GrantDuration {
    type Error = LicenseError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        GrantDuration::from_code(code).ok_or_else(|| {
            LicenseError::validation("time", format!("unsupported grant duration code {code}"))
        })
    }
}

impl From<GrantDuration> for i64 {
    fn from(grant: GrantDuration) -> Self {
        grant.code()
    }
}

impl fmt::Display for GrantDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantDuration::Perpetual => write!(f, "perpetual"),
            GrantDuration::ThirtyDays => write!(f, "30 days"),
            GrantDuration::ThreeSixtyFiveDays => write!(f, "365 days"),
        }
    }
}

/// Whether a grant created at `created_at` is still valid at `now`.
///
/// Perpetual grants never expire. Day-based grants are valid while
/// `now < created_at + days`; the expiry instant itself is already expired.
pub fn is_within_grant(grant: GrantDuration, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match grant.expires_at(created_at) {
        None => true,
        Some(expires_at) => now < expires_at,
    }
}
