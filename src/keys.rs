//! Activation key generation, redemption and deletion.
//!
//! Keys have the format `XXXX-XXXX-XXXX-XXXX`: a configurable number of
//! dash-separated groups drawn from `[A-Z0-9]`.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_auth::keys::{generate_activation_key, validate_key_format, KeyFormat};
//!
//! let format = KeyFormat::default();
//! let key = generate_activation_key(&format);
//! assert!(validate_key_format(&key, &format));
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::KeysConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::grant::GrantDuration;
use crate::logging::{log_authorization_event, AuthorizationEvent};
use crate::models::ActivationKey;
use crate::store::Store;

/// Character set for activation keys.
const ACTIVATION_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest batch a single `generate` call accepts.
pub const MAX_KEYS_PER_BATCH: usize = 100;

/// Attempts to draw a key that collides with neither the store nor the batch.
const MAX_DRAW_ATTEMPTS: u32 = 10;

/// Attempts to insert a whole batch when a concurrent generator wins a race.
const MAX_BATCH_ATTEMPTS: u32 = 3;

/// Shape of generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFormat {
    /// Number of groups
    pub segments: u8,
    /// Length of each group
    pub segment_length: u8,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            segments: 4,
            segment_length: 4,
        }
    }
}

impl From<&KeysConfig> for KeyFormat {
    fn from(config: &KeysConfig) -> Self {
        Self {
            segments: config.segments,
            segment_length: config.segment_length,
        }
    }
}

fn generate_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..ACTIVATION_KEY_CHARSET.len());
            ACTIVATION_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a single key. Uniqueness is not checked.
pub fn generate_activation_key(format: &KeyFormat) -> String {
    let segments: Vec<String> = (0..format.segments)
        .map(|_| generate_segment(format.segment_length))
        .collect();
    segments.join("-")
}

/// Whether `key` has the shape produced by [`generate_activation_key`].
pub fn validate_key_format(key: &str, format: &KeyFormat) -> bool {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() != format.segments as usize {
        return false;
    }

    parts.iter().all(|segment| {
        segment.len() == format.segment_length as usize
            && segment.bytes().all(|b| ACTIVATION_KEY_CHARSET.contains(&b))
    })
}

/// Draw a key that is in neither the store nor `taken`.
async fn draw_unique_key(
    store: &dyn Store,
    format: &KeyFormat,
    taken: &HashSet<String>,
) -> LicenseResult<String> {
    for _ in 0..MAX_DRAW_ATTEMPTS {
        let key = generate_activation_key(format);
        if taken.contains(&key) {
            continue;
        }
        if !store.key_exists(&key).await? {
            return Ok(key);
        }
        debug!(key = %key, "Generated key already exists, redrawing");
    }

    Err(LicenseError::ServerError(format!(
        "failed to generate unique activation key after {MAX_DRAW_ATTEMPTS} attempts"
    )))
}

/// Generate and persist `count` unused keys for `app_id`.
///
/// `count` must be in `1..=100` and `app_id` must be non-empty. The batch is
/// stored with one insert; if another generator wins a race on one of the
/// values, the whole batch is redrawn.
pub async fn generate(
    store: &dyn Store,
    count: usize,
    grant: GrantDuration,
    app_id: &str,
    format: &KeyFormat,
    now: DateTime<Utc>,
) -> LicenseResult<Vec<ActivationKey>> {
    if count == 0 || count > MAX_KEYS_PER_BATCH {
        return Err(LicenseError::validation(
            "count",
            format!("must be between 1 and {MAX_KEYS_PER_BATCH}"),
        ));
    }
    if app_id.trim().is_empty() {
        return Err(LicenseError::validation("appid", "must not be empty"));
    }

    for attempt in 1..=MAX_BATCH_ATTEMPTS {
        let mut taken = HashSet::with_capacity(count);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let key = draw_unique_key(store, format, &taken).await?;
            taken.insert(key.clone());
            batch.push(ActivationKey::new(key, grant, app_id, now));
        }

        match store.insert_keys(&batch).await {
            Ok(()) => {
                log_authorization_event(
                    AuthorizationEvent::KeysGenerated,
                    app_id,
                    Some(&format!("count={count} grant={grant}")),
                );
                return Ok(batch);
            }
            Err(e) if e.is_unique_violation_on("key") => {
                warn!(attempt, "Key batch collided with a concurrent insert, redrawing");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(LicenseError::ServerError(format!(
        "failed to store a unique key batch after {MAX_BATCH_ATTEMPTS} attempts"
    )))
}

/// Consume an unused key, recording the domain it was bound to.
///
/// Absent and already-used keys are indistinguishable to the caller.
pub async fn redeem(store: &dyn Store, key: &str, domain: &str) -> LicenseResult<ActivationKey> {
    store
        .mark_key_used(key, domain)
        .await?
        .ok_or(LicenseError::KeyInvalid)
}

/// Delete a key that has never been redeemed.
pub async fn delete(store: &dyn Store, key: &str) -> LicenseResult<()> {
    if store.delete_unused_key(key).await? {
        log_authorization_event(AuthorizationEvent::KeyDeleted, key, None);
        Ok(())
    } else {
        Err(LicenseError::KeyNotDeletable)
    }
}
