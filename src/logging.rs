//! Structured logging of authorization state changes.
//!
//! Every state change in the core is reported through
//! [`log_authorization_event`], so a single `tracing` filter on the
//! `authorization_event` span captures the full lifecycle.

use tracing::{error, info, info_span, warn};

/// Authorization state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationEvent {
    /// A batch of activation keys was generated
    KeysGenerated,
    /// An unused activation key was deleted
    KeyDeleted,
    /// A domain was bound through key redemption
    Bound,
    /// A domain was bound through the administrative path
    AdminBound,
    /// A binding failed after its key was consumed
    PartialBind,
    /// An authorization was set inactive
    Revoked,
    /// A presented credential matched an active authorization
    Verified,
    /// A presented credential did not verify
    VerificationFailed,
    /// A client reported an unlicensed domain
    UnauthorizedReported,
}

impl std::fmt::Display for AuthorizationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthorizationEvent::KeysGenerated => "keys_generated",
            AuthorizationEvent::KeyDeleted => "key_deleted",
            AuthorizationEvent::Bound => "bound",
            AuthorizationEvent::AdminBound => "admin_bound",
            AuthorizationEvent::PartialBind => "partial_bind",
            AuthorizationEvent::Revoked => "revoked",
            AuthorizationEvent::Verified => "verified",
            AuthorizationEvent::VerificationFailed => "verification_failed",
            AuthorizationEvent::UnauthorizedReported => "unauthorized_reported",
        };
        write!(f, "{}", s)
    }
}

/// Log an authorization state change.
///
/// `subject` is the domain or key the event is about. Failed verifications
/// log at `warn`, partial bindings at `error`, everything else at `info`.
pub fn log_authorization_event(event: AuthorizationEvent, subject: &str, details: Option<&str>) {
    let span = info_span!(
        "authorization_event",
        event = %event,
        subject = %subject,
    );
    let _enter = span.enter();

    match event {
        AuthorizationEvent::PartialBind => {
            if let Some(d) = details {
                error!(details = %d, "Authorization event occurred");
            } else {
                error!("Authorization event occurred");
            }
        }
        AuthorizationEvent::VerificationFailed | AuthorizationEvent::UnauthorizedReported => {
            if let Some(d) = details {
                warn!(reason = %d, "Authorization event occurred");
            } else {
                warn!("Authorization event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "Authorization event occurred");
            } else {
                info!("Authorization event occurred");
            }
        }
    }
}
