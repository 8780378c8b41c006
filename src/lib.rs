//! domain-auth - domain-bound license authorization
//!
//! Single-use activation keys are redeemed to bind a domain. A binding issues
//! a placeholder certificate, a random token and an integrity hash over both;
//! clients later present the certificate and hash to prove the domain is
//! licensed.
//!
//! # Features
//!
//! - `server` - HTTP surface and SQL store (handlers, routes, database). Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_auth::{config::AuthConfig, grant::GrantDuration, service::Licensing, store::MemoryStore};
//!
//! let licensing = Licensing::new(Arc::new(MemoryStore::new()), &AuthConfig::default());
//! let keys = licensing.generate_keys(1, GrantDuration::ThirtyDays, "APP1").await?;
//! let bound = licensing.redeem_key(&keys[0], "https://www.example.com/").await?;
//! let check = licensing
//!     .verify("example.com", &bound.credentials.certificate, &bound.credentials.hash)
//!     .await?;
//! assert!(check.valid);
//! ```

// Core modules (always available)
pub mod binder;
pub mod config;
pub mod derivation;
pub mod domain;
pub mod errors;
pub mod grant;
pub mod keys;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;
pub mod verifier;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use errors::{LicenseError, LicenseResult};
pub use service::{Licensing, Stats};
