//! Configuration system.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `DOMAIN_AUTH_SERVER_HOST` - Server bind address
//! - `DOMAIN_AUTH_SERVER_PORT` - Server port
//! - `DOMAIN_AUTH_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `DOMAIN_AUTH_DATABASE_URL` - Database connection URL
//! - `DOMAIN_AUTH_STORE_TIMEOUT_SECS` - Bounded wait for a single store call
//! - `DOMAIN_AUTH_CERT_ORGANIZATION` - Subject organization in issued artifacts
//! - `DOMAIN_AUTH_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//!
//! Nothing here is global: the caller loads an [`AuthConfig`] once and hands
//! the relevant sections to the components that need them.

use config::Config;
use serde::Deserialize;
use std::env;

use crate::errors::{LicenseError, LicenseResult};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Store access configuration
    pub store: StoreConfig,
    /// Activation key format
    pub keys: KeysConfig,
    /// Placeholder certificate contents
    pub certificate: CertificateConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://domain_auth.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/domain_auth".to_string(),
            max_connections: 5,
        }
    }
}

/// Store access configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on a single store call before the request fails
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Activation key format.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Number of dash-separated groups
    pub segments: u8,
    /// Characters per group
    pub segment_length: u8,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            segments: 4,
            segment_length: 4,
        }
    }
}

/// Values embedded in the placeholder certificate artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Subject organization (O)
    pub organization: String,
    /// Subject locality (L)
    pub locality: String,
    /// Subject state or province (S)
    pub state: String,
    /// Subject and issuer country (C)
    pub country: String,
    /// Issuer common name (CN); the issuer organization is the app id
    pub issuer_common_name: String,
    /// Validity window written into the artifact
    pub validity_years: u32,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            organization: "Domain Authorization Service".to_string(),
            locality: "Changchun".to_string(),
            state: "Jilin".to_string(),
            country: "CN".to_string(),
            issuer_common_name: "AUth".to_string(),
            validity_years: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

impl AuthConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let defaults = AuthConfig::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("database.db_type", defaults.database.db_type)
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url)
            .map_err(config_err)?
            .set_default("database.postgres_url", defaults.database.postgres_url)
            .map_err(config_err)?
            .set_default(
                "database.max_connections",
                i64::from(defaults.database.max_connections),
            )
            .map_err(config_err)?
            .set_default("store.timeout_secs", defaults.store.timeout_secs as i64)
            .map_err(config_err)?
            .set_default("keys.segments", i64::from(defaults.keys.segments))
            .map_err(config_err)?
            .set_default("keys.segment_length", i64::from(defaults.keys.segment_length))
            .map_err(config_err)?
            .set_default("certificate.organization", defaults.certificate.organization)
            .map_err(config_err)?
            .set_default("certificate.locality", defaults.certificate.locality)
            .map_err(config_err)?
            .set_default("certificate.state", defaults.certificate.state)
            .map_err(config_err)?
            .set_default("certificate.country", defaults.certificate.country)
            .map_err(config_err)?
            .set_default(
                "certificate.issuer_common_name",
                defaults.certificate.issuer_common_name,
            )
            .map_err(config_err)?
            .set_default(
                "certificate.validity_years",
                i64::from(defaults.certificate.validity_years),
            )
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("DOMAIN_AUTH_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option(
                "server.port",
                env::var("DOMAIN_AUTH_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("DOMAIN_AUTH_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                env::var("DOMAIN_AUTH_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                env::var("DOMAIN_AUTH_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option(
                "store.timeout_secs",
                env::var("DOMAIN_AUTH_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "certificate.organization",
                env::var("DOMAIN_AUTH_CERT_ORGANIZATION").ok(),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("DOMAIN_AUTH_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }
        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.store.timeout_secs == 0 {
            return Err(LicenseError::ConfigError(
                "store.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.keys.segments == 0 || self.keys.segment_length == 0 {
            return Err(LicenseError::ConfigError(
                "keys.segments and keys.segment_length must be greater than 0".to_string(),
            ));
        }

        if self.certificate.validity_years == 0 {
            return Err(LicenseError::ConfigError(
                "certificate.validity_years must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Load and validate configuration.
///
/// Call this once at startup and pass the result down; there is no cached
/// global copy.
pub fn load_config() -> LicenseResult<AuthConfig> {
    let config = AuthConfig::load()?;
    config.validate()?;
    Ok(config)
}
