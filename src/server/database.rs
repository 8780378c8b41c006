//! SQL store over SQLite and Postgres.
//!
//! Uniqueness is enforced by the schema created in [`Database::migrate`]:
//! activation keys are unique, and authorizations and certificates are unique
//! on `domain`, `token` and `hash`. [`Store::commit_binding`] runs inside a
//! transaction, so a lost race on a domain leaves the key unused.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::sqlite::SqlitePoolOptions;
#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::postgres::PgPoolOptions;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::grant::GrantDuration;
use crate::models::{
    ActivationKey, Authorization, AuthorizationState, CertificateRecord, KeyState,
    UnauthorizedReport,
};
use crate::store::{Binding, CommitError, Store, StoreError, StoreResult};

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS activation_keys (
        activation_key TEXT NOT NULL UNIQUE,
        grant_days     INTEGER NOT NULL,
        state          INTEGER NOT NULL DEFAULT 0,
        app_id         TEXT NOT NULL,
        bound_domain   TEXT,
        created_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authorizations (
        domain      TEXT NOT NULL UNIQUE,
        source_key  TEXT NOT NULL,
        grant_days  INTEGER NOT NULL,
        state       INTEGER NOT NULL,
        certificate TEXT NOT NULL,
        token       TEXT NOT NULL UNIQUE,
        hash        TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS certificates (
        domain      TEXT NOT NULL UNIQUE,
        certificate TEXT NOT NULL,
        private_key TEXT NOT NULL,
        token       TEXT NOT NULL UNIQUE,
        hash        TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS unauthorized_reports (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        domain      TEXT NOT NULL,
        reported_at TEXT NOT NULL
    )
    "#,
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS activation_keys (
        activation_key TEXT NOT NULL,
        grant_days     BIGINT NOT NULL,
        state          BIGINT NOT NULL DEFAULT 0,
        app_id         TEXT NOT NULL,
        bound_domain   TEXT,
        created_at     TIMESTAMPTZ NOT NULL,
        CONSTRAINT ux_activation_keys_key UNIQUE (activation_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authorizations (
        domain      TEXT NOT NULL,
        source_key  TEXT NOT NULL,
        grant_days  BIGINT NOT NULL,
        state       BIGINT NOT NULL,
        certificate TEXT NOT NULL,
        token       TEXT NOT NULL,
        hash        TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        CONSTRAINT ux_authorizations_domain UNIQUE (domain),
        CONSTRAINT ux_authorizations_token UNIQUE (token),
        CONSTRAINT ux_authorizations_hash UNIQUE (hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS certificates (
        domain      TEXT NOT NULL,
        certificate TEXT NOT NULL,
        private_key TEXT NOT NULL,
        token       TEXT NOT NULL,
        hash        TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        CONSTRAINT ux_certificates_domain UNIQUE (domain),
        CONSTRAINT ux_certificates_token UNIQUE (token),
        CONSTRAINT ux_certificates_hash UNIQUE (hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS unauthorized_reports (
        id          BIGSERIAL PRIMARY KEY,
        domain      TEXT NOT NULL,
        reported_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Row layout of `activation_keys`.
#[derive(Debug, Clone, FromRow)]
struct KeyRow {
    activation_key: String,
    grant_days: i64,
    state: i64,
    app_id: String,
    bound_domain: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<KeyRow> for ActivationKey {
    type Error = StoreError;

    fn try_from(row: KeyRow) -> Result<Self, Self::Error> {
        Ok(ActivationKey {
            grant: GrantDuration::try_from(row.grant_days)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            state: KeyState::try_from(row.state).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            key: row.activation_key,
            app_id: row.app_id,
            bound_domain: row.bound_domain,
            created_at: row.created_at,
        })
    }
}

/// Row layout of `authorizations`.
#[derive(Debug, Clone, FromRow)]
struct AuthorizationRow {
    domain: String,
    source_key: String,
    grant_days: i64,
    state: i64,
    certificate: String,
    token: String,
    hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuthorizationRow> for Authorization {
    type Error = StoreError;

    fn try_from(row: AuthorizationRow) -> Result<Self, Self::Error> {
        Ok(Authorization {
            grant: GrantDuration::try_from(row.grant_days)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            state: AuthorizationState::try_from(row.state)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            domain: row.domain,
            source_key: row.source_key,
            certificate: row.certificate,
            token: row.token,
            hash: row.hash,
            created_at: row.created_at,
        })
    }
}

/// Row layout of `certificates`.
#[derive(Debug, Clone, FromRow)]
struct CertificateRow {
    domain: String,
    certificate: String,
    private_key: String,
    token: String,
    hash: String,
    created_at: DateTime<Utc>,
}

impl From<CertificateRow> for CertificateRecord {
    fn from(row: CertificateRow) -> Self {
        CertificateRecord {
            domain: row.domain,
            certificate: row.certificate,
            private_key: row.private_key,
            token: row.token,
            hash: row.hash,
            created_at: row.created_at,
        }
    }
}

/// Column named by a unique-violation error.
///
/// Postgres reports the constraint (`ux_authorizations_domain`), SQLite only
/// the message (`UNIQUE constraint failed: authorizations.domain`). Both end
/// in the column name; `activation_key` reduces to `key`.
fn unique_field(db_err: &dyn sqlx::error::DatabaseError) -> String {
    let source = db_err.constraint().unwrap_or_else(|| db_err.message());
    source
        .rsplit(|c: char| c == '.' || c == '_')
        .next()
        .unwrap_or(source)
        .trim()
        .to_string()
}

/// Map a driver error, keeping unique violations distinguishable.
fn store_err(operation: &str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation {
                field: unique_field(db_err.as_ref()),
            };
        }
    }
    error!("{operation} failed: {e}");
    StoreError::Unavailable(format!("database error: {e}"))
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Open a connection pool for the configured backend.
    pub async fn connect(config: &DatabaseConfig) -> LicenseResult<Self> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::StoreUnavailable(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Database::SQLite(pool))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::StoreUnavailable(format!(
                            "failed to connect to PostgreSQL: {e}"
                        ))
                    })?;

                Ok(Database::Postgres(pool))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Create tables and unique constraints if they do not exist yet.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| LicenseError::from(store_err("SQLite migrate", e)))?;
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| LicenseError::from(store_err("Postgres migrate", e)))?;
                }
            }
        }
        info!(db_type = self.db_type(), "Database schema is up to date");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => pool.close().await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => pool.close().await,
        }
    }

    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }
}

#[async_trait]
impl Store for Database {
    async fn ping(&self) -> StoreResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("SQLite ping", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("Postgres ping", e))?;
            }
        }
        Ok(())
    }

    async fn find_key(&self, key: &str) -> StoreResult<Option<ActivationKey>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, KeyRow>("SELECT * FROM activation_keys WHERE activation_key = ?")
                    .bind(key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("SQLite find_key", e))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, KeyRow>("SELECT * FROM activation_keys WHERE activation_key = $1")
                    .bind(key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("Postgres find_key", e))?
            }
        };

        row.map(ActivationKey::try_from).transpose()
    }

    async fn insert_keys(&self, keys: &[ActivationKey]) -> StoreResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_err("SQLite insert_keys", e))?;
                for key in keys {
                    query(
                        "INSERT INTO activation_keys \
                             (activation_key, grant_days, state, app_id, bound_domain, created_at) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(&key.key)
                    .bind(key.grant.code())
                    .bind(key.state.code())
                    .bind(&key.app_id)
                    .bind(&key.bound_domain)
                    .bind(key.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("SQLite insert_keys", e))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| store_err("SQLite insert_keys", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| store_err("Postgres insert_keys", e))?;
                for key in keys {
                    query(
                        "INSERT INTO activation_keys \
                             (activation_key, grant_days, state, app_id, bound_domain, created_at) \
                         VALUES ($1, $2, $3, $4, $5, $6)",
                    )
                    .bind(&key.key)
                    .bind(key.grant.code())
                    .bind(key.state.code())
                    .bind(&key.app_id)
                    .bind(&key.bound_domain)
                    .bind(key.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_err("Postgres insert_keys", e))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| store_err("Postgres insert_keys", e))?;
            }
        }

        Ok(())
    }

    async fn mark_key_used(&self, key: &str, domain: &str) -> StoreResult<Option<ActivationKey>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, KeyRow>(
                "UPDATE activation_keys SET state = ?, bound_domain = ? \
                 WHERE activation_key = ? AND state = ? \
                 RETURNING *",
            )
            .bind(KeyState::Used.code())
            .bind(domain)
            .bind(key)
            .bind(KeyState::Unused.code())
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("SQLite mark_key_used", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, KeyRow>(
                "UPDATE activation_keys SET state = $1, bound_domain = $2 \
                 WHERE activation_key = $3 AND state = $4 \
                 RETURNING *",
            )
            .bind(KeyState::Used.code())
            .bind(domain)
            .bind(key)
            .bind(KeyState::Unused.code())
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("Postgres mark_key_used", e))?,
        };

        row.map(ActivationKey::try_from).transpose()
    }

    async fn delete_unused_key(&self, key: &str) -> StoreResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("DELETE FROM activation_keys WHERE activation_key = ? AND state = ?")
                    .bind(key)
                    .bind(KeyState::Unused.code())
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("SQLite delete_unused_key", e))?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("DELETE FROM activation_keys WHERE activation_key = $1 AND state = $2")
                    .bind(key)
                    .bind(KeyState::Unused.code())
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("Postgres delete_unused_key", e))?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }

    async fn count_keys(&self, state: Option<KeyState>) -> StoreResult<u64> {
        let state = state.map(KeyState::code);
        let count: i64 = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar(
                "SELECT COUNT(*) FROM activation_keys WHERE (? IS NULL OR state = ?)",
            )
            .bind(state)
            .bind(state)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("SQLite count_keys", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar(
                "SELECT COUNT(*) FROM activation_keys WHERE ($1::BIGINT IS NULL OR state = $1)",
            )
            .bind(state)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("Postgres count_keys", e))?,
        };

        Ok(count.max(0) as u64)
    }

    async fn find_authorization(&self, domain: &str) -> StoreResult<Option<Authorization>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, AuthorizationRow>("SELECT * FROM authorizations WHERE domain = ?")
                    .bind(domain)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("SQLite find_authorization", e))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, AuthorizationRow>("SELECT * FROM authorizations WHERE domain = $1")
                    .bind(domain)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("Postgres find_authorization", e))?
            }
        };

        row.map(Authorization::try_from).transpose()
    }

    async fn find_matching_authorization(
        &self,
        domain: &str,
        certificate: &str,
        hash: &str,
    ) -> StoreResult<Option<Authorization>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, AuthorizationRow>(
                "SELECT * FROM authorizations WHERE domain = ? AND certificate = ? AND hash = ?",
            )
            .bind(domain)
            .bind(certificate)
            .bind(hash)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("SQLite find_matching_authorization", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, AuthorizationRow>(
                "SELECT * FROM authorizations WHERE domain = $1 AND certificate = $2 AND hash = $3",
            )
            .bind(domain)
            .bind(certificate)
            .bind(hash)
            .fetch_optional(pool)
            .await
            .map_err(|e| store_err("Postgres find_matching_authorization", e))?,
        };

        row.map(Authorization::try_from).transpose()
    }

    async fn insert_authorization(&self, authorization: &Authorization) -> StoreResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                sqlite::insert_authorization(pool, authorization)
                    .await
                    .map_err(|e| store_err("SQLite insert_authorization", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                postgres::insert_authorization(pool, authorization)
                    .await
                    .map_err(|e| store_err("Postgres insert_authorization", e))?;
            }
        }
        Ok(())
    }

    async fn set_authorization_state(
        &self,
        domain: &str,
        state: AuthorizationState,
    ) -> StoreResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("UPDATE authorizations SET state = ? WHERE domain = ?")
                .bind(state.code())
                .bind(domain)
                .execute(pool)
                .await
                .map_err(|e| store_err("SQLite set_authorization_state", e))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE authorizations SET state = $1 WHERE domain = $2")
                    .bind(state.code())
                    .bind(domain)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("Postgres set_authorization_state", e))?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }

    async fn count_authorizations(&self, state: Option<AuthorizationState>) -> StoreResult<u64> {
        let state = state.map(AuthorizationState::code);
        let count: i64 = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar(
                "SELECT COUNT(*) FROM authorizations WHERE (? IS NULL OR state = ?)",
            )
            .bind(state)
            .bind(state)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("SQLite count_authorizations", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar(
                "SELECT COUNT(*) FROM authorizations WHERE ($1::BIGINT IS NULL OR state = $1)",
            )
            .bind(state)
            .fetch_one(pool)
            .await
            .map_err(|e| store_err("Postgres count_authorizations", e))?,
        };

        Ok(count.max(0) as u64)
    }

    async fn find_certificate(&self, domain: &str) -> StoreResult<Option<CertificateRecord>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE domain = ?")
                    .bind(domain)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("SQLite find_certificate", e))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, CertificateRow>("SELECT * FROM certificates WHERE domain = $1")
                    .bind(domain)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| store_err("Postgres find_certificate", e))?
            }
        };

        Ok(row.map(CertificateRecord::from))
    }

    async fn insert_certificate(&self, certificate: &CertificateRecord) -> StoreResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                sqlite::insert_certificate(pool, certificate)
                    .await
                    .map_err(|e| store_err("SQLite insert_certificate", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                postgres::insert_certificate(pool, certificate)
                    .await
                    .map_err(|e| store_err("Postgres insert_certificate", e))?;
            }
        }
        Ok(())
    }

    async fn insert_unauthorized_report(&self, report: &UnauthorizedReport) -> StoreResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("INSERT INTO unauthorized_reports (domain, reported_at) VALUES (?, ?)")
                    .bind(&report.domain)
                    .bind(report.reported_at)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("SQLite insert_unauthorized_report", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("INSERT INTO unauthorized_reports (domain, reported_at) VALUES ($1, $2)")
                    .bind(&report.domain)
                    .bind(report.reported_at)
                    .execute(pool)
                    .await
                    .map_err(|e| store_err("Postgres insert_unauthorized_report", e))?;
            }
        }
        Ok(())
    }

    async fn count_unauthorized_reports(&self) -> StoreResult<u64> {
        let count: i64 = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar("SELECT COUNT(*) FROM unauthorized_reports")
                .fetch_one(pool)
                .await
                .map_err(|e| store_err("SQLite count_unauthorized_reports", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar("SELECT COUNT(*) FROM unauthorized_reports")
                .fetch_one(pool)
                .await
                .map_err(|e| store_err("Postgres count_unauthorized_reports", e))?,
        };

        Ok(count.max(0) as u64)
    }

    async fn commit_binding(&self, binding: &Binding) -> Result<ActivationKey, CommitError> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => sqlite::commit_binding(pool, binding).await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => postgres::commit_binding(pool, binding).await,
        }
    }
}

/// Map an insert failure inside a binding transaction. The transaction is
/// rolled back when it is dropped, so nothing has been written.
fn binding_insert_err(operation: &str, e: sqlx::Error) -> CommitError {
    match store_err(operation, e) {
        err if err.is_unique_violation_on("domain") => CommitError::DomainTaken,
        err => CommitError::Store(err),
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sqlx::{Sqlite, SqliteConnection};

    pub(super) async fn insert_authorization<'e, E>(
        executor: E,
        auth: &Authorization,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        query(
            "INSERT INTO authorizations \
                 (domain, source_key, grant_days, state, certificate, token, hash, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&auth.domain)
        .bind(&auth.source_key)
        .bind(auth.grant.code())
        .bind(auth.state.code())
        .bind(&auth.certificate)
        .bind(&auth.token)
        .bind(&auth.hash)
        .bind(auth.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub(super) async fn insert_certificate<'e, E>(
        executor: E,
        cert: &CertificateRecord,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        query(
            "INSERT INTO certificates \
                 (domain, certificate, private_key, token, hash, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&cert.domain)
        .bind(&cert.certificate)
        .bind(&cert.private_key)
        .bind(&cert.token)
        .bind(&cert.hash)
        .bind(cert.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn flip_key(
        conn: &mut SqliteConnection,
        key: &str,
        domain: &str,
    ) -> Result<Option<KeyRow>, sqlx::Error> {
        query_as::<_, KeyRow>(
            "UPDATE activation_keys SET state = ?, bound_domain = ? \
             WHERE activation_key = ? AND state = ? \
             RETURNING *",
        )
        .bind(KeyState::Used.code())
        .bind(domain)
        .bind(key)
        .bind(KeyState::Unused.code())
        .fetch_optional(conn)
        .await
    }

    pub(super) async fn commit_binding(
        pool: &SqlitePool,
        binding: &Binding,
    ) -> Result<ActivationKey, CommitError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| store_err("SQLite commit_binding", e))?;

        let row = flip_key(&mut tx, binding.key(), binding.domain())
            .await
            .map_err(|e| store_err("SQLite commit_binding", e))?
            .ok_or(CommitError::KeyUnavailable)?;

        insert_authorization(&mut *tx, &binding.authorization)
            .await
            .map_err(|e| binding_insert_err("SQLite commit_binding", e))?;
        insert_certificate(&mut *tx, &binding.certificate)
            .await
            .map_err(|e| binding_insert_err("SQLite commit_binding", e))?;

        tx.commit()
            .await
            .map_err(|e| store_err("SQLite commit_binding", e))?;

        Ok(ActivationKey::try_from(row)?)
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::{PgConnection, Postgres};

    pub(super) async fn insert_authorization<'e, E>(
        executor: E,
        auth: &Authorization,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        query(
            "INSERT INTO authorizations \
                 (domain, source_key, grant_days, state, certificate, token, hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&auth.domain)
        .bind(&auth.source_key)
        .bind(auth.grant.code())
        .bind(auth.state.code())
        .bind(&auth.certificate)
        .bind(&auth.token)
        .bind(&auth.hash)
        .bind(auth.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub(super) async fn insert_certificate<'e, E>(
        executor: E,
        cert: &CertificateRecord,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        query(
            "INSERT INTO certificates \
                 (domain, certificate, private_key, token, hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&cert.domain)
        .bind(&cert.certificate)
        .bind(&cert.private_key)
        .bind(&cert.token)
        .bind(&cert.hash)
        .bind(cert.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn flip_key(
        conn: &mut PgConnection,
        key: &str,
        domain: &str,
    ) -> Result<Option<KeyRow>, sqlx::Error> {
        query_as::<_, KeyRow>(
            "UPDATE activation_keys SET state = $1, bound_domain = $2 \
             WHERE activation_key = $3 AND state = $4 \
             RETURNING *",
        )
        .bind(KeyState::Used.code())
        .bind(domain)
        .bind(key)
        .bind(KeyState::Unused.code())
        .fetch_optional(conn)
        .await
    }

    pub(super) async fn commit_binding(
        pool: &PgPool,
        binding: &Binding,
    ) -> Result<ActivationKey, CommitError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| store_err("Postgres commit_binding", e))?;

        let row = flip_key(&mut tx, binding.key(), binding.domain())
            .await
            .map_err(|e| store_err("Postgres commit_binding", e))?
            .ok_or(CommitError::KeyUnavailable)?;

        insert_authorization(&mut *tx, &binding.authorization)
            .await
            .map_err(|e| binding_insert_err("Postgres commit_binding", e))?;
        insert_certificate(&mut *tx, &binding.certificate)
            .await
            .map_err(|e| binding_insert_err("Postgres commit_binding", e))?;

        tx.commit()
            .await
            .map_err(|e| store_err("Postgres commit_binding", e))?;

        Ok(ActivationKey::try_from(row)?)
    }
}
