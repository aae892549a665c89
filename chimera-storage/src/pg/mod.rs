//! PostgreSQL storage backend.
//!
//! One [`PgStore`] wraps a deadpool connection pool and implements every
//! storage trait. The expected schema ships in
//! `migrations/V1__generation_cache.sql`; nothing here creates tables.
//!
//! Coalescing relies on the partial unique index
//! `generation_requests_in_flight (fingerprint, kind) WHERE status IN
//! ('pending', 'processing')`: acquisition is a plain INSERT, and a unique
//! violation means another attempt holds the slot.

mod artifacts;
mod ledger;
mod styles;

use chimera_core::{env_parse, FallbackEvent, FallbackRecorder, StorageError};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait for a pooled connection before giving up
    pub timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "chimera".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CHIMERA_DB_HOST`, `CHIMERA_DB_PORT`, `CHIMERA_DB_NAME`,
    ///   `CHIMERA_DB_USER`, `CHIMERA_DB_PASSWORD`
    /// - `CHIMERA_DB_POOL_SIZE`: Maximum pooled connections (default: 16)
    /// - `CHIMERA_DB_TIMEOUT`: Seconds to wait for a connection (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("CHIMERA_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("CHIMERA_DB_PORT", defaults.port),
            dbname: std::env::var("CHIMERA_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("CHIMERA_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("CHIMERA_DB_PASSWORD").unwrap_or_default(),
            max_size: env_parse("CHIMERA_DB_POOL_SIZE", defaults.max_size),
            timeout: Duration::from_secs(env_parse("CHIMERA_DB_TIMEOUT", 30)),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool, StorageError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            })
    }
}

// ============================================================================
// STORE
// ============================================================================

/// PostgreSQL-backed cache, ledger, style and fallback-log store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> Result<Self, StorageError> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })
    }
}

/// Map a driver error for `operation` into a storage error.
fn query_err(operation: &'static str) -> impl Fn(tokio_postgres::Error) -> StorageError {
    move |e| StorageError::query(operation, e)
}

fn is_unique_violation(e: &tokio_postgres::Error) -> bool {
    e.as_db_error()
        .map(|db| db.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION)
        .unwrap_or(false)
}

fn decode_err(entity: &str, reason: impl ToString) -> StorageError {
    StorageError::SerializationFailed {
        entity: entity.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait::async_trait]
impl FallbackRecorder for PgStore {
    async fn record(&self, event: &FallbackEvent) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO generation_fallback_logs \
             (from_provider, to_provider, reason, prompt_preview, occurred_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &event.from_provider,
                &event.to_provider,
                &event.reason,
                &event.prompt_preview,
                &event.occurred_at,
            ],
        )
        .await
        .map_err(query_err("fallback_record"))?;
        Ok(())
    }
}
