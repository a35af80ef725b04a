//! SQLite Connection and Bootstrap

use crate::schema::SCHEMA;
use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://ringwatch.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ringwatch.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    fn is_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

/// SQLite-backed topology and alert store
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database and bootstrap the schema
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // each pooled connection to :memory: would get its own database
        let max_connections = if config.is_memory() {
            1
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            config.max_connections.max(1)
        };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if config.is_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await?;
        info!("Connected to {} ({} connections)", config.url, max_connections);

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they don't exist
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::SerializationError(format!("timestamp out of range: {ms}")))
}
