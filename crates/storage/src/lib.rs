//! Storage Layer
//!
//! SQLite persistence behind the topology and alerting store traits.

mod alerts;
mod schema;
mod sqlite;
mod topology_store;

pub use sqlite::{DatabaseConfig, SqliteStore};

use alerting::AlertError;
use thiserror::Error;
use topology::TopologyError;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<StorageError> for TopologyError {
    fn from(err: StorageError) -> Self {
        TopologyError::Store(err.to_string())
    }
}

impl From<StorageError> for AlertError {
    fn from(err: StorageError) -> Self {
        AlertError::Store(err.to_string())
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
