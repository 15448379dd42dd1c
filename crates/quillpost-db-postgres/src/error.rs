//! Error types for the PostgreSQL storage backend.

use quillpost_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::connection_error(e.to_string()),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Maps a query failure onto the storage error taxonomy.
///
/// Unique violations become [`StorageError::Conflict`] carrying `conflict`
/// as the message.
pub(crate) fn query_error(err: SqlxError, conflict: impl FnOnce() -> String) -> StorageError {
    match err {
        SqlxError::Database(ref db_err) if db_err.is_unique_violation() => {
            StorageError::conflict(conflict())
        }
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
            StorageError::connection_error(err.to_string())
        }
        other => StorageError::internal(other.to_string()),
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
