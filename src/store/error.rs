//! Store error types.

use thiserror::Error;

/// Persistent store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Natural key already present; callers treat this as success
    #[error("duplicate key")]
    DuplicateKey,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateKey
            }
            other => StoreError::Database(other),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
