//! Datastore error types.

use thiserror::Error;

/// Datastore operation errors.
///
/// Connection-shaped sqlx failures are classified on conversion so outer
/// layers can map them to transient HTTP statuses without inspecting driver
/// internals.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    #[error("resource exists already")]
    Exists,

    #[error("not resource owner")]
    NotOwner,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no database connection")]
    Connection,

    #[error("database timeout")]
    Timeout,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// True for failures worth retrying: the database was unreachable or slow,
    /// not wrong.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::PoolTimedOut => Self::Timeout,
            sqlx::Error::Io(_) => Self::Connection,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::Exists,
            other => Self::Database(other),
        }
    }
}

/// Result type for datastore operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
