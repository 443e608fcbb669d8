//! Sync and publication error types.

use curator_store::StoreError;
use curator_upstream::UpstreamError;
use thiserror::Error;

/// Errors from the sync and publication engines.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The per-user rate limit refused the run.
    #[error("too soon")]
    TooSoon,

    /// The batch or call deadline expired.
    #[error("operation timed out")]
    Timeout,

    /// The upstream's publish response carried no identifier.
    #[error("no identifier in dataset")]
    NoIdentifier,

    /// The record does not belong to the upstream family or lacks an upstream
    /// identifier.
    #[error("not an upstream dataset: {0}")]
    NotUpstreamDataset(String),

    #[error(transparent)]
    Core(#[from] curator_core::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
