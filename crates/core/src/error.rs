//! Core error types.

use thiserror::Error;

/// Errors produced by the record model and validation rules.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid record id")]
    InvalidId,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    #[error("unknown schema family: {0}")]
    UnknownFamily(i16),

    #[error("dataset catalog unknown or missing: {0}")]
    UnknownCatalog(String),

    #[error("readonly field {field} changed: {old} -> {new}")]
    ReadOnlyField {
        field: String,
        old: String,
        new: String,
    },

    #[error("record is frozen for local edits (preservation_state {0})")]
    Frozen(i64),

    #[error("{0}: changes not allowed")]
    FileStructureChanged(&'static str),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
