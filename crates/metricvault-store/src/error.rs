//! Error types for the metricvault storage layer.

use thiserror::Error;

/// Result type alias for table backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for storage-layer operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a table backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("entity not found: ({partition}, {row})")]
    NotFound { partition: String, row: String },

    #[error("entity already exists: ({partition}, {row})")]
    Conflict { partition: String, row: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("failed to open table: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Conflict { .. })
    }
}

/// Errors surfaced by the storage layer to its callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("partition key is {len} characters, limit is {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("batch {batch} of {partition} failed: {source}")]
    Batch {
        partition: String,
        batch: usize,
        #[source]
        source: BackendError,
    },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
