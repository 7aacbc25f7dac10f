//! Error types for sync orchestration and metrics sources.

use thiserror::Error;

/// Result type alias for metrics-source calls.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by a [`crate::MetricsSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Worth trying again later (rate limits, timeouts, 5xx).
    #[error("metrics source temporarily unavailable: {0}")]
    Retryable(String),

    #[error("metrics source error: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Retryable(_))
    }
}

/// Errors that reject a sync request outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("no projects requested")]
    NoProjects,

    #[error("window must cover at least one day")]
    EmptyWindow,
}
