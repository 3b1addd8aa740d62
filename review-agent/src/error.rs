//! Error taxonomy for the review sync pipeline
//!
//! Repository code keeps returning `anyhow::Result` with context strings; a
//! `SyncError` raised inside a repository travels through `anyhow` and is
//! recovered by [`SyncError::from_store`].

use std::time::Duration;

/// Errors surfaced by the sync orchestrator, the analysis service and the
/// upstream clients.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Expired or invalid upstream credential. Caller refreshes and may retry once.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Permission denied upstream. Not retryable.
    #[error("Access forbidden: {0}")]
    AccessForbidden(String),

    /// Entity absent upstream or locally.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure or timeout. Retryable by the caller with backoff.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Any other non-success upstream status.
    #[error("Upstream error {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Malformed caller input, rejected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Local store read/write failure. Aborts the current batch.
    #[error("Persistence failure: {0:#}")]
    PersistenceFailure(anyhow::Error),

    /// The analysis response could not be parsed. Never escapes the analysis
    /// parser, which degrades to a fallback record instead.
    #[error("Analysis parse failure: {0}")]
    AnalysisParseFailure(String),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SyncError::InvalidArgument(message.into())
    }

    /// Convert a repository error, keeping any `SyncError` it carries.
    pub fn from_store(err: anyhow::Error) -> Self {
        match err.downcast::<SyncError>() {
            Ok(sync) => sync,
            Err(other) => SyncError::PersistenceFailure(other),
        }
    }

    /// Whether the caller may retry the operation after a delay.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::UpstreamUnavailable(_) => true,
            SyncError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            SyncError::AccessForbidden(_) => "ACCESS_FORBIDDEN",
            SyncError::NotFound(_) => "NOT_FOUND",
            SyncError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            SyncError::Upstream { .. } => "UPSTREAM_ERROR",
            SyncError::InvalidArgument(_) => "INVALID_ARGUMENT",
            SyncError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            SyncError::AnalysisParseFailure(_) => "ANALYSIS_PARSE_FAILURE",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::PersistenceFailure(err.into())
    }
}
