//! SDK Error Types

use thiserror::Error;

use crate::config::ConfigValidationError;

/// Engine Result type alias
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures of a single vision extraction call.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("extraction timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("empty response from {model}")]
    EmptyResponse { model: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// Whether another attempt may succeed.
    ///
    /// Rate limits, server errors, timeouts and transport failures are
    /// retried; client errors and unreadable files are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout { .. } | Self::EmptyResponse { .. } => true,
            Self::Io(_) => false,
        }
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    /// Fingerprinting or storage error
    #[error(transparent)]
    Core(#[from] vmem_core::Error),

    /// Extraction failed after all retries
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// A blocking task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// Check if this error came from the store (rolled back, nothing persisted)
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_storage())
    }
}
