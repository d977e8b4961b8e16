//! Error types for the sentiment pipeline.
//!
//! This module provides custom error types using `thiserror`. Every fallible
//! boundary of the ingestion pipeline returns one of these as a typed outcome;
//! the orchestrator matches on them instead of catching anything.

use std::fmt;

use thiserror::Error;

/// Crate-level errors surfaced by the storage, HTTP and config layers.
#[derive(Error, Debug)]
pub enum SentimentError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors (includes pool checkout timeouts)
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking storage task was cancelled or panicked
    #[error("Background task failed: {0}")]
    Join(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `SentimentError`
pub type Result<T> = std::result::Result<T, SentimentError>;

impl From<anyhow::Error> for SentimentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SentimentError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

/// Failure of the storage capability. Carried as a string so the error can
/// cross task boundaries and be cloned into outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("storage unavailable: {0}")]
pub struct StorageError(pub String);

impl From<SentimentError> for StorageError {
    fn from(err: SentimentError) -> Self {
        Self(err.to_string())
    }
}

/// Why the extraction oracle did not produce a usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionFailureKind {
    /// The oracle could not be reached or answered with an error status
    Transport,
    /// The oracle answered, but not with a valid extraction record
    Malformed,
    /// The oracle did not answer within the configured timeout
    Timeout,
}

impl ExtractionFailureKind {
    /// Stable label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Malformed => "malformed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExtractionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed extraction call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("extraction failed ({kind}): {detail}")]
pub struct ExtractionFailure {
    /// Failure category
    pub kind: ExtractionFailureKind,
    /// Human-readable detail for logs
    pub detail: String,
}

impl ExtractionFailure {
    /// Build a failure of the given kind
    pub fn new(kind: ExtractionFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Transport failure
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(ExtractionFailureKind::Transport, detail)
    }

    /// Malformed response
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ExtractionFailureKind::Malformed, detail)
    }

    /// Timeout
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ExtractionFailureKind::Timeout, detail)
    }
}

/// Terminal failure of one message's pipeline. Never fatal to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The inbound event failed validation
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The oracle call failed; nothing was persisted
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    /// Storage failed while resolving the author or channel
    #[error("resolution failed: {0}")]
    Resolution(StorageError),

    /// Storage failed while inserting the message
    #[error("store failed: {0}")]
    Store(StorageError),
}

impl PipelineError {
    /// Pipeline stage at which the failure happened
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "validation",
            Self::Extraction(_) => "extraction",
            Self::Resolution(_) => "resolution",
            Self::Store(_) => "store",
        }
    }

    /// Finer-grained failure label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "invalid",
            Self::Extraction(failure) => failure.kind.as_str(),
            Self::Resolution(_) | Self::Store(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_labels() {
        let err = PipelineError::from(ExtractionFailure::timeout("slow"));
        assert_eq!(err.stage(), "extraction");
        assert_eq!(err.kind(), "timeout");

        let err = PipelineError::Store(StorageError("locked".into()));
        assert_eq!(err.stage(), "store");
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn test_storage_error_from_crate_error() {
        let err: StorageError = SentimentError::Other("disk gone".into()).into();
        assert!(err.to_string().contains("disk gone"));
    }
}
