//! Crate-wide error type and the smaller engine-local failure classification.

use std::path::PathBuf;

/// Errors that cross a job-level boundary.
///
/// Engine-local failures are represented by [`OcrFailure`] and are only
/// converted into an `ExamCutError` once the orchestrator's retry and
/// fallback policy has been exhausted for a column.
#[derive(Debug, thiserror::Error)]
pub enum ExamCutError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("rasterization failed: {message}")]
    RasterizeFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OCR failed: {message}")]
    OcrFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("remote OCR unavailable: {message}")]
    RemoteUnavailable { message: String },

    #[error("deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u128 },

    #[error("internal invariant violated: {message}")]
    InternalAssert { message: String },

    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("packaging failed: {message}")]
    Packaging {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, ExamCutError>;

/// Classification of an OCR engine call's failure, used to drive retry policy
/// without leaking engine-specific error types into the orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OcrFailure {
    #[error("transient OCR failure: {0}")]
    Transient(String),
    #[error("permanent OCR failure: {0}")]
    Permanent(String),
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u128 },
}
