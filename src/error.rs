//! Crate-wide error type.
//!
//! Mirrors the teacher's `AppError` shape: one `thiserror` variant per
//! failure class, plain `String` payloads, no downcasting. Adapter-boundary
//! functions return `Result<T>` and never panic; panics are reserved for
//! invariant violations exercised only in tests.

use thiserror::Error;

/// Errors produced anywhere in the RAG engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// No adapter is registered for the requested capability.
    #[error("no adapter registered for capability: {0}")]
    NoAdapter(String),

    /// A vector or embedding operation used the wrong dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A rate limiter denied the call; callers should back off and retry.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// A call exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A structured response (JSON, etc.) could not be parsed.
    #[error("parse error: {0}")]
    ParseError(String),

    /// An upstream provider (LLM, embedder, store) returned an error.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Caller-supplied input failed validation.
    #[error("validation error on {field}: {reason}")]
    ValidationError { field: String, reason: String },

    /// A worker task exited, e.g. a channel was dropped mid-pipeline.
    #[error("task exited: {0}")]
    TaskExit(String),

    /// The pipeline context was already halted by a prior error.
    #[error("pipeline halted: {0}")]
    Halted(String),

    /// I/O failure (filesystem, persistence).
    #[error("I/O error: {0}")]
    Io(String),

    /// The underlying vector/graph store reported a failure.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything that does not fit a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        RagError::ParseError(e.to_string())
    }
}

/// A specialized `Result` for RAG engine operations.
pub type Result<T> = std::result::Result<T, RagError>;
