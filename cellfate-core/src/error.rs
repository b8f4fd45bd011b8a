//! Structured error types for the cellfate toolkit.

use thiserror::Error;

/// Unified error type for all cellfate operations.
#[derive(Debug, Error)]
pub enum CellfateError {
    /// A value has the wrong kind (e.g. a non-categorical series where a
    /// categorical one is required).
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// Invalid input (bad arguments, out-of-range values, violated preconditions)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A named key (column, gene, lineage) does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A positional index is out of range.
    #[error("index error: {0}")]
    OutOfBounds(String),

    /// A user-supplied callback broke its contract during validation.
    #[error("Callback validation failed: {0}")]
    CallbackValidation(String),

    /// A parallel worker panicked or the worker pool could not be built.
    #[error("worker failure: {0}")]
    Worker(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the cellfate crates.
pub type Result<T> = std::result::Result<T, CellfateError>;
