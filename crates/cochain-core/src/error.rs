//! Error types for cochain-core.

use thiserror::Error;

/// Error type for complex construction and dataset I/O.
#[derive(Error, Debug)]
pub enum Error {
    /// A complex or cochain violates a structural invariant.
    #[error("invalid complex: {0}")]
    InvalidComplex(String),

    /// Invalid dataset configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for cochain-core operations.
pub type Result<T> = std::result::Result<T, Error>;
