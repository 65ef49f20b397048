//! Error types for manifold-flow

use thiserror::Error;

/// manifold-flow error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Latent/data dimensionality ordering violated
    #[error("Dimension error: {0}")]
    Dimension(String),

    /// Batch width, row count or context layout mismatch
    #[error("Shape error: {0}")]
    Shape(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error (singular matrix, non-finite values, ...)
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
