//! Error types shared across the recap engine.

use thiserror::Error;

/// Unified error type for cross-cutting concerns (configuration,
/// serialization). Component crates define their own narrower errors.
#[derive(Debug, Error)]
pub enum RecapError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}
