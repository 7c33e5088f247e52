//! Error types for `patternd` core library.

use thiserror::Error;

/// Result type alias using `patternd` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `patternd` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pattern lookup found nothing under the requested name
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    /// Pattern name is empty or would escape the pattern directory
    #[error("Invalid pattern name: {0:?}")]
    InvalidPatternName(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
