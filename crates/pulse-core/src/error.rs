//! Error types for pulse-core.

use thiserror::Error;

/// Result type alias using pulse-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for pulse operations
#[derive(Error, Debug)]
pub enum Error {
    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Stored state that cannot be used as-is
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}
