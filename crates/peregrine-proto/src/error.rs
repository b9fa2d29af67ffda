//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stream ended in the middle of a message
    #[error("Stream truncated mid-message")]
    Truncated,

    /// Message too large
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Response does not correlate with the request that was sent
    #[error("Response for unexpected request: {0}")]
    Correlation(String),
}
