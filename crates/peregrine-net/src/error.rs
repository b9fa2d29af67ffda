//! Error types for transport operations

use std::time::Duration;
use thiserror::Error;

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Destination unreachable or the call failed mid-flight
    #[error("Destination {target} unavailable: {reason}")]
    Unavailable {
        /// Target that could not be reached
        target: String,
        /// Underlying failure
        reason: String,
    },

    /// Remote call did not complete within the configured timeout
    #[error("Remote call timed out after {duration:?}")]
    Timeout {
        /// Duration that was exceeded
        duration: Duration,
    },

    /// The remote place reported a failure
    #[error("Remote place rejected the call: {0}")]
    Rejected(String),

    /// Wire-level failure (codec, correlation, unexpected response)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Target is neither a known name nor a parseable `host:port`
    #[error("Unknown host: {0}")]
    UnknownHost(String),
}

impl From<peregrine_proto::ProtocolError> for TransportError {
    fn from(err: peregrine_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
