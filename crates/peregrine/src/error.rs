//! Error types for the Peregrine library

use peregrine_net::TransportError;
use thiserror::Error;

/// Main error type for Peregrine operations
#[derive(Debug, Error)]
pub enum PeregrineError {
    /// No local payload exists for a never-registered code identity
    #[error("No code payload available for identity {identity:?}")]
    CodeUnavailable {
        /// Identity that could not be resolved
        identity: String,
    },

    /// The code registry rejected a registration or resolution
    #[error("Code registration failed for {identity:?}: {reason}")]
    CodeRegistration {
        /// Identity being registered or resolved
        identity: String,
        /// Why the registry rejected it
        reason: String,
    },

    /// Agent state bytes did not decode against the registered identity
    #[error("Failed to restore agent state: {0}")]
    Deserialize(String),

    /// The named continuation is not an entry point of the agent type
    #[error("Agent type {identity:?} has no entry point {name:?}")]
    ContinuationNotFound {
        /// Code identity of the agent type
        identity: String,
        /// Continuation name that failed to resolve
        name: String,
    },

    /// The continuation itself failed while running
    #[error("Continuation {name:?} failed: {reason}")]
    Dispatch {
        /// Continuation that was running
        name: String,
        /// Failure description
        reason: String,
    },

    /// Messaging attempted before any place assigned this agent an id
    #[error("Agent id not yet assigned; ids are assigned on first transfer")]
    IdUnassigned,

    /// Agent image encode/decode plumbing failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
