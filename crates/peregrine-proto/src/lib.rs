//! # Peregrine Protocol
//!
//! Wire contract for the Peregrine mobile-agent platform: the RPC messages a
//! place exposes (transfer / send / receive) and the codec that moves them
//! over async byte streams.

#![warn(missing_docs)]

/// Message types and enums
pub mod message;

/// Message codec for async streams
pub mod codec;

/// Error types for protocol operations
pub mod error;

pub use message::{AgentId, ErrorCode, ErrorDetails, Request, Response};
pub use codec::MessageCodec;
pub use error::ProtocolError;
