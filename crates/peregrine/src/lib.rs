//! # Peregrine
//!
//! A Rust library for mobile-agent migration: an agent suspends itself,
//! ships its code identity, payload, and state to a remote place, and
//! resumes there at a named continuation, chaining hops across hosts and
//! exchanging mailbox messages along the way.
//!
//! The hop is fire and forget: once a destination accepts the transfer the
//! local task exits cooperatively, and a structurally identical task resumes
//! the agent at the destination. A failed hop leaves the local task running
//! at the statement after the call.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use peregrine_net as net;
pub use peregrine_proto as proto;

/// Error types for the Peregrine library
pub mod error;

/// Agent model and execution context
pub mod agent;

/// Code registry abstraction and in-memory implementation
pub mod registry;

/// Per-place mailbox
pub mod mailbox;

/// The per-host agent container
pub mod place;

/// RPC server loop exposing a place
pub mod server;

pub use agent::{
    AgentContext, AgentDescriptor, AgentFactory, AgentId, AgentImage, Flow, MobileAgent,
};
pub use error::PeregrineError;
pub use mailbox::Mailbox;
pub use place::Place;
pub use registry::{CodeRegistry, InMemoryRegistry};
pub use server::{serve, serve_with_shutdown};

/// Result type alias for Peregrine operations
pub type Result<T> = std::result::Result<T, PeregrineError>;
