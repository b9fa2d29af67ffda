//! # Peregrine Net
//!
//! Transport layer for the Peregrine mobile-agent platform: host addressing,
//! the config-supplied address book, and the TCP request/response transport
//! used for agent transfer and mailbox traffic.

#![warn(missing_docs)]

/// Host addressing and the address book
pub mod address;

/// Transport trait and TCP implementation
pub mod transport;

/// Error types for transport operations
pub mod error;

pub use address::{AddressBook, HostAddr};
pub use transport::{TcpTransport, Transport};
pub use error::TransportError;
