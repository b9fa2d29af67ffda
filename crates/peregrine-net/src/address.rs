//! Host addressing and the address book

use crate::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Network identity of a place: a host name and a port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddr {
    /// Host name or IP address
    pub host: String,
    /// TCP port the place listens on
    pub port: u16,
}

impl HostAddr {
    /// Create a new host address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let colon = s
            .rfind(':')
            .ok_or_else(|| TransportError::UnknownHost(s.to_string()))?;
        let host = &s[..colon];
        let port = s[colon + 1..]
            .parse::<u16>()
            .map_err(|_| TransportError::UnknownHost(s.to_string()))?;
        if host.is_empty() {
            return Err(TransportError::UnknownHost(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

/// Config-supplied mapping from logical place names to host addresses
///
/// Replaces ambient naming-service lookup: every transport is handed its own
/// book. Targets that are not in the book fall back to being parsed as a
/// literal `host:port`.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: HashMap<String, HostAddr>,
}

impl AddressBook {
    /// Create an empty address book
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named entry, returning the book for chaining
    pub fn with_entry(mut self, name: impl Into<String>, addr: HostAddr) -> Self {
        self.entries.insert(name.into(), addr);
        self
    }

    /// Add a named entry
    pub fn insert(&mut self, name: impl Into<String>, addr: HostAddr) {
        self.entries.insert(name.into(), addr);
    }

    /// Resolve a target: a known name, or a literal `host:port`
    pub fn resolve(&self, target: &str) -> Result<HostAddr, TransportError> {
        if let Some(addr) = self.entries.get(target) {
            return Ok(addr.clone());
        }
        target.parse()
    }
}
