//! Code registry: register a code identity with its payload, resolve an
//! identity to something instantiable

use crate::agent::AgentFactory;
use crate::{PeregrineError, Result};
use bytes::Bytes;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// The capability a place uses to make incoming code resumable
///
/// Decoupled from any code-loading technology: `register` records an
/// identity's payload bytes, `factory` resolves the identity to something
/// that can rebuild agent instances.
pub trait CodeRegistry: Send + Sync {
    /// Register an identity with its payload
    ///
    /// Idempotent: re-registering a known identity is a no-op. The payload
    /// is not checked against prior registrations; the FIRST payload seen
    /// for an identity is kept, and divergent bytes only produce a warning.
    fn register(&self, identity: &str, payload: Bytes) -> Result<()>;

    /// The locally stored payload for an identity, if it was ever registered
    fn payload(&self, identity: &str) -> Option<Bytes>;

    /// Resolve an identity to the factory that restores its agents
    fn factory(&self, identity: &str) -> Result<Arc<dyn AgentFactory>>;
}

/// In-memory registry backed by a table of linked-in agent factories
///
/// Rust links agent types at build time, so the set of restorable
/// identities is fixed when the registry is built; payloads registered for
/// them are carried and re-served faithfully. Registering an identity with
/// no installed factory is rejected.
#[derive(Default)]
pub struct InMemoryRegistry {
    factories: HashMap<String, Arc<dyn AgentFactory>>,
    payloads: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a factory under its own code identity
    pub fn with_factory(mut self, factory: Arc<dyn AgentFactory>) -> Self {
        self.factories
            .insert(factory.code_identity().to_string(), factory);
        self
    }

    /// Seed a payload, as the originating host of an agent type does before
    /// injecting it
    pub fn with_payload(self, identity: impl Into<String>, payload: Bytes) -> Self {
        self.payloads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity.into(), payload);
        self
    }
}

impl CodeRegistry for InMemoryRegistry {
    fn register(&self, identity: &str, payload: Bytes) -> Result<()> {
        if !self.factories.contains_key(identity) {
            return Err(PeregrineError::CodeRegistration {
                identity: identity.to_string(),
                reason: "no factory installed for this identity".to_string(),
            });
        }

        let mut payloads = self.payloads.write().unwrap_or_else(|e| e.into_inner());
        match payloads.entry(identity.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get() != &payload {
                    // First write wins; see DESIGN.md on divergent payloads
                    warn!(
                        "Identity {:?} re-registered with different payload, keeping the first",
                        identity
                    );
                }
            }
            Entry::Vacant(slot) => {
                debug!("Registered code identity {:?}", identity);
                slot.insert(payload);
            }
        }
        Ok(())
    }

    fn payload(&self, identity: &str) -> Option<Bytes> {
        self.payloads
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(identity)
            .cloned()
    }

    fn factory(&self, identity: &str) -> Result<Arc<dyn AgentFactory>> {
        self.factories.get(identity).cloned().ok_or_else(|| {
            PeregrineError::CodeRegistration {
                identity: identity.to_string(),
                reason: "no factory installed for this identity".to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MobileAgent;

    struct NullFactory {
        identity: &'static str,
    }

    impl AgentFactory for NullFactory {
        fn code_identity(&self) -> &str {
            self.identity
        }

        fn restore(&self, _state: &[u8]) -> Result<Box<dyn MobileAgent>> {
            Err(PeregrineError::Deserialize("not restorable".to_string()))
        }
    }

    fn registry() -> InMemoryRegistry {
        InMemoryRegistry::new().with_factory(Arc::new(NullFactory { identity: "probe" }))
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = registry();
        let payload = Bytes::from_static(b"code-v1");

        registry.register("probe", payload.clone()).unwrap();
        registry.register("probe", payload.clone()).unwrap();

        assert_eq!(registry.payload("probe"), Some(payload));
    }

    #[test]
    fn test_first_payload_wins() {
        let registry = registry();

        registry.register("probe", Bytes::from_static(b"code-v1")).unwrap();
        registry.register("probe", Bytes::from_static(b"code-v2")).unwrap();

        assert_eq!(registry.payload("probe"), Some(Bytes::from_static(b"code-v1")));
    }

    #[test]
    fn test_unknown_identity_rejected() {
        let registry = registry();

        let err = registry
            .register("stranger", Bytes::from_static(b"code"))
            .unwrap_err();
        assert!(matches!(err, PeregrineError::CodeRegistration { .. }));
        assert!(registry.factory("stranger").is_err());
    }

    #[test]
    fn test_payload_absent_until_registered() {
        let registry = registry();
        assert_eq!(registry.payload("probe"), None);
    }
}
