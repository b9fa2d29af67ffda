//! The per-host agent container: accepts transferred agents, restores and
//! schedules them, and owns the mailbox

use crate::agent::{AgentContext, AgentDescriptor, AgentId, AgentImage, Flow, MobileAgent};
use crate::mailbox::Mailbox;
use crate::registry::CodeRegistry;
use crate::{PeregrineError, Result};
use bytes::Bytes;
use peregrine_net::{HostAddr, Transport};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-host agent execution platform
///
/// Created once per host process and alive for the process lifetime. Every
/// accepted transfer and every local injection schedules one independent
/// tokio task; tasks are never pooled, paused, or bounded. Registered code
/// identities and mailbox entries accumulate without eviction.
pub struct Place {
    host: HostAddr,
    registry: Arc<dyn CodeRegistry>,
    transport: Arc<dyn Transport>,
    sequencer: AtomicU64,
    mailbox: Mailbox,
}

impl Place {
    /// Create a place for `host`, with its code registry and the transport
    /// its resident agents use for outbound hops and messages
    pub fn new(
        host: HostAddr,
        registry: Arc<dyn CodeRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            host,
            registry,
            transport,
            sequencer: AtomicU64::new(0),
            mailbox: Mailbox::new(),
        }
    }

    /// This place's network identity
    pub fn host(&self) -> &HostAddr {
        &self.host
    }

    /// Accept a transferred agent: register its code, restore it, and
    /// schedule it as an independent task
    ///
    /// A successful return means the migration was accepted and a task was
    /// scheduled, not that the resumed computation will succeed: failures
    /// inside the resumed continuation are reported independently and never
    /// travel back to the caller of `transfer`.
    pub async fn transfer(
        self: &Arc<Self>,
        code_identity: &str,
        code_payload: Bytes,
        state: Bytes,
    ) -> Result<()> {
        self.registry.register(code_identity, code_payload.clone())?;
        let factory = self.registry.factory(code_identity)?;

        let image = AgentImage::from_bytes(&state)?;
        if image.descriptor.code_identity != code_identity {
            return Err(PeregrineError::Deserialize(format!(
                "image describes identity {:?} but transfer carried {:?}",
                image.descriptor.code_identity, code_identity
            )));
        }

        let agent = factory.restore(&image.state)?;
        if !agent
            .entry_points()
            .contains(&image.descriptor.continuation.as_str())
        {
            return Err(PeregrineError::ContinuationNotFound {
                identity: code_identity.to_string(),
                name: image.descriptor.continuation,
            });
        }

        let mut descriptor = image.descriptor;
        let id = descriptor.id.unwrap_or_else(|| self.assign_id());
        descriptor.id = Some(id);
        descriptor.pending_target = None;

        info!(
            "Accepted agent {} ({}) at {}, continuation {:?}",
            id, code_identity, self.host, descriptor.continuation
        );
        self.schedule(agent, descriptor, Some(code_payload));
        Ok(())
    }

    /// Host a locally created agent
    ///
    /// The agent starts with no id: ids are assigned by the first place an
    /// agent is *transferred* to. `spawn_origin` is set to this place.
    pub fn inject(
        self: &Arc<Self>,
        agent: Box<dyn MobileAgent>,
        continuation: &str,
        args: Vec<String>,
    ) -> Result<()> {
        if !agent.entry_points().contains(&continuation) {
            return Err(PeregrineError::ContinuationNotFound {
                identity: agent.code_identity().to_string(),
                name: continuation.to_string(),
            });
        }

        let descriptor = AgentDescriptor {
            id: None,
            code_identity: agent.code_identity().to_string(),
            pending_target: None,
            continuation: continuation.to_string(),
            args,
            spawn_origin: self.host.to_string(),
        };

        info!(
            "Injected {} agent at {}, continuation {:?}",
            descriptor.code_identity, self.host, continuation
        );
        self.schedule(agent, descriptor, None);
        Ok(())
    }

    /// Append a message to the mailbox entry for `sender`
    pub async fn send(&self, sender: AgentId, message: impl Into<String>) {
        self.mailbox.push(sender, message).await;
    }

    /// Atomically drain and format the whole mailbox
    ///
    /// All senders' messages are returned regardless of which agent asks;
    /// see [`Mailbox::drain`].
    pub async fn receive(&self) -> String {
        self.mailbox.drain().await
    }

    /// Assign a fresh agent id
    ///
    /// `(host_term << 32) | counter`, where `host_term` is a 32-bit hash of
    /// this place's `host:port` and the counter is process-local and
    /// strictly increasing. Unique within this host's lifetime; two hosts
    /// whose 32-bit terms collide can assign colliding ids, since there is
    /// no cross-host coordination.
    fn assign_id(&self) -> AgentId {
        let mut hasher = DefaultHasher::new();
        self.host.to_string().hash(&mut hasher);
        let host_term = hasher.finish() as u32;
        let seq = self.sequencer.fetch_add(1, Ordering::Relaxed);
        ((host_term as u64) << 32) | (seq & 0xFFFF_FFFF)
    }

    /// Spawn the entry dispatcher for a restored or injected agent
    ///
    /// The dispatcher drains the local mailbox, invokes the carried
    /// continuation, and interprets the outcome. Continuation failures are
    /// reported here and terminate only this task; termination after a
    /// successful hop is the dispatcher observing [`Flow::Migrated`] and
    /// returning, never external preemption.
    fn schedule(
        self: &Arc<Self>,
        mut agent: Box<dyn MobileAgent>,
        descriptor: AgentDescriptor,
        payload: Option<Bytes>,
    ) {
        let place = Arc::clone(self);
        tokio::spawn(async move {
            let inbox = place.receive().await;
            if !inbox.is_empty() {
                info!("Agent {:?} received messages:\n{}", descriptor.id, inbox);
            }

            let mut ctx = AgentContext::new(
                descriptor.id,
                descriptor.code_identity.clone(),
                descriptor.spawn_origin.clone(),
                place.host.clone(),
                Arc::clone(&place.transport),
                Arc::clone(&place.registry),
                payload,
            );

            match agent
                .dispatch(&descriptor.continuation, &descriptor.args, &mut ctx)
                .await
            {
                Ok(Flow::Migrated) => {
                    debug!("Agent {:?} migrated away from {}", descriptor.id, place.host)
                }
                Ok(Flow::Complete) => {
                    debug!("Agent {:?} finished at {}", descriptor.id, place.host)
                }
                // Already resumed elsewhere; only the local epilogue failed
                Err(e) if ctx.migrated() => warn!(
                    "Agent {:?} migrated away from {} but its continuation failed afterwards: {}",
                    descriptor.id, place.host, e
                ),
                Err(e) => error!(
                    "Agent {:?} continuation {:?} failed at {}: {}",
                    descriptor.id, descriptor.continuation, place.host, e
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentFactory;
    use crate::registry::InMemoryRegistry;
    use async_trait::async_trait;
    use peregrine_net::TransportError;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Transport that routes calls to in-process places
    #[derive(Default)]
    struct LoopbackTransport {
        places: StdMutex<HashMap<HostAddr, Arc<Place>>>,
    }

    impl LoopbackTransport {
        fn attach(&self, place: Arc<Place>) {
            let mut places = self.places.lock().unwrap();
            places.insert(place.host().clone(), place);
        }

        fn lookup(&self, target: &HostAddr) -> std::result::Result<Arc<Place>, TransportError> {
            let places = self.places.lock().unwrap();
            places
                .get(target)
                .cloned()
                .ok_or_else(|| TransportError::Unavailable {
                    target: target.to_string(),
                    reason: "no such place".to_string(),
                })
        }
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        fn resolve(&self, target: &str) -> std::result::Result<HostAddr, TransportError> {
            target.parse()
        }

        async fn transfer(
            &self,
            target: &HostAddr,
            code_identity: &str,
            code_payload: Bytes,
            state: Bytes,
        ) -> std::result::Result<bool, TransportError> {
            let place = self.lookup(target)?;
            place
                .transfer(code_identity, code_payload, state)
                .await
                .map(|_| true)
                .map_err(|e| TransportError::Rejected(e.to_string()))
        }

        async fn send(
            &self,
            target: &HostAddr,
            sender: AgentId,
            message: &str,
        ) -> std::result::Result<(), TransportError> {
            let place = self.lookup(target)?;
            place.send(sender, message).await;
            Ok(())
        }

        async fn receive(&self, target: &HostAddr) -> std::result::Result<String, TransportError> {
            let place = self.lookup(target)?;
            Ok(place.receive().await)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ProbeState {
        label: String,
        count: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct ProbeEvent {
        id: Option<AgentId>,
        at: HostAddr,
        args: Vec<String>,
        state: ProbeState,
    }

    /// Test agent that records every dispatch into a shared log
    #[derive(Debug)]
    struct Probe {
        state: ProbeState,
        log: Arc<StdMutex<Vec<ProbeEvent>>>,
    }

    #[async_trait]
    impl MobileAgent for Probe {
        fn code_identity(&self) -> &str {
            "probe"
        }

        fn entry_points(&self) -> &'static [&'static str] {
            &["report", "travel"]
        }

        fn encode_state(&self) -> Result<Bytes> {
            rmp_serde::to_vec(&self.state)
                .map(Bytes::from)
                .map_err(|e| PeregrineError::Serialization(e.to_string()))
        }

        async fn dispatch(
            &mut self,
            name: &str,
            args: &[String],
            ctx: &mut AgentContext,
        ) -> Result<Flow> {
            self.log.lock().unwrap().push(ProbeEvent {
                id: ctx.id(),
                at: ctx.local().clone(),
                args: args.to_vec(),
                state: self.state.clone(),
            });
            match name {
                "report" => Ok(Flow::Complete),
                "travel" => {
                    let target = args[0].clone();
                    self.state.count += 1;
                    ctx.hop(self, &target, "report", vec!["arrived".to_string()])
                        .await
                }
                other => Err(PeregrineError::ContinuationNotFound {
                    identity: "probe".to_string(),
                    name: other.to_string(),
                }),
            }
        }
    }

    struct ProbeFactory {
        log: Arc<StdMutex<Vec<ProbeEvent>>>,
    }

    impl AgentFactory for ProbeFactory {
        fn code_identity(&self) -> &str {
            "probe"
        }

        fn restore(&self, state: &[u8]) -> Result<Box<dyn MobileAgent>> {
            let state: ProbeState = rmp_serde::from_slice(state)
                .map_err(|e| PeregrineError::Deserialize(e.to_string()))?;
            Ok(Box::new(Probe {
                state,
                log: Arc::clone(&self.log),
            }))
        }
    }

    struct Fixture {
        log: Arc<StdMutex<Vec<ProbeEvent>>>,
        transport: Arc<LoopbackTransport>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                log: Arc::new(StdMutex::new(Vec::new())),
                transport: Arc::new(LoopbackTransport::default()),
            }
        }

        fn place(&self, host: &str, port: u16) -> Arc<Place> {
            let registry = InMemoryRegistry::new()
                .with_factory(Arc::new(ProbeFactory {
                    log: Arc::clone(&self.log),
                }))
                .with_payload("probe", Bytes::from_static(b"probe-code"));
            let place = Arc::new(Place::new(
                HostAddr::new(host, port),
                Arc::new(registry),
                Arc::clone(&self.transport) as Arc<dyn Transport>,
            ));
            self.transport.attach(Arc::clone(&place));
            place
        }

        fn image(&self, descriptor: AgentDescriptor, state: &ProbeState) -> Bytes {
            let image = AgentImage {
                descriptor,
                state: Bytes::from(rmp_serde::to_vec(state).unwrap()),
            };
            image.to_bytes().unwrap()
        }

        async fn wait_for_events(&self, count: usize) -> Vec<ProbeEvent> {
            for _ in 0..200 {
                {
                    let log = self.log.lock().unwrap();
                    if log.len() >= count {
                        return log.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("timed out waiting for {} probe events", count);
        }
    }

    fn descriptor(continuation: &str, args: Vec<String>) -> AgentDescriptor {
        AgentDescriptor {
            id: None,
            code_identity: "probe".to_string(),
            pending_target: None,
            continuation: continuation.to_string(),
            args,
            spawn_origin: "origin:5001".to_string(),
        }
    }

    #[tokio::test]
    async fn test_transfer_restores_state_and_assigns_id() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let state = ProbeState {
            label: "wanderer".to_string(),
            count: 3,
        };
        let image = fixture.image(descriptor("report", vec!["x".to_string()]), &state);
        place
            .transfer("probe", Bytes::from_static(b"probe-code"), image)
            .await
            .unwrap();

        let events = fixture.wait_for_events(1).await;
        assert_eq!(events[0].state, state);
        assert_eq!(events[0].args, vec!["x".to_string()]);
        assert!(events[0].id.is_some());
    }

    #[tokio::test]
    async fn test_assigned_id_survives_transfer() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let mut desc = descriptor("report", Vec::new());
        desc.id = Some(42);
        let state = ProbeState {
            label: "veteran".to_string(),
            count: 0,
        };
        let image = fixture.image(desc, &state);
        place
            .transfer("probe", Bytes::from_static(b"probe-code"), image)
            .await
            .unwrap();

        let events = fixture.wait_for_events(1).await;
        assert_eq!(events[0].id, Some(42));
    }

    #[tokio::test]
    async fn test_unknown_continuation_rejected_before_scheduling() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let state = ProbeState {
            label: "lost".to_string(),
            count: 0,
        };
        let image = fixture.image(descriptor("teleport", Vec::new()), &state);
        let err = place
            .transfer("probe", Bytes::from_static(b"probe-code"), image)
            .await
            .unwrap_err();

        assert!(matches!(err, PeregrineError::ContinuationNotFound { .. }));
        assert!(fixture.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_identity_rejected() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let err = place
            .transfer("stranger", Bytes::from_static(b"code"), Bytes::from_static(b"state"))
            .await
            .unwrap_err();
        assert!(matches!(err, PeregrineError::CodeRegistration { .. }));
    }

    #[tokio::test]
    async fn test_identity_mismatch_rejected() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let state = ProbeState {
            label: "mismatch".to_string(),
            count: 0,
        };
        let mut desc = descriptor("report", Vec::new());
        desc.code_identity = "other".to_string();
        let image = fixture.image(desc, &state);

        let err = place
            .transfer("probe", Bytes::from_static(b"probe-code"), image)
            .await
            .unwrap_err();
        assert!(matches!(err, PeregrineError::Deserialize(_)));
    }

    #[tokio::test]
    async fn test_injected_agent_hops_and_keeps_state() {
        let fixture = Fixture::new();
        let origin = fixture.place("node-a", 5001);
        let _remote = fixture.place("node-b", 5002);

        let agent = Box::new(Probe {
            state: ProbeState {
                label: "hopper".to_string(),
                count: 0,
            },
            log: Arc::clone(&fixture.log),
        });
        origin
            .inject(agent, "travel", vec!["node-b:5002".to_string()])
            .unwrap();

        let events = fixture.wait_for_events(2).await;

        // Injected: no id yet, original state
        assert_eq!(events[0].id, None);
        assert_eq!(events[0].at, HostAddr::new("node-a", 5001));
        assert_eq!(events[0].state.count, 0);

        // Arrived: id assigned, mutation from before the hop carried over
        assert!(events[1].id.is_some());
        assert_eq!(events[1].at, HostAddr::new("node-b", 5002));
        assert_eq!(events[1].state.count, 1);
        assert_eq!(events[1].args, vec!["arrived".to_string()]);
    }

    #[tokio::test]
    async fn test_inject_validates_entry_point() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let agent = Box::new(Probe {
            state: ProbeState {
                label: "typo".to_string(),
                count: 0,
            },
            log: Arc::clone(&fixture.log),
        });
        let err = place.inject(agent, "telport", Vec::new()).unwrap_err();
        assert!(matches!(err, PeregrineError::ContinuationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sequencer_assigns_distinct_ids() {
        let fixture = Fixture::new();
        let place = fixture.place("node-a", 5001);

        let a = place.assign_id();
        let b = place.assign_id();
        assert_ne!(a, b);
        // Same host term, consecutive counters
        assert_eq!(a >> 32, b >> 32);
    }
}
