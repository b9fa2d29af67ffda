//! Agent model: migration descriptor, wire image, behavior contract, and the
//! execution context handed to every dispatched continuation

use crate::registry::CodeRegistry;
use crate::{PeregrineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use peregrine_net::{HostAddr, Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub use peregrine_proto::AgentId;

/// Migration descriptor carried with every agent
///
/// `id` stays `None` until the first place the agent is transferred to
/// assigns one; after that it never changes. `pending_target` is set only
/// while a hop is in flight and cleared by the destination on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Assigned identity, `None` until first arrival by transfer
    pub id: Option<AgentId>,
    /// Code identity resolvable by the code registry
    pub code_identity: String,
    /// Destination of the in-flight hop, if any
    pub pending_target: Option<HostAddr>,
    /// Entry-point name to invoke on resumption
    pub continuation: String,
    /// Arguments for the continuation
    pub args: Vec<String>,
    /// `host:port` of the place where the agent was first injected
    pub spawn_origin: String,
}

/// Serialized form of an agent crossing the wire: the migration descriptor
/// plus the concrete type's own encoded state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentImage {
    /// Migration descriptor
    pub descriptor: AgentDescriptor,
    /// Concrete agent state, encoded by the type's own schema
    pub state: Bytes,
}

impl AgentImage {
    /// Encode the image for transfer
    pub fn to_bytes(&self) -> Result<Bytes> {
        rmp_serde::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| PeregrineError::Serialization(e.to_string()))
    }

    /// Decode an image received by transfer
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| PeregrineError::Deserialize(e.to_string()))
    }
}

/// Outcome of a dispatched continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The continuation ran to completion on this host
    Complete,
    /// The agent migrated away; the task must exit without running further
    /// agent code
    Migrated,
}

/// Behavior contract for a mobile agent type
///
/// Continuation dispatch is an explicit mapping from names to entry points:
/// `entry_points` lists every valid name, and `dispatch` invokes one. Names
/// are validated against `entry_points` before an agent is scheduled and
/// before a hop leaves the host; a `dispatch` implementation should still
/// map an unknown name to [`PeregrineError::ContinuationNotFound`].
#[async_trait]
pub trait MobileAgent: Send + Sync + std::fmt::Debug {
    /// The registry key for this agent type
    fn code_identity(&self) -> &str;

    /// Every valid continuation name of this type
    fn entry_points(&self) -> &'static [&'static str];

    /// Encode this agent's own state with its explicit schema
    ///
    /// Every field that must survive a hop has to be covered here; nothing
    /// is captured implicitly.
    fn encode_state(&self) -> Result<Bytes>;

    /// Invoke the named entry point with the carried arguments
    async fn dispatch(&mut self, name: &str, args: &[String], ctx: &mut AgentContext)
        -> Result<Flow>;
}

/// Restores agents of one code identity from their encoded state
///
/// Factories are what "instantiable" means here: the hosting process links
/// its agent types ahead of time and installs one factory per identity into
/// the registry. Collaborators that must not cross the wire (probes,
/// channels) live in the factory and are rewired into restored instances.
pub trait AgentFactory: Send + Sync {
    /// Code identity this factory restores
    fn code_identity(&self) -> &str;

    /// Rebuild an agent from state produced by [`MobileAgent::encode_state`]
    fn restore(&self, state: &[u8]) -> Result<Box<dyn MobileAgent>>;
}

/// Execution context of one resumed agent instance
///
/// There is at most one context per agent instance at any time: the
/// dispatcher creates it, hands it to the continuation, and drops it when
/// the task ends. The code payload is fetched lazily once and cached for
/// the lifetime of the instance.
pub struct AgentContext {
    id: Option<AgentId>,
    code_identity: String,
    spawn_origin: String,
    local: HostAddr,
    transport: Arc<dyn Transport>,
    registry: Arc<dyn CodeRegistry>,
    payload: Option<Bytes>,
    migrated: bool,
}

impl AgentContext {
    pub(crate) fn new(
        id: Option<AgentId>,
        code_identity: String,
        spawn_origin: String,
        local: HostAddr,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn CodeRegistry>,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            id,
            code_identity,
            spawn_origin,
            local,
            transport,
            registry,
            payload,
            migrated: false,
        }
    }

    /// This agent's assigned id, `None` before the first transfer
    pub fn id(&self) -> Option<AgentId> {
        self.id
    }

    /// `host:port` of the place where this agent was first injected
    pub fn spawn_origin(&self) -> &str {
        &self.spawn_origin
    }

    /// Address of the place currently hosting this agent
    pub fn local(&self) -> &HostAddr {
        &self.local
    }

    /// Whether a hop has been accepted by a destination
    pub fn migrated(&self) -> bool {
        self.migrated
    }

    /// The code payload for this agent's own identity
    ///
    /// Cached after the first read. Fails with
    /// [`PeregrineError::CodeUnavailable`] when the local registry has never
    /// seen the identity: only the originating host can self-supply its own
    /// payload, by registering it before injection.
    pub fn code_payload(&mut self) -> Result<Bytes> {
        if let Some(payload) = &self.payload {
            return Ok(payload.clone());
        }
        let payload = self.registry.payload(&self.code_identity).ok_or_else(|| {
            PeregrineError::CodeUnavailable {
                identity: self.code_identity.clone(),
            }
        })?;
        self.payload = Some(payload.clone());
        Ok(payload)
    }

    /// Migrate this agent to `target` and resume it there at `continuation`
    ///
    /// On acceptance the context is marked migrated and `Flow::Migrated` is
    /// returned; the dispatcher interprets that as "exit now without running
    /// further agent code". On failure the error surfaces to the caller and
    /// the local task keeps running at the following statement. No retry is
    /// performed.
    pub async fn hop(
        &mut self,
        agent: &dyn MobileAgent,
        target: &str,
        continuation: &str,
        args: Vec<String>,
    ) -> Result<Flow> {
        if !agent.entry_points().contains(&continuation) {
            return Err(PeregrineError::ContinuationNotFound {
                identity: self.code_identity.clone(),
                name: continuation.to_string(),
            });
        }

        let addr = self.transport.resolve(target)?;
        let payload = self.code_payload()?;

        let descriptor = AgentDescriptor {
            id: self.id,
            code_identity: self.code_identity.clone(),
            pending_target: Some(addr.clone()),
            continuation: continuation.to_string(),
            args,
            spawn_origin: self.spawn_origin.clone(),
        };
        let state = agent.encode_state()?;
        let image = AgentImage { descriptor, state }.to_bytes()?;

        debug!("Agent {:?} hopping {} -> {}", self.id, self.local, addr);
        let accepted = self
            .transport
            .transfer(&addr, &self.code_identity, payload, image)
            .await?;
        if !accepted {
            return Err(PeregrineError::Transport(TransportError::Rejected(
                format!("{} declined the transfer", addr),
            )));
        }

        self.migrated = true;
        info!("Agent {:?} migrated to {}", self.id, addr);
        Ok(Flow::Migrated)
    }

    /// Send a message to the mailbox of the place at `target`
    ///
    /// Fire and forget: errors surface to the caller, nothing is retried.
    pub async fn send_message(&self, target: &str, message: &str) -> Result<()> {
        let id = self.id.ok_or(PeregrineError::IdUnassigned)?;
        let addr = self.transport.resolve(target)?;
        self.transport.send(&addr, id, message).await?;
        debug!("Agent {} sent message to {}", id, addr);
        Ok(())
    }
}
