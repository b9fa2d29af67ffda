//! Built-in roaming agent
//!
//! A courier visits the places named in its itinerary and reports completion
//! back to the place it was spawned at. Ships with every place binary so a
//! fleet of stock binaries can pass couriers around out of the box.

use async_trait::async_trait;
use bytes::Bytes;
use peregrine::{AgentContext, AgentFactory, Flow, MobileAgent, PeregrineError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registry key for the courier agent type
pub const CODE_IDENTITY: &str = "courier";

/// Payload registered for the courier
///
/// Courier code is linked into the binary, so the payload is a version stamp
/// rather than loadable code; it is carried and re-registered on every hop
/// like any other payload.
pub fn code_stamp() -> Bytes {
    Bytes::from_static(b"peregrine-courier/0.1.0")
}

/// State that survives a courier's hops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierState {
    /// Hops taken so far
    pub hop_count: u32,
    /// Places still to visit, first two are used
    pub destinations: Vec<String>,
}

/// The courier itself
#[derive(Debug)]
pub struct Courier {
    state: CourierState,
}

#[async_trait]
impl MobileAgent for Courier {
    fn code_identity(&self) -> &str {
        CODE_IDENTITY
    }

    fn entry_points(&self) -> &'static [&'static str] {
        &["init", "step", "jump"]
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
        match name {
            "init" => {
                if self.state.destinations.len() < 2 {
                    return Err(PeregrineError::Dispatch {
                        name: name.to_string(),
                        reason: "itinerary needs at least two destinations".to_string(),
                    });
                }
                info!(
                    "Courier {:?} starting at {}, next {}",
                    ctx.id(),
                    ctx.local(),
                    self.state.destinations[0]
                );
                self.state.hop_count += 1;
                let target = self.state.destinations[0].clone();
                ctx.hop(self, &target, "step", vec!["Courier: Hello!".to_string()])
                    .await
            }
            "step" => {
                info!(
                    "Courier {:?} at {}, hop {}, message {:?}",
                    ctx.id(),
                    ctx.local(),
                    self.state.hop_count,
                    args[0]
                );
                self.state.hop_count += 1;
                let target = self.state.destinations[1].clone();
                ctx.hop(self, &target, "jump", vec!["Courier: Oi!".to_string()])
                    .await
            }
            "jump" => {
                info!(
                    "Courier {:?} at {}, hop {}, message {:?}",
                    ctx.id(),
                    ctx.local(),
                    self.state.hop_count,
                    args[0]
                );
                let report = format!(
                    "Courier: completed hops from {} and {}",
                    self.state.destinations[0], self.state.destinations[1]
                );
                ctx.send_message(ctx.spawn_origin(), &report).await?;
                info!("Courier {:?} reported home to {}", ctx.id(), ctx.spawn_origin());
                Ok(Flow::Complete)
            }
            other => Err(PeregrineError::ContinuationNotFound {
                identity: CODE_IDENTITY.to_string(),
                name: other.to_string(),
            }),
        }
    }
}

/// Restores couriers from their encoded state
pub struct CourierFactory;

impl AgentFactory for CourierFactory {
    fn code_identity(&self) -> &str {
        CODE_IDENTITY
    }

    fn restore(&self, state: &[u8]) -> Result<Box<dyn MobileAgent>> {
        let state: CourierState =
            rmp_serde::from_slice(state).map_err(|e| PeregrineError::Deserialize(e.to_string()))?;
        Ok(Box::new(Courier { state }))
    }
}
