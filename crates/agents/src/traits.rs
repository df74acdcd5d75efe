//! Core agent trait and agent configuration.

use crate::capability::{Capability, CapabilitySet, Expertise};
use crate::metrics::{AgentMetrics, MetricsUpdate};
use crate::runtime::{AgentCore, AgentState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::warn;
use triad_common::{
    AgentId, AgentMessage, AgentRole, LifecycleEvent, MessageKind, Recipient, Result, Task,
    TaskResult,
};

/// The contract every pipeline agent implements.
///
/// Implementors provide the stage behavior (`process_task`,
/// `handle_message`) and expose their [`AgentCore`]; identity, lifecycle,
/// metrics and messaging come from the provided methods.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's runtime state.
    fn core(&self) -> &AgentCore;

    /// Perform this agent's pipeline stage for `task`.
    ///
    /// Implementations must fail with `AgentInactive` after shutdown and must
    /// record metrics exactly once per processed task.
    async fn process_task(&self, task: &Task) -> Result<TaskResult>;

    /// React to a delivered message. Errors are logged by
    /// [`Agent::receive_message`] and never propagate.
    async fn handle_message(&self, message: &AgentMessage) -> Result<()>;

    fn id(&self) -> AgentId {
        self.core().id()
    }

    fn name(&self) -> &str {
        &self.core().identity().name
    }

    fn role(&self) -> AgentRole {
        self.core().role()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.core().capabilities()
    }

    fn has_capability(&self, name: &str) -> bool {
        self.core().has_capability(name)
    }

    fn add_capability(&self, capability: Capability) {
        self.core().add_capability(capability);
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn expertise(&self) -> Expertise {
        self.core().expertise().clone()
    }

    /// Mark the agent active and idle. Idempotent.
    async fn initialize(&self) -> Result<()> {
        self.core().activate();
        Ok(())
    }

    /// Mark the agent inactive; later `process_task` calls are rejected.
    async fn shutdown(&self) -> Result<()> {
        self.core().deactivate();
        Ok(())
    }

    fn get_status(&self) -> AgentState {
        self.core().status()
    }

    fn get_metrics(&self) -> AgentMetrics {
        self.core().metrics()
    }

    fn update_metrics(&self, update: MetricsUpdate) {
        self.core().update_metrics(&update);
    }

    /// Peer connections and their weights.
    fn connections(&self) -> HashMap<AgentId, f64> {
        self.core().connections()
    }

    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.core().events().subscribe()
    }

    /// Build an envelope addressed to `to`. Delivery is the caller's job
    /// (see the coordinator's message routing).
    fn send_message(&self, to: Recipient, kind: MessageKind, content: serde_json::Value) -> AgentMessage {
        self.core().compose(to, kind, content)
    }

    /// Queue an incoming message and hand it to `handle_message`.
    async fn receive_message(&self, message: AgentMessage) {
        self.core().enqueue(message.clone());

        if let Err(e) = self.handle_message(&message).await {
            warn!(
                agent = %self.id(),
                message_id = %message.id,
                from = %message.from,
                error = %e,
                "Message handler failed"
            );
        }
    }
}

/// A capability declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub name: String,

    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl From<&CapabilityConfig> for Capability {
    fn from(config: &CapabilityConfig) -> Self {
        Capability::new(&config.name, config.confidence)
    }
}

/// Configuration for agent creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub role: AgentRole,

    /// Human-readable name
    pub name: String,

    /// Fixed agent id (random when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AgentId>,

    /// Capabilities added on top of the role defaults
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,

    /// Simulated processing time per stage (ms)
    #[serde(default)]
    pub think_time_ms: u64,

    #[serde(default, skip_serializing_if = "Expertise::is_empty")]
    pub expertise: Expertise,
}

impl AgentConfig {
    pub fn new(role: AgentRole, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            id: None,
            capabilities: Vec::new(),
            think_time_ms: 0,
            expertise: Expertise::default(),
        }
    }

    pub fn with_capability(mut self, name: impl Into<String>, confidence: f64) -> Self {
        self.capabilities.push(CapabilityConfig {
            name: name.into(),
            confidence,
        });
        self
    }

    pub fn with_think_time_ms(mut self, millis: u64) -> Self {
        self.think_time_ms = millis;
        self
    }

    pub fn with_expertise(mut self, expertise: Expertise) -> Self {
        self.expertise = expertise;
        self
    }
}
