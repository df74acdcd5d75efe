//! Shared agent runtime: state, working memory, inbox, connections and
//! metrics tracking.
//!
//! Every concrete agent embeds one [`AgentCore`]. The core owns all mutable
//! per-agent data; callers only ever see copies.

use crate::capability::{Capability, CapabilitySet, Expertise};
use crate::metrics::{AgentMetrics, MetricsUpdate};
use crate::traits::AgentConfig;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use triad_common::time::now_millis;
use triad_common::{
    AgentId, AgentIdentity, AgentMessage, AgentRole, EventBus, LifecycleEvent, MessageKind,
    Recipient, Result, TriadError,
};

/// What an agent is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Working,
    Waiting,
}

/// Agent-private scratch space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    pub short_term: HashMap<String, serde_json::Value>,
    pub working_set: BTreeSet<String>,
}

/// Snapshot of an agent's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub is_active: bool,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    pub last_active: u64,
    pub memory: WorkingMemory,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            is_active: true,
            status: AgentStatus::Idle,
            current_task: None,
            last_active: now_millis(),
            memory: WorkingMemory::default(),
        }
    }
}

pub struct AgentCore {
    identity: AgentIdentity,
    capabilities: RwLock<CapabilitySet>,
    metrics: Mutex<AgentMetrics>,
    state: Mutex<AgentState>,
    inbox: Mutex<VecDeque<AgentMessage>>,
    connections: RwLock<HashMap<AgentId, f64>>,
    events: EventBus,
    think_time: Duration,
    expertise: Expertise,
}

impl AgentCore {
    pub fn new(identity: AgentIdentity, capabilities: CapabilitySet, events: EventBus) -> Self {
        Self {
            identity,
            capabilities: RwLock::new(capabilities),
            metrics: Mutex::new(AgentMetrics::default()),
            state: Mutex::new(AgentState::default()),
            inbox: Mutex::new(VecDeque::new()),
            connections: RwLock::new(HashMap::new()),
            events,
            think_time: Duration::ZERO,
            expertise: Expertise::default(),
        }
    }

    /// Build a core from configuration. Configured capabilities are layered
    /// over the role defaults and win on name clashes.
    pub fn from_config<I>(config: &AgentConfig, defaults: I, events: EventBus) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        let mut capabilities: CapabilitySet = defaults.into_iter().collect();
        for declared in &config.capabilities {
            capabilities.insert(Capability::from(declared));
        }

        let identity = match config.id {
            Some(id) => AgentIdentity::with_id(id, &config.name, config.role),
            None => AgentIdentity::new(&config.name, config.role),
        };

        Self::new(identity, capabilities, events)
            .with_think_time(Duration::from_millis(config.think_time_ms))
            .with_expertise(config.expertise.clone())
    }

    /// Simulated processing time spent inside each stage.
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn with_expertise(mut self, expertise: Expertise) -> Self {
        self.expertise = expertise;
        self
    }

    pub fn expertise(&self) -> &Expertise {
        &self.expertise
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn id(&self) -> AgentId {
        self.identity.id
    }

    pub fn role(&self) -> AgentRole {
        self.identity.role
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn activate(&self) {
        let mut state = self.state.lock();
        if !state.is_active {
            info!(agent = %self.identity.id, name = %self.identity.name, "Initializing agent");
        }
        state.is_active = true;
        state.status = AgentStatus::Idle;
        state.last_active = now_millis();
    }

    pub fn deactivate(&self) {
        let mut state = self.state.lock();
        state.is_active = false;
        state.status = AgentStatus::Idle;
        state.current_task = None;
        info!(agent = %self.identity.id, name = %self.identity.name, "Shutting down agent");
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_active
    }

    pub fn status(&self) -> AgentState {
        self.state.lock().clone()
    }

    pub fn set_status(&self, status: AgentStatus) {
        self.state.lock().status = status;
    }

    // ---- capabilities ----------------------------------------------------

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities.read().clone()
    }

    pub fn add_capability(&self, capability: Capability) {
        self.capabilities.write().insert(capability);
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.read().contains(name)
    }

    /// Confidence of a capability, 0 when absent.
    pub fn confidence(&self, name: &str) -> f64 {
        self.capabilities
            .read()
            .get(name)
            .map(|c| c.confidence)
            .unwrap_or_default()
    }

    pub fn touch_capability(&self, name: &str) {
        self.capabilities.write().touch(name);
    }

    // ---- metrics ---------------------------------------------------------

    pub fn metrics(&self) -> AgentMetrics {
        self.metrics.lock().clone()
    }

    pub fn update_metrics(&self, update: &MetricsUpdate) {
        self.metrics.lock().apply(update);
    }

    /// Enter a task-processing scope.
    ///
    /// Fails with `AgentInactive` after shutdown. The returned scope records
    /// metrics exactly once, either through [`TaskScope::finish`] or, if the
    /// surrounding future is dropped, as a failure on drop.
    pub fn begin(&self, task_id: &str) -> Result<TaskScope<'_>> {
        {
            let mut state = self.state.lock();
            if !state.is_active {
                return Err(TriadError::AgentInactive {
                    agent: self.identity.name.clone(),
                });
            }
            state.status = AgentStatus::Working;
            state.current_task = Some(task_id.to_string());
            state.memory.working_set.insert(task_id.to_string());
        }

        Ok(TaskScope {
            core: self,
            task_id: task_id.to_string(),
            started: Instant::now(),
            finished: false,
        })
    }

    /// Run `work` inside a task scope and return its value with the elapsed
    /// milliseconds.
    pub async fn track<T, F>(&self, task_id: &str, work: F) -> Result<(T, u64)>
    where
        F: Future<Output = Result<T>>,
    {
        let scope = self.begin(task_id)?;
        let outcome = work.await;
        let elapsed = scope.finish(outcome.is_ok());
        outcome.map(|value| (value, elapsed))
    }

    /// Suspension point modelling work inside a stage.
    pub async fn think(&self) {
        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }
    }

    // ---- working memory --------------------------------------------------

    pub fn remember(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state.lock().memory.short_term.insert(key.into(), value);
    }

    pub fn recall(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().memory.short_term.get(key).cloned()
    }

    // ---- connections -----------------------------------------------------

    pub fn connect(&self, peer: AgentId, weight: f64) {
        self.connections.write().insert(peer, weight);
    }

    pub fn disconnect(&self, peer: &AgentId) -> Option<f64> {
        self.connections.write().remove(peer)
    }

    pub fn connections(&self) -> HashMap<AgentId, f64> {
        self.connections.read().clone()
    }

    // ---- messaging -------------------------------------------------------

    /// Build an outgoing envelope and announce it.
    pub fn compose(&self, to: Recipient, kind: MessageKind, content: serde_json::Value) -> AgentMessage {
        let message = AgentMessage::new(self.identity.id, to, kind, content);
        debug!(agent = %self.identity.id, to = %to, kind = ?kind, "Sending message");
        self.events.publish(LifecycleEvent::MessageSent {
            message: message.clone(),
        });
        message
    }

    pub fn enqueue(&self, message: AgentMessage) {
        self.inbox.lock().push_back(message);
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.lock().len()
    }

    /// Take every queued message, oldest first.
    pub fn drain_inbox(&self) -> Vec<AgentMessage> {
        self.inbox.lock().drain(..).collect()
    }

    // ---- events ----------------------------------------------------------

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn publish(&self, event: LifecycleEvent) {
        self.events.publish(event);
    }
}

/// Guard for one in-flight `process_task` call.
pub struct TaskScope<'a> {
    core: &'a AgentCore,
    task_id: String,
    started: Instant,
    finished: bool,
}

impl TaskScope<'_> {
    /// Record the outcome and return the elapsed milliseconds.
    pub fn finish(mut self, success: bool) -> u64 {
        self.complete(success)
    }

    fn complete(&mut self, success: bool) -> u64 {
        self.finished = true;
        let elapsed = self.started.elapsed().as_millis() as u64;

        self.core.metrics.lock().record(elapsed, success);

        let mut state = self.core.state.lock();
        state.memory.working_set.remove(&self.task_id);
        if state.current_task.as_deref() == Some(self.task_id.as_str()) {
            state.current_task = None;
        }
        if state.memory.working_set.is_empty() {
            state.status = AgentStatus::Idle;
        }
        state.last_active = now_millis();

        elapsed
    }
}

impl Drop for TaskScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                agent = %self.core.identity.id,
                task_id = %self.task_id,
                "Task scope dropped before completion"
            );
            self.complete(false);
        }
    }
}
