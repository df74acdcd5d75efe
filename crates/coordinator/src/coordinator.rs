//! Agent registry, capability routing and the pending-task queue.

use crate::config::CoordinatorConfig;
use crate::index::CapabilityIndex;
use crate::routing::{Dispatch, DispatchOutcome, PendingEntry, Requirement};
use crate::selection::{self, Candidate};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use triad_agents::{create_agent, Agent, AgentDeps};
use triad_common::{
    AgentId, AgentMessage, EventBus, LifecycleEvent, Recipient, Result, Task, TaskStatus,
    TriadError,
};

/// Everything guarded by the registry lock.
#[derive(Default)]
struct Registry {
    agents: HashMap<AgentId, Arc<dyn Agent>>,
    index: CapabilityIndex,
    pending: VecDeque<PendingEntry>,
}

impl Registry {
    /// Choose the single best agent satisfying `requirement`.
    fn select(&self, requirement: &Requirement) -> Option<Arc<dyn Agent>> {
        let candidates = self
            .index
            .agents_with_all(&requirement.capabilities)
            .into_iter()
            .filter_map(|id| self.agents.get(&id))
            .filter(|agent| requirement.accepts_role(agent.role()))
            .filter(|agent| !requirement.active_only || agent.is_active())
            .map(|agent| Candidate::new(agent.id(), agent.get_metrics()));

        selection::select_best(candidates).and_then(|winner| self.agents.get(&winner.id).cloned())
    }
}

/// Owns the agent registry and routes tasks to agents.
///
/// Registry mutation and the select-or-enqueue step of a dispatch happen
/// under one write lock, so a task is never routed to an agent that has
/// already been removed. Agents run outside the lock.
pub struct Coordinator {
    registry: RwLock<Registry>,
    events: EventBus,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_events(EventBus::default())
    }

    pub fn with_events(events: EventBus) -> Self {
        info!("Initializing triad coordinator");
        Self {
            registry: RwLock::new(Registry::default()),
            events,
        }
    }

    /// Build a coordinator and register the agents declared in `config`.
    ///
    /// Created agents share the coordinator's event bus and use the review
    /// rules from `config`; the artifact producer comes from `deps`.
    pub async fn from_config(config: &CoordinatorConfig, deps: AgentDeps) -> Result<Self> {
        let coordinator = Self::with_events(EventBus::new(config.events.capacity));
        let deps = deps
            .with_events(coordinator.events.clone())
            .with_review_rules(config.review.clone());

        for agent_config in &config.agents {
            coordinator
                .register_agent(create_agent(agent_config, &deps))
                .await?;
        }
        Ok(coordinator)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Add or replace an agent and re-dispatch any queued task it unblocks.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let id = agent.id();
        if id.is_nil() {
            return Err(TriadError::InvalidInput("agent id must not be nil".into()));
        }

        let mut registry = self.registry.write().await;

        let capabilities = agent.capabilities();
        registry.index.index(id, capabilities.names());
        if registry.agents.insert(id, Arc::clone(&agent)).is_some() {
            debug!(agent = %id, "Replaced existing registration");
        }

        info!(
            agent = %id,
            name = %agent.name(),
            role = %agent.role(),
            capabilities = capabilities.len(),
            "Agent registered"
        );
        self.events.publish(LifecycleEvent::AgentRegistered { agent: id });

        self.drain_pending(&mut registry);
        Ok(())
    }

    /// Scan the pending queue once, in order, dispatching every entry that
    /// can now be served. The rest keep their relative order.
    fn drain_pending(&self, registry: &mut Registry) {
        if registry.pending.is_empty() {
            return;
        }

        let queued = std::mem::take(&mut registry.pending);
        for mut entry in queued {
            if entry.is_stale() {
                debug!(task_id = %entry.task.id, "Dropping cancelled or expired pending task");
                continue;
            }

            match registry.select(&entry.requirement) {
                Some(agent) => {
                    info!(
                        task_id = %entry.task.id,
                        agent = %agent.id(),
                        "Dispatching queued task"
                    );
                    let events = self.events.clone();
                    let PendingEntry {
                        task,
                        reply,
                        mut cancel,
                        ..
                    } = entry;
                    let task_id = task.id.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            outcome = run_on(agent, task, &events) => {
                                if reply.send(outcome).is_err() {
                                    debug!(task_id = %task_id, "Queued task finished without a waiter");
                                }
                            }
                            Ok(()) = &mut cancel => {
                                warn!(task_id = %task_id, "Queued task cancelled while running");
                            }
                        }
                    });
                }
                None => registry.pending.push_back(entry),
            }
        }
    }

    /// Unregister an agent and drop it from the capability index.
    pub async fn remove_agent(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        let mut registry = self.registry.write().await;
        let removed = registry.agents.remove(id);
        registry.index.remove(id);

        if removed.is_some() {
            info!(agent = %id, "Agent removed");
            self.events.publish(LifecycleEvent::AgentRemoved { agent: *id });
        }
        removed
    }

    /// Route `task` by its own requirements.
    ///
    /// Non-empty `required_capabilities` select among all agents advertising
    /// them; otherwise active agents whose role matches `task.stage` compete.
    pub async fn dispatch_task(&self, task: Task) -> Result<Dispatch> {
        let requirement = Requirement::for_task(&task);
        self.dispatch_with(task, requirement).await
    }

    /// Route `task` to the best agent satisfying `requirement`, or queue it.
    pub async fn dispatch_with(&self, task: Task, requirement: Requirement) -> Result<Dispatch> {
        task.validate_id()?;

        let winner = {
            let mut registry = self.registry.write().await;
            match registry.select(&requirement) {
                Some(agent) => agent,
                None => {
                    warn!(
                        task_id = %task.id,
                        requirement = %requirement,
                        "No suitable agent, queuing task"
                    );
                    self.events.publish(LifecycleEvent::TaskQueued {
                        task_id: task.id.clone(),
                    });

                    let (entry, pending) = PendingEntry::new(task, requirement);
                    registry.pending.push_back(entry);
                    return Ok(Dispatch::Queued(pending));
                }
            }
        };

        Ok(Dispatch::Assigned(run_on(winner, task, &self.events).await))
    }

    pub async fn get_agent_by_id(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.registry.read().await.agents.get(id).cloned()
    }

    /// Agents advertising `capability`, in id order.
    pub async fn get_agents_by_capability(&self, capability: &str) -> Vec<Arc<dyn Agent>> {
        let registry = self.registry.read().await;
        registry
            .index
            .agents_with(capability)
            .into_iter()
            .filter_map(|id| registry.agents.get(&id).cloned())
            .collect()
    }

    /// Registered peers of `id` with their connection weights, heaviest first.
    pub async fn get_connected_agents(&self, id: &AgentId) -> Vec<(Arc<dyn Agent>, f64)> {
        let registry = self.registry.read().await;
        let Some(agent) = registry.agents.get(id) else {
            return Vec::new();
        };

        let mut peers: Vec<(Arc<dyn Agent>, f64)> = agent
            .connections()
            .into_iter()
            .filter_map(|(peer, weight)| registry.agents.get(&peer).map(|a| (Arc::clone(a), weight)))
            .collect();
        peers.sort_by(|(a, wa), (b, wb)| wb.total_cmp(wa).then_with(|| a.id().cmp(&b.id())));
        peers
    }

    /// Record a weighted connection from `from` to `to`.
    pub async fn connect(&self, from: &AgentId, to: &AgentId, weight: f64) -> Result<()> {
        let registry = self.registry.read().await;
        let source = registry
            .agents
            .get(from)
            .ok_or_else(|| TriadError::InvalidInput(format!("unknown agent {}", from)))?;
        if !registry.agents.contains_key(to) {
            return Err(TriadError::InvalidInput(format!("unknown agent {}", to)));
        }

        source.core().connect(*to, weight);
        debug!(from = %from, to = %to, weight, "Agents connected");
        Ok(())
    }

    /// Deliver a message to its target, or to every other agent for a
    /// broadcast. Returns the number of recipients.
    pub async fn send_message(&self, message: AgentMessage) -> usize {
        let recipients: Vec<Arc<dyn Agent>> = {
            let registry = self.registry.read().await;
            match message.to {
                Recipient::Agent(id) => registry.agents.get(&id).cloned().into_iter().collect(),
                Recipient::Broadcast => registry
                    .agents
                    .values()
                    .filter(|agent| agent.id() != message.from)
                    .cloned()
                    .collect(),
            }
        };

        if recipients.is_empty() {
            warn!(message_id = %message.id, to = %message.to, "No recipient for message, dropping");
            return 0;
        }

        for agent in &recipients {
            agent.receive_message(message.clone()).await;
        }
        recipients.len()
    }

    /// Ids of queued tasks, oldest first. Cancelled and expired entries are
    /// pruned first.
    pub async fn pending_tasks(&self) -> Vec<String> {
        let mut registry = self.registry.write().await;
        registry.pending.retain_mut(|entry| !entry.is_stale());
        registry
            .pending
            .iter()
            .map(|entry| entry.task.id.clone())
            .collect()
    }

    pub async fn agent_count(&self) -> usize {
        self.registry.read().await.agents.len()
    }

    /// All registered agents, in id order.
    pub async fn agents(&self) -> Vec<Arc<dyn Agent>> {
        let registry = self.registry.read().await;
        let mut agents: Vec<Arc<dyn Agent>> = registry.agents.values().cloned().collect();
        agents.sort_by_key(|agent| agent.id());
        agents
    }

    /// Shut every agent down and clear registry, index and queue.
    ///
    /// Waiters on queued tasks resolve with `NoSuitableAgent`.
    pub async fn shutdown(&self) -> Result<()> {
        let agents: Vec<Arc<dyn Agent>> = {
            let mut registry = self.registry.write().await;
            let dropped = registry.pending.len();
            registry.pending.clear();
            registry.index.clear();
            if dropped > 0 {
                warn!(dropped, "Discarded pending tasks on shutdown");
            }
            registry.agents.drain().map(|(_, agent)| agent).collect()
        };

        info!(agents = agents.len(), "Shutting down coordinator");
        for agent in agents {
            agent.shutdown().await?;
        }
        Ok(())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Hand `task` to `agent` and wrap up the result.
async fn run_on(agent: Arc<dyn Agent>, mut task: Task, events: &EventBus) -> DispatchOutcome {
    let agent_id = agent.id();
    task.assigned_to = Some(agent_id);
    task.set_status(TaskStatus::InProgress);

    info!(task_id = %task.id, agent = %agent_id, stage = %task.stage, "Task dispatched");
    events.publish(LifecycleEvent::TaskDispatched {
        agent: agent_id,
        task_id: task.id.clone(),
    });

    match agent.process_task(&task).await {
        Ok(result) => {
            task.set_status(result.status);
            DispatchOutcome::Completed {
                agent_id,
                task,
                result,
            }
        }
        Err(e) => {
            error!(task_id = %task.id, agent = %agent_id, error = %e, "Agent failed task");
            task.fail(e.to_string());
            DispatchOutcome::Failed {
                agent_id,
                task,
                error: e,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triad_agents::{AgentConfig, DoerAgent, PlannerAgent, ReviewerAgent};
    use triad_common::{AgentRole, MessageKind, TaskPayload};

    fn planner(name: &str) -> Arc<dyn Agent> {
        Arc::new(PlannerAgent::new(
            &AgentConfig::new(AgentRole::Planner, name),
            EventBus::default(),
        ))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let coordinator = Coordinator::new();
        let agent = planner("P");
        let id = agent.id();
        coordinator.register_agent(agent).await.unwrap();

        assert_eq!(coordinator.agent_count().await, 1);
        assert!(coordinator.get_agent_by_id(&id).await.is_some());
        assert_eq!(coordinator.get_agents_by_capability("task_analysis").await.len(), 1);
        assert!(coordinator.get_agents_by_capability("task_execution").await.is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_nil_id() {
        let coordinator = Coordinator::new();
        let mut config = AgentConfig::new(AgentRole::Planner, "Nil");
        config.id = Some("00000000-0000-0000-0000-000000000000".parse().unwrap());
        let agent: Arc<dyn Agent> = Arc::new(PlannerAgent::new(&config, EventBus::default()));

        let err = coordinator.register_agent(agent).await.unwrap_err();
        assert!(matches!(err, TriadError::InvalidInput(_)));
        assert_eq!(coordinator.agent_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let coordinator = Coordinator::new();
        assert!(coordinator.remove_agent(&AgentId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_by_stage_role() {
        let coordinator = Coordinator::new();
        coordinator.register_agent(planner("P")).await.unwrap();
        coordinator
            .register_agent(Arc::new(ReviewerAgent::with_default_config()))
            .await
            .unwrap();

        let task = Task::new("t1", TaskPayload::coding("x"));
        let outcome = coordinator.dispatch_task(task).await.unwrap().resolve().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.task().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_blank_id() {
        let coordinator = Coordinator::new();
        let task = Task::new("", TaskPayload::coding("x"));
        assert!(matches!(
            coordinator.dispatch_task(task).await,
            Err(TriadError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_agent_failure_is_recorded_on_task() {
        let coordinator = Coordinator::new();
        let doer: Arc<dyn Agent> = Arc::new(DoerAgent::with_default_config());
        doer.shutdown().await.unwrap();
        coordinator.register_agent(Arc::clone(&doer)).await.unwrap();

        let task = Task::new("t1", TaskPayload::coding("x")).require("task_execution");
        let outcome = coordinator.dispatch_task(task).await.unwrap().resolve().await.unwrap();

        assert!(!outcome.is_completed());
        assert_eq!(outcome.task().status, TaskStatus::Failed);
        assert!(outcome.task().failure.is_some());
        assert_eq!(coordinator.agent_count().await, 1);
    }

    #[tokio::test]
    async fn test_role_dispatch_skips_inactive_agents() {
        let coordinator = Coordinator::new();
        let agent = planner("P");
        agent.shutdown().await.unwrap();
        coordinator.register_agent(agent).await.unwrap();

        let dispatch = coordinator
            .dispatch_task(Task::new("t1", TaskPayload::coding("x")))
            .await
            .unwrap();
        assert!(dispatch.is_queued());
        assert_eq!(coordinator.pending_tasks().await, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let coordinator = Coordinator::new();
        let a = planner("A");
        let b = planner("B");
        let c = planner("C");
        for agent in [&a, &b, &c] {
            coordinator.register_agent(Arc::clone(agent)).await.unwrap();
        }

        let message = a.send_message(
            Recipient::Broadcast,
            MessageKind::Knowledge,
            serde_json::json!({"fact": 1}),
        );
        assert_eq!(coordinator.send_message(message).await, 2);
        assert_eq!(a.core().inbox_len(), 0);
        assert_eq!(b.core().inbox_len(), 1);
        assert_eq!(c.core().inbox_len(), 1);

        let lost = a.send_message(
            Recipient::Agent(AgentId::new()),
            MessageKind::Status,
            serde_json::Value::Null,
        );
        assert_eq!(coordinator.send_message(lost).await, 0);
    }

    #[tokio::test]
    async fn test_connected_agents_sorted_by_weight() {
        let coordinator = Coordinator::new();
        let a = planner("A");
        let b = planner("B");
        let c = planner("C");
        for agent in [&a, &b, &c] {
            coordinator.register_agent(Arc::clone(agent)).await.unwrap();
        }

        coordinator.connect(&a.id(), &b.id(), 0.2).await.unwrap();
        coordinator.connect(&a.id(), &c.id(), 0.9).await.unwrap();
        assert!(coordinator.connect(&a.id(), &AgentId::new(), 1.0).await.is_err());

        let peers = coordinator.get_connected_agents(&a.id()).await;
        let ids: Vec<AgentId> = peers.iter().map(|(agent, _)| agent.id()).collect();
        assert_eq!(ids, vec![c.id(), b.id()]);

        coordinator.remove_agent(&c.id()).await;
        assert_eq!(coordinator.get_connected_agents(&a.id()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_everything() {
        let coordinator = Coordinator::new();
        let agent = planner("P");
        coordinator.register_agent(Arc::clone(&agent)).await.unwrap();
        let queued = coordinator
            .dispatch_task(Task::new("t1", TaskPayload::coding("x")).require("nobody_has_this"))
            .await
            .unwrap();

        coordinator.shutdown().await.unwrap();

        assert_eq!(coordinator.agent_count().await, 0);
        assert!(coordinator.pending_tasks().await.is_empty());
        assert!(!agent.is_active());
        assert!(matches!(
            queued.resolve().await,
            Err(TriadError::NoSuitableAgent { .. })
        ));
    }
}
