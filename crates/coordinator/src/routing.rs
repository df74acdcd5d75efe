//! Dispatch requirements and decision types.

use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::oneshot;
use triad_common::{AgentId, AgentRole, Result, Task, TaskResult, TriadError};

/// What an agent must offer to receive a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Role filter; `None` accepts any role
    pub role: Option<AgentRole>,

    /// Capability names the agent must advertise (all of them)
    pub capabilities: BTreeSet<String>,

    /// Skip agents that have been shut down
    pub active_only: bool,
}

impl Requirement {
    /// The routing rule applied by `Coordinator::dispatch_task`: a
    /// non-empty capability set is matched on its own, an empty one falls
    /// back to the task's current stage role.
    pub fn for_task(task: &Task) -> Self {
        if task.required_capabilities.is_empty() {
            Self::role(task.stage)
        } else {
            Self::capabilities(task.required_capabilities.clone())
        }
    }

    pub fn role(role: AgentRole) -> Self {
        Self {
            role: Some(role),
            capabilities: BTreeSet::new(),
            active_only: true,
        }
    }

    /// Capability-only matching. Inactive agents stay eligible and reject
    /// the task themselves, which surfaces as a failed dispatch.
    pub fn capabilities(capabilities: BTreeSet<String>) -> Self {
        Self {
            role: None,
            capabilities,
            active_only: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: BTreeSet<String>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn accepts_role(&self, role: AgentRole) -> bool {
        self.role.map_or(true, |wanted| wanted == role)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Some(role) => write!(f, "role={}", role)?,
            None => write!(f, "role=any")?,
        }
        if !self.capabilities.is_empty() {
            let names: Vec<&str> = self.capabilities.iter().map(String::as_str).collect();
            write!(f, " capabilities=[{}]", names.join(","))?;
        }
        Ok(())
    }
}

/// Result of handing a task to one selected agent.
///
/// The task travels with the outcome; on failure its status is `failed` and
/// `failure` holds the agent's error.
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed {
        agent_id: AgentId,
        task: Task,
        result: TaskResult,
    },
    Failed {
        agent_id: AgentId,
        task: Task,
        error: TriadError,
    },
}

impl DispatchOutcome {
    pub fn agent_id(&self) -> AgentId {
        match self {
            DispatchOutcome::Completed { agent_id, .. } | DispatchOutcome::Failed { agent_id, .. } => {
                *agent_id
            }
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            DispatchOutcome::Completed { task, .. } | DispatchOutcome::Failed { task, .. } => task,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed { .. })
    }

    /// Split into the task and the stage result.
    pub fn into_parts(self) -> (Task, Result<TaskResult>) {
        match self {
            DispatchOutcome::Completed { task, result, .. } => (task, Ok(result)),
            DispatchOutcome::Failed { task, error, .. } => (task, Err(error)),
        }
    }
}

/// Handle for a task parked in the pending queue.
///
/// Dropping the handle without waiting leaves the task queued; it still runs
/// when a matching agent registers. Dropping a `wait()` that is in progress,
/// or calling `cancel`, withdraws the task and stops a stage already running.
#[derive(Debug)]
#[must_use = "a queued task keeps running unless it is waited on or cancelled"]
pub struct PendingDispatch {
    task_id: String,
    receiver: oneshot::Receiver<DispatchOutcome>,
    cancel: oneshot::Sender<()>,
}

impl PendingDispatch {
    pub(crate) fn new(
        task_id: String,
        receiver: oneshot::Receiver<DispatchOutcome>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            task_id,
            receiver,
            cancel,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Withdraw the task from the queue, or stop it if it is already running.
    pub fn cancel(self) {
        let _ = self.cancel.send(());
    }

    /// Wait until a later registration drains and runs the task.
    ///
    /// Fails with `NoSuitableAgent` if the coordinator discards the entry
    /// (shutdown, or a deadline that passed while queued).
    pub async fn wait(self) -> Result<DispatchOutcome> {
        let PendingDispatch {
            task_id,
            receiver,
            cancel,
        } = self;

        let mut guard = CancelOnDrop(Some(cancel));
        let received = receiver.await;
        guard.disarm();

        received.map_err(|_| TriadError::NoSuitableAgent { task_id })
    }
}

/// Cancels the queued task if the waiting future is dropped before it
/// resolves.
struct CancelOnDrop(Option<oneshot::Sender<()>>);

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            let _ = cancel.send(());
        }
    }
}

/// What `dispatch_task` did with a task.
#[derive(Debug)]
#[must_use]
pub enum Dispatch {
    /// A winner was selected and has processed the task
    Assigned(DispatchOutcome),

    /// No agent matched; the task waits in the pending queue
    Queued(PendingDispatch),
}

impl Dispatch {
    pub fn is_queued(&self) -> bool {
        matches!(self, Dispatch::Queued(_))
    }

    /// Resolve to an outcome, waiting on the queue when necessary.
    pub async fn resolve(self) -> Result<DispatchOutcome> {
        match self {
            Dispatch::Assigned(outcome) => Ok(outcome),
            Dispatch::Queued(pending) => pending.wait().await,
        }
    }
}

/// A queued task together with its requirement and waiter.
pub(crate) struct PendingEntry {
    pub task: Task,
    pub requirement: Requirement,
    pub reply: oneshot::Sender<DispatchOutcome>,
    pub cancel: oneshot::Receiver<()>,
}

impl PendingEntry {
    /// Build an entry and the handle returned to the caller.
    pub fn new(task: Task, requirement: Requirement) -> (Self, PendingDispatch) {
        let (reply, receiver) = oneshot::channel();
        let (cancel_tx, cancel) = oneshot::channel();
        let pending = PendingDispatch::new(task.id.clone(), receiver, cancel_tx);
        let entry = Self {
            task,
            requirement,
            reply,
            cancel,
        };
        (entry, pending)
    }

    /// True once the caller cancelled. A handle dropped without cancelling
    /// does not count.
    pub fn is_cancelled(&mut self) -> bool {
        matches!(self.cancel.try_recv(), Ok(()))
    }

    /// Cancelled, or queued past its deadline.
    pub fn is_stale(&mut self) -> bool {
        self.is_cancelled() || self.task.is_past_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triad_common::TaskPayload;

    fn queued(task: Task) -> (PendingEntry, PendingDispatch) {
        PendingEntry::new(task, Requirement::role(AgentRole::Doer))
    }

    #[test]
    fn test_requirement_for_task() {
        let task = Task::new("t1", TaskPayload::coding("x"));
        assert_eq!(Requirement::for_task(&task), Requirement::role(AgentRole::Planner));

        let task = task.require("task_execution");
        let requirement = Requirement::for_task(&task);
        assert!(requirement.role.is_none());
        assert!(requirement.capabilities.contains("task_execution"));
        assert!(requirement.accepts_role(AgentRole::Reviewer));
    }

    #[test]
    fn test_requirement_display() {
        let requirement = Requirement::role(AgentRole::Doer)
            .with_capabilities(["rust".to_string()].into_iter().collect());
        assert_eq!(requirement.to_string(), "role=doer capabilities=[rust]");
    }

    #[tokio::test]
    async fn test_pending_wait_fails_when_entry_dropped() {
        let (entry, pending) = queued(Task::new("t1", TaskPayload::coding("x")));
        drop(entry);

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, TriadError::NoSuitableAgent { task_id } if task_id == "t1"));
    }

    #[test]
    fn test_dropped_handle_is_not_cancellation() {
        let (mut entry, pending) = queued(Task::new("t1", TaskPayload::coding("x")));
        drop(pending);
        assert!(!entry.is_cancelled());
        assert!(!entry.is_stale());
    }

    #[test]
    fn test_explicit_cancel() {
        let (mut entry, pending) = queued(Task::new("t1", TaskPayload::coding("x")));
        pending.cancel();
        assert!(entry.is_cancelled());
    }

    #[tokio::test]
    async fn test_abandoned_wait_cancels() {
        let (mut entry, pending) = queued(Task::new("t1", TaskPayload::coding("x")));
        let waited = tokio::time::timeout(std::time::Duration::from_millis(10), pending.wait()).await;
        assert!(waited.is_err());
        assert!(entry.is_cancelled());
    }

    #[test]
    fn test_expired_entry_is_stale() {
        let task = Task::new("t1", TaskPayload::coding("x")).with_deadline_at(1);
        let (mut entry, _pending) = queued(task);
        assert!(entry.is_stale());
    }
}
