//! Lifecycle notifications for observers (logging, UIs).
//!
//! Events are informational only: nothing in the pipeline waits on them or
//! branches on them.

use crate::identity::AgentId;
use crate::message::AgentMessage;
use crate::plan::{Plan, Step};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer size for an event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TaskReceived { agent: AgentId, task_id: String },
    PlanCreated { agent: AgentId, task_id: String, plan: Plan },
    TaskStarted { agent: AgentId, task_id: String },
    StepCompleted { agent: AgentId, task_id: String, step: Step },
    ReviewStarted { agent: AgentId, task_id: String },
    MessageSent { message: AgentMessage },
    AgentRegistered { agent: AgentId },
    AgentRemoved { agent: AgentId },
    TaskQueued { task_id: String },
    TaskDispatched { agent: AgentId, task_id: String },
}

/// Typed broadcast channel for lifecycle events.
///
/// Cloning yields another handle onto the same channel. Publishing with no
/// subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: LifecycleEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(LifecycleEvent::TaskQueued { task_id: "t".into() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let agent = AgentId::new();

        bus.publish(LifecycleEvent::TaskReceived { agent, task_id: "t".into() });
        bus.publish(LifecycleEvent::TaskStarted { agent, task_id: "t".into() });

        assert!(matches!(rx.recv().await.unwrap(), LifecycleEvent::TaskReceived { .. }));
        assert!(matches!(rx.recv().await.unwrap(), LifecycleEvent::TaskStarted { .. }));
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::new(4);
        let other = bus.clone();
        let mut rx = bus.subscribe();
        other.publish(LifecycleEvent::TaskQueued { task_id: "q".into() });
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::TaskQueued { task_id: "q".into() }
        );
    }
}
