//! Common types shared across the triad crates.
//!
//! This crate holds the data model that planners, doers, reviewers and the
//! coordinator exchange: tasks and their typed payloads, plans, stage results,
//! message envelopes and lifecycle events.

pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod plan;
pub mod result;
pub mod task;
pub mod time;

pub use error::{Result, TriadError};
pub use event::{EventBus, LifecycleEvent};
pub use identity::{AgentId, AgentIdentity, AgentRole};
pub use message::{AgentMessage, MessageKind, Recipient};
pub use plan::{Implementation, Plan, Step, StepStatus};
pub use result::{Assessment, PerformanceImprovement, ResultMetrics, StageOutput, TaskResult};
pub use task::{Task, TaskPayload, TaskStatus, TaskType};
