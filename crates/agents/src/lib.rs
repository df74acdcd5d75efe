//! Pipeline agents for triad.
//!
//! This crate provides the three stage agents and the runtime they share:
//!
//! - **Planner**: classifies a task and emits an ordered plan
//! - **Doer**: executes the plan step by step, delegating material output
//!   to an [`ArtifactProducer`]
//! - **Reviewer**: scores the implementation with [`ReviewRules`]
//!
//! # Architecture
//!
//! Each agent embeds an [`AgentCore`] holding identity, capabilities,
//! metrics, state, inbox and peer connections:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      AGENTS                           │
//! ├───────────────────────────────────────────────────────┤
//! │                                                       │
//! │  ┌─────────┐      ┌─────────┐      ┌──────────┐       │
//! │  │ Planner │ ───▶ │  Doer   │ ───▶ │ Reviewer │       │
//! │  └────┬────┘      └────┬────┘      └────┬─────┘       │
//! │       │                │                │             │
//! │       ▼                ▼                ▼             │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │     AgentCore (state, metrics, inbox, events)   │  │
//! │  └─────────────────────────────────────────────────┘  │
//! │                                                       │
//! └───────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod capability;
pub mod execution;
pub mod factory;
pub mod metrics;
pub mod planning;
pub mod review;
pub mod runtime;
pub mod traits;

pub use artifact::{Artifact, ArtifactProducer, ArtifactRequest, TemplateProducer};
pub use capability::{Capability, CapabilitySet, Expertise};
pub use execution::DoerAgent;
pub use factory::{create_agent, AgentDeps};
pub use metrics::{AgentMetrics, MetricsUpdate};
pub use planning::PlannerAgent;
pub use review::{ReviewRules, ReviewerAgent};
pub use runtime::{AgentCore, AgentState, AgentStatus};
pub use traits::{Agent, AgentConfig, CapabilityConfig};
