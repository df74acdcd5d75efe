//! Capability-routed coordinator for triad.
//!
//! The coordinator is the hub that:
//! 1. Registers agents and indexes their capabilities
//! 2. Routes each task to exactly one best-suited agent
//! 3. Parks tasks nobody can serve until a matching agent registers
//! 4. Drives tasks through the plan → implement → review pipeline
//!
//! # Architecture
//!
//! ```text
//!   Task
//!     │
//!     ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │    Pipeline     │ ───▶ │   Coordinator    │ ◄── register / remove
//! │ (state machine) │      │ registry + index │
//! └─────────────────┘      └────────┬─────────┘
//!                                   │ select best
//!                  ┌────────────────┼────────────────┐
//!                  ▼                ▼                ▼
//!              [Planner]         [Doer]         [Reviewer]
//! ```

pub mod config;
pub mod coordinator;
pub mod index;
pub mod pipeline;
pub mod routing;
pub mod selection;

pub use config::{CoordinatorConfig, EventsConfig, PipelineConfig};
pub use coordinator::Coordinator;
pub use index::CapabilityIndex;
pub use pipeline::{AbortReason, Pipeline, PipelineOutcome, PipelineState};
pub use routing::{Dispatch, DispatchOutcome, PendingDispatch, Requirement};
pub use selection::Candidate;
