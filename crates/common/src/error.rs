//! Error types for the triad pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriadError {
    #[error("Agent {agent} is inactive")]
    AgentInactive { agent: String },

    #[error("No suitable agent for task {task_id}")]
    NoSuitableAgent { task_id: String },

    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("Implementation failed: {0}")]
    ImplementationFailed(String),

    #[error("Review failed: {0}")]
    ReviewFailed(String),

    #[error("Quality {quality:.2} below threshold {threshold:.2} after {attempts} attempt(s)")]
    QualityThresholdNotMet {
        quality: f64,
        threshold: f64,
        attempts: u32,
    },

    #[error("Deadline exceeded for task {task_id} during {stage}")]
    DeadlineExceeded { task_id: String, stage: String },

    #[error("Unsupported task type: {0}")]
    UnsupportedTaskType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriadError>;
