//! Task types flowing through the plan → implement → review pipeline.

use crate::identity::{AgentId, AgentRole};
use crate::plan::{Implementation, Plan};
use crate::result::Assessment;
use crate::time::now_millis;
use crate::{Result, TriadError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Task classification. Closed for the built-in kinds, open through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Coding,
    Optimization,
    Test,
    Project,
    Custom(String),
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "coding" => TaskType::Coding,
            "optimization" => TaskType::Optimization,
            "test" => TaskType::Test,
            "project" => TaskType::Project,
            _ => TaskType::Custom(value),
        }
    }
}

impl From<TaskType> for String {
    fn from(value: TaskType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Coding => write!(f, "coding"),
            TaskType::Optimization => write!(f, "optimization"),
            TaskType::Test => write!(f, "test"),
            TaskType::Project => write!(f, "project"),
            TaskType::Custom(kind) => write!(f, "{}", kind),
        }
    }
}

/// Type-specific task data, tagged by task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    Coding {
        description: String,
        #[serde(default)]
        requirements: Vec<String>,
    },
    Optimization {
        code: String,
        #[serde(default)]
        goal: String,
    },
    Test {
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Project {
        description: String,
        #[serde(default)]
        requirements: Vec<String>,
        output_path: String,
        framework: String,
    },
    Custom {
        kind: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl TaskPayload {
    pub fn coding(description: impl Into<String>) -> Self {
        TaskPayload::Coding {
            description: description.into(),
            requirements: Vec::new(),
        }
    }

    pub fn optimization(code: impl Into<String>, goal: impl Into<String>) -> Self {
        TaskPayload::Optimization {
            code: code.into(),
            goal: goal.into(),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::Coding { .. } => TaskType::Coding,
            TaskPayload::Optimization { .. } => TaskType::Optimization,
            TaskPayload::Test { .. } => TaskType::Test,
            TaskPayload::Project { .. } => TaskType::Project,
            TaskPayload::Custom { kind, .. } => TaskType::from(kind.clone()),
        }
    }

    /// Short human-readable summary of the payload.
    pub fn summary(&self) -> &str {
        match self {
            TaskPayload::Coding { description, .. }
            | TaskPayload::Test { description, .. }
            | TaskPayload::Project { description, .. } => description,
            TaskPayload::Optimization { goal, .. } => goal,
            TaskPayload::Custom { kind, .. } => kind,
        }
    }

    /// Check the payload shape for its task type.
    pub fn validate(&self) -> Result<()> {
        fn require(field: &str, value: &str, kind: &str) -> Result<()> {
            if value.trim().is_empty() {
                return Err(TriadError::PlanningFailed(format!(
                    "{} task is missing '{}'",
                    kind, field
                )));
            }
            Ok(())
        }

        match self {
            TaskPayload::Coding { description, .. } => require("description", description, "coding"),
            TaskPayload::Test { description, .. } => require("description", description, "test"),
            TaskPayload::Optimization { code, .. } => require("code", code, "optimization"),
            TaskPayload::Project {
                output_path,
                framework,
                ..
            } => {
                require("output_path", output_path, "project")?;
                require("framework", framework, "project")
            }
            TaskPayload::Custom { kind, .. } => {
                if kind.trim().is_empty() {
                    return Err(TriadError::UnsupportedTaskType(
                        "custom task without a kind".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Current status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

/// A unit of work handed through the pipeline.
///
/// `plan`, `implementation` and `review` are filled in by successive stages
/// and never cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Caller-supplied unique id
    pub id: String,

    /// Type-specific data
    pub payload: TaskPayload,

    /// Higher is more urgent
    #[serde(default)]
    pub priority: i32,

    /// Capabilities the executing agent must advertise
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,

    /// Deadline (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,

    pub status: TaskStatus,

    /// Pipeline stage the task is waiting on
    pub stage: AgentRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AgentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Implementation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<Assessment>,

    /// Human-readable reason for the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Number of replanning cycles performed so far
    #[serde(default)]
    pub attempts: u32,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Task {
    pub fn new(id: impl Into<String>, payload: TaskPayload) -> Self {
        let now = now_millis();

        Self {
            id: id.into(),
            payload,
            priority: 0,
            required_capabilities: BTreeSet::new(),
            deadline: None,
            status: TaskStatus::Pending,
            stage: AgentRole::Planner,
            assigned_to: None,
            plan: None,
            implementation: None,
            review: None,
            failure: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn require(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.insert(capability.into());
        self
    }

    pub fn with_deadline_at(mut self, deadline_millis: u64) -> Self {
        self.deadline = Some(deadline_millis);
        self
    }

    pub fn with_deadline_in(self, timeout: Duration) -> Self {
        let deadline = now_millis().saturating_add(timeout.as_millis() as u64);
        self.with_deadline_at(deadline)
    }

    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }

    /// Reject malformed tasks before they enter the coordinator.
    pub fn validate_id(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TriadError::InvalidInput("task id must not be empty".into()));
        }
        Ok(())
    }

    /// Time left before the deadline, `None` when there is no deadline.
    /// Returns `Some(Duration::ZERO)` once the deadline has passed.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| Duration::from_millis(d.saturating_sub(now_millis())))
    }

    pub fn is_past_deadline(&self) -> bool {
        matches!(self.time_remaining(), Some(d) if d.is_zero())
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    /// Mark the task failed and record why.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.set_status(TaskStatus::Failed);
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("t1", TaskPayload::coding("Build a parser"));

        assert_eq!(task.id, "t1");
        assert_eq!(task.task_type(), TaskType::Coding);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.stage, AgentRole::Planner);
        assert!(task.required_capabilities.is_empty());
        assert!(task.plan.is_none());
        assert!(task.implementation.is_none());
        assert!(task.review.is_none());
        assert!(task.created_at > 0);
    }

    #[test]
    fn test_task_builder_methods() {
        let task = Task::new("t2", TaskPayload::coding("x"))
            .with_priority(5)
            .require("task_execution")
            .require("progress_tracking")
            .with_deadline_at(42);

        assert_eq!(task.priority, 5);
        assert_eq!(task.required_capabilities.len(), 2);
        assert_eq!(task.deadline, Some(42));
        assert!(task.is_past_deadline());
    }

    #[test]
    fn test_validate_id_rejects_blank() {
        let task = Task::new("  ", TaskPayload::coding("x"));
        assert!(matches!(task.validate_id(), Err(TriadError::InvalidInput(_))));
    }

    #[test]
    fn test_payload_validation() {
        assert!(TaskPayload::coding("ok").validate().is_ok());
        assert!(matches!(
            TaskPayload::coding(" ").validate(),
            Err(TriadError::PlanningFailed(_))
        ));
        assert!(matches!(
            TaskPayload::optimization("", "faster").validate(),
            Err(TriadError::PlanningFailed(_))
        ));

        let project = TaskPayload::Project {
            description: "svc".into(),
            requirements: vec![],
            output_path: "out".into(),
            framework: String::new(),
        };
        assert!(project.validate().is_err());

        let custom = TaskPayload::Custom {
            kind: String::new(),
            data: serde_json::Value::Null,
        };
        assert!(matches!(
            custom.validate(),
            Err(TriadError::UnsupportedTaskType(_))
        ));
    }

    #[test]
    fn test_task_type_strings() {
        assert_eq!(TaskType::from("test".to_string()), TaskType::Test);
        assert_eq!(
            TaskType::from("research".to_string()),
            TaskType::Custom("research".into())
        );
        assert_eq!(TaskType::Optimization.to_string(), "optimization");
    }

    #[test]
    fn test_payload_tagged_serialization() {
        let payload = TaskPayload::optimization("fn f() {}", "speed");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "optimization");

        let back: TaskPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut task = Task::new("t3", TaskPayload::coding("x"));
        task.fail("boom");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure.as_deref(), Some("boom"));
    }
}
