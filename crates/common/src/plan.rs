//! Plans produced by planners and implementations produced by doers.

use crate::{Result, TriadError};
use serde::{Deserialize, Serialize};

/// Status of a single plan step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One step of a plan. Ids are 1-based and give the execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: u32,
    pub action: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An ordered sequence of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,

    /// Suggestions carried over from a prior review of the same task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<String>,
}

impl Plan {
    /// Build a plan from `(action, details)` pairs, numbering steps from 1.
    pub fn from_actions<I, A, D>(actions: I) -> Self
    where
        I: IntoIterator<Item = (A, D)>,
        A: Into<String>,
        D: Into<String>,
    {
        let steps = actions
            .into_iter()
            .enumerate()
            .map(|(i, (action, details))| Step {
                id: i as u32 + 1,
                action: action.into(),
                status: StepStatus::Pending,
                details: Some(details.into()),
            })
            .collect();

        Self {
            steps,
            feedback: Vec::new(),
        }
    }

    pub fn with_feedback(mut self, feedback: Vec<String>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that step ids run 1..=n in order with no gaps or duplicates.
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.id != expected {
                return Err(TriadError::InvalidInput(format!(
                    "plan step at position {} has id {} (expected {})",
                    index + 1,
                    step.id,
                    expected
                )));
            }
        }
        Ok(())
    }

    /// True once every step has completed.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }
}

/// The doer's output after executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub success: bool,
    pub message: String,

    /// Concatenated textual output of the executed steps, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// References to artifacts produced by external collaborators.
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Steps as executed, in id order, with their final status.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Implementation {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count()
    }
}
