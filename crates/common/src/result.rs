//! Stage results and reviewer assessments.

use crate::identity::AgentId;
use crate::plan::{Implementation, Plan};
use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};

/// Round to two decimals and clamp into [0, 1].
pub fn normalize_score(value: f64) -> f64 {
    ((value * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

/// Qualitative performance gain reported for optimization reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceImprovement {
    Moderate,
    Significant,
}

/// Measurements attached to a stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    /// Wall time spent in the stage (ms)
    pub time_spent_ms: u64,

    /// Agent confidence in its output, in [0, 1]
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_improvement: Option<PerformanceImprovement>,
}

/// Scored evaluation of a stage's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub quality: f64,
    pub completeness: f64,
    pub efficiency: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub metrics: ResultMetrics,
}

impl Assessment {
    /// Build an assessment with scores normalized into [0, 1].
    pub fn new(quality: f64, completeness: f64, efficiency: f64, confidence: f64) -> Self {
        Self {
            quality: normalize_score(quality),
            completeness: normalize_score(completeness),
            efficiency: normalize_score(efficiency),
            suggestions: Vec::new(),
            metrics: ResultMetrics {
                time_spent_ms: 0,
                confidence: normalize_score(confidence),
                performance_improvement: None,
            },
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_time_spent(mut self, millis: u64) -> Self {
        self.metrics.time_spent_ms = millis;
        self
    }

    pub fn with_performance_improvement(mut self, improvement: PerformanceImprovement) -> Self {
        self.metrics.performance_improvement = Some(improvement);
        self
    }
}

/// What a stage produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageOutput {
    Plan(Plan),
    Implementation(Implementation),
    /// The assessment itself is the reviewer's output.
    Review,
}

/// Result returned by an agent's `process_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub agent_id: AgentId,
    pub status: TaskStatus,
    pub output: StageOutput,
    pub assessment: Assessment,
}

impl TaskResult {
    pub fn plan(&self) -> Option<&Plan> {
        match &self.output {
            StageOutput::Plan(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn implementation(&self) -> Option<&Implementation> {
        match &self.output {
            StageOutput::Implementation(implementation) => Some(implementation),
            _ => None,
        }
    }
}
