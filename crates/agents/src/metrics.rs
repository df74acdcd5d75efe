//! Per-agent performance metrics and reputation.

use serde::{Deserialize, Serialize};

/// Reputation change applied per processed task.
pub const REPUTATION_STEP: f64 = 0.1;

/// Running performance figures for one agent.
///
/// `success_rate` and `reputation_score` always stay in [0, 1] and
/// `tasks_completed` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Exponentially smoothed success signal
    pub success_rate: f64,

    /// Number of processed tasks, successful or not
    pub tasks_completed: u64,

    /// Mean processing time over `tasks_completed` (ms)
    pub avg_response_time_ms: f64,

    pub reputation_score: f64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            tasks_completed: 0,
            avg_response_time_ms: 0.0,
            reputation_score: 1.0,
        }
    }
}

impl AgentMetrics {
    /// Fold one processed task into the metrics.
    pub fn record(&mut self, duration_ms: u64, success: bool) {
        self.tasks_completed = self.tasks_completed.saturating_add(1);
        let n = self.tasks_completed as f64;
        self.avg_response_time_ms =
            (self.avg_response_time_ms * (n - 1.0) + duration_ms as f64) / n;

        if success {
            self.success_rate = ((self.success_rate + 1.0) / 2.0).clamp(0.0, 1.0);
            self.reputation_score = (self.reputation_score + REPUTATION_STEP).min(1.0);
        } else {
            self.success_rate = (self.success_rate / 2.0).clamp(0.0, 1.0);
            self.reputation_score = (self.reputation_score - REPUTATION_STEP).max(0.0);
        }
    }

    /// Apply a partial update, keeping the invariants.
    pub fn apply(&mut self, update: &MetricsUpdate) {
        if let Some(rate) = update.success_rate {
            self.success_rate = clamp_unit(rate);
        }
        if let Some(completed) = update.tasks_completed {
            self.tasks_completed = self.tasks_completed.max(completed);
        }
        if let Some(avg) = update.avg_response_time_ms {
            if avg.is_finite() && avg >= 0.0 {
                self.avg_response_time_ms = avg;
            }
        }
        if let Some(score) = update.reputation_score {
            self.reputation_score = clamp_unit(score);
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Partial metrics update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub tasks_completed: Option<u64>,
    #[serde(default)]
    pub avg_response_time_ms: Option<f64>,
    #[serde(default)]
    pub reputation_score: Option<f64>,
}
