//! Reviewer agent - scores an implementation with inspectable rules.

use crate::capability::Capability;
use crate::runtime::AgentCore;
use crate::traits::{Agent, AgentConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triad_common::{
    AgentMessage, AgentRole, Assessment, EventBus, Implementation, LifecycleEvent, MessageKind,
    PerformanceImprovement, Result, StageOutput, Task, TaskResult, TaskStatus, TaskType,
    TriadError,
};

pub const QUALITY_ASSESSMENT: &str = "quality_assessment";
pub const IMPROVEMENT_SUGGESTIONS: &str = "improvement_suggestions";
pub const PERFORMANCE_ANALYSIS: &str = "performance_analysis";

/// An expected property of the implementation, detected by text markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Safeguard {
    pub name: String,

    /// Any one marker present satisfies the safeguard
    pub markers: Vec<String>,

    pub penalty: f64,

    pub suggestion: String,
}

impl Safeguard {
    pub fn new(name: &str, markers: &[&str], penalty: f64, suggestion: &str) -> Self {
        Self {
            name: name.into(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
            penalty,
            suggestion: suggestion.into(),
        }
    }

    pub fn is_present(&self, text: &str) -> bool {
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodingRules {
    pub base_quality: f64,
    pub safeguards: Vec<Safeguard>,
    /// Text longer than this counts as complete
    pub complete_above_chars: usize,
    pub complete: f64,
    pub partial: f64,
    pub efficiency: f64,
}

impl Default for CodingRules {
    fn default() -> Self {
        Self {
            base_quality: 0.9,
            safeguards: vec![
                Safeguard::new("error_handling", &["Err("], 0.1, "Add error handling"),
                Safeguard::new(
                    "input_validation",
                    &["is_finite", "validate", "is_empty()"],
                    0.1,
                    "Add input validation",
                ),
                Safeguard::new("tests", &["#[test]", "assert"], 0.1, "Add unit tests"),
            ],
            complete_above_chars: 100,
            complete: 0.9,
            partial: 0.7,
            efficiency: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationRules {
    pub quality: f64,
    pub completeness: f64,
    pub base_efficiency: f64,
    pub asymptotic: Safeguard,
    pub commentary: Safeguard,
    /// Efficiency above this is a significant improvement
    pub significant_above: f64,
}

impl Default for OptimizationRules {
    fn default() -> Self {
        Self {
            quality: 0.85,
            completeness: 0.9,
            base_efficiency: 0.9,
            asymptotic: Safeguard::new(
                "asymptotic_improvement",
                &["O(1)", "closed-form"],
                0.2,
                "Consider an asymptotically better approach",
            ),
            commentary: Safeguard::new(
                "explanation",
                &["// "],
                0.1,
                "Document the optimization",
            ),
            significant_above: 0.8,
        }
    }
}

/// Deterministic scoring tables used by the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewRules {
    pub coding: CodingRules,
    pub optimization: OptimizationRules,

    /// Project quality lost per failed step
    pub project_step_penalty: f64,

    /// Quality ceiling when the implementation reported failure
    pub failed_quality_cap: f64,
}

impl Default for ReviewRules {
    fn default() -> Self {
        Self {
            coding: CodingRules::default(),
            optimization: OptimizationRules::default(),
            project_step_penalty: 0.1,
            failed_quality_cap: 0.5,
        }
    }
}

impl ReviewRules {
    /// Score an implementation of a task of the given type.
    pub fn assess(
        &self,
        task_type: &TaskType,
        implementation: &Implementation,
        confidence: f64,
    ) -> Assessment {
        let text = implementation.text();
        let mut suggestions = Vec::new();

        let (mut quality, completeness, efficiency, improvement) = match task_type {
            TaskType::Coding => {
                let rules = &self.coding;
                let mut quality = rules.base_quality;
                for safeguard in &rules.safeguards {
                    if !safeguard.is_present(text) {
                        quality -= safeguard.penalty;
                        suggestions.push(safeguard.suggestion.clone());
                    }
                }
                let completeness = if text.len() > rules.complete_above_chars {
                    rules.complete
                } else {
                    rules.partial
                };
                (quality, completeness, rules.efficiency, None)
            }
            TaskType::Optimization => {
                let rules = &self.optimization;
                let mut efficiency = rules.base_efficiency;
                for safeguard in [&rules.asymptotic, &rules.commentary] {
                    if !safeguard.is_present(text) {
                        efficiency -= safeguard.penalty;
                        suggestions.push(safeguard.suggestion.clone());
                    }
                }
                let improvement = if efficiency > rules.significant_above {
                    PerformanceImprovement::Significant
                } else {
                    PerformanceImprovement::Moderate
                };
                (rules.quality, rules.completeness, efficiency, Some(improvement))
            }
            TaskType::Project => {
                let total = implementation.steps.len();
                let failed = implementation.failed_steps();
                let quality = 0.9 - self.project_step_penalty * failed as f64;
                let completeness = if total == 0 {
                    0.0
                } else {
                    (total - failed) as f64 / total as f64
                };
                if failed > 0 {
                    suggestions.push(format!("Retry {} failed project steps", failed));
                }
                (quality, completeness, 0.8, None)
            }
            TaskType::Test | TaskType::Custom(_) => (0.85, 0.9, 0.8, None),
        };

        if !implementation.success {
            quality = quality.min(self.failed_quality_cap);
            suggestions.push(format!("Resolve failure: {}", implementation.message));
        }

        let assessment = Assessment::new(quality, completeness, efficiency, confidence)
            .with_suggestions(suggestions);
        match improvement {
            Some(improvement) => assessment.with_performance_improvement(improvement),
            None => assessment,
        }
    }
}

/// Reviewer agent: the third pipeline stage.
pub struct ReviewerAgent {
    core: AgentCore,
    rules: ReviewRules,
}

impl ReviewerAgent {
    pub fn new(config: &AgentConfig, events: EventBus, rules: ReviewRules) -> Self {
        let defaults = [
            Capability::new(QUALITY_ASSESSMENT, 0.9),
            Capability::new(IMPROVEMENT_SUGGESTIONS, 0.85),
            Capability::new(PERFORMANCE_ANALYSIS, 0.8),
        ];
        Self {
            core: AgentCore::from_config(config, defaults, events),
            rules,
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(
            &AgentConfig::new(AgentRole::Reviewer, "Reviewer"),
            EventBus::default(),
            ReviewRules::default(),
        )
    }

    pub fn rules(&self) -> &ReviewRules {
        &self.rules
    }

    fn review(&self, task_type: &TaskType, implementation: &Implementation) -> Assessment {
        let core = &self.core;
        core.touch_capability(QUALITY_ASSESSMENT);
        if *task_type == TaskType::Optimization {
            core.touch_capability(PERFORMANCE_ANALYSIS);
        }

        let assessment =
            self.rules
                .assess(task_type, implementation, core.confidence(QUALITY_ASSESSMENT));
        if !assessment.suggestions.is_empty() {
            core.touch_capability(IMPROVEMENT_SUGGESTIONS);
        }
        assessment
    }
}

#[async_trait]
impl Agent for ReviewerAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_task(&self, task: &Task) -> Result<TaskResult> {
        info!(agent = %self.id(), task_id = %task.id, "Processing review task");

        let core = &self.core;
        let (assessment, elapsed) = core
            .track(&task.id, async {
                core.publish(LifecycleEvent::TaskReceived {
                    agent: core.id(),
                    task_id: task.id.clone(),
                });

                let implementation = task.implementation.as_ref().ok_or_else(|| {
                    TriadError::ReviewFailed(format!("task {} has no implementation", task.id))
                })?;

                core.publish(LifecycleEvent::ReviewStarted {
                    agent: core.id(),
                    task_id: task.id.clone(),
                });
                core.think().await;

                let assessment = self.review(&task.task_type(), implementation);
                core.remember(format!("review:{}", task.id), serde_json::to_value(&assessment)?);
                Ok(assessment)
            })
            .await?;

        info!(
            agent = %self.id(),
            task_id = %task.id,
            quality = assessment.quality,
            suggestions = assessment.suggestions.len(),
            "Review finished"
        );

        Ok(TaskResult {
            task_id: task.id.clone(),
            agent_id: self.id(),
            status: TaskStatus::Completed,
            output: StageOutput::Review,
            assessment: assessment.with_time_spent(elapsed),
        })
    }

    async fn handle_message(&self, message: &AgentMessage) -> Result<()> {
        match message.kind {
            MessageKind::Knowledge => {
                self.core
                    .remember(format!("knowledge:{}", message.id), message.content.clone());
            }
            MessageKind::Request if message.content_type() == Some("review_request") => {
                let task_id = message.content["task_id"].as_str().ok_or_else(|| {
                    TriadError::InvalidInput("review_request without task_id".into())
                })?;
                let task_type = message.content["task_type"]
                    .as_str()
                    .map(|name| TaskType::from(name.to_string()))
                    .ok_or_else(|| {
                        TriadError::InvalidInput("review_request without task_type".into())
                    })?;
                let implementation: Implementation =
                    serde_json::from_value(message.content["implementation"].clone())?;

                let assessment = self.review(&task_type, &implementation);
                self.core
                    .remember(format!("review:{}", task_id), serde_json::to_value(&assessment)?);
            }
            _ => {
                debug!(agent = %self.id(), kind = ?message.kind, "Ignoring message");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use triad_common::{AgentId, Plan, Recipient, StepStatus, TaskPayload};

    fn implementation(text: &str) -> Implementation {
        Implementation {
            success: true,
            message: "ok".into(),
            content: Some(text.into()),
            artifacts: vec![],
            steps: vec![],
        }
    }

    #[test]
    fn test_coding_penalties_per_missing_safeguard() {
        let rules = ReviewRules::default();

        let bare = rules.assess(&TaskType::Coding, &implementation("fn run() {}"), 0.9);
        assert_eq!(bare.quality, 0.6);
        assert_eq!(bare.completeness, 0.7);
        assert_eq!(bare.suggestions.len(), 3);

        let guarded = format!(
            "{}\nfn run(s: &str) -> Result<(), E> {{ if s.is_empty() {{ return Err(E); }} Ok(()) }}\n#[test] fn t() {{ assert!(true) }}",
            "// ".repeat(20)
        );
        let full = rules.assess(&TaskType::Coding, &implementation(&guarded), 0.9);
        assert_eq!(full.quality, 0.9);
        assert_eq!(full.completeness, 0.9);
        assert!(full.suggestions.is_empty());
    }

    #[test]
    fn test_optimization_efficiency() {
        let rules = ReviewRules::default();

        let good = rules.assess(
            &TaskType::Optimization,
            &implementation("// closed-form, O(1)\nn * (n - 1) / 2"),
            0.9,
        );
        assert_eq!(good.efficiency, 0.9);
        assert_eq!(good.quality, 0.85);
        assert_eq!(
            good.metrics.performance_improvement,
            Some(PerformanceImprovement::Significant)
        );

        let weak = rules.assess(&TaskType::Optimization, &implementation("loop {}"), 0.9);
        assert_eq!(weak.efficiency, 0.6);
        assert_eq!(
            weak.metrics.performance_improvement,
            Some(PerformanceImprovement::Moderate)
        );
    }

    #[test]
    fn test_project_counts_failed_steps() {
        let mut plan = Plan::from_actions([("a", ""), ("b", ""), ("c", ""), ("d", "")]);
        for (i, step) in plan.steps.iter_mut().enumerate() {
            step.status = if i == 0 { StepStatus::Failed } else { StepStatus::Completed };
        }
        let imp = Implementation {
            success: true,
            message: "ok".into(),
            content: None,
            artifacts: vec![],
            steps: plan.steps,
        };

        let a = ReviewRules::default().assess(&TaskType::Project, &imp, 0.9);
        assert_eq!(a.quality, 0.8);
        assert_eq!(a.completeness, 0.75);
    }

    #[test]
    fn test_failed_implementation_caps_quality() {
        let mut imp = implementation("x");
        imp.success = false;
        let a = ReviewRules::default().assess(&TaskType::Test, &imp, 0.9);
        assert_eq!(a.quality, 0.5);
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let rules: ReviewRules = serde_json::from_value(json!({
            "failed_quality_cap": 0.4,
            "coding": {"base_quality": 1.0}
        }))
        .unwrap();
        assert_eq!(rules.failed_quality_cap, 0.4);
        assert_eq!(rules.coding.base_quality, 1.0);
        assert_eq!(rules.coding.safeguards.len(), 3);
        assert_eq!(rules.optimization, OptimizationRules::default());
    }

    #[tokio::test]
    async fn test_review_requires_implementation() {
        let reviewer = ReviewerAgent::with_default_config();
        let task = Task::new("t1", TaskPayload::coding("x"));

        let err = reviewer.process_task(&task).await.unwrap_err();
        assert!(matches!(err, TriadError::ReviewFailed(_)));
        assert_eq!(reviewer.get_metrics().tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_review_request_message() {
        let reviewer = ReviewerAgent::with_default_config();
        let message = AgentMessage::new(
            AgentId::new(),
            Recipient::Agent(reviewer.id()),
            MessageKind::Request,
            json!({
                "type": "review_request",
                "task_id": "t9",
                "task_type": "coding",
                "implementation": implementation("fn run() {}"),
            }),
        );

        reviewer.receive_message(message).await;
        assert_eq!(reviewer.core().inbox_len(), 1);
        let stored = reviewer.core().recall("review:t9").unwrap();
        assert_eq!(stored["quality"], json!(0.6));
    }

    #[tokio::test]
    async fn test_malformed_request_is_isolated() {
        let reviewer = ReviewerAgent::with_default_config();
        let message = AgentMessage::new(
            AgentId::new(),
            Recipient::Agent(reviewer.id()),
            MessageKind::Request,
            json!({"type": "review_request"}),
        );

        reviewer.receive_message(message).await;
        assert_eq!(reviewer.core().inbox_len(), 1);
        assert!(reviewer.is_active());
    }

    #[tokio::test]
    async fn test_review_request_requires_task_type() {
        let reviewer = ReviewerAgent::with_default_config();
        let content = json!({
            "type": "review_request",
            "task_id": "t9",
            "implementation": implementation("fn run() {}"),
        });
        let message = AgentMessage::new(
            AgentId::new(),
            Recipient::Agent(reviewer.id()),
            MessageKind::Request,
            content,
        );

        let err = reviewer.handle_message(&message).await.unwrap_err();
        assert!(matches!(err, TriadError::InvalidInput(ref msg) if msg.contains("task_type")));
        assert!(reviewer.core().recall("review:t9").is_none());
    }
}
