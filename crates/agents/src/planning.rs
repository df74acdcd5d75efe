//! Planner agent - classifies a task and breaks it into ordered steps.

use crate::capability::{Capability, CapabilitySet};
use crate::runtime::AgentCore;
use crate::traits::{Agent, AgentConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};
use triad_common::{
    AgentMessage, AgentRole, Assessment, EventBus, LifecycleEvent, MessageKind, Plan, Result,
    StageOutput, Task, TaskPayload, TaskResult, TaskStatus, TriadError,
};

pub const TASK_ANALYSIS: &str = "task_analysis";
pub const STRATEGY_PLANNING: &str = "strategy_planning";

/// Step list used for custom task kinds without a registered template.
const DEFAULT_STEPS: &[(&str, &str)] = &[
    ("analyze", "Analyze the task input"),
    ("execute", "Carry out the requested work"),
];

/// Planner agent: the first pipeline stage.
pub struct PlannerAgent {
    core: AgentCore,
    templates: HashMap<String, Vec<(String, String)>>,
}

impl PlannerAgent {
    pub fn new(config: &AgentConfig, events: EventBus) -> Self {
        let defaults = [
            Capability::new(TASK_ANALYSIS, 1.0),
            Capability::new(STRATEGY_PLANNING, 1.0),
        ];
        Self {
            core: AgentCore::from_config(config, defaults, events),
            templates: HashMap::new(),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(&AgentConfig::new(AgentRole::Planner, "Planner"), EventBus::default())
    }

    /// Register the step list used for a custom task kind.
    pub fn with_template<A, D>(mut self, kind: impl Into<String>, steps: Vec<(A, D)>) -> Self
    where
        A: Into<String>,
        D: Into<String>,
    {
        let steps = steps
            .into_iter()
            .map(|(action, details)| (action.into(), details.into()))
            .collect();
        self.templates.insert(kind.into(), steps);
        self
    }

    /// Build the plan for `task`. The step shape depends only on the payload
    /// type; feedback from a prior review is carried alongside.
    pub fn create_plan(&self, task: &Task) -> Result<Plan> {
        task.payload.validate()?;

        let plan = match &task.payload {
            TaskPayload::Coding {
                description,
                requirements,
            } => Plan::from_actions([
                (
                    "analyze_requirements",
                    format!("Analyze '{}' ({} requirements)", description, requirements.len()),
                ),
                ("design_solution", "Design the solution structure".to_string()),
                ("implement_code", "Implement the solution".to_string()),
                ("add_tests", "Add tests for the implementation".to_string()),
            ]),
            TaskPayload::Optimization { goal, .. } => Plan::from_actions([
                ("analyze_current_code", "Analyze the current implementation".to_string()),
                ("identify_optimizations", format!("Identify optimizations for '{}'", goal)),
                ("implement_optimizations", "Apply the optimizations".to_string()),
                ("benchmark", "Compare against the original".to_string()),
            ]),
            TaskPayload::Test { description, target } => Plan::from_actions([
                (
                    "analyze_target",
                    match target {
                        Some(target) => format!("Analyze {} for '{}'", target, description),
                        None => format!("Analyze '{}'", description),
                    },
                ),
                ("write_tests", "Write the test cases".to_string()),
                ("run_tests", "Run the test suite".to_string()),
            ]),
            TaskPayload::Project {
                output_path,
                framework,
                ..
            } => Plan::from_actions([
                ("create_structure", format!("Create project layout at {}", output_path)),
                ("write_manifests", format!("Write {} build manifests", framework)),
                ("generate_sources", "Generate source files".to_string()),
                ("write_docs", "Write project documentation".to_string()),
            ]),
            TaskPayload::Custom { kind, .. } => match self.templates.get(kind) {
                Some(steps) => Plan::from_actions(steps.iter().cloned()),
                None => Plan::from_actions(DEFAULT_STEPS.iter().copied()),
            },
        };

        if plan.is_empty() {
            return Err(TriadError::PlanningFailed(format!(
                "no steps for task type {}",
                task.task_type()
            )));
        }

        let feedback = task
            .review
            .as_ref()
            .map(|review| review.suggestions.clone())
            .unwrap_or_default();

        Ok(plan.with_feedback(feedback))
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_task(&self, task: &Task) -> Result<TaskResult> {
        info!(
            agent = %self.id(),
            task_id = %task.id,
            task_type = %task.task_type(),
            "Processing planning task"
        );

        let core = &self.core;
        let (plan, elapsed) = core
            .track(&task.id, async {
                core.publish(LifecycleEvent::TaskReceived {
                    agent: core.id(),
                    task_id: task.id.clone(),
                });

                core.touch_capability(TASK_ANALYSIS);
                core.think().await;
                let plan = self.create_plan(task)?;
                core.touch_capability(STRATEGY_PLANNING);

                core.remember(format!("plan:{}", task.id), serde_json::to_value(&plan)?);
                core.publish(LifecycleEvent::PlanCreated {
                    agent: core.id(),
                    task_id: task.id.clone(),
                    plan: plan.clone(),
                });
                Ok(plan)
            })
            .await?;

        debug!(agent = %self.id(), task_id = %task.id, steps = plan.len(), "Plan created");

        Ok(TaskResult {
            task_id: task.id.clone(),
            agent_id: self.id(),
            status: TaskStatus::Completed,
            output: StageOutput::Plan(plan),
            assessment: Assessment::new(0.9, 0.85, 0.8, core.confidence(STRATEGY_PLANNING))
                .with_time_spent(elapsed),
        })
    }

    async fn handle_message(&self, message: &AgentMessage) -> Result<()> {
        match message.kind {
            MessageKind::Knowledge => {
                self.core
                    .remember(format!("knowledge:{}", message.id), message.content.clone());
            }
            MessageKind::Request if message.content_type() == Some("plan_request") => {
                let task: Task = serde_json::from_value(message.content["task"].clone())?;
                let plan = self.create_plan(&task)?;
                self.core
                    .remember(format!("plan:{}", task.id), serde_json::to_value(&plan)?);
            }
            _ => {
                debug!(agent = %self.id(), kind = ?message.kind, "Ignoring message");
            }
        }
        Ok(())
    }
}
