//! Doer agent - executes a plan step by step.

use crate::artifact::{Artifact, ArtifactProducer, ArtifactRequest, TemplateProducer};
use crate::capability::Capability;
use crate::runtime::AgentCore;
use crate::traits::{Agent, AgentConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use triad_common::{
    AgentMessage, AgentRole, Assessment, EventBus, Implementation, LifecycleEvent, MessageKind,
    Plan, Result, StageOutput, Step, StepStatus, Task, TaskResult, TaskStatus, TriadError,
};

pub const TASK_EXECUTION: &str = "task_execution";
pub const PROGRESS_TRACKING: &str = "progress_tracking";

/// Actions whose execution produces material output.
pub const MATERIAL_ACTIONS: &[&str] = &[
    "implement_code",
    "add_tests",
    "implement_optimizations",
    "write_tests",
    "create_structure",
    "write_manifests",
    "generate_sources",
    "write_docs",
];

/// Actions completed in place without a collaborator.
const ANALYSIS_ACTIONS: &[&str] = &[
    "analyze_requirements",
    "design_solution",
    "analyze_current_code",
    "identify_optimizations",
    "benchmark",
    "analyze_target",
    "run_tests",
    "analyze",
    "execute",
];

/// Doer agent: the second pipeline stage.
pub struct DoerAgent {
    core: AgentCore,
    producer: Arc<dyn ArtifactProducer>,
}

impl DoerAgent {
    pub fn new(config: &AgentConfig, events: EventBus, producer: Arc<dyn ArtifactProducer>) -> Self {
        let defaults = [
            Capability::new(TASK_EXECUTION, 1.0),
            Capability::new(PROGRESS_TRACKING, 1.0),
        ];
        Self {
            core: AgentCore::from_config(config, defaults, events),
            producer,
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(
            &AgentConfig::new(AgentRole::Doer, "Doer"),
            EventBus::default(),
            Arc::new(TemplateProducer),
        )
    }

    async fn execute_step(&self, task: &Task, planned: &Step) -> Result<(Step, Option<Artifact>)> {
        let mut step = planned.clone();
        step.status = StepStatus::InProgress;
        self.core.think().await;

        if !MATERIAL_ACTIONS.contains(&step.action.as_str()) {
            if !ANALYSIS_ACTIONS.contains(&step.action.as_str()) {
                debug!(task_id = %task.id, action = %step.action, "Unknown action, completing as no-op");
            }
            step.status = StepStatus::Completed;
            return Ok((step, None));
        }

        let artifact = self
            .producer
            .produce(ArtifactRequest { task, step: &step })
            .await
            .map_err(|e| {
                TriadError::ImplementationFailed(format!(
                    "step {} ({}) failed: {}",
                    step.id, step.action, e
                ))
            })?;

        if artifact.success {
            step.status = StepStatus::Completed;
        } else {
            warn!(
                agent = %self.core.id(),
                task_id = %task.id,
                step = step.id,
                message = %artifact.message,
                "Artifact production failed"
            );
            step.status = StepStatus::Failed;
        }
        step.details = Some(format!("{}: {}", artifact.artifact_ref, artifact.message));

        Ok((step, Some(artifact)))
    }

    /// Run every step of `plan` in id order.
    pub async fn execute_plan(&self, task: &Task, plan: &Plan) -> Result<Implementation> {
        plan.validate()
            .map_err(|e| TriadError::ImplementationFailed(format!("invalid plan: {}", e)))?;

        let mut steps = Vec::with_capacity(plan.len());
        let mut artifacts = Vec::new();
        let mut content = String::new();

        for planned in &plan.steps {
            let (step, artifact) = self.execute_step(task, planned).await?;
            debug!(
                agent = %self.core.id(),
                task_id = %task.id,
                step = step.id,
                status = ?step.status,
                "Step finished"
            );

            if let Some(artifact) = artifact {
                if artifact.success {
                    if let Some(text) = &artifact.content {
                        content.push_str(text);
                    }
                }
                artifacts.push(artifact.artifact_ref);
            }

            self.core.publish(LifecycleEvent::StepCompleted {
                agent: self.core.id(),
                task_id: task.id.clone(),
                step: step.clone(),
            });
            steps.push(step);
        }

        let failed = steps.iter().filter(|s| s.status == StepStatus::Failed).count();
        let message = if failed == 0 {
            format!("Executed {} steps", steps.len())
        } else {
            format!("{} of {} steps failed", failed, steps.len())
        };

        Ok(Implementation {
            success: failed == 0,
            message,
            content: (!content.is_empty()).then_some(content),
            artifacts,
            steps,
        })
    }
}

#[async_trait]
impl Agent for DoerAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_task(&self, task: &Task) -> Result<TaskResult> {
        info!(agent = %self.id(), task_id = %task.id, "Processing implementation task");

        let core = &self.core;
        let (implementation, elapsed) = core
            .track(&task.id, async {
                core.publish(LifecycleEvent::TaskReceived {
                    agent: core.id(),
                    task_id: task.id.clone(),
                });

                let plan = task.plan.as_ref().ok_or_else(|| {
                    TriadError::ImplementationFailed(format!("task {} has no plan", task.id))
                })?;

                core.publish(LifecycleEvent::TaskStarted {
                    agent: core.id(),
                    task_id: task.id.clone(),
                });
                core.touch_capability(TASK_EXECUTION);

                let implementation = self.execute_plan(task, plan).await?;
                core.touch_capability(PROGRESS_TRACKING);
                core.remember(
                    format!("implementation:{}", task.id),
                    serde_json::to_value(&implementation)?,
                );
                Ok(implementation)
            })
            .await?;

        info!(
            agent = %self.id(),
            task_id = %task.id,
            success = implementation.success,
            "Implementation finished"
        );

        Ok(TaskResult {
            task_id: task.id.clone(),
            agent_id: self.id(),
            status: TaskStatus::Completed,
            output: StageOutput::Implementation(implementation),
            assessment: Assessment::new(0.85, 0.9, 0.8, core.confidence(TASK_EXECUTION))
                .with_time_spent(elapsed),
        })
    }

    async fn handle_message(&self, message: &AgentMessage) -> Result<()> {
        match message.kind {
            MessageKind::Knowledge => {
                self.core
                    .remember(format!("knowledge:{}", message.id), message.content.clone());
            }
            MessageKind::Status => {
                debug!(agent = %self.id(), from = %message.from, "Peer status update");
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
    use crate::artifact::MockProducer;
    use triad_common::TaskPayload;

    fn planned(task: Task, plan: Plan) -> Task {
        let mut task = task;
        task.plan = Some(plan);
        task
    }

    fn doer_with(producer: MockProducer) -> DoerAgent {
        DoerAgent::new(
            &AgentConfig::new(AgentRole::Doer, "Doer"),
            EventBus::default(),
            Arc::new(producer),
        )
    }

    #[tokio::test]
    async fn test_executes_steps_in_order_with_events() {
        let doer = DoerAgent::with_default_config();
        let mut events = doer.subscribe();
        let task = planned(
            Task::new("t1", TaskPayload::coding("Trim input")),
            Plan::from_actions([
                ("analyze_requirements", ""),
                ("implement_code", ""),
                ("add_tests", ""),
            ]),
        );

        let result = doer.process_task(&task).await.unwrap();
        let implementation = result.implementation().unwrap();
        assert!(implementation.success);
        assert!(implementation.text().contains("#[test]"));
        assert_eq!(implementation.artifacts.len(), 2);

        let mut completed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let LifecycleEvent::StepCompleted { step, .. } = event {
                completed.push(step.id);
            }
        }
        assert_eq!(completed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_action_is_noop() {
        let doer = doer_with(MockProducer::new(vec![]));
        let task = planned(
            Task::new("t1", TaskPayload::coding("x")),
            Plan::from_actions([("juggle", "")]),
        );

        let result = doer.process_task(&task).await.unwrap();
        let implementation = result.implementation().unwrap();
        assert!(implementation.success);
        assert_eq!(implementation.steps[0].status, StepStatus::Completed);
        assert!(implementation.content.is_none());
    }

    #[tokio::test]
    async fn test_failed_artifact_marks_step_failed() {
        let doer = doer_with(MockProducer::new(vec![
            Ok(Artifact::inline("a", "fn ok() {}")),
            Ok(Artifact::failed("b", "disk full")),
        ]));
        let task = planned(
            Task::new("t1", TaskPayload::coding("x")),
            Plan::from_actions([("implement_code", ""), ("add_tests", "")]),
        );

        let result = doer.process_task(&task).await.unwrap();
        let implementation = result.implementation().unwrap();
        assert!(!implementation.success);
        assert_eq!(implementation.failed_steps(), 1);
        assert_eq!(implementation.text(), "fn ok() {}");
        assert_eq!(doer.get_metrics().success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_producer_error_is_implementation_failure() {
        let doer = doer_with(MockProducer::new(vec![Err(TriadError::Io(
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        ))]));
        let task = planned(
            Task::new("t1", TaskPayload::coding("x")),
            Plan::from_actions([("implement_code", "")]),
        );

        let err = doer.process_task(&task).await.unwrap_err();
        assert!(matches!(err, TriadError::ImplementationFailed(_)));
        assert_eq!(doer.get_metrics().tasks_completed, 1);
        assert_eq!(doer.get_metrics().success_rate, 0.5);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_plan_rejected() {
        let doer = DoerAgent::with_default_config();

        let unplanned = Task::new("t1", TaskPayload::coding("x"));
        assert!(matches!(
            doer.process_task(&unplanned).await,
            Err(TriadError::ImplementationFailed(_))
        ));

        let mut plan = Plan::from_actions([("analyze", ""), ("execute", "")]);
        plan.steps.swap(0, 1);
        let shuffled = planned(Task::new("t2", TaskPayload::coding("x")), plan);
        assert!(matches!(
            doer.process_task(&shuffled).await,
            Err(TriadError::ImplementationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let doer = DoerAgent::with_default_config();
        doer.shutdown().await.unwrap();

        let task = planned(
            Task::new("t1", TaskPayload::coding("x")),
            Plan::from_actions([("analyze", "")]),
        );
        assert!(matches!(
            doer.process_task(&task).await,
            Err(TriadError::AgentInactive { .. })
        ));
        assert_eq!(doer.get_metrics().tasks_completed, 0);
    }
}
