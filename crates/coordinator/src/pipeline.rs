//! Plan → implement → review state machine with a bounded feedback loop.

use crate::config::PipelineConfig;
use crate::coordinator::Coordinator;
use crate::routing::Requirement;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use triad_common::{AgentRole, Assessment, Result, Task, TaskResult, TaskStatus, TriadError};

/// Why a pipeline ended without finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    PlanningFailed,
    ImplementationFailed,
    ReviewFailed,
    QualityThresholdNotMet,
    DeadlineExceeded,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbortReason::PlanningFailed => "planning failed",
            AbortReason::ImplementationFailed => "implementation failed",
            AbortReason::ReviewFailed => "review failed",
            AbortReason::QualityThresholdNotMet => "quality threshold not met",
            AbortReason::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Planning,
    Implementing,
    Reviewing,
    Replanning,
    Done,
    Aborted(AbortReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted(_))
    }

    /// The agent role serving this state, if any.
    pub fn role(&self) -> Option<AgentRole> {
        match self {
            PipelineState::Planning => Some(AgentRole::Planner),
            PipelineState::Implementing => Some(AgentRole::Doer),
            PipelineState::Reviewing => Some(AgentRole::Reviewer),
            _ => None,
        }
    }
}

/// Final result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The task with every plan, implementation and review it gathered
    pub task: Task,

    /// `Done` or `Aborted`
    pub state: PipelineState,

    /// Every visited state, in order, ending with `state`
    pub history: Vec<PipelineState>,

    /// Replanning cycles performed
    pub attempts: u32,

    /// The error behind an abort
    pub error: Option<TriadError>,
}

impl PipelineOutcome {
    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn review(&self) -> Option<&Assessment> {
        self.task.review.as_ref()
    }
}

/// Drives tasks through the coordinator's agents.
pub struct Pipeline {
    coordinator: Arc<Coordinator>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(coordinator: Arc<Coordinator>, config: PipelineConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `task` to a terminal state.
    ///
    /// Stage failures end in `Aborted` rather than an error; only a
    /// malformed task (blank id) is rejected up front.
    pub async fn run(&self, mut task: Task) -> Result<PipelineOutcome> {
        task.validate_id()?;

        let deadline = task
            .time_remaining()
            .map(|remaining| Instant::now() + remaining);
        let mut history = Vec::new();
        let mut attempts = 0u32;
        let mut state = PipelineState::Planning;
        let mut failure: Option<TriadError> = None;

        info!(task_id = %task.id, task_type = %task.task_type(), "Starting pipeline");

        while !state.is_terminal() {
            history.push(state);

            let next = match state {
                PipelineState::Planning => {
                    let staged = self.run_stage(&mut task, AgentRole::Planner, deadline).await;
                    match staged {
                        Ok(result) => match result.plan() {
                            Some(plan) => {
                                task.plan = Some(plan.clone());
                                PipelineState::Implementing
                            }
                            None => {
                                failure = Some(TriadError::PlanningFailed(
                                    "planner returned no plan".into(),
                                ));
                                PipelineState::Aborted(AbortReason::PlanningFailed)
                            }
                        },
                        Err(e) => abort_on(e, AbortReason::PlanningFailed, &mut failure),
                    }
                }
                PipelineState::Implementing => {
                    let staged = self.run_stage(&mut task, AgentRole::Doer, deadline).await;
                    match staged {
                        Ok(result) => match result.implementation() {
                            Some(implementation) => {
                                task.implementation = Some(implementation.clone());
                                PipelineState::Reviewing
                            }
                            None => {
                                failure = Some(TriadError::ImplementationFailed(
                                    "doer returned no implementation".into(),
                                ));
                                PipelineState::Aborted(AbortReason::ImplementationFailed)
                            }
                        },
                        Err(e) => abort_on(e, AbortReason::ImplementationFailed, &mut failure),
                    }
                }
                PipelineState::Reviewing => {
                    let staged = self.run_stage(&mut task, AgentRole::Reviewer, deadline).await;
                    match staged {
                        Ok(result) => self.judge(&mut task, result, &mut attempts, &mut failure),
                        Err(e) => abort_on(e, AbortReason::ReviewFailed, &mut failure),
                    }
                }
                PipelineState::Replanning => PipelineState::Planning,
                PipelineState::Done | PipelineState::Aborted(_) => state,
            };

            info!(task_id = %task.id, from = ?state, to = ?next, "Pipeline transition");
            state = next;
        }
        history.push(state);

        match state {
            PipelineState::Aborted(reason) => {
                let detail = failure
                    .as_ref()
                    .map(|e| format!("{}: {}", reason, e))
                    .unwrap_or_else(|| reason.to_string());
                warn!(task_id = %task.id, reason = %reason, attempts, "Pipeline aborted");
                task.fail(detail);
            }
            _ => {
                info!(task_id = %task.id, attempts, "Pipeline finished");
                task.set_status(TaskStatus::Completed);
            }
        }

        Ok(PipelineOutcome {
            task,
            state,
            history,
            attempts,
            error: failure,
        })
    }

    /// Accept the review, loop back for another plan, or give up.
    fn judge(
        &self,
        task: &mut Task,
        result: TaskResult,
        attempts: &mut u32,
        failure: &mut Option<TriadError>,
    ) -> PipelineState {
        let assessment = result.assessment;
        let quality = assessment.quality;
        let threshold = self.config.acceptance_threshold;
        task.review = Some(assessment);

        if quality >= threshold {
            return PipelineState::Done;
        }

        if *attempts < self.config.max_retries {
            *attempts += 1;
            task.attempts = *attempts;
            info!(
                task_id = %task.id,
                quality,
                threshold,
                attempt = *attempts,
                "Review below threshold, replanning"
            );
            return PipelineState::Replanning;
        }

        *failure = Some(TriadError::QualityThresholdNotMet {
            quality,
            threshold,
            attempts: *attempts,
        });
        PipelineState::Aborted(AbortReason::QualityThresholdNotMet)
    }

    /// Dispatch one stage and wait for it, bounded by the task deadline.
    ///
    /// On success `task` is replaced by the dispatched copy; on timeout it
    /// keeps its state from before the stage.
    async fn run_stage(
        &self,
        task: &mut Task,
        role: AgentRole,
        deadline: Option<Instant>,
    ) -> Result<TaskResult> {
        let deadline_error = |task: &Task| TriadError::DeadlineExceeded {
            task_id: task.id.clone(),
            stage: role.to_string(),
        };
        if task.is_past_deadline() {
            return Err(deadline_error(&*task));
        }

        task.stage = role;
        let requirement = match role {
            AgentRole::Doer => {
                Requirement::role(role).with_capabilities(task.required_capabilities.clone())
            }
            _ => Requirement::role(role),
        };

        let staged = task.clone();
        let coordinator = &self.coordinator;
        let work = async move {
            coordinator
                .dispatch_with(staged, requirement)
                .await?
                .resolve()
                .await
        };

        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, work)
                .await
                .map_err(|_| deadline_error(&*task))??,
            None => work.await?,
        };

        let (returned, result) = outcome.into_parts();
        *task = returned;
        if let Err(e) = &result {
            error!(task_id = %task.id, stage = %role, error = %e, "Stage failed");
        }
        result
    }
}

fn abort_on(
    error: TriadError,
    reason: AbortReason,
    failure: &mut Option<TriadError>,
) -> PipelineState {
    let reason = match error {
        TriadError::DeadlineExceeded { .. } => AbortReason::DeadlineExceeded,
        _ => reason,
    };
    *failure = Some(error);
    PipelineState::Aborted(reason)
}
