//! Triad host binary.
//!
//! Loads a coordinator configuration (first argument, optional), registers
//! the configured agents and runs a few sample tasks through the pipeline
//! concurrently. Outcomes are printed to stdout as JSON lines.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triad_agents::AgentDeps;
use triad_common::{LifecycleEvent, Task, TaskPayload};
use triad_coordinator::{Coordinator, CoordinatorConfig, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,triad_coordinator=debug,triad_agents=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => CoordinatorConfig::from_file(&path)?,
        None => CoordinatorConfig::with_default_agents(),
    };
    if config.agents.is_empty() {
        config.agents = CoordinatorConfig::with_default_agents().agents;
    }
    config.apply_env_overrides()?;

    let coordinator = Arc::new(Coordinator::from_config(&config, AgentDeps::default()).await?);
    let mut events = coordinator.subscribe();
    let observer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let LifecycleEvent::StepCompleted { task_id, step, .. } = &event {
                tracing::debug!(task_id = %task_id, step = step.id, action = %step.action, "Step completed");
            }
        }
    });

    let pipeline = Arc::new(Pipeline::new(Arc::clone(&coordinator), config.pipeline.clone()));
    let tasks = vec![
        Task::new("coding-1", TaskPayload::coding("Normalize user input"))
            .require("task_execution"),
        Task::new(
            "optimize-1",
            TaskPayload::optimization("fn sum(n: u64) -> u64 { (0..n).sum() }", "constant time"),
        ),
        Task::new(
            "project-1",
            TaskPayload::Project {
                description: "Inventory service".into(),
                requirements: vec!["REST API".into()],
                output_path: "out/inventory".into(),
                framework: "axum".into(),
            },
        )
        .with_priority(1),
    ];

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run(task).await })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await??;
        let summary = serde_json::json!({
            "task_id": outcome.task.id,
            "state": outcome.state,
            "attempts": outcome.attempts,
            "status": outcome.task.status,
            "review": outcome.task.review,
            "failure": outcome.task.failure,
        });
        println!("{}", summary);
    }

    coordinator.shutdown().await?;
    observer.abort();
    tracing::info!("Done");
    Ok(())
}
