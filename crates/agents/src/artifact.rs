//! Artifact production seam for doers.
//!
//! Doers hand steps that imply material output to an [`ArtifactProducer`].
//! What the producer writes (source text, directory trees, manifests) is
//! opaque to the pipeline; only `success` and `message`, plus any inline
//! `content`, are inspected downstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use triad_common::{Result, Step, Task, TaskPayload};

/// Input for one production call.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRequest<'a> {
    pub task: &'a Task,
    pub step: &'a Step,
}

/// What a producer reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub success: bool,

    /// Where the artifact lives (path, URI, or an inline marker)
    pub artifact_ref: String,

    pub message: String,

    /// Inline textual output, when the artifact is small enough to carry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Artifact {
    pub fn inline(artifact_ref: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            success: true,
            artifact_ref: artifact_ref.into(),
            message: "Artifact produced".into(),
            content: Some(content.into()),
        }
    }

    pub fn reference(artifact_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            artifact_ref: artifact_ref.into(),
            message: message.into(),
            content: None,
        }
    }

    pub fn failed(artifact_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            artifact_ref: artifact_ref.into(),
            message: message.into(),
            content: None,
        }
    }
}

/// External collaborator that materializes a step's output.
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    async fn produce(&self, request: ArtifactRequest<'_>) -> Result<Artifact>;
}

/// Deterministic in-memory producer emitting scaffold fragments.
///
/// Coding fragments include input validation, error propagation and an
/// embedded test; optimization fragments replace iteration with a
/// closed-form expression. Project actions yield path references under the
/// task's output directory without touching the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateProducer;

impl TemplateProducer {
    fn fragment(task: &Task, action: &str) -> Option<String> {
        let fragment = match action {
            "implement_code" => format!(
                concat!(
                    "/// {}\n",
                    "pub fn run(input: &str) -> Result<String, TaskError> {{\n",
                    "    if input.trim().is_empty() {{\n",
                    "        return Err(TaskError::EmptyInput);\n",
                    "    }}\n",
                    "    Ok(input.trim().to_string())\n",
                    "}}\n",
                ),
                task.payload.summary()
            ),
            "add_tests" | "write_tests" => concat!(
                "\n#[cfg(test)]\nmod tests {\n    use super::*;\n\n",
                "    #[test]\n    fn rejects_empty_input() {\n",
                "        assert!(run(\"  \").is_err());\n",
                "        assert_eq!(run(\" ok \"), Ok(\"ok\".to_string()));\n",
                "    }\n}\n",
            )
            .to_string(),
            "implement_optimizations" => concat!(
                "// closed-form sum of 0..n: O(1) instead of a loop\n",
                "pub fn sum_below(n: u64) -> u64 {\n",
                "    n * (n - 1) / 2\n",
                "}\n",
            )
            .to_string(),
            _ => return None,
        };
        Some(fragment)
    }
}

#[async_trait]
impl ArtifactProducer for TemplateProducer {
    async fn produce(&self, request: ArtifactRequest<'_>) -> Result<Artifact> {
        let ArtifactRequest { task, step } = request;
        debug!(task_id = %task.id, step = step.id, action = %step.action, "Producing artifact");

        if let TaskPayload::Project { output_path, .. } = &task.payload {
            let target = match step.action.as_str() {
                "create_structure" => format!("{}/", output_path.trim_end_matches('/')),
                "write_manifests" => format!("{}/Cargo.toml", output_path.trim_end_matches('/')),
                "generate_sources" => format!("{}/src/lib.rs", output_path.trim_end_matches('/')),
                "write_docs" => format!("{}/README.md", output_path.trim_end_matches('/')),
                other => format!("{}/{}", output_path.trim_end_matches('/'), other),
            };
            return Ok(Artifact::reference(
                target,
                format!("Prepared {} for {}", step.action, task.id),
            ));
        }

        let artifact_ref = format!("inline:{}:{}", task.id, step.id);
        Ok(match Self::fragment(task, &step.action) {
            Some(content) => Artifact::inline(artifact_ref, content),
            None => Artifact::reference(artifact_ref, format!("No template for {}", step.action)),
        })
    }
}

/// Mock producer for testing: returns queued results in order.
#[cfg(test)]
pub struct MockProducer {
    responses: parking_lot::Mutex<std::collections::VecDeque<Result<Artifact>>>,
}

#[cfg(test)]
impl MockProducer {
    pub fn new(responses: Vec<Result<Artifact>>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses.into()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ArtifactProducer for MockProducer {
    async fn produce(&self, request: ArtifactRequest<'_>) -> Result<Artifact> {
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Ok(Artifact::failed(
                format!("mock:{}", request.step.id),
                "No more mock responses",
            ))
        })
    }
}
