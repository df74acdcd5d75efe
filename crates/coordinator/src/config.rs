//! Configuration for the coordinator and pipeline.
//!
//! Loaded from TOML. Every section is optional and falls back to defaults;
//! `TRIAD_ACCEPTANCE_THRESHOLD` and `TRIAD_MAX_RETRIES` override the
//! pipeline section.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};
use triad_agents::{AgentConfig, ReviewRules};
use triad_common::event::DEFAULT_EVENT_CAPACITY;
use triad_common::AgentRole;

pub const ENV_ACCEPTANCE_THRESHOLD: &str = "TRIAD_ACCEPTANCE_THRESHOLD";
pub const ENV_MAX_RETRIES: &str = "TRIAD_MAX_RETRIES";

/// Main coordinator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub events: EventsConfig,

    /// Agents registered at startup
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Reviewer scoring tables
    #[serde(default)]
    pub review: ReviewRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum review quality for a task to finish
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,

    /// Replanning cycles allowed before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_acceptance_threshold() -> f64 {
    0.8
}

fn default_max_retries() -> u32 {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer per event bus
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl CoordinatorConfig {
    /// One agent per role with default capabilities.
    pub fn with_default_agents() -> Self {
        Self {
            agents: vec![
                AgentConfig::new(AgentRole::Planner, "Planner"),
                AgentConfig::new(AgentRole::Doer, "Doer"),
                AgentConfig::new(AgentRole::Reviewer, "Reviewer"),
            ],
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        debug!(path = %path.display(), agents = config.agents.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        config.warn_missing_roles();
        Ok(config)
    }

    /// Apply `TRIAD_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, then re-validate.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_ACCEPTANCE_THRESHOLD) {
            self.pipeline.acceptance_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a number: '{}'", ENV_ACCEPTANCE_THRESHOLD, raw))?;
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            self.pipeline.max_retries = raw
                .trim()
                .parse()
                .with_context(|| format!("{} is not a count: '{}'", ENV_MAX_RETRIES, raw))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.pipeline.acceptance_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("acceptance_threshold must be within [0, 1], got {}", threshold);
        }
        if self.events.capacity == 0 {
            anyhow::bail!("events.capacity must be at least 1");
        }
        if let Some(agent) = self.agents.iter().find(|a| a.name.trim().is_empty()) {
            anyhow::bail!("agent with role '{}' has an empty name", agent.role);
        }
        Ok(())
    }

    fn warn_missing_roles(&self) {
        if self.agents.is_empty() {
            return;
        }
        let present: BTreeSet<AgentRole> = self.agents.iter().map(|a| a.role).collect();
        for role in [AgentRole::Planner, AgentRole::Doer, AgentRole::Reviewer] {
            if !present.contains(&role) {
                warn!(
                    role = %role,
                    "No {} configured; tasks reaching that stage will queue",
                    role
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CoordinatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.pipeline.acceptance_threshold, 0.8);
        assert_eq!(config.pipeline.max_retries, 1);
        assert_eq!(config.events.capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.agents.is_empty());
        assert_eq!(config.review, ReviewRules::default());
    }

    #[test]
    fn test_full_config() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            [pipeline]
            acceptance_threshold = 0.9
            max_retries = 3

            [events]
            capacity = 16

            [[agents]]
            role = "planner"
            name = "Planner"

            [[agents]]
            role = "doer"
            name = "Rust doer"
            think_time_ms = 5
            capabilities = [{ name = "rust", confidence = 0.7 }]
            expertise = { domains = ["backend"], skills = ["rust"] }

            [review]
            failed_quality_cap = 0.3

            [review.coding]
            base_quality = 1.0
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.events.capacity, 16);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[1].capabilities[0].name, "rust");
        assert_eq!(config.agents[1].think_time_ms, 5);
        assert_eq!(config.agents[1].expertise.skills, vec!["rust"]);
        assert!(config.agents[1].expertise.platforms.is_empty());
        assert_eq!(config.review.failed_quality_cap, 0.3);
        assert_eq!(config.review.coding.base_quality, 1.0);
        assert_eq!(config.review.coding.safeguards.len(), 3);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = CoordinatorConfig::from_toml_str("[pipeline]\nacceptance_threshold = 1.5\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = CoordinatorConfig::default();
        let env: HashMap<&str, &str> = [
            (ENV_ACCEPTANCE_THRESHOLD, "0.65"),
            (ENV_MAX_RETRIES, " 4 "),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.pipeline.acceptance_threshold, 0.65);
        assert_eq!(config.pipeline.max_retries, 4);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let mut config = CoordinatorConfig::default();
        assert!(config
            .apply_overrides_from(|key| (key == ENV_MAX_RETRIES).then(|| "-1".to_string()))
            .is_err());
        assert!(config
            .apply_overrides_from(|key| (key == ENV_ACCEPTANCE_THRESHOLD).then(|| "2".to_string()))
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nmax_retries = 2").unwrap();

        let config = CoordinatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.max_retries, 2);

        assert!(CoordinatorConfig::from_file("/nonexistent/triad.toml").is_err());
    }

    #[test]
    fn test_default_agents_cover_every_role() {
        let config = CoordinatorConfig::with_default_agents();
        let roles: Vec<AgentRole> = config.agents.iter().map(|a| a.role).collect();
        assert_eq!(roles, vec![AgentRole::Planner, AgentRole::Doer, AgentRole::Reviewer]);
        assert!(config.validate().is_ok());
    }
}
