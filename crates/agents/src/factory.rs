//! Build agents from configuration.

use crate::artifact::{ArtifactProducer, TemplateProducer};
use crate::execution::DoerAgent;
use crate::planning::PlannerAgent;
use crate::review::{ReviewRules, ReviewerAgent};
use crate::traits::{Agent, AgentConfig};
use std::sync::Arc;
use triad_common::{AgentRole, EventBus};

/// Collaborators shared by the agents a factory creates.
#[derive(Clone)]
pub struct AgentDeps {
    pub events: EventBus,
    pub producer: Arc<dyn ArtifactProducer>,
    pub review_rules: ReviewRules,
}

impl Default for AgentDeps {
    fn default() -> Self {
        Self {
            events: EventBus::default(),
            producer: Arc::new(TemplateProducer),
            review_rules: ReviewRules::default(),
        }
    }
}

impl AgentDeps {
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_producer(mut self, producer: Arc<dyn ArtifactProducer>) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_review_rules(mut self, rules: ReviewRules) -> Self {
        self.review_rules = rules;
        self
    }
}

/// Create the agent variant selected by `config.role`.
pub fn create_agent(config: &AgentConfig, deps: &AgentDeps) -> Arc<dyn Agent> {
    match config.role {
        AgentRole::Planner => Arc::new(PlannerAgent::new(config, deps.events.clone())),
        AgentRole::Doer => Arc::new(DoerAgent::new(
            config,
            deps.events.clone(),
            Arc::clone(&deps.producer),
        )),
        AgentRole::Reviewer => Arc::new(ReviewerAgent::new(
            config,
            deps.events.clone(),
            deps.review_rules.clone(),
        )),
    }
}
