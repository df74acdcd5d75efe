//! Deterministic agent selection.
//!
//! Candidates are ranked by reputation (higher first), then success rate
//! (higher first), then average response time (lower first), then agent id
//! (lower first). The order is total, so a fixed set of metrics snapshots
//! always yields the same winner.

use std::cmp::Ordering;
use triad_agents::AgentMetrics;
use triad_common::AgentId;

/// A metrics snapshot taken for one candidate at selection time.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: AgentId,
    pub metrics: AgentMetrics,
}

impl Candidate {
    pub fn new(id: AgentId, metrics: AgentMetrics) -> Self {
        Self { id, metrics }
    }
}

/// `Less` means `a` is the better candidate.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.metrics
        .reputation_score
        .total_cmp(&a.metrics.reputation_score)
        .then_with(|| b.metrics.success_rate.total_cmp(&a.metrics.success_rate))
        .then_with(|| {
            a.metrics
                .avg_response_time_ms
                .total_cmp(&b.metrics.avg_response_time_ms)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Pick the single best candidate, if any.
pub fn select_best<I>(candidates: I) -> Option<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    candidates.into_iter().min_by(compare)
}

/// All candidates in preference order.
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(compare);
    candidates
}
