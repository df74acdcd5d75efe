//! Reverse mapping from capability name to the agents advertising it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use triad_common::AgentId;

/// Capability index maintained incrementally on register and remove.
///
/// Buckets never hold stale ids: re-indexing an agent first drops every
/// entry recorded for it, and empty buckets are removed.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    buckets: BTreeMap<String, BTreeSet<AgentId>>,
    by_agent: HashMap<AgentId, BTreeSet<String>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was indexed for `agent` with `capabilities`.
    pub fn index<I, S>(&mut self, agent: AgentId, capabilities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove(&agent);

        let names: BTreeSet<String> = capabilities.into_iter().map(Into::into).collect();
        for name in &names {
            self.buckets.entry(name.clone()).or_default().insert(agent);
        }
        self.by_agent.insert(agent, names);
    }

    /// Drop every entry for `agent`. Returns the names it was indexed under.
    pub fn remove(&mut self, agent: &AgentId) -> BTreeSet<String> {
        let names = self.by_agent.remove(agent).unwrap_or_default();
        for name in &names {
            if let Some(bucket) = self.buckets.get_mut(name) {
                bucket.remove(agent);
                if bucket.is_empty() {
                    self.buckets.remove(name);
                }
            }
        }
        names
    }

    /// Agents advertising `capability`, in id order.
    pub fn agents_with(&self, capability: &str) -> Vec<AgentId> {
        self.buckets
            .get(capability)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Agents advertising every name in `required`, in id order.
    ///
    /// An empty requirement matches every indexed agent.
    pub fn agents_with_all(&self, required: &BTreeSet<String>) -> Vec<AgentId> {
        let mut names = required.iter();
        let Some(first) = names.next() else {
            let mut all: Vec<AgentId> = self.by_agent.keys().copied().collect();
            all.sort();
            return all;
        };

        let Some(seed) = self.buckets.get(first) else {
            return Vec::new();
        };
        seed.iter()
            .copied()
            .filter(|id| {
                self.by_agent
                    .get(id)
                    .is_some_and(|caps| required.is_subset(caps))
            })
            .collect()
    }

    pub fn capabilities_of(&self, agent: &AgentId) -> Option<&BTreeSet<String>> {
        self.by_agent.get(agent)
    }

    /// Whether any indexed agent covers `required`.
    pub fn can_satisfy(&self, required: &BTreeSet<String>) -> bool {
        !self.agents_with_all(required).is_empty()
    }

    pub fn capability_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.by_agent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_and_lookup() {
        let mut index = CapabilityIndex::new();
        let a = AgentId::new();
        let b = AgentId::new();
        index.index(a, ["rust", "review"]);
        index.index(b, ["rust"]);

        let mut both = vec![a, b];
        both.sort();
        assert_eq!(index.agents_with("rust"), both);
        assert_eq!(index.agents_with("review"), vec![a]);
        assert!(index.agents_with("python").is_empty());
        assert_eq!(index.agents_with_all(&set(&["rust", "review"])), vec![a]);
        assert_eq!(index.agents_with_all(&set(&[])).len(), 2);
    }

    #[test]
    fn test_reindex_drops_stale_entries() {
        let mut index = CapabilityIndex::new();
        let a = AgentId::new();
        index.index(a, ["old", "shared"]);
        index.index(a, ["shared", "new"]);

        assert!(index.agents_with("old").is_empty());
        assert_eq!(index.agents_with("new"), vec![a]);
        assert_eq!(index.bucket_count(), 2);
    }

    #[test]
    fn test_remove_drops_empty_buckets() {
        let mut index = CapabilityIndex::new();
        let a = AgentId::new();
        index.index(a, ["solo"]);

        assert_eq!(index.remove(&a), set(&["solo"]));
        assert_eq!(index.bucket_count(), 0);
        assert!(index.capabilities_of(&a).is_none());
        assert!(index.remove(&a).is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Index(usize, Vec<u8>),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..4, prop::collection::vec(0u8..5, 0..4)).prop_map(|(a, c)| Op::Index(a, c)),
            (0usize..4).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_index_matches_declared_capabilities(ops in prop::collection::vec(op(), 0..40)) {
            let agents: Vec<AgentId> = (0..4).map(|_| AgentId::new()).collect();
            let mut index = CapabilityIndex::new();
            let mut model: HashMap<AgentId, BTreeSet<String>> = HashMap::new();

            for op in ops {
                match op {
                    Op::Index(a, caps) => {
                        let names: BTreeSet<String> = caps.iter().map(|c| format!("cap{}", c)).collect();
                        index.index(agents[a], names.clone());
                        model.insert(agents[a], names);
                    }
                    Op::Remove(a) => {
                        index.remove(&agents[a]);
                        model.remove(&agents[a]);
                    }
                }
            }

            for c in 0u8..5 {
                let name = format!("cap{}", c);
                let found: BTreeSet<AgentId> = index.agents_with(&name).into_iter().collect();
                let expected: BTreeSet<AgentId> = model
                    .iter()
                    .filter(|(_, caps)| caps.contains(&name))
                    .map(|(id, _)| *id)
                    .collect();
                prop_assert_eq!(found, expected);
            }
            prop_assert!(index.capability_names().all(|n| !index.agents_with(n).is_empty()));
        }
    }
}
