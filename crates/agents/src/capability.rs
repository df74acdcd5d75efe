//! Named skills advertised by agents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use triad_common::time::now_millis;

/// A named skill with a confidence level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Last time the capability was exercised (Unix millis). Informational.
    pub last_used: u64,
}

impl Capability {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            last_used: now_millis(),
        }
    }
}

/// Capabilities keyed by name. Inserting an existing name overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    entries: BTreeMap<String, Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a capability, returning the previous entry.
    pub fn insert(&mut self, capability: Capability) -> Option<Capability> {
        self.entries.insert(capability.name.clone(), capability)
    }

    pub fn remove(&mut self, name: &str) -> Option<Capability> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// True when every name in `required` is present.
    pub fn covers<'a, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        required.into_iter().all(|name| self.contains(name))
    }

    /// Refresh `last_used` for a capability, if present.
    pub fn touch(&mut self, name: &str) {
        if let Some(cap) = self.entries.get_mut(name) {
            cap.last_used = now_millis();
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut set = CapabilitySet::new();
        for cap in iter {
            set.insert(cap);
        }
        set
    }
}

/// Descriptive profile of an agent. Informational only; routing never
/// looks at it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expertise {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl Expertise {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.skills.is_empty() && self.platforms.is_empty()
    }
}
