//! Capability Registry
//!
//! Tools and skills the runtime can call, organized by category path with
//! usage statistics. Confidence lives in the Bayesian store under the same
//! capability name; the registry consults it for on-demand selection but
//! never writes it (single-writer ownership).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::confidence::ConfidenceStore;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventPayload, Topic};

// ============================================================================
// KINDS AND PRIORITIES
// ============================================================================

/// Where a capability comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    /// Built into the runtime
    SystemTool,
    /// Registered by the embedding application
    RegisteredSkill,
    /// Provided by an external capability server
    ExternalTool,
}

impl CapabilityKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::SystemTool => "system-tool",
            CapabilityKind::RegisteredSkill => "registered-skill",
            CapabilityKind::ExternalTool => "external-tool",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When a capability should be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPriority {
    /// Always loaded, required for core operation
    Critical,
    /// Loaded at startup
    High,
    /// Loaded when the category is first touched
    Medium,
    /// Loaded lazily
    Low,
    /// Loaded only when explicitly selected
    OnDemand,
}

// ============================================================================
// CAPABILITY
// ============================================================================

/// Usage statistics for one capability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    /// Total invocations
    pub calls: u64,
    /// Successful invocations
    pub successes: u64,
    /// Failed invocations
    pub failures: u64,
    /// Sum of observed latencies
    pub total_latency_ms: u64,
}

impl UsageStats {
    /// Mean latency; 0 before the first call.
    pub fn average_latency_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.calls as f64
        }
    }
}

/// A registered capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Unique name; also the Bayesian store key
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
    /// Short description
    pub description: String,
    /// Capability kind
    pub kind: CapabilityKind,
    /// Category path, slash-separated (e.g. "io/network")
    pub category: String,
    /// Tags
    pub tags: Vec<String>,
    /// Source origin (crate, plugin id, server address)
    pub origin: String,
    /// Load priority
    pub load_priority: LoadPriority,
    /// Usage statistics
    pub stats: UsageStats,
}

impl Capability {
    /// Minimal capability with sane defaults.
    pub fn new(name: impl Into<String>, kind: CapabilityKind, category: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            kind,
            category: category.into(),
            tags: vec![],
            origin: "embedded".to_string(),
            load_priority: LoadPriority::Medium,
            stats: UsageStats::default(),
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// The capability registry.
#[derive(Debug)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Capability>,
    bus: EventBus,
}

impl CapabilityRegistry {
    /// Empty registry.
    pub fn new(bus: EventBus) -> Self {
        Self {
            capabilities: HashMap::new(),
            bus,
        }
    }

    /// Register a capability. Duplicate names are rejected.
    pub fn register(&mut self, capability: Capability) -> Result<()> {
        if self.capabilities.contains_key(&capability.name) {
            return Err(CoreError::Validation(format!(
                "capability '{}' is already registered",
                capability.name
            )));
        }
        tracing::info!(
            capability = %capability.name,
            kind = %capability.kind,
            category = %capability.category,
            "capability registered"
        );
        self.capabilities
            .insert(capability.name.clone(), capability);
        Ok(())
    }

    /// Remove a capability. Returns whether it existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.capabilities.remove(name).is_some()
    }

    /// Look up one capability.
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// All category paths, deduplicated and sorted.
    pub fn categories(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .capabilities
            .values()
            .map(|c| c.category.clone())
            .collect();
        set.into_iter().collect()
    }

    /// Capabilities under a category path prefix, sorted by load priority.
    pub fn list_by_category(&self, prefix: &str) -> Vec<&Capability> {
        let mut matches: Vec<&Capability> = self
            .capabilities
            .values()
            .filter(|c| c.category == prefix || c.category.starts_with(&format!("{prefix}/")))
            .collect();
        matches.sort_by(|a, b| {
            a.load_priority
                .cmp(&b.load_priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        matches
    }

    /// Record one use: update stats and publish `capability:used`. The
    /// caller updates the Bayesian store separately (it is a distinct
    /// component with its own ownership).
    pub fn record_use(&mut self, name: &str, success: bool, latency_ms: u64) -> Result<()> {
        let capability = self
            .capabilities
            .get_mut(name)
            .ok_or_else(|| CoreError::Validation(format!("unknown capability '{name}'")))?;

        capability.stats.calls += 1;
        if success {
            capability.stats.successes += 1;
        } else {
            capability.stats.failures += 1;
        }
        capability.stats.total_latency_ms += latency_ms;

        self.bus.publish(
            Topic::CapabilityUsed,
            EventPayload::Capability {
                name: name.to_string(),
                success,
                latency_ms,
            },
        );
        Ok(())
    }

    /// On-demand selection: the best capability (by UCB) among those
    /// matching the category prefix and all given tags.
    pub fn select(
        &self,
        category_prefix: Option<&str>,
        tags: &[&str],
        confidence: &ConfidenceStore,
    ) -> Option<String> {
        let matching: Vec<&str> = self
            .capabilities
            .values()
            .filter(|c| {
                category_prefix.is_none_or(|p| {
                    c.category == p || c.category.starts_with(&format!("{p}/"))
                })
            })
            .filter(|c| tags.iter().all(|t| c.tags.iter().any(|ct| ct == t)))
            .map(|c| c.name.as_str())
            .collect();
        confidence.best_among(&matching)
    }
}
