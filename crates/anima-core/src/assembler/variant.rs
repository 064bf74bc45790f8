//! Prompt Variants and A/B Evaluation
//!
//! Each namespace (e.g. "system-prompt", "self-description") carries at
//! most one active variant; candidates accumulate performance until a
//! two-proportion Z-test separates them. Retiring an active variant always
//! installs a successor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventPayload, Topic};

// ============================================================================
// VARIANT
// ============================================================================

/// Lifecycle state of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantState {
    /// Collecting samples, not the primary
    Candidate,
    /// The one variant rendered for its namespace
    Active,
    /// Lost an A/B evaluation or was retired manually
    Retired,
}

/// Accumulated performance of one variant.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantPerformance {
    /// Recorded samples
    pub samples: u64,
    /// Successful samples
    pub successes: u64,
    /// Sum of token costs
    pub total_tokens: u64,
    /// Sum of latencies
    pub total_latency_ms: u64,
}

impl VariantPerformance {
    /// Success rate; 0 before the first sample.
    pub fn success_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.successes as f64 / self.samples as f64
        }
    }

    /// Mean token cost.
    pub fn average_tokens(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.samples as f64
        }
    }

    /// Mean latency.
    pub fn average_latency_ms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.samples as f64
        }
    }
}

/// A named content alternative for a prompt slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVariant {
    /// Unique identifier
    pub id: String,
    /// Variant name, also the Bayesian store key
    pub name: String,
    /// Namespace the variant competes in
    pub namespace: String,
    /// Content template
    pub template: String,
    /// Accumulated performance
    pub performance: VariantPerformance,
    /// Lifecycle state
    pub state: VariantState,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// A/B CONFIG AND OUTCOME
// ============================================================================

/// Configuration for A/B evaluation.
#[derive(Debug, Clone)]
pub struct AbConfig {
    /// Samples each variant needs before comparison
    pub min_samples_for_comparison: u64,
    /// Z-test confidence level (0.95 -> |z| > 1.96)
    pub confidence_threshold: f64,
    /// Required absolute success-rate improvement
    pub min_improvement: f64,
}

impl Default for AbConfig {
    fn default() -> Self {
        Self {
            min_samples_for_comparison: 10,
            confidence_threshold: 0.95,
            min_improvement: 0.05,
        }
    }
}

fn z_for_confidence(confidence: f64) -> f64 {
    if confidence >= 0.99 {
        2.576
    } else if confidence >= 0.95 {
        1.96
    } else {
        1.645
    }
}

/// Two-proportion pooled Z statistic.
pub fn two_proportion_z(successes_a: u64, n_a: u64, successes_b: u64, n_b: u64) -> f64 {
    if n_a == 0 || n_b == 0 {
        return 0.0;
    }
    let p_a = successes_a as f64 / n_a as f64;
    let p_b = successes_b as f64 / n_b as f64;
    let pooled = (successes_a + successes_b) as f64 / (n_a + n_b) as f64;
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a as f64 + 1.0 / n_b as f64)).sqrt();
    if se == 0.0 {
        return 0.0;
    }
    (p_a - p_b) / se
}

/// Result of one A/B evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbOutcome {
    /// Namespace evaluated
    pub namespace: String,
    /// Winner (now active)
    pub winner: String,
    /// Loser (now retired)
    pub retired: String,
    /// Z statistic observed
    pub z: f64,
}

// ============================================================================
// MANAGER
// ============================================================================

/// Owns all prompt variants across namespaces.
#[derive(Debug)]
pub struct VariantManager {
    variants: Vec<PromptVariant>,
    config: AbConfig,
    bus: EventBus,
}

impl VariantManager {
    /// Empty manager.
    pub fn new(config: AbConfig, bus: EventBus) -> Self {
        Self {
            variants: vec![],
            config,
            bus,
        }
    }

    /// Hot-reloadable: minimum samples for comparison.
    pub fn set_min_samples(&mut self, min: u64) {
        self.config.min_samples_for_comparison = min.max(1);
    }

    /// Add a candidate variant. Names must be unique within a namespace.
    pub fn add(&mut self, namespace: &str, name: &str, template: &str) -> Result<()> {
        if self
            .variants
            .iter()
            .any(|v| v.namespace == namespace && v.name == name)
        {
            return Err(CoreError::Validation(format!(
                "variant '{name}' already exists in namespace '{namespace}'"
            )));
        }
        self.variants.push(PromptVariant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            template: template.to_string(),
            performance: VariantPerformance::default(),
            state: VariantState::Candidate,
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Activate a variant; a previously active variant in the namespace
    /// drops back to candidate.
    pub fn activate(&mut self, namespace: &str, name: &str) -> Result<()> {
        if !self
            .variants
            .iter()
            .any(|v| v.namespace == namespace && v.name == name)
        {
            return Err(CoreError::Validation(format!(
                "unknown variant '{name}' in namespace '{namespace}'"
            )));
        }
        for variant in &mut self.variants {
            if variant.namespace != namespace {
                continue;
            }
            if variant.name == name {
                variant.state = VariantState::Active;
            } else if variant.state == VariantState::Active {
                variant.state = VariantState::Candidate;
            }
        }
        self.bus.publish(
            Topic::VariantActivated,
            EventPayload::Variant {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
        );
        Ok(())
    }

    /// Retire a variant. Retiring the active variant requires a successor,
    /// which is activated in its place.
    pub fn retire(&mut self, namespace: &str, name: &str, successor: Option<&str>) -> Result<()> {
        let is_active = self
            .variants
            .iter()
            .any(|v| v.namespace == namespace && v.name == name && v.state == VariantState::Active);

        if is_active {
            let successor = successor.ok_or_else(|| {
                CoreError::Validation(format!(
                    "retiring active variant '{name}' requires a successor"
                ))
            })?;
            self.activate(namespace, successor)?;
        }

        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.namespace == namespace && v.name == name)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "unknown variant '{name}' in namespace '{namespace}'"
                ))
            })?;
        variant.state = VariantState::Retired;

        self.bus.publish(
            Topic::VariantRetired,
            EventPayload::Variant {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
        );
        Ok(())
    }

    /// The active variant for a namespace, if any.
    pub fn active(&self, namespace: &str) -> Option<&PromptVariant> {
        self.variants
            .iter()
            .find(|v| v.namespace == namespace && v.state == VariantState::Active)
    }

    /// All variants (snapshot export).
    pub fn export(&self) -> Vec<PromptVariant> {
        self.variants.clone()
    }

    /// Restore variants from a snapshot, enforcing at most one active per
    /// namespace (extras drop to candidate).
    pub fn restore(&mut self, variants: Vec<PromptVariant>) {
        self.variants = variants;
        let mut seen_active: Vec<String> = vec![];
        for variant in &mut self.variants {
            if variant.state == VariantState::Active {
                if seen_active.contains(&variant.namespace) {
                    variant.state = VariantState::Candidate;
                } else {
                    seen_active.push(variant.namespace.clone());
                }
            }
        }
    }

    /// Record a performance sample against the namespace's active variant.
    /// Returns the variant name so the caller can mirror the observation
    /// into the Bayesian store.
    pub fn record(
        &mut self,
        namespace: &str,
        success: bool,
        latency_ms: u64,
        tokens: u64,
    ) -> Option<String> {
        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.namespace == namespace && v.state == VariantState::Active)?;
        variant.performance.samples += 1;
        if success {
            variant.performance.successes += 1;
        }
        variant.performance.total_latency_ms += latency_ms;
        variant.performance.total_tokens += tokens;
        Some(variant.name.clone())
    }

    /// Evaluate the namespace: if the active variant and the best-sampled
    /// candidate both have enough samples and the Z-test separates them with
    /// more than the minimum improvement, retire the loser.
    pub fn evaluate(&mut self, namespace: &str) -> Option<AbOutcome> {
        let min = self.config.min_samples_for_comparison;
        let active = self.active(namespace)?.clone();
        let challenger = self
            .variants
            .iter()
            .filter(|v| {
                v.namespace == namespace
                    && v.state == VariantState::Candidate
                    && v.performance.samples >= min
            })
            .max_by_key(|v| v.performance.samples)?
            .clone();
        if active.performance.samples < min {
            return None;
        }

        let z = two_proportion_z(
            challenger.performance.successes,
            challenger.performance.samples,
            active.performance.successes,
            active.performance.samples,
        );
        let improvement =
            (challenger.performance.success_rate() - active.performance.success_rate()).abs();
        if z.abs() <= z_for_confidence(self.config.confidence_threshold)
            || improvement <= self.config.min_improvement
        {
            return None;
        }

        let (winner, loser) = if z > 0.0 {
            (challenger.name.clone(), active.name.clone())
        } else {
            (active.name.clone(), challenger.name.clone())
        };

        // The winner is the successor; satisfies the retire-active invariant.
        self.retire(namespace, &loser, Some(&winner)).ok()?;
        tracing::info!(
            namespace,
            winner = %winner,
            retired = %loser,
            z,
            "A/B evaluation resolved"
        );
        Some(AbOutcome {
            namespace: namespace.to_string(),
            winner,
            retired: loser,
            z,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> VariantManager {
        VariantManager::new(AbConfig::default(), EventBus::default())
    }

    fn feed(manager: &mut VariantManager, namespace: &str, successes: u64, failures: u64) {
        for _ in 0..successes {
            manager.record(namespace, true, 100, 500);
        }
        for _ in 0..failures {
            manager.record(namespace, false, 100, 500);
        }
    }

    #[test]
    fn test_at_most_one_active_per_namespace() {
        let mut m = manager();
        m.add("system-prompt", "a", "template a").unwrap();
        m.add("system-prompt", "b", "template b").unwrap();
        m.activate("system-prompt", "a").unwrap();
        m.activate("system-prompt", "b").unwrap();

        assert_eq!(m.active("system-prompt").unwrap().name, "b");
        let actives = m
            .export()
            .into_iter()
            .filter(|v| v.state == VariantState::Active)
            .count();
        assert_eq!(actives, 1);
    }

    #[test]
    fn test_retire_active_requires_successor() {
        let mut m = manager();
        m.add("system-prompt", "a", "ta").unwrap();
        m.add("system-prompt", "b", "tb").unwrap();
        m.activate("system-prompt", "a").unwrap();

        assert!(m.retire("system-prompt", "a", None).is_err());
        m.retire("system-prompt", "a", Some("b")).unwrap();
        assert_eq!(m.active("system-prompt").unwrap().name, "b");
    }

    #[test]
    fn test_record_routes_to_active() {
        let mut m = manager();
        m.add("self-description", "base", "t").unwrap();
        m.activate("self-description", "base").unwrap();

        let name = m.record("self-description", true, 120, 800).unwrap();
        assert_eq!(name, "base");
        let v = m.active("self-description").unwrap();
        assert_eq!(v.performance.samples, 1);
        assert_eq!(v.performance.average_tokens(), 800.0);
        assert_eq!(v.performance.average_latency_ms(), 120.0);
    }

    #[test]
    fn test_evaluation_retires_clear_loser() {
        let mut m = manager();
        m.add("system-prompt", "weak", "tw").unwrap();
        m.add("system-prompt", "strong", "ts").unwrap();
        m.activate("system-prompt", "weak").unwrap();

        // Active "weak" performs poorly.
        feed(&mut m, "system-prompt", 8, 22);
        // Swap activation so the challenger accumulates its own samples.
        m.activate("system-prompt", "strong").unwrap();
        feed(&mut m, "system-prompt", 28, 2);
        // Put "weak" back on duty; "strong" is now the sampled candidate.
        m.activate("system-prompt", "weak").unwrap();

        let outcome = m.evaluate("system-prompt").expect("resolved");
        assert_eq!(outcome.winner, "strong");
        assert_eq!(outcome.retired, "weak");
        assert_eq!(m.active("system-prompt").unwrap().name, "strong");
    }

    #[test]
    fn test_evaluation_waits_for_samples() {
        let mut m = manager();
        m.add("system-prompt", "a", "ta").unwrap();
        m.add("system-prompt", "b", "tb").unwrap();
        m.activate("system-prompt", "a").unwrap();
        feed(&mut m, "system-prompt", 3, 0);
        assert!(m.evaluate("system-prompt").is_none());
    }

    #[test]
    fn test_evaluation_keeps_close_variants() {
        let mut m = manager();
        m.add("system-prompt", "a", "ta").unwrap();
        m.add("system-prompt", "b", "tb").unwrap();
        m.activate("system-prompt", "a").unwrap();
        feed(&mut m, "system-prompt", 15, 5);
        m.activate("system-prompt", "b").unwrap();
        feed(&mut m, "system-prompt", 14, 6);
        m.activate("system-prompt", "a").unwrap();

        assert!(m.evaluate("system-prompt").is_none());
    }

    #[test]
    fn test_two_proportion_z_symmetry() {
        let z_ab = two_proportion_z(90, 100, 50, 100);
        let z_ba = two_proportion_z(50, 100, 90, 100);
        assert!(z_ab > 0.0);
        assert!((z_ab + z_ba).abs() < 1e-12);
    }

    #[test]
    fn test_restore_enforces_single_active() {
        let mut m = manager();
        m.add("ns", "a", "ta").unwrap();
        m.add("ns", "b", "tb").unwrap();
        let mut exported = m.export();
        for v in &mut exported {
            v.state = VariantState::Active;
        }
        m.restore(exported);
        let actives = m
            .export()
            .into_iter()
            .filter(|v| v.state == VariantState::Active)
            .count();
        assert_eq!(actives, 1);
    }
}
