//! Bayesian Confidence Store
//!
//! One Beta(α, β) distribution per capability name. The mean is the
//! capability's confidence, the variance its uncertainty, and an upper
//! confidence bound (UCB) drives explore/exploit selection. Smoothing keeps
//! α ≥ 1 and β ≥ 1 at all times, including after deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default exploration constant for UCB.
pub const DEFAULT_UCB_C: f64 = 2.0;

/// UCB assigned to capabilities with no recorded history, so unknowns
/// dominate poorly-performing known capabilities.
pub const UNKNOWN_UCB: f64 = 0.8;

/// Minimum samples before `should_use` trusts the posterior.
pub const DEFAULT_MIN_SAMPLES: u64 = 5;

// ============================================================================
// BETA DISTRIBUTION
// ============================================================================

/// Beta(α, β) with α, β ≥ 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaDistribution {
    /// Success shape parameter (≥ 1)
    pub alpha: f64,
    /// Failure shape parameter (≥ 1)
    pub beta: f64,
}

impl Default for BetaDistribution {
    fn default() -> Self {
        Self::uniform()
    }
}

impl BetaDistribution {
    /// The uniform prior Beta(1, 1).
    pub fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Construct with clamping to the smoothing floor.
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha: alpha.max(1.0),
            beta: beta.max(1.0),
        }
    }

    /// Seed from historic counts: Beta(max(1, s), max(1, f)).
    pub fn from_counts(successes: u64, failures: u64) -> Self {
        Self::new(successes as f64, failures as f64)
    }

    /// Record one observation.
    pub fn observe(&mut self, success: bool) {
        if success {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }

    /// Posterior mean α/(α+β).
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Posterior variance αβ/((α+β)²(α+β+1)).
    pub fn variance(&self) -> f64 {
        let n = self.alpha + self.beta;
        (self.alpha * self.beta) / (n * n * (n + 1.0))
    }

    /// Standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Upper confidence bound: mean + c·√variance.
    pub fn ucb(&self, c: f64) -> f64 {
        self.mean() + c * self.std_dev()
    }

    /// Observations beyond the uniform prior.
    pub fn observations(&self) -> f64 {
        (self.alpha - 1.0) + (self.beta - 1.0)
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

/// Outcome of comparing two capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// The first capability is better
    A,
    /// The second capability is better
    B,
    /// The posteriors overlap too much to call
    Uncertain,
}

// ============================================================================
// STORE
// ============================================================================

/// Per-capability tracked state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceEntry {
    /// Posterior distribution
    pub dist: BetaDistribution,
    /// Total observations recorded through the store
    pub total_count: u64,
    /// Last update time
    pub last_updated: DateTime<Utc>,
}

/// Assembler-facing summary of the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceOverview {
    /// Mean of all capability confidences (0.5 when empty)
    pub average_confidence: f64,
    /// Mean of all capability uncertainties
    pub overall_uncertainty: f64,
    /// (name, confidence) at or above the threshold, sorted descending
    pub strong: Vec<(String, f64)>,
    /// (name, confidence) below the threshold, sorted ascending
    pub weak: Vec<(String, f64)>,
    /// Names with confidence < 0.4 and enough samples to mean it
    pub high_risk: Vec<String>,
}

/// Bayesian confidence store keyed by capability name.
#[derive(Debug, Default)]
pub struct ConfidenceStore {
    entries: HashMap<String, ConfidenceEntry>,
}

impl ConfidenceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a capability from historic counts. Overwrites any existing entry.
    pub fn seed(&mut self, name: &str, successes: u64, failures: u64) {
        self.entries.insert(
            name.to_string(),
            ConfidenceEntry {
                dist: BetaDistribution::from_counts(successes, failures),
                total_count: successes + failures,
                last_updated: Utc::now(),
            },
        );
    }

    fn entry_mut(&mut self, name: &str) -> &mut ConfidenceEntry {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| ConfidenceEntry {
                dist: BetaDistribution::uniform(),
                total_count: 0,
                last_updated: Utc::now(),
            })
    }

    /// Record one observation.
    pub fn update(&mut self, name: &str, success: bool) {
        let entry = self.entry_mut(name);
        entry.dist.observe(success);
        entry.total_count += 1;
        entry.last_updated = Utc::now();
        tracing::debug!(
            capability = name,
            success,
            confidence = entry.dist.mean(),
            "confidence updated"
        );
    }

    /// Record a batch of observations.
    pub fn update_batch(&mut self, name: &str, results: &[bool]) {
        let entry = self.entry_mut(name);
        for &success in results {
            entry.dist.observe(success);
        }
        entry.total_count += results.len() as u64;
        entry.last_updated = Utc::now();
    }

    /// Posterior mean; unknown capabilities sit at the uniform prior (0.5).
    pub fn confidence(&self, name: &str) -> f64 {
        self.entries
            .get(name)
            .map(|e| e.dist.mean())
            .unwrap_or_else(|| BetaDistribution::uniform().mean())
    }

    /// Posterior variance.
    pub fn uncertainty(&self, name: &str) -> f64 {
        self.entries
            .get(name)
            .map(|e| e.dist.variance())
            .unwrap_or_else(|| BetaDistribution::uniform().variance())
    }

    /// Total observations recorded for a capability.
    pub fn total_count(&self, name: &str) -> u64 {
        self.entries.get(name).map(|e| e.total_count).unwrap_or(0)
    }

    /// Whether the capability should be used.
    ///
    /// Below `min_samples` the store always says yes (explore); after that
    /// the posterior mean must clear the threshold.
    pub fn should_use(&self, name: &str, threshold: f64, min_samples: u64) -> bool {
        if self.total_count(name) < min_samples {
            return true;
        }
        self.confidence(name) >= threshold
    }

    /// Upper confidence bound for one capability.
    pub fn ucb(&self, name: &str, c: f64) -> f64 {
        match self.entries.get(name) {
            Some(e) if e.total_count > 0 => e.dist.ucb(c),
            _ => UNKNOWN_UCB,
        }
    }

    /// Argmax of UCB across the given names. Empty input returns `None`;
    /// unknown capabilities carry [`UNKNOWN_UCB`] so they outrank known
    /// poor performers.
    pub fn best_among(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .map(|n| (*n, self.ucb(n, DEFAULT_UCB_C)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(n, _)| n.to_string())
    }

    /// Compare two capabilities by posterior overlap.
    ///
    /// Returns `Uncertain` when the means are closer than
    /// `0.2 · (σ_a + σ_b) / 2`, otherwise the higher mean wins.
    pub fn compare(&self, a: &str, b: &str) -> Comparison {
        let (mean_a, sd_a) = match self.entries.get(a) {
            Some(e) => (e.dist.mean(), e.dist.std_dev()),
            None => (0.5, BetaDistribution::uniform().std_dev()),
        };
        let (mean_b, sd_b) = match self.entries.get(b) {
            Some(e) => (e.dist.mean(), e.dist.std_dev()),
            None => (0.5, BetaDistribution::uniform().std_dev()),
        };

        let overlap_band = 0.2 * (sd_a + sd_b) / 2.0;
        if (mean_a - mean_b).abs() < overlap_band {
            Comparison::Uncertain
        } else if mean_a > mean_b {
            Comparison::A
        } else {
            Comparison::B
        }
    }

    /// Known capability names.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Assembler-facing overview split at `min_confidence`.
    pub fn overview(&self, min_confidence: f64) -> ConfidenceOverview {
        if self.entries.is_empty() {
            return ConfidenceOverview {
                average_confidence: 0.5,
                overall_uncertainty: BetaDistribution::uniform().variance(),
                strong: vec![],
                weak: vec![],
                high_risk: vec![],
            };
        }

        let mut strong = Vec::new();
        let mut weak = Vec::new();
        let mut high_risk = Vec::new();
        let mut conf_sum = 0.0;
        let mut unc_sum = 0.0;

        for (name, entry) in &self.entries {
            let conf = entry.dist.mean();
            conf_sum += conf;
            unc_sum += entry.dist.variance();
            if conf >= min_confidence {
                strong.push((name.clone(), conf));
            } else {
                weak.push((name.clone(), conf));
            }
            if conf < 0.4 && entry.total_count >= DEFAULT_MIN_SAMPLES {
                high_risk.push(name.clone());
            }
        }

        strong.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        weak.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        high_risk.sort();

        let n = self.entries.len() as f64;
        ConfidenceOverview {
            average_confidence: conf_sum / n,
            overall_uncertainty: unc_sum / n,
            strong,
            weak,
            high_risk,
        }
    }

    /// Export (name, entry) pairs for the snapshot store.
    pub fn export(&self) -> Vec<(String, ConfidenceEntry)> {
        let mut pairs: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    /// Restore from exported pairs. α and β are clamped back to ≥ 1, so a
    /// corrupted snapshot cannot break the smoothing invariant.
    pub fn restore(&mut self, pairs: Vec<(String, ConfidenceEntry)>) {
        self.entries.clear();
        for (name, mut entry) in pairs {
            entry.dist = BetaDistribution::new(entry.dist.alpha, entry.dist.beta);
            self.entries.insert(name, entry);
        }
    }
}
