//! Hormone Field
//!
//! Bounded scalar state that parameterizes admission and decision policies.
//! Five core hormones plus an auxiliary fatigue level, each with a baseline
//! and a per-type decay rate. Levels always stay in [0, 1]; decay pulls each
//! level toward its baseline without ever crossing it.
//!
//! Cross-effects model hormone interplay: sustained alertness suppresses
//! stress, reward builds stability, stability calms stress, and curiosity
//! burns off fatigue.

mod field;

pub use field::{HormoneConfig, HormoneField};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// HORMONE TYPES
// ============================================================================

/// The tracked hormone levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HormoneType {
    /// Rapid-response readiness
    Alert,
    /// Energy conservation pressure
    Stress,
    /// Reinforcement signal
    Reward,
    /// Calming / consolidation signal
    Stability,
    /// Exploration drive
    Curiosity,
    /// Accumulated work debt (auxiliary level)
    Fatigue,
}

impl HormoneType {
    /// All tracked hormones, iteration order is stable.
    pub const ALL: [HormoneType; 6] = [
        HormoneType::Alert,
        HormoneType::Stress,
        HormoneType::Reward,
        HormoneType::Stability,
        HormoneType::Curiosity,
        HormoneType::Fatigue,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HormoneType::Alert => "alert",
            HormoneType::Stress => "stress",
            HormoneType::Reward => "reward",
            HormoneType::Stability => "stability",
            HormoneType::Curiosity => "curiosity",
            HormoneType::Fatigue => "fatigue",
        }
    }

    /// Parse from string name. Unknown names are rejected, not defaulted:
    /// an invalid hormone type is a validation error at the caller.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alert" => Some(HormoneType::Alert),
            "stress" => Some(HormoneType::Stress),
            "reward" => Some(HormoneType::Reward),
            "stability" => Some(HormoneType::Stability),
            "curiosity" => Some(HormoneType::Curiosity),
            "fatigue" => Some(HormoneType::Fatigue),
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            HormoneType::Alert => 0,
            HormoneType::Stress => 1,
            HormoneType::Reward => 2,
            HormoneType::Stability => 3,
            HormoneType::Curiosity => 4,
            HormoneType::Fatigue => 5,
        }
    }

    /// Resting level the hormone decays toward.
    pub fn baseline(&self) -> f64 {
        match self {
            HormoneType::Alert => 0.2,
            HormoneType::Stress => 0.2,
            HormoneType::Reward => 0.3,
            HormoneType::Stability => 0.6,
            HormoneType::Curiosity => 0.5,
            HormoneType::Fatigue => 0.1,
        }
    }

    /// Decay rate toward baseline, in level units per second.
    pub fn decay_rate_per_sec(&self) -> f64 {
        match self {
            HormoneType::Alert => 0.010,
            HormoneType::Stress => 0.008,
            HormoneType::Reward => 0.010,
            HormoneType::Stability => 0.005,
            HormoneType::Curiosity => 0.004,
            HormoneType::Fatigue => 0.003,
        }
    }
}

impl std::fmt::Display for HormoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SNAPSHOT / HISTORY / ADVICE
// ============================================================================

/// Immutable copy of the tracked levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HormoneSnapshot {
    /// Rapid-response readiness
    pub alert: f64,
    /// Energy conservation pressure
    pub stress: f64,
    /// Reinforcement signal
    pub reward: f64,
    /// Calming signal
    pub stability: f64,
    /// Exploration drive
    pub curiosity: f64,
    /// Accumulated work debt
    pub fatigue: f64,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl HormoneSnapshot {
    /// Level for a hormone type.
    pub fn level(&self, hormone: HormoneType) -> f64 {
        match hormone {
            HormoneType::Alert => self.alert,
            HormoneType::Stress => self.stress,
            HormoneType::Reward => self.reward,
            HormoneType::Stability => self.stability,
            HormoneType::Curiosity => self.curiosity,
            HormoneType::Fatigue => self.fatigue,
        }
    }
}

/// One entry in the hormone history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HormoneEvent {
    /// When the change happened
    pub at: DateTime<Utc>,
    /// Which hormone changed
    pub hormone: HormoneType,
    /// Requested delta (before clamping)
    pub delta: f64,
    /// Resulting level after clamping
    pub level: f64,
    /// Caller-supplied reason
    pub reason: String,
}

/// A prioritized advisory derived from the current levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HormoneAdvice {
    /// Severity in [0, 1]; entries are sorted descending
    pub severity: f64,
    /// Hormone driving the advisory
    pub hormone: HormoneType,
    /// Human-readable guidance
    pub message: String,
}

/// Scheduler-facing recommendation derived from the current levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecommendation {
    /// Whether new work should be accepted at all
    pub accept_new: bool,
    /// Task kinds to prefer
    pub preferred_kinds: Vec<String>,
    /// Task kinds to avoid
    pub avoid_kinds: Vec<String>,
}

impl Default for TaskRecommendation {
    fn default() -> Self {
        Self {
            accept_new: true,
            preferred_kinds: vec![],
            avoid_kinds: vec![],
        }
    }
}
