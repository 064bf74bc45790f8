//! Reflection Triggers
//!
//! Each trigger pairs a cooldown with a condition over the performance
//! window. The periodic checker skips disabled triggers, respects
//! cooldowns, and records fire counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::window::{PerformanceWindow, Trend};

// ============================================================================
// KINDS AND CONDITIONS
// ============================================================================

/// What caused a reflection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    /// Fixed cadence
    Scheduled,
    /// Success rate, trend, or latency regression
    PerformanceDrop,
    /// Failure clusters and outliers
    Anomaly,
    /// Caller-requested
    Manual,
}

impl TriggerKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::PerformanceDrop => "performance-drop",
            TriggerKind::Anomaly => "anomaly",
            TriggerKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type-specific firing condition.
#[derive(Debug, Clone)]
pub enum TriggerCondition {
    /// Fire whenever the cooldown has elapsed
    Always,
    /// Fire on low success rate, degrading trend, or slow responses
    PerformanceDrop {
        /// Success-rate floor
        min_success_rate: f64,
        /// Recent-average ceiling
        max_response_ms: f64,
    },
    /// Fire on failure clusters or high-severity outliers
    Anomaly {
        /// Consecutive-failure ceiling
        max_consecutive_failures: u32,
        /// Recent-error ceiling over the ring
        max_recent_errors: usize,
    },
    /// Never fires from the checker; only via `fire_manual`
    Manual,
}

impl TriggerCondition {
    fn evaluate(&self, window: &PerformanceWindow) -> bool {
        match self {
            TriggerCondition::Always => true,
            TriggerCondition::PerformanceDrop {
                min_success_rate,
                max_response_ms,
            } => {
                window.recent_success_rate() < *min_success_rate
                    || window.trend() == Trend::Degrading
                    || window.recent_average_ms() > *max_response_ms
            }
            TriggerCondition::Anomaly {
                max_consecutive_failures,
                max_recent_errors,
            } => {
                if window.consecutive_failures() >= *max_consecutive_failures {
                    return true;
                }
                if window.recent_error_count() >= *max_recent_errors {
                    return true;
                }
                // High-severity outliers: responses far above the long-run
                // average, or a collapsed success rate with enough evidence.
                let running = window.running_average_ms();
                if running > 0.0 && window.recent_average_ms() > 3.0 * running {
                    return true;
                }
                window.len() >= 5 && window.recent_success_rate() < 0.5
            }
            TriggerCondition::Manual => false,
        }
    }
}

// ============================================================================
// TRIGGERS
// ============================================================================

/// A registered trigger.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Unique identifier
    pub id: String,
    /// Kind
    pub kind: TriggerKind,
    /// Display name
    pub name: String,
    /// Disabled triggers are skipped entirely
    pub enabled: bool,
    /// Minimum time between firings
    pub cooldown: Duration,
    /// Last firing time
    pub last_fired: Option<DateTime<Utc>>,
    /// Total firings
    pub fire_count: u64,
    /// Firing condition
    pub condition: TriggerCondition,
}

impl Trigger {
    fn new(
        kind: TriggerKind,
        name: &str,
        cooldown: Duration,
        condition: TriggerCondition,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            name: name.to_string(),
            enabled: true,
            cooldown,
            last_fired: None,
            fire_count: 0,
            condition,
        }
    }

    /// Built-in scheduled trigger.
    pub fn scheduled(interval: Duration) -> Self {
        Self::new(
            TriggerKind::Scheduled,
            "scheduled-reflection",
            interval,
            TriggerCondition::Always,
        )
    }

    /// Built-in performance-drop trigger (5 minute cooldown).
    pub fn performance_drop() -> Self {
        Self::new(
            TriggerKind::PerformanceDrop,
            "performance-drop",
            Duration::from_secs(300),
            TriggerCondition::PerformanceDrop {
                min_success_rate: 0.9,
                max_response_ms: 2000.0,
            },
        )
    }

    /// Built-in anomaly trigger (10 minute cooldown).
    pub fn anomaly() -> Self {
        Self::new(
            TriggerKind::Anomaly,
            "anomaly",
            Duration::from_secs(600),
            TriggerCondition::Anomaly {
                max_consecutive_failures: 3,
                max_recent_errors: 5,
            },
        )
    }

    fn cooled_down(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => {
                let elapsed = (now - last).num_milliseconds().max(0) as u128;
                elapsed >= self.cooldown.as_millis()
            }
        }
    }
}

/// A fired trigger, handed to the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredTrigger {
    /// Trigger identifier
    pub trigger_id: String,
    /// Trigger kind
    pub kind: TriggerKind,
    /// Trigger name
    pub name: String,
    /// When it fired
    pub fired_at: DateTime<Utc>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Holds the trigger collection and runs the periodic check.
#[derive(Debug)]
pub struct TriggerEngine {
    triggers: Vec<Trigger>,
}

impl TriggerEngine {
    /// Engine with the three built-in triggers.
    pub fn with_builtins(schedule_interval: Duration) -> Self {
        Self {
            triggers: vec![
                Trigger::scheduled(schedule_interval),
                Trigger::performance_drop(),
                Trigger::anomaly(),
            ],
        }
    }

    /// Empty engine (tests, custom setups).
    pub fn new() -> Self {
        Self { triggers: vec![] }
    }

    /// Add a trigger.
    pub fn add(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    /// Enable or disable a trigger by name. Returns whether it was found.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.triggers.iter_mut().find(|t| t.name == name) {
            Some(trigger) => {
                trigger.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Registered triggers.
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Run one check pass: evaluate every enabled, cooled-down trigger.
    pub fn check(&mut self, now: DateTime<Utc>, window: &PerformanceWindow) -> Vec<FiredTrigger> {
        let mut fired = Vec::new();
        for trigger in &mut self.triggers {
            if !trigger.enabled || !trigger.cooled_down(now) {
                continue;
            }
            if trigger.condition.evaluate(window) {
                trigger.last_fired = Some(now);
                trigger.fire_count += 1;
                tracing::debug!(trigger = %trigger.name, kind = %trigger.kind, "reflection trigger fired");
                fired.push(FiredTrigger {
                    trigger_id: trigger.id.clone(),
                    kind: trigger.kind,
                    name: trigger.name.clone(),
                    fired_at: now,
                });
            }
        }
        fired
    }

    /// Fire a manual trigger immediately (registering one if absent).
    pub fn fire_manual(&mut self, now: DateTime<Utc>, reason: &str) -> FiredTrigger {
        let trigger = match self
            .triggers
            .iter_mut()
            .find(|t| t.kind == TriggerKind::Manual)
        {
            Some(t) => t,
            None => {
                self.triggers.push(Trigger::new(
                    TriggerKind::Manual,
                    "manual",
                    Duration::ZERO,
                    TriggerCondition::Manual,
                ));
                self.triggers.last_mut().expect("just pushed")
            }
        };
        trigger.last_fired = Some(now);
        trigger.fire_count += 1;
        FiredTrigger {
            trigger_id: trigger.id.clone(),
            kind: TriggerKind::Manual,
            name: reason.to_string(),
            fired_at: now,
        }
    }
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_scheduled_fires_once_per_cooldown() {
        let mut engine = TriggerEngine::new();
        engine.add(Trigger::scheduled(Duration::from_secs(60)));
        let window = PerformanceWindow::default();
        let now = Utc::now();

        assert_eq!(engine.check(now, &window).len(), 1);
        // Within cooldown: silent.
        assert_eq!(
            engine.check(now + ChronoDuration::seconds(30), &window).len(),
            0
        );
        // Past cooldown: fires again.
        assert_eq!(
            engine.check(now + ChronoDuration::seconds(61), &window).len(),
            1
        );
    }

    #[test]
    fn test_disabled_trigger_is_skipped() {
        let mut engine = TriggerEngine::new();
        engine.add(Trigger::scheduled(Duration::from_secs(1)));
        assert!(engine.set_enabled("scheduled-reflection", false));
        let window = PerformanceWindow::default();
        assert!(engine.check(Utc::now(), &window).is_empty());
    }

    #[test]
    fn test_performance_drop_on_low_success_rate() {
        let mut engine = TriggerEngine::new();
        engine.add(Trigger::performance_drop());
        let mut window = PerformanceWindow::default();
        for i in 0..10 {
            window.record(50.0, i % 2 == 0); // 50% success rate
        }
        let fired = engine.check(Utc::now(), &window);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TriggerKind::PerformanceDrop);
    }

    #[test]
    fn test_performance_drop_on_slow_responses() {
        let mut engine = TriggerEngine::new();
        engine.add(Trigger::performance_drop());
        let mut window = PerformanceWindow::default();
        for _ in 0..10 {
            window.record(2500.0, true);
        }
        assert_eq!(engine.check(Utc::now(), &window).len(), 1);
    }

    #[test]
    fn test_performance_drop_quiet_when_healthy() {
        let mut engine = TriggerEngine::new();
        engine.add(Trigger::performance_drop());
        let mut window = PerformanceWindow::default();
        for _ in 0..10 {
            window.record(100.0, true);
        }
        assert!(engine.check(Utc::now(), &window).is_empty());
    }

    #[test]
    fn test_anomaly_on_consecutive_failures() {
        let mut engine = TriggerEngine::new();
        engine.add(Trigger::anomaly());
        let mut window = PerformanceWindow::default();
        window.record(10.0, true);
        window.record(10.0, false);
        window.record(10.0, false);
        window.record(10.0, false);
        let fired = engine.check(Utc::now(), &window);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TriggerKind::Anomaly);
    }

    #[test]
    fn test_manual_fire_records_count() {
        let mut engine = TriggerEngine::new();
        let fired = engine.fire_manual(Utc::now(), "operator request");
        assert_eq!(fired.kind, TriggerKind::Manual);
        assert_eq!(engine.triggers().len(), 1);
        assert_eq!(engine.triggers()[0].fire_count, 1);
    }
}
