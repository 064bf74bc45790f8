//! Hormone Field Implementation
//!
//! The field is the sole writer of hormone levels. Other components observe
//! through [`HormoneSnapshot`] copies or subscribe to `hormone:changed`
//! events on the bus. All mutators are synchronous; the stepper serializes
//! access.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::{HormoneAdvice, HormoneEvent, HormoneSnapshot, HormoneType, TaskRecommendation};
use crate::events::{EventBus, EventPayload, Topic};

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for the hormone field.
#[derive(Debug, Clone)]
pub struct HormoneConfig {
    /// Decay cadence driven by the stepper
    pub decay_tick_ms: u64,
    /// Bounded history ring size
    pub history_size: usize,
}

impl Default for HormoneConfig {
    fn default() -> Self {
        Self {
            decay_tick_ms: 1000,
            history_size: 1000,
        }
    }
}

// ============================================================================
// HORMONE FIELD
// ============================================================================

/// Five core hormones plus fatigue, with decay, cross-effects and history.
#[derive(Debug)]
pub struct HormoneField {
    levels: [f64; 6],
    history: VecDeque<HormoneEvent>,
    last_decay: Option<DateTime<Utc>>,
    config: HormoneConfig,
    bus: EventBus,
}

impl HormoneField {
    /// Create a field at baseline levels.
    pub fn new(config: HormoneConfig, bus: EventBus) -> Self {
        let mut levels = [0.0; 6];
        for hormone in HormoneType::ALL {
            levels[hormone.index()] = hormone.baseline();
        }
        Self {
            levels,
            history: VecDeque::with_capacity(config.history_size.min(64)),
            last_decay: None,
            config,
            bus,
        }
    }

    /// Current level of one hormone.
    pub fn level(&self, hormone: HormoneType) -> f64 {
        self.levels[hormone.index()]
    }

    /// Immutable copy of all levels.
    pub fn snapshot(&self) -> HormoneSnapshot {
        HormoneSnapshot {
            alert: self.level(HormoneType::Alert),
            stress: self.level(HormoneType::Stress),
            reward: self.level(HormoneType::Reward),
            stability: self.level(HormoneType::Stability),
            curiosity: self.level(HormoneType::Curiosity),
            fatigue: self.level(HormoneType::Fatigue),
            taken_at: Utc::now(),
        }
    }

    /// Apply a delta, clamp to [0, 1], record history, trigger cross-effects.
    ///
    /// Returns the new level. Cross-effect changes are recorded and published
    /// individually with a `cross-effect:` reason prefix.
    pub fn adjust(&mut self, hormone: HormoneType, delta: f64, reason: &str) -> f64 {
        let new_level = self.write(hormone, self.level(hormone) + delta, delta, reason);
        self.apply_cross_effects();
        new_level
    }

    /// Set an absolute level (clamped). Used by reset and calibration; does
    /// not trigger cross-effects.
    pub fn set(&mut self, hormone: HormoneType, value: f64, reason: &str) -> f64 {
        let delta = value - self.level(hormone);
        self.write(hormone, value, delta, reason)
    }

    /// Reset every hormone to its baseline.
    pub fn reset(&mut self, reason: &str) {
        for hormone in HormoneType::ALL {
            self.set(hormone, hormone.baseline(), reason);
        }
    }

    fn write(&mut self, hormone: HormoneType, target: f64, delta: f64, reason: &str) -> f64 {
        let new_level = target.clamp(0.0, 1.0);
        self.levels[hormone.index()] = new_level;

        self.history.push_back(HormoneEvent {
            at: Utc::now(),
            hormone,
            delta,
            level: new_level,
            reason: reason.to_string(),
        });
        while self.history.len() > self.config.history_size {
            self.history.pop_front();
        }

        self.bus.publish(
            Topic::HormoneChanged,
            EventPayload::Hormone {
                hormone: hormone.as_str().to_string(),
                delta,
                level: new_level,
                reason: reason.to_string(),
            },
        );
        new_level
    }

    /// Cross-effects, applied after every adjust (post-clamp):
    /// - alert > 0.6 multiplicatively reduces stress
    /// - reward > 0.7 adds to stability
    /// - stability > 0.6 multiplicatively reduces stress
    /// - curiosity > 0.7 multiplicatively reduces fatigue
    fn apply_cross_effects(&mut self) {
        if self.level(HormoneType::Alert) > 0.6 {
            let stress = self.level(HormoneType::Stress);
            let target = stress * 0.95;
            self.write(
                HormoneType::Stress,
                target,
                target - stress,
                "cross-effect: alert suppresses stress",
            );
        }
        if self.level(HormoneType::Reward) > 0.7 {
            let stability = self.level(HormoneType::Stability);
            self.write(
                HormoneType::Stability,
                stability + 0.02,
                0.02,
                "cross-effect: reward builds stability",
            );
        }
        if self.level(HormoneType::Stability) > 0.6 {
            let stress = self.level(HormoneType::Stress);
            let target = stress * 0.95;
            self.write(
                HormoneType::Stress,
                target,
                target - stress,
                "cross-effect: stability calms stress",
            );
        }
        if self.level(HormoneType::Curiosity) > 0.7 {
            let fatigue = self.level(HormoneType::Fatigue);
            let target = fatigue * 0.95;
            self.write(
                HormoneType::Fatigue,
                target,
                target - fatigue,
                "cross-effect: curiosity burns fatigue",
            );
        }
    }

    /// Move every level toward its baseline by the per-type rate.
    ///
    /// Decay never crosses the baseline. Calling twice with the same `now`
    /// is equivalent to one call (the elapsed slice is consumed).
    pub fn decay_tick(&mut self, now: DateTime<Utc>) {
        let elapsed_secs = match self.last_decay {
            Some(last) => (now - last).num_milliseconds().max(0) as f64 / 1000.0,
            None => {
                self.last_decay = Some(now);
                return;
            }
        };
        if elapsed_secs == 0.0 {
            return;
        }
        self.last_decay = Some(now);

        for hormone in HormoneType::ALL {
            let level = self.level(hormone);
            let baseline = hormone.baseline();
            if level == baseline {
                continue;
            }
            let step = hormone.decay_rate_per_sec() * elapsed_secs;
            let next = if level > baseline {
                (level - step).max(baseline)
            } else {
                (level + step).min(baseline)
            };
            self.levels[hormone.index()] = next;
        }
    }

    /// Recent history, oldest first.
    pub fn history(&self, limit: usize) -> Vec<HormoneEvent> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Recent history for one hormone, oldest first.
    pub fn history_for(&self, hormone: HormoneType, limit: usize) -> Vec<HormoneEvent> {
        let matching: Vec<HormoneEvent> = self
            .history
            .iter()
            .filter(|e| e.hormone == hormone)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }

    /// Prioritized advisories, sorted by severity descending.
    pub fn advice(&self) -> Vec<HormoneAdvice> {
        let snap = self.snapshot();
        let mut entries = Vec::new();

        if snap.stress >= 0.8 {
            entries.push(HormoneAdvice {
                severity: snap.stress,
                hormone: HormoneType::Stress,
                message: "High stress: defer non-critical work and let decay run".into(),
            });
        }
        if snap.fatigue >= 0.7 {
            entries.push(HormoneAdvice {
                severity: snap.fatigue * 0.9,
                hormone: HormoneType::Fatigue,
                message: "Fatigue elevated: schedule maintenance, reduce throughput".into(),
            });
        }
        if snap.alert >= 0.6 {
            entries.push(HormoneAdvice {
                severity: snap.alert * 0.8,
                hormone: HormoneType::Alert,
                message: "Alert posture: prioritize critical and reactive work".into(),
            });
        }
        if snap.stability <= 0.3 {
            entries.push(HormoneAdvice {
                severity: (1.0 - snap.stability) * 0.7,
                hormone: HormoneType::Stability,
                message: "Stability low: avoid risky changes until levels recover".into(),
            });
        }
        if snap.curiosity >= 0.7 {
            entries.push(HormoneAdvice {
                severity: snap.curiosity * 0.5,
                hormone: HormoneType::Curiosity,
                message: "Curiosity high: good window for exploration and learning".into(),
            });
        }

        entries.sort_by(|a, b| {
            b.severity
                .partial_cmp(&a.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    /// Scheduler-facing recommendation.
    ///
    /// Stress dominates: at stress >= 0.8 no new work is accepted. Otherwise
    /// alertness prefers the rapid path, and curiosity prefers exploration.
    pub fn task_recommendation(&self) -> TaskRecommendation {
        let snap = self.snapshot();

        if snap.stress >= 0.8 {
            return TaskRecommendation {
                accept_new: false,
                preferred_kinds: vec![],
                avoid_kinds: vec!["complex".into(), "exploration".into()],
            };
        }
        if snap.alert >= 0.6 {
            return TaskRecommendation {
                accept_new: true,
                preferred_kinds: vec!["critical".into(), "reactive".into()],
                avoid_kinds: vec![],
            };
        }
        if snap.curiosity >= 0.7 {
            return TaskRecommendation {
                accept_new: true,
                preferred_kinds: vec!["exploration".into(), "learning".into()],
                avoid_kinds: vec![],
            };
        }
        TaskRecommendation::default()
    }

    /// Compact one-line mood summary for the assembler's identity section.
    pub fn mood_summary(&self) -> String {
        let snap = self.snapshot();
        let dominant = HormoneType::ALL
            .iter()
            .map(|h| (*h, (snap.level(*h) - h.baseline()).abs()))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(h, _)| h)
            .unwrap_or(HormoneType::Stability);
        format!(
            "alert {:.2}, stress {:.2}, reward {:.2}, stability {:.2}, curiosity {:.2}, fatigue {:.2} (dominant deviation: {})",
            snap.alert, snap.stress, snap.reward, snap.stability, snap.curiosity, snap.fatigue, dominant
        )
    }
}
