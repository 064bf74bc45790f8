//! Safety Envelope
//!
//! Four layers between the outside world and the runtime:
//!
//! - **L1 Identity anchor**: soul signature over a declared entropy vector,
//!   verified against the current process.
//! - **L2 Vitals**: CPU and memory against configured thresholds.
//! - **L3 Adversarial filter**: compiled-once pattern set over every
//!   external string before it reaches the scheduler.
//! - **L4 Sacred core**: sealed, fingerprinted core callables with tamper
//!   detection and emergency lockdown.

mod adversarial;
mod identity;
mod sacred;

pub use adversarial::{
    AdversarialFilter, AttackCategory, FilterAction, InspectionResult, PatternMatch, Sensitivity,
    DEFAULT_BLOCK_THRESHOLD,
};
pub use identity::{EntropyVector, IdentityAnchor};
pub use sacred::{fingerprint, ExecutionLogEntry, SacredCore, SacredFn};

use serde::{Deserialize, Serialize};

use crate::clock::ResourceSample;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventPayload, Topic};

// ============================================================================
// REPORTS
// ============================================================================

/// One reported violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Stable code ("identity-drift:pid", "cpu-over-threshold", ...)
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Severity in [0, 1]
    pub severity: f64,
    /// Critical violations fail the layer
    pub critical: bool,
}

/// Result of one layer check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerReport {
    /// Layer name
    pub layer: String,
    /// Whether the layer passed
    pub passed: bool,
    /// Violations found
    pub violations: Vec<Violation>,
    /// Suggested remediations
    pub recommendations: Vec<String>,
}

impl LayerReport {
    /// A passing report with no findings.
    pub fn passing(layer: &str) -> Self {
        Self {
            layer: layer.to_string(),
            passed: true,
            violations: vec![],
            recommendations: vec![],
        }
    }
}

/// Result of running all four layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullCheck {
    /// Per-layer reports, L1 through L4
    pub layers: Vec<LayerReport>,
    /// Whether every layer passed
    pub passed: bool,
}

// ============================================================================
// L2: VITALS
// ============================================================================

/// Resource thresholds (Layer 2).
#[derive(Debug, Clone)]
pub struct VitalsGuard {
    /// CPU threshold in percent
    pub cpu_threshold_pct: f64,
    /// Memory threshold in percent
    pub memory_threshold_pct: f64,
}

impl Default for VitalsGuard {
    fn default() -> Self {
        Self {
            cpu_threshold_pct: 80.0,
            memory_threshold_pct: 85.0,
        }
    }
}

impl VitalsGuard {
    /// Check a resource sample. Severity is the relative excursion over the
    /// threshold, capped at 1.
    pub fn check(&self, sample: &ResourceSample) -> LayerReport {
        let mut report = LayerReport::passing("vitals");

        for (code, value, threshold) in [
            ("cpu-over-threshold", sample.cpu_pct, self.cpu_threshold_pct),
            (
                "memory-over-threshold",
                sample.memory_pct,
                self.memory_threshold_pct,
            ),
        ] {
            if value > threshold {
                let severity = ((value - threshold) / threshold).min(1.0);
                report.violations.push(Violation {
                    code: code.to_string(),
                    message: format!("{code}: {value:.1}% against {threshold:.1}%"),
                    severity,
                    critical: false,
                });
            }
        }

        if !report.violations.is_empty() {
            report.passed = false;
            report
                .recommendations
                .push("shed background work until vitals recover".to_string());
        }
        report
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Configuration for the safety envelope.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Strict mode: any identity mismatch is critical; post-seal
    /// registration errors
    pub strict_mode: bool,
    /// Whether hostile input is blocked (vs only flagged)
    pub auto_mitigate: bool,
    /// Adversarial block threshold
    pub block_threshold: f64,
    /// Adversarial sensitivity
    pub sensitivity: Sensitivity,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            auto_mitigate: true,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            sensitivity: Sensitivity::Medium,
        }
    }
}

/// The four-layer safety envelope.
pub struct SafetyEnvelope {
    anchor: IdentityAnchor,
    vitals: VitalsGuard,
    filter: AdversarialFilter,
    core: SacredCore,
    config: SafetyConfig,
    bus: EventBus,
}

impl SafetyEnvelope {
    /// Capture identity and build all four layers.
    pub fn new(config: SafetyConfig, bus: EventBus) -> Self {
        Self {
            anchor: IdentityAnchor::capture(config.strict_mode),
            vitals: VitalsGuard::default(),
            filter: AdversarialFilter::new(
                config.sensitivity,
                config.block_threshold,
                config.auto_mitigate,
            ),
            core: SacredCore::new(config.strict_mode, bus.clone()),
            config,
            bus,
        }
    }

    /// The identity anchor (L1).
    pub fn anchor(&self) -> &IdentityAnchor {
        &self.anchor
    }

    /// The identity anchor, mutable (rotation).
    pub fn anchor_mut(&mut self) -> &mut IdentityAnchor {
        &mut self.anchor
    }

    /// The adversarial filter (L3).
    pub fn filter(&self) -> &AdversarialFilter {
        &self.filter
    }

    /// The sacred core (L4).
    pub fn core(&self) -> &SacredCore {
        &self.core
    }

    /// The sacred core, mutable (registration and sealing).
    pub fn core_mut(&mut self) -> &mut SacredCore {
        &mut self.core
    }

    /// Hot-reloadable: adversarial block threshold.
    pub fn set_block_threshold(&mut self, threshold: f64) {
        self.config.block_threshold = threshold.clamp(0.0, 1.0);
        self.filter.set_block_threshold(threshold);
    }

    /// Inspect one external string (L3) and publish violations.
    pub fn inspect_input(&self, input: &str) -> InspectionResult {
        let result = self.filter.inspect(input);
        if result.action != FilterAction::Allowed {
            self.bus.publish(
                Topic::SafetyViolation,
                EventPayload::Safety {
                    layer: "adversarial".to_string(),
                    severity: result.confidence,
                    message: result
                        .matches
                        .first()
                        .map(|m| format!("{} matched", m.category))
                        .unwrap_or_else(|| "heuristic detection".to_string()),
                },
            );
        }
        result
    }

    /// Run all four layers. L3 has no standing input, so it contributes a
    /// passing report unless the envelope is locked down.
    pub fn full_check(&mut self, sample: Option<&ResourceSample>) -> FullCheck {
        let identity = self.anchor.verify();
        let vitals = match sample {
            Some(sample) => self.vitals.check(sample),
            None => LayerReport::passing("vitals"),
        };
        let adversarial = LayerReport::passing("adversarial");
        let core = self.core.verify_integrity();

        for report in [&identity, &vitals, &core] {
            for violation in &report.violations {
                self.bus.publish(
                    Topic::SafetyViolation,
                    EventPayload::Safety {
                        layer: report.layer.clone(),
                        severity: violation.severity,
                        message: violation.message.clone(),
                    },
                );
            }
        }

        let layers = vec![identity, vitals, adversarial, core];
        let passed = layers.iter().all(|l| l.passed);
        FullCheck { layers, passed }
    }

    /// Chain the layers in front of an operation.
    ///
    /// Refuses with `Lockdown` when the sacred core is locked down or the
    /// context is blocked by the adversarial filter; refuses with
    /// `Integrity` when the identity anchor fails critically.
    pub fn safe_execute<F>(&mut self, context: &str, operation: F) -> Result<serde_json::Value>
    where
        F: FnOnce() -> Result<serde_json::Value>,
    {
        if self.core.is_locked_down() {
            return Err(CoreError::Lockdown(
                "refusing execution: sacred core locked down".to_string(),
            ));
        }

        let identity = self.anchor.verify();
        if !identity.passed {
            self.bus.publish(
                Topic::SafetyViolation,
                EventPayload::Safety {
                    layer: "identity".to_string(),
                    severity: 1.0,
                    message: "identity verification failed before execution".to_string(),
                },
            );
            return Err(CoreError::Integrity(
                "identity verification failed".to_string(),
            ));
        }

        let inspection = self.inspect_input(context);
        if inspection.action == FilterAction::Blocked {
            return Err(CoreError::Lockdown(format!(
                "refusing execution: adversarial input (confidence {:.2})",
                inspection.confidence
            )));
        }

        operation()
    }
}
