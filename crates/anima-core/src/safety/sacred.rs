//! Sacred Core (Layer 4)
//!
//! A set of named callables registered before sealing. Each function is
//! fingerprinted by a stable identifier plus a configuration hash (runtime
//! function bodies are not introspectable, so the fingerprint covers what
//! the function is wired to do, not its machine code). After `seal()`,
//! registration attempts are tamper events; three consecutive tampers drop
//! every registered function and put the envelope into lockdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use super::{LayerReport, Violation};
use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventPayload, Topic};

/// Consecutive tamper events that trigger emergency lockdown.
const LOCKDOWN_AFTER_TAMPERS: u32 = 3;

/// Execution log entries retained.
const EXECUTION_LOG_SIZE: usize = 256;

/// A protected callable.
pub type SacredFn =
    Arc<dyn Fn(&serde_json::Value) -> Result<serde_json::Value> + Send + Sync>;

/// Fingerprint a sacred function: SHA-256 over name and config hash.
pub fn fingerprint(name: &str, config_hash: &str) -> String {
    hex::encode(Sha256::digest(format!("{name}:{config_hash}").as_bytes()))
}

struct SacredFunction {
    config_hash: String,
    fingerprint: String,
    callable: SacredFn,
}

/// One invocation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    /// Function name
    pub name: String,
    /// Invocation start
    pub start: DateTime<Utc>,
    /// Invocation end
    pub end: DateTime<Utc>,
    /// Whether the call succeeded
    pub success: bool,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// SACRED CORE
// ============================================================================

/// The sealed set of core functions.
pub struct SacredCore {
    functions: HashMap<String, SacredFunction>,
    sealed: bool,
    strict: bool,
    consecutive_tampers: u32,
    locked_down: bool,
    execution_log: Vec<ExecutionLogEntry>,
    bus: EventBus,
}

impl SacredCore {
    /// Unsealed, empty core.
    pub fn new(strict: bool, bus: EventBus) -> Self {
        Self {
            functions: HashMap::new(),
            sealed: false,
            strict,
            consecutive_tampers: 0,
            locked_down: false,
            execution_log: vec![],
            bus,
        }
    }

    /// Register a function. Before sealing this always succeeds (duplicate
    /// names are replaced); after sealing it is a tamper event.
    pub fn register(&mut self, name: &str, config_hash: &str, callable: SacredFn) -> Result<()> {
        if self.locked_down {
            return Err(CoreError::Lockdown(
                "sacred core is locked down".to_string(),
            ));
        }
        if self.sealed {
            self.tamper(&format!("registration of '{name}' after seal"));
            if self.strict {
                return Err(CoreError::Integrity(format!(
                    "cannot register '{name}': core is sealed"
                )));
            }
            tracing::warn!(function = name, "post-seal registration recorded, not applied");
            return Ok(());
        }

        self.functions.insert(
            name.to_string(),
            SacredFunction {
                config_hash: config_hash.to_string(),
                fingerprint: fingerprint(name, config_hash),
                callable,
            },
        );
        Ok(())
    }

    /// Seal the core. Fingerprints are already fixed; from here on the set
    /// is immutable.
    pub fn seal(&mut self) {
        self.sealed = true;
        tracing::info!(functions = self.functions.len(), "sacred core sealed");
    }

    /// Whether the core has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether emergency lockdown has fired.
    pub fn is_locked_down(&self) -> bool {
        self.locked_down
    }

    /// Names of registered functions, sorted. Empty after lockdown.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Consecutive tamper events so far.
    pub fn tamper_count(&self) -> u32 {
        self.consecutive_tampers
    }

    /// Recent invocations, oldest first.
    pub fn execution_log(&self) -> &[ExecutionLogEntry] {
        &self.execution_log
    }

    fn tamper(&mut self, what: &str) {
        self.consecutive_tampers += 1;
        tracing::warn!(
            tamper = what,
            count = self.consecutive_tampers,
            "sacred core tamper event"
        );
        self.bus.publish(
            Topic::SafetyViolation,
            EventPayload::Safety {
                layer: "sacred-core".to_string(),
                severity: (self.consecutive_tampers as f64 / LOCKDOWN_AFTER_TAMPERS as f64)
                    .min(1.0),
                message: format!("tamper attempt: {what}"),
            },
        );

        if self.consecutive_tampers >= LOCKDOWN_AFTER_TAMPERS {
            self.lockdown("three consecutive tamper events");
        }
    }

    fn lockdown(&mut self, reason: &str) {
        self.locked_down = true;
        self.functions.clear();
        tracing::error!(reason, "sacred core emergency lockdown");
        self.bus.publish(
            Topic::Lockdown,
            EventPayload::Safety {
                layer: "sacred-core".to_string(),
                severity: 1.0,
                message: reason.to_string(),
            },
        );
    }

    /// Recompute every fingerprint and compare. Discrepancies are reported;
    /// a clean pass resets the consecutive-tamper streak.
    pub fn verify_integrity(&mut self) -> LayerReport {
        let mut report = LayerReport::passing("sacred-core");
        if self.locked_down {
            report.passed = false;
            report.violations.push(Violation {
                code: "lockdown".to_string(),
                message: "core is in emergency lockdown".to_string(),
                severity: 1.0,
                critical: true,
            });
            return report;
        }

        for (name, function) in &self.functions {
            let expected = fingerprint(name, &function.config_hash);
            if expected != function.fingerprint {
                report.violations.push(Violation {
                    code: format!("fingerprint-mismatch:{name}"),
                    message: format!("fingerprint drift for '{name}'"),
                    severity: 1.0,
                    critical: true,
                });
            }
        }

        if report.violations.is_empty() {
            self.consecutive_tampers = 0;
        } else {
            report.passed = false;
            report
                .recommendations
                .push("drop and re-register the core from trusted configuration".to_string());
        }
        report
    }

    /// Invoke a registered function, wrapping it in an execution log entry.
    pub fn invoke(&mut self, name: &str, args: &serde_json::Value) -> Result<serde_json::Value> {
        if self.locked_down {
            return Err(CoreError::Lockdown(
                "sacred core is locked down".to_string(),
            ));
        }
        let callable = match self.functions.get(name) {
            Some(f) => f.callable.clone(),
            None => {
                return Err(CoreError::Validation(format!(
                    "unknown sacred function '{name}'"
                )))
            }
        };

        let start = Utc::now();
        let result = callable(args);
        let entry = ExecutionLogEntry {
            name: name.to_string(),
            start,
            end: Utc::now(),
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        self.execution_log.push(entry);
        while self.execution_log.len() > EXECUTION_LOG_SIZE {
            self.execution_log.remove(0);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn corrupt_fingerprint(&mut self, name: &str) {
        if let Some(f) = self.functions.get_mut(name) {
            f.fingerprint = "corrupted".to_string();
        }
    }
}
