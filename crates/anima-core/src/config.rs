//! Configuration
//!
//! A flat, dotted key space over the per-component config structs. Loaded
//! once at start (`CoreConfig::from_flat`); a selected subset of keys is
//! hot-reloadable through `set`, which is also the surface the reflection
//! engine's approved proposals mutate.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::assembler::{AbConfig, AssemblerConfig, BudgetFractions};
use crate::events::{DEFAULT_BUS_CAPACITY, DEFAULT_HISTORY_SIZE};
use crate::hormones::HormoneConfig;
use crate::memory::MemoryConfig;
use crate::error::{CoreError, Result};
use crate::reflection::{ApprovalMode, ReflectionConfig};
use crate::safety::{SafetyConfig, Sensitivity};
use crate::scheduler::SchedulerConfig;

// ============================================================================
// SNAPSHOT / BUS SECTIONS
// ============================================================================

/// Persistence cadence and location.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// How often mutable roots are written
    pub interval_ms: u64,
    /// Store location; `None` uses the platform data dir, `Some` a file,
    /// and `in_memory` an ephemeral store
    pub path: Option<PathBuf>,
    /// Ephemeral store (tests, embedded callers that persist elsewhere)
    pub in_memory: bool,
    /// Disable persistence entirely
    pub enabled: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            path: None,
            in_memory: false,
            enabled: true,
        }
    }
}

/// Event bus sizing.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Broadcast buffer size
    pub capacity: usize,
    /// History ring size
    pub history_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

// ============================================================================
// CORE CONFIG
// ============================================================================

/// The full runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    /// Scheduler section
    pub scheduler: SchedulerConfig,
    /// Hormone section
    pub hormones: HormoneConfig,
    /// Memory section
    pub memory: MemoryConfig,
    /// Reflection section
    pub reflection: ReflectionConfig,
    /// Assembler section
    pub assembler: AssemblerConfig,
    /// A/B section
    pub ab: AbConfig,
    /// Safety section
    pub safety: SafetyConfig,
    /// Snapshot section
    pub snapshot: SnapshotConfig,
    /// Bus section
    pub bus: BusConfig,
}

impl CoreConfig {
    /// Build from a flat key map, starting at defaults. Unknown keys are
    /// rejected so typos do not silently configure nothing.
    pub fn from_flat(entries: &HashMap<String, Value>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in entries {
            config.set(key, value)?;
        }
        Ok(config)
    }

    /// Read one key. Returns `None` for unknown keys.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = match key {
            "scheduler.async_loop_interval_ms" => self.scheduler.loop_interval_ms.into(),
            "scheduler.default_timeout_ms" => self.scheduler.default_timeout_ms.into(),
            "scheduler.max_concurrent" => self.scheduler.max_concurrent.into(),
            "scheduler.homeostasis_enable" => self.scheduler.homeostasis_enable.into(),
            "scheduler.cpu_threshold_pct" => self.scheduler.cpu_threshold_pct.into(),
            "scheduler.memory_threshold_pct" => self.scheduler.memory_threshold_pct.into(),
            "scheduler.fatigue_threshold" => self.scheduler.fatigue_threshold.into(),
            "hormone.decay_tick_ms" => self.hormones.decay_tick_ms.into(),
            "hormone.history_size" => self.hormones.history_size.into(),
            "memory.max_count" => self.memory.max_count.into(),
            "memory.prune_threshold" => self.memory.prune_threshold.into(),
            "memory.maintenance_interval_ms" => self.memory.maintenance_interval_ms.into(),
            "memory.retrieval.semantic" => self.memory.retrieval.semantic.into(),
            "memory.retrieval.temporal" => self.memory.retrieval.temporal.into(),
            "memory.retrieval.importance" => self.memory.retrieval.importance.into(),
            "reflection.schedule_interval_ms" => self.reflection.schedule_interval_ms.into(),
            "reflection.check_interval_ms" => self.reflection.check_interval_ms.into(),
            "reflection.approval_mode" => self.reflection.approval_mode.as_str().into(),
            "assembler.max_context_window" => self.assembler.max_context_window.into(),
            "assembler.max_recent_memories" => self.assembler.max_recent_memories.into(),
            "assembler.prompt_compression" => self.assembler.prompt_compression.into(),
            "assembler.budget_fractions.system" => self.assembler.fractions.system.into(),
            "assembler.budget_fractions.self" => self.assembler.fractions.self_description.into(),
            "assembler.budget_fractions.memory" => self.assembler.fractions.memory.into(),
            "assembler.budget_fractions.working" => self.assembler.fractions.working.into(),
            "assembler.budget_fractions.reserve" => self.assembler.fractions.reserve.into(),
            "safety.strict_mode" => self.safety.strict_mode.into(),
            "safety.auto_mitigate" => self.safety.auto_mitigate.into(),
            "safety.block_threshold" => self.safety.block_threshold.into(),
            "safety.sensitivity" => match self.safety.sensitivity {
                Sensitivity::Low => "low".into(),
                Sensitivity::Medium => "medium".into(),
                Sensitivity::High => "high".into(),
            },
            "ab.min_samples_for_comparison" => self.ab.min_samples_for_comparison.into(),
            "ab.confidence_threshold" => self.ab.confidence_threshold.into(),
            "snapshot.interval_ms" => self.snapshot.interval_ms.into(),
            _ => return None,
        };
        Some(value)
    }

    /// Set one key, returning the previous value. Unknown keys and
    /// ill-typed values are validation errors; no state changes on error.
    pub fn set(&mut self, key: &str, value: &Value) -> Result<Value> {
        let before = self
            .get(key)
            .ok_or_else(|| CoreError::Validation(format!("unknown config key '{key}'")))?;

        match key {
            "scheduler.async_loop_interval_ms" => {
                self.scheduler.loop_interval_ms = as_u64(key, value)?.max(1)
            }
            "scheduler.default_timeout_ms" => {
                self.scheduler.default_timeout_ms = as_u64(key, value)?.max(1)
            }
            "scheduler.max_concurrent" => {
                self.scheduler.max_concurrent = as_u64(key, value)?.max(1) as usize
            }
            "scheduler.homeostasis_enable" => {
                self.scheduler.homeostasis_enable = as_bool(key, value)?
            }
            "scheduler.cpu_threshold_pct" => {
                self.scheduler.cpu_threshold_pct = as_f64(key, value)?
            }
            "scheduler.memory_threshold_pct" => {
                self.scheduler.memory_threshold_pct = as_f64(key, value)?
            }
            "scheduler.fatigue_threshold" => {
                self.scheduler.fatigue_threshold = as_f64(key, value)?.clamp(0.0, 1.0)
            }
            "hormone.decay_tick_ms" => self.hormones.decay_tick_ms = as_u64(key, value)?.max(1),
            "hormone.history_size" => {
                self.hormones.history_size = as_u64(key, value)?.max(1) as usize
            }
            "memory.max_count" => self.memory.max_count = as_u64(key, value)?.max(1) as usize,
            "memory.prune_threshold" => {
                self.memory.prune_threshold = as_f64(key, value)?.clamp(0.0, 1.0)
            }
            "memory.maintenance_interval_ms" => {
                self.memory.maintenance_interval_ms = as_u64(key, value)?.max(1)
            }
            "memory.retrieval.semantic" => self.memory.retrieval.semantic = as_f64(key, value)?,
            "memory.retrieval.temporal" => self.memory.retrieval.temporal = as_f64(key, value)?,
            "memory.retrieval.importance" => {
                self.memory.retrieval.importance = as_f64(key, value)?
            }
            "reflection.schedule_interval_ms" => {
                self.reflection.schedule_interval_ms = as_u64(key, value)?.max(1)
            }
            "reflection.check_interval_ms" => {
                self.reflection.check_interval_ms = as_u64(key, value)?.max(1)
            }
            "reflection.approval_mode" => {
                let name = as_str(key, value)?;
                self.reflection.approval_mode = ApprovalMode::from_name(&name).ok_or_else(|| {
                    CoreError::Validation(format!("unknown approval mode '{name}'"))
                })?;
            }
            "assembler.max_context_window" => {
                self.assembler.max_context_window = as_u64(key, value)?.max(1) as usize
            }
            "assembler.max_recent_memories" => {
                self.assembler.max_recent_memories = as_u64(key, value)?.max(1) as usize
            }
            "assembler.prompt_compression" => {
                self.assembler.prompt_compression = as_bool(key, value)?
            }
            "assembler.budget_fractions.system"
            | "assembler.budget_fractions.self"
            | "assembler.budget_fractions.memory"
            | "assembler.budget_fractions.working"
            | "assembler.budget_fractions.reserve" => {
                let fraction = as_f64(key, value)?;
                let mut fractions = self.assembler.fractions;
                match key.rsplit('.').next().unwrap_or_default() {
                    "system" => fractions.system = fraction,
                    "self" => fractions.self_description = fraction,
                    "memory" => fractions.memory = fraction,
                    "working" => fractions.working = fraction,
                    _ => fractions.reserve = fraction,
                }
                fractions.validate()?;
                self.assembler.fractions = fractions;
            }
            "safety.strict_mode" => self.safety.strict_mode = as_bool(key, value)?,
            "safety.auto_mitigate" => self.safety.auto_mitigate = as_bool(key, value)?,
            "safety.block_threshold" => {
                self.safety.block_threshold = as_f64(key, value)?.clamp(0.0, 1.0)
            }
            "safety.sensitivity" => {
                let name = as_str(key, value)?;
                self.safety.sensitivity = Sensitivity::from_name(&name).ok_or_else(|| {
                    CoreError::Validation(format!("unknown sensitivity '{name}'"))
                })?;
            }
            "ab.min_samples_for_comparison" => {
                self.ab.min_samples_for_comparison = as_u64(key, value)?.max(1)
            }
            "ab.confidence_threshold" => {
                self.ab.confidence_threshold = as_f64(key, value)?.clamp(0.5, 0.999)
            }
            "snapshot.interval_ms" => self.snapshot.interval_ms = as_u64(key, value)?.max(1),
            _ => unreachable!("get() accepted the key"),
        }
        Ok(before)
    }
}

fn as_u64(key: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| CoreError::Validation(format!("'{key}' expects an unsigned integer")))
}

fn as_f64(key: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| CoreError::Validation(format!("'{key}' expects a number")))
}

fn as_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| CoreError::Validation(format!("'{key}' expects a boolean")))
}

fn as_str(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::Validation(format!("'{key}' expects a string")))
}
