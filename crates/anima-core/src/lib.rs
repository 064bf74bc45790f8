//! # Anima Core
//!
//! Cognitive runtime for self-reflective agents. Implements the subsystems
//! that make an agent *feel* like a process with a body and a history:
//!
//! - **Hormone Field**: five bounded scalars (plus fatigue) with baselines,
//!   decay, cross-effects and a bounded history ring. Gates task admission
//!   and flavors the self-description.
//! - **Hormone-Gated Scheduler**: dual-queue (reactive/regulatory) priority
//!   execution with capacity, homeostasis and admission gates; cooperative
//!   cancellation; outcome feedback into the hormone field.
//! - **Stratified Memory**: episodic, semantic, procedural and reflective
//!   records with salience-driven forgetting, spaced-repetition review
//!   intervals, and episodic-to-semantic consolidation.
//! - **Bayesian Confidence**: Beta(α, β) per capability with UCB selection
//!   and explore-first semantics for unknowns.
//! - **Reflection Engine**: triggers over a rolling performance window, a
//!   pure analyzer, and a monotonic proposal state machine with change
//!   history.
//! - **Self-Description Assembler**: dynamic identity rendering, token
//!   budget slots, and A/B-tested prompt variants.
//! - **Safety Envelope**: identity anchor (soul signature), vitals guard,
//!   compiled-once adversarial filter, and a sealed core with emergency
//!   lockdown.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use anima_core::prelude::*;
//!
//! let mut runtime = CognitiveRuntime::new(CoreConfig::default())?;
//! runtime.start();
//!
//! // Submit guarded external work
//! let id = runtime.submit_guarded(
//!     "summarize the logs",
//!     Box::new(|| Box::pin(async { Ok(serde_json::json!("done")) })),
//!     TaskPriority::High,
//! )?;
//!
//! // Assemble a prompt from the current self-state
//! let prompt = runtime.assemble_prompt(&AssembleRequest {
//!     user_message: "what happened overnight?".into(),
//!     ..Default::default()
//! });
//! ```
//!
//! The core exposes no CLI and no network surface; callers embed it and
//! wire their own front-ends against the event bus.

// ============================================================================
// MODULES
// ============================================================================

pub mod assembler;
pub mod body;
pub mod capability;
pub mod clock;
pub mod config;
pub mod confidence;
pub mod error;
pub mod events;
pub mod hormones;
pub mod memory;
pub mod reflection;
pub mod runtime;
pub mod safety;
pub mod scheduler;
pub mod snapshot;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use error::{CoreError, Result};

pub use clock::{jittered, Clock, MetricsProbe, ResourceSample};

pub use events::{Event, EventBus, EventPayload, Topic};

pub use hormones::{
    HormoneAdvice, HormoneConfig, HormoneEvent, HormoneField, HormoneSnapshot, HormoneType,
    TaskRecommendation,
};

pub use body::{BodySchema, EnvironmentInfo, ProcessIdentity};

pub use confidence::{
    BetaDistribution, Comparison, ConfidenceEntry, ConfidenceOverview, ConfidenceStore,
};

pub use memory::{
    next_review_interval_hours, retention, salience, should_forget, MaintenanceReport,
    MemoryConfig, MemoryPayload, MemoryQuery, MemoryRecord, MemoryStats, MemoryStore, MemoryType,
    RecordOptions, RetrievalCue, RetrievalWeights, ScoredMemory,
};

pub use capability::{
    Capability, CapabilityKind, CapabilityRegistry, LoadPriority, UsageStats,
};

pub use scheduler::{
    admit, CancelHandle, QueueClass, Scheduler, SchedulerConfig, Task, TaskClosure, TaskFuture,
    TaskOutput, TaskPriority, TaskQueue,
};

pub use reflection::{
    analyze, Analysis, ApprovalMode, ChangeRecord, ChangeStatus, ConfigMutator, FiredTrigger,
    Insight, PerformanceWindow, Proposal, ProposalState, ProposedAction, ReflectionConfig,
    ReflectionEngine, RiskLevel, Trend, Trigger, TriggerEngine, TriggerKind, TuningView,
};

pub use assembler::{
    AbConfig, AbOutcome, AssembledPrompt, AssembleRequest, Assembler, AssemblerConfig,
    BudgetFractions, BudgetSlot, CharEstimator, IdentityState, PromptVariant, TokenBudget,
    TokenEstimator, VariantManager, VariantState,
};

pub use safety::{
    AdversarialFilter, AttackCategory, EntropyVector, FilterAction, FullCheck, IdentityAnchor,
    InspectionResult, LayerReport, SacredCore, SacredFn, SafetyConfig, SafetyEnvelope,
    Sensitivity, VitalsGuard, Violation,
};

pub use snapshot::{SnapshotStore, SNAPSHOT_SCHEMA_VERSION};

pub use config::{BusConfig, CoreConfig, SnapshotConfig};

pub use runtime::CognitiveRuntime;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AssembledPrompt, AssembleRequest, Capability, CapabilityKind, CognitiveRuntime,
        ConfidenceStore, CoreConfig, CoreError, EventBus, HormoneField, HormoneType,
        MemoryQuery, MemoryStore, MemoryType, RecordOptions, Result, RetrievalCue, Scheduler,
        TaskPriority, Topic,
    };
}
