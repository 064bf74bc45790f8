//! Reflection Engine
//!
//! Watches the runtime's own performance, fires triggers, analyzes, and
//! proposes configuration changes. Proposals flow through a monotonic state
//! machine gated by the approval policy; executed changes are written to a
//! change history with before/after values.

mod analyzer;
mod proposal;
mod triggers;
mod window;

pub use analyzer::{analyze, Analysis, TuningView};
pub use proposal::{
    ApprovalMode, ChangeRecord, ChangeStatus, Insight, Proposal, ProposalState, ProposedAction,
    RiskLevel,
};
pub use triggers::{FiredTrigger, Trigger, TriggerCondition, TriggerEngine, TriggerKind};
pub use window::{PerfSample, PerformanceWindow, Trend, DEFAULT_WINDOW_SIZE};

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventPayload, Topic};
use crate::memory::MemoryStats;

/// Prompt-size samples kept for the analyzer.
const PROMPT_SIZE_HISTORY: usize = 32;

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for the reflection engine.
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    /// Scheduled reflection cadence
    pub schedule_interval_ms: u64,
    /// Trigger checker cadence
    pub check_interval_ms: u64,
    /// Approval policy
    pub approval_mode: ApprovalMode,
    /// Performance ring size
    pub window_size: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            schedule_interval_ms: 1_800_000,
            check_interval_ms: 30_000,
            approval_mode: ApprovalMode::Auto,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

// ============================================================================
// CONFIG MUTATOR
// ============================================================================

/// Applies an approved action to a live configuration target.
///
/// Implemented by the composition root; returns the value that was in place
/// before the change.
pub trait ConfigMutator {
    /// Apply `value` at the dotted config path `target`, returning the
    /// previous value.
    fn apply(&mut self, target: &str, value: &serde_json::Value) -> Result<serde_json::Value>;
}

// ============================================================================
// ENGINE
// ============================================================================

/// The reflection engine.
pub struct ReflectionEngine {
    config: ReflectionConfig,
    window: PerformanceWindow,
    triggers: TriggerEngine,
    proposals: Vec<Proposal>,
    history: Vec<ChangeRecord>,
    prompt_tokens: VecDeque<usize>,
    bus: EventBus,
}

impl ReflectionEngine {
    /// Engine with the built-in trigger set.
    pub fn new(config: ReflectionConfig, bus: EventBus) -> Self {
        let triggers =
            TriggerEngine::with_builtins(Duration::from_millis(config.schedule_interval_ms));
        Self {
            window: PerformanceWindow::new(config.window_size),
            triggers,
            proposals: vec![],
            history: vec![],
            prompt_tokens: VecDeque::with_capacity(PROMPT_SIZE_HISTORY),
            config,
            bus,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &ReflectionConfig {
        &self.config
    }

    /// Hot-reloadable: approval policy.
    pub fn set_approval_mode(&mut self, mode: ApprovalMode) {
        self.config.approval_mode = mode;
    }

    /// Append a performance sample (task or capability outcome).
    pub fn record_sample(&mut self, response_ms: f64, success: bool) {
        self.window.record(response_ms, success);
    }

    /// Append an observed assembled-prompt size.
    pub fn record_prompt_tokens(&mut self, tokens: usize) {
        self.prompt_tokens.push_back(tokens);
        while self.prompt_tokens.len() > PROMPT_SIZE_HISTORY {
            self.prompt_tokens.pop_front();
        }
    }

    /// Read access to the performance window.
    pub fn window(&self) -> &PerformanceWindow {
        &self.window
    }

    /// All proposals, oldest first.
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Change history, oldest first.
    pub fn history(&self) -> &[ChangeRecord] {
        &self.history
    }

    /// Restore proposals and history from a snapshot.
    pub fn restore(&mut self, proposals: Vec<Proposal>, history: Vec<ChangeRecord>) {
        self.proposals = proposals;
        self.history = history;
    }

    // ------------------------------------------------------------------
    // Trigger checking and proposal creation
    // ------------------------------------------------------------------

    /// Run one trigger check pass; returns ids of proposals created.
    pub fn check(
        &mut self,
        now: DateTime<Utc>,
        memory_stats: &MemoryStats,
        tuning: &TuningView,
    ) -> Vec<String> {
        let fired = self.triggers.check(now, &self.window);
        let mut created = Vec::new();
        for trigger in fired {
            self.bus.publish(
                Topic::ReflectionFired,
                EventPayload::Reflection {
                    id: trigger.trigger_id.clone(),
                    detail: trigger.kind.as_str().to_string(),
                },
            );
            if let Some(id) = self.reflect_on(&trigger, memory_stats, tuning) {
                created.push(id);
            }
        }
        created
    }

    /// Fire a manual reflection pass immediately.
    pub fn reflect_now(
        &mut self,
        reason: &str,
        memory_stats: &MemoryStats,
        tuning: &TuningView,
    ) -> Option<String> {
        let trigger = self.triggers.fire_manual(Utc::now(), reason);
        self.bus.publish(
            Topic::ReflectionFired,
            EventPayload::Reflection {
                id: trigger.trigger_id.clone(),
                detail: trigger.kind.as_str().to_string(),
            },
        );
        self.reflect_on(&trigger, memory_stats, tuning)
    }

    fn reflect_on(
        &mut self,
        trigger: &FiredTrigger,
        memory_stats: &MemoryStats,
        tuning: &TuningView,
    ) -> Option<String> {
        let tokens: Vec<usize> = self.prompt_tokens.iter().copied().collect();
        let analysis = analyze(&self.window, memory_stats, &tokens, tuning);
        if analysis.is_empty() {
            return None;
        }

        let mut proposal = Proposal::new(
            trigger.kind,
            &trigger.trigger_id,
            analysis.insights,
            analysis.actions,
            self.config.approval_mode,
        );
        self.route(&mut proposal);

        let id = proposal.id.clone();
        self.bus.publish(
            Topic::ReflectionProposed,
            EventPayload::Reflection {
                id: id.clone(),
                detail: proposal.state.as_str().to_string(),
            },
        );
        tracing::info!(
            proposal = %id,
            state = %proposal.state,
            actions = proposal.actions.len(),
            "reflection proposal created"
        );
        self.proposals.push(proposal);
        Some(id)
    }

    /// Route a fresh proposal per the approval policy.
    fn route(&self, proposal: &mut Proposal) {
        let risk = proposal.max_risk();
        let to = match self.config.approval_mode {
            ApprovalMode::Auto if risk <= RiskLevel::Medium => ProposalState::Approved,
            ApprovalMode::Conservative if risk == RiskLevel::Low => ProposalState::Approved,
            _ => ProposalState::Queued,
        };
        // Pending -> Approved/Queued is always legal.
        proposal.transition(to).expect("routing from pending");
    }

    // ------------------------------------------------------------------
    // Human acknowledgement
    // ------------------------------------------------------------------

    /// Approve a queued proposal.
    pub fn approve(&mut self, proposal_id: &str) -> Result<()> {
        self.ack(proposal_id, ProposalState::Approved)
    }

    /// Reject a queued proposal.
    pub fn reject(&mut self, proposal_id: &str) -> Result<()> {
        self.ack(proposal_id, ProposalState::Rejected)
    }

    fn ack(&mut self, proposal_id: &str, to: ProposalState) -> Result<()> {
        let proposal = self
            .proposals
            .iter_mut()
            .find(|p| p.id == proposal_id)
            .ok_or_else(|| CoreError::Validation(format!("unknown proposal '{proposal_id}'")))?;
        proposal.transition(to)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute all approved proposals FIFO, applying each action through the
    /// mutator. Returns the change records written this pass.
    pub fn execute_approved(&mut self, mutator: &mut dyn ConfigMutator) -> Vec<ChangeRecord> {
        let mut written = Vec::new();

        for proposal in &mut self.proposals {
            if proposal.state != ProposalState::Approved {
                continue;
            }

            let mut all_applied = true;
            for action in &proposal.actions {
                let record = match mutator.apply(&action.target, &action.proposed) {
                    Ok(before) => ChangeRecord {
                        id: Uuid::new_v4().to_string(),
                        proposal_id: proposal.id.clone(),
                        action_id: action.id.clone(),
                        target: action.target.clone(),
                        before,
                        after: action.proposed.clone(),
                        reason: action.description.clone(),
                        trigger_id: proposal.trigger_id.clone(),
                        at: Utc::now(),
                        status: ChangeStatus::Applied,
                        error: None,
                    },
                    Err(e) => {
                        all_applied = false;
                        ChangeRecord {
                            id: Uuid::new_v4().to_string(),
                            proposal_id: proposal.id.clone(),
                            action_id: action.id.clone(),
                            target: action.target.clone(),
                            before: action.current.clone(),
                            after: action.proposed.clone(),
                            reason: action.description.clone(),
                            trigger_id: proposal.trigger_id.clone(),
                            at: Utc::now(),
                            status: ChangeStatus::Failed,
                            error: Some(e.to_string()),
                        }
                    }
                };
                written.push(record);
            }

            let to = if all_applied {
                ProposalState::Executed
            } else {
                ProposalState::Failed
            };
            // Approved -> Executed/Failed is always legal.
            proposal.transition(to).expect("execution from approved");

            self.bus.publish(
                Topic::ReflectionExecuted,
                EventPayload::Reflection {
                    id: proposal.id.clone(),
                    detail: proposal.state.as_str().to_string(),
                },
            );
        }

        self.history.extend(written.clone());
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapMutator {
        values: HashMap<String, serde_json::Value>,
        fail_on: Option<String>,
    }

    impl MapMutator {
        fn new() -> Self {
            let mut values = HashMap::new();
            values.insert(
                "assembler.max_recent_memories".to_string(),
                serde_json::json!(10),
            );
            values.insert(
                "memory.maintenance_interval_ms".to_string(),
                serde_json::json!(60_000),
            );
            Self {
                values,
                fail_on: None,
            }
        }
    }

    impl ConfigMutator for MapMutator {
        fn apply(
            &mut self,
            target: &str,
            value: &serde_json::Value,
        ) -> Result<serde_json::Value> {
            if self.fail_on.as_deref() == Some(target) {
                return Err(CoreError::Validation(format!("cannot mutate {target}")));
            }
            let before = self
                .values
                .get(target)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            self.values.insert(target.to_string(), value.clone());
            Ok(before)
        }
    }

    fn tuning() -> TuningView {
        TuningView {
            max_recent_memories: 10,
            maintenance_interval_ms: 60_000,
            approval_mode: "auto".to_string(),
            prompt_compression: false,
        }
    }

    fn stats_with_backlog(forgettable: usize) -> MemoryStats {
        MemoryStats {
            total: forgettable,
            live: forgettable,
            tombstoned: 0,
            episodic: forgettable,
            semantic: 0,
            procedural: 0,
            reflective: 0,
            average_importance: 0.2,
            average_salience: 0.05,
            forgettable,
        }
    }

    fn engine() -> (ReflectionEngine, EventBus) {
        let bus = EventBus::default();
        (
            ReflectionEngine::new(ReflectionConfig::default(), bus.clone()),
            bus,
        )
    }

    #[test]
    fn test_manual_reflection_creates_and_executes_proposal() {
        let (mut engine, bus) = engine();
        let id = engine
            .reflect_now("operator", &stats_with_backlog(200), &tuning())
            .expect("proposal");

        // Low risk + auto mode: approved immediately.
        let proposal = engine.proposals().iter().find(|p| p.id == id).unwrap();
        assert_eq!(proposal.state, ProposalState::Approved);

        let mut mutator = MapMutator::new();
        let written = engine.execute_approved(&mut mutator);
        assert!(!written.is_empty());
        assert!(written.iter().all(|r| r.status == ChangeStatus::Applied));
        assert_eq!(
            mutator.values["memory.maintenance_interval_ms"],
            serde_json::json!(30_000)
        );

        let proposal = engine.proposals().iter().find(|p| p.id == id).unwrap();
        assert_eq!(proposal.state, ProposalState::Executed);
        // Executed implies matching change-history entries.
        assert!(engine.history().iter().any(|r| r.proposal_id == id));
        assert!(!bus.history_for(Topic::ReflectionExecuted).is_empty());
    }

    #[test]
    fn test_failed_mutation_marks_proposal_failed() {
        let (mut engine, _) = engine();
        let id = engine
            .reflect_now("operator", &stats_with_backlog(200), &tuning())
            .expect("proposal");

        let mut mutator = MapMutator::new();
        mutator.fail_on = Some("memory.maintenance_interval_ms".to_string());
        let written = engine.execute_approved(&mut mutator);
        assert!(written.iter().any(|r| r.status == ChangeStatus::Failed));
        assert!(written
            .iter()
            .filter(|r| r.status == ChangeStatus::Failed)
            .all(|r| r.error.is_some()));

        let proposal = engine.proposals().iter().find(|p| p.id == id).unwrap();
        assert_eq!(proposal.state, ProposalState::Failed);
    }

    #[test]
    fn test_human_mode_queues_everything() {
        let bus = EventBus::default();
        let mut engine = ReflectionEngine::new(
            ReflectionConfig {
                approval_mode: ApprovalMode::Human,
                ..Default::default()
            },
            bus,
        );
        let id = engine
            .reflect_now("operator", &stats_with_backlog(200), &tuning())
            .expect("proposal");
        let proposal = engine.proposals().iter().find(|p| p.id == id).unwrap();
        assert_eq!(proposal.state, ProposalState::Queued);

        // Nothing approved: execution is a no-op.
        let mut mutator = MapMutator::new();
        assert!(engine.execute_approved(&mut mutator).is_empty());

        // Human acks, then execution applies.
        engine.approve(&id).unwrap();
        assert!(!engine.execute_approved(&mut mutator).is_empty());
    }

    #[test]
    fn test_rejected_proposal_never_executes() {
        let bus = EventBus::default();
        let mut engine = ReflectionEngine::new(
            ReflectionConfig {
                approval_mode: ApprovalMode::Human,
                ..Default::default()
            },
            bus,
        );
        let id = engine
            .reflect_now("operator", &stats_with_backlog(200), &tuning())
            .expect("proposal");
        engine.reject(&id).unwrap();

        let mut mutator = MapMutator::new();
        assert!(engine.execute_approved(&mut mutator).is_empty());
        assert!(engine.approve(&id).is_err());
    }

    #[test]
    fn test_conservative_mode_queues_medium_risk() {
        let bus = EventBus::default();
        let mut engine = ReflectionEngine::new(
            ReflectionConfig {
                approval_mode: ApprovalMode::Conservative,
                ..Default::default()
            },
            bus,
        );
        // Drive an elevated error rate: the conservative-mode action is
        // medium risk.
        for i in 0..20 {
            engine.record_sample(50.0, i % 3 != 0);
        }
        let mut tuning = tuning();
        tuning.approval_mode = "conservative".to_string();
        // With mode already conservative the medium-risk action is not
        // proposed; use auto view to force it.
        tuning.approval_mode = "auto".to_string();
        let id = engine
            .reflect_now("operator", &stats_with_backlog(0), &tuning)
            .expect("proposal");
        let proposal = engine.proposals().iter().find(|p| p.id == id).unwrap();
        assert_eq!(proposal.max_risk(), RiskLevel::Medium);
        assert_eq!(proposal.state, ProposalState::Queued);
    }

    #[test]
    fn test_scheduled_trigger_with_healthy_window_creates_no_proposal() {
        let (mut engine, bus) = engine();
        for _ in 0..10 {
            engine.record_sample(50.0, true);
        }
        let created = engine.check(Utc::now(), &stats_with_backlog(0), &tuning());
        // The scheduled trigger fires (cooldown fresh) but analysis is empty.
        assert!(created.is_empty());
        assert!(!bus.history_for(Topic::ReflectionFired).is_empty());
        assert!(bus.history_for(Topic::ReflectionProposed).is_empty());
    }
}
