//! Proposals and Change History
//!
//! A proposal is a state-machine-governed intent to alter configuration.
//! Transitions are monotonic; terminal states never transition again, and a
//! rejected proposal can never execute. Every executed action leaves a
//! change-history entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::triggers::TriggerKind;
use crate::error::{CoreError, Result};

// ============================================================================
// RISK AND APPROVAL
// ============================================================================

/// Risk classification of a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Reversible tuning with bounded blast radius
    Low,
    /// Behavior-visible change
    Medium,
    /// Changes how changes are made
    High,
}

impl RiskLevel {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// How proposals get approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Approve low and medium risk automatically; queue high risk
    #[default]
    Auto,
    /// Approve only low risk automatically; queue the rest
    Conservative,
    /// Queue everything for human acknowledgement
    Human,
}

impl ApprovalMode {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalMode::Auto => "auto",
            ApprovalMode::Conservative => "conservative",
            ApprovalMode::Human => "human",
        }
    }

    /// Parse from string name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(ApprovalMode::Auto),
            "conservative" => Some(ApprovalMode::Conservative),
            "human" => Some(ApprovalMode::Human),
            _ => None,
        }
    }
}

// ============================================================================
// STATES
// ============================================================================

/// Proposal lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    /// Created, not yet routed by the approval policy
    Pending,
    /// Waiting for human acknowledgement
    Queued,
    /// Cleared to execute
    Approved,
    /// Terminal: declined
    Rejected,
    /// Terminal: applied, change history has matching entries
    Executed,
    /// Terminal: execution errored
    Failed,
}

impl ProposalState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Rejected | ProposalState::Executed | ProposalState::Failed
        )
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(&self, to: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Queued)
                | (Pending, Rejected)
                | (Queued, Approved)
                | (Queued, Rejected)
                | (Approved, Executed)
                | (Approved, Failed)
        )
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Queued => "queued",
            ProposalState::Approved => "approved",
            ProposalState::Rejected => "rejected",
            ProposalState::Executed => "executed",
            ProposalState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INSIGHTS AND ACTIONS
// ============================================================================

/// An analyzer finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    /// What was observed
    pub summary: String,
    /// Category slug ("latency", "errors", "memory", "prompt")
    pub category: String,
    /// Analyzer confidence in [0, 1]
    pub confidence: f64,
}

/// A concrete configuration change the analyzer wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    /// Unique identifier
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Risk level
    pub risk: RiskLevel,
    /// Expected impact description
    pub expected_impact: String,
    /// Dotted config path this action mutates
    pub target: String,
    /// Value at analysis time
    pub current: serde_json::Value,
    /// Proposed value
    pub proposed: serde_json::Value,
}

impl ProposedAction {
    /// Build an action with a fresh id.
    pub fn new(
        description: &str,
        risk: RiskLevel,
        expected_impact: &str,
        target: &str,
        current: serde_json::Value,
        proposed: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            risk,
            expected_impact: expected_impact.to_string(),
            target: target.to_string(),
            current,
            proposed,
        }
    }
}

// ============================================================================
// PROPOSAL
// ============================================================================

/// A reflection-generated proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Unique identifier
    pub id: String,
    /// What kind of trigger produced it
    pub trigger_kind: TriggerKind,
    /// The trigger instance
    pub trigger_id: String,
    /// Analyzer insights
    pub insights: Vec<Insight>,
    /// Proposed actions
    pub actions: Vec<ProposedAction>,
    /// Approval mode in force at creation
    pub approval_mode: ApprovalMode,
    /// Lifecycle state
    pub state: ProposalState,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Build a pending proposal.
    pub fn new(
        trigger_kind: TriggerKind,
        trigger_id: &str,
        insights: Vec<Insight>,
        actions: Vec<ProposedAction>,
        approval_mode: ApprovalMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            trigger_kind,
            trigger_id: trigger_id.to_string(),
            insights,
            actions,
            approval_mode,
            state: ProposalState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Highest risk across the actions (Low when empty).
    pub fn max_risk(&self) -> RiskLevel {
        self.actions
            .iter()
            .map(|a| a.risk)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    /// Transition to a new state, enforcing monotonicity.
    pub fn transition(&mut self, to: ProposalState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(CoreError::Validation(format!(
                "illegal proposal transition {} -> {}",
                self.state, to
            )));
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// CHANGE HISTORY
// ============================================================================

/// Outcome of applying one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// The mutator accepted the change
    Applied,
    /// The mutator errored; `error` holds the message
    Failed,
}

/// One entry in the change history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Unique identifier
    pub id: String,
    /// Proposal that produced this change
    pub proposal_id: String,
    /// Action within the proposal
    pub action_id: String,
    /// Config path mutated
    pub target: String,
    /// Value before
    pub before: serde_json::Value,
    /// Value after (the proposed value on success)
    pub after: serde_json::Value,
    /// Why (action description)
    pub reason: String,
    /// Trigger that started the pass
    pub trigger_id: String,
    /// When the change was applied
    pub at: DateTime<Utc>,
    /// Applied or failed
    pub status: ChangeStatus,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal_with_risk(risk: RiskLevel) -> Proposal {
        Proposal::new(
            TriggerKind::Scheduled,
            "trigger-1",
            vec![],
            vec![ProposedAction::new(
                "tune",
                risk,
                "smaller prompts",
                "assembler.max_recent_memories",
                serde_json::json!(10),
                serde_json::json!(5),
            )],
            ApprovalMode::Auto,
        )
    }

    #[test]
    fn test_legal_lifecycle_paths() {
        let mut p = proposal_with_risk(RiskLevel::Low);
        p.transition(ProposalState::Approved).unwrap();
        p.transition(ProposalState::Executed).unwrap();
        assert!(p.state.is_terminal());

        let mut p = proposal_with_risk(RiskLevel::High);
        p.transition(ProposalState::Queued).unwrap();
        p.transition(ProposalState::Rejected).unwrap();
        assert!(p.state.is_terminal());
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        let mut p = proposal_with_risk(RiskLevel::Low);
        p.transition(ProposalState::Approved).unwrap();
        p.transition(ProposalState::Executed).unwrap();
        for to in [
            ProposalState::Pending,
            ProposalState::Approved,
            ProposalState::Failed,
            ProposalState::Rejected,
        ] {
            assert!(p.transition(to).is_err());
        }
    }

    #[test]
    fn test_rejected_never_executes() {
        let mut p = proposal_with_risk(RiskLevel::Medium);
        p.transition(ProposalState::Queued).unwrap();
        p.transition(ProposalState::Rejected).unwrap();
        assert!(p.transition(ProposalState::Approved).is_err());
        assert!(p.transition(ProposalState::Executed).is_err());
    }

    #[test]
    fn test_max_risk() {
        let mut p = proposal_with_risk(RiskLevel::Low);
        p.actions.push(ProposedAction::new(
            "risky",
            RiskLevel::High,
            "mode shift",
            "reflection.approval_mode",
            serde_json::json!("auto"),
            serde_json::json!("conservative"),
        ));
        assert_eq!(p.max_risk(), RiskLevel::High);
    }

    #[test]
    fn test_approval_mode_parsing() {
        assert_eq!(ApprovalMode::from_name("AUTO"), Some(ApprovalMode::Auto));
        assert_eq!(
            ApprovalMode::from_name("conservative"),
            Some(ApprovalMode::Conservative)
        );
        assert_eq!(ApprovalMode::from_name("nope"), None);
    }
}
