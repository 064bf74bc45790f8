//! Self-Description Assembler
//!
//! Builds the system prompt for every model call: a dynamic identity
//! rendered from the body schema, hormone snapshot and confidence overview;
//! capability and guidance sections; recent reflective insights; and
//! memory candidates packed under the token budget. Over-budget prompts are
//! trimmed by a fixed optimization ladder, never by silent truncation.

mod budget;
mod variant;

pub use budget::{
    BudgetFractions, BudgetSlot, CharEstimator, TokenBudget, TokenEstimator,
};
pub use variant::{
    two_proportion_z, AbConfig, AbOutcome, PromptVariant, VariantManager, VariantPerformance,
    VariantState,
};

use serde::{Deserialize, Serialize};

use crate::body::BodySchema;
use crate::confidence::ConfidenceOverview;
use crate::error::Result;
use crate::events::EventBus;
use crate::hormones::HormoneSnapshot;
use crate::memory::{MemoryRecord, ScoredMemory};

/// Namespace for the system preamble variant.
pub const NS_SYSTEM_PROMPT: &str = "system-prompt";

/// Namespace for the self-description variant.
pub const NS_SELF_DESCRIPTION: &str = "self-description";

/// Baseline system preamble used when no variant is active.
const BASELINE_SYSTEM: &str =
    "You are a self-reflective agent. Ground every answer in your recorded \
     memories and current capabilities; say so when you are unsure.";

/// Baseline self-description template used when no variant is active.
const BASELINE_SELF: &str = "Current state: {state}. {body}. Hormone levels: {mood}.";

/// Relevance floor below which retrieved memories are dropped first.
const RELEVANCE_FLOOR: f64 = 0.4;

// ============================================================================
// CONFIG AND REQUEST TYPES
// ============================================================================

/// Configuration for the assembler.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Model context window in tokens
    pub max_context_window: usize,
    /// Budget slot fractions
    pub fractions: BudgetFractions,
    /// Confidence threshold splitting strong from weak capabilities
    pub min_confidence: f64,
    /// Working-memory capacity: recent memories packed per prompt
    pub max_recent_memories: usize,
    /// Reflective insights rendered per prompt
    pub max_insights: usize,
    /// Whether insight compression is always applied
    pub prompt_compression: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_context_window: 8192,
            fractions: BudgetFractions::default(),
            min_confidence: 0.5,
            max_recent_memories: 10,
            max_insights: 5,
            prompt_compression: false,
        }
    }
}

/// Identity template selector, chosen from the confidence overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityState {
    /// Low uncertainty, decent confidence
    Confident,
    /// Still accumulating evidence
    Learning,
    /// At least one high-risk capability
    Uncertain,
    /// Overall uncertainty too high; takes priority over everything
    Stressed,
}

impl IdentityState {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityState::Confident => "confident",
            IdentityState::Learning => "learning",
            IdentityState::Uncertain => "uncertain",
            IdentityState::Stressed => "stressed",
        }
    }

    /// Choose the identity state. Stressed takes priority, then high-risk
    /// capabilities, then the confidence split.
    pub fn choose(overview: &ConfidenceOverview) -> Self {
        if overview.overall_uncertainty > 0.20 {
            IdentityState::Stressed
        } else if !overview.high_risk.is_empty() {
            IdentityState::Uncertain
        } else if overview.average_confidence < 0.5 {
            IdentityState::Learning
        } else if overview.overall_uncertainty <= 0.15 {
            IdentityState::Confident
        } else {
            IdentityState::Learning
        }
    }
}

/// Inputs to one assemble call.
#[derive(Debug, Clone, Default)]
pub struct AssembleRequest {
    /// The user message
    pub user_message: String,
    /// Recent working memories, newest last
    pub recent_memories: Vec<MemoryRecord>,
    /// Retrieved memories, already relevance-scored
    pub retrieved: Vec<ScoredMemory>,
    /// Rolling conversation summary
    pub recent_summary: Option<String>,
    /// Topic or intent hint
    pub topic_hint: Option<String>,
}

/// Output of one assemble call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledPrompt {
    /// The full prompt text
    pub prompt_text: String,
    /// Estimated token count
    pub total_tokens: usize,
    /// Whether the working area was hard-truncated
    pub truncated: bool,
    /// Optimization steps applied, in order
    pub optimizations_applied: Vec<String>,
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// The self-description assembler.
pub struct Assembler {
    config: AssemblerConfig,
    budget: TokenBudget,
    variants: VariantManager,
    estimator: Box<dyn TokenEstimator>,
}

impl Assembler {
    /// Create an assembler with the chars/4 estimator.
    pub fn new(config: AssemblerConfig, ab: AbConfig, bus: EventBus) -> Result<Self> {
        let budget = TokenBudget::new(config.max_context_window, config.fractions)?;
        Ok(Self {
            config,
            budget,
            variants: VariantManager::new(ab, bus),
            estimator: Box::new(CharEstimator),
        })
    }

    /// Install a real tokenizer.
    pub fn set_estimator(&mut self, estimator: Box<dyn TokenEstimator>) {
        self.estimator = estimator;
    }

    /// Current configuration.
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// The token budget (hot-swappable).
    pub fn budget_mut(&mut self) -> &mut TokenBudget {
        &mut self.budget
    }

    /// The variant manager.
    pub fn variants(&self) -> &VariantManager {
        &self.variants
    }

    /// The variant manager, mutable.
    pub fn variants_mut(&mut self) -> &mut VariantManager {
        &mut self.variants
    }

    /// Hot-reloadable: working-memory capacity.
    pub fn set_max_recent_memories(&mut self, max: usize) {
        self.config.max_recent_memories = max.max(1);
    }

    /// Hot-reloadable: always-compress-insights flag.
    pub fn set_prompt_compression(&mut self, enabled: bool) {
        self.config.prompt_compression = enabled;
    }

    /// Hot-reloadable: context window.
    pub fn set_max_context_window(&mut self, window: usize) {
        self.config.max_context_window = window.max(1);
        self.budget.set_context_window(self.config.max_context_window);
    }

    /// Assemble the prompt.
    pub fn assemble(
        &self,
        request: &AssembleRequest,
        body: &BodySchema,
        hormones: &HormoneSnapshot,
        confidence: &ConfidenceOverview,
        insights: &[String],
    ) -> AssembledPrompt {
        let state = IdentityState::choose(confidence);

        let system_section = self
            .variants
            .active(NS_SYSTEM_PROMPT)
            .map(|v| v.template.clone())
            .unwrap_or_else(|| BASELINE_SYSTEM.to_string());

        let identity_section = self.render_identity(state, body, hormones);
        let capability_section = render_capabilities(confidence, self.config.min_confidence);
        let guidance_section = render_guidance(state, confidence);

        let mut recent: Vec<&MemoryRecord> = request
            .recent_memories
            .iter()
            .take(self.config.max_recent_memories)
            .collect();
        let mut retrieved: Vec<&ScoredMemory> = request.retrieved.iter().collect();
        let mut insights: Vec<String> = insights
            .iter()
            .take(self.config.max_insights)
            .cloned()
            .collect();
        if self.config.prompt_compression {
            insights = insights.iter().map(|i| headline(i)).collect();
        }

        let mut optimizations: Vec<String> = vec![];
        let mut truncated = false;
        let mut working_limit: Option<usize> = None;
        let usable = self.budget.usable();

        // Optimization ladder: rebuild, and trim one rung at a time until
        // the prompt fits or nothing is left to trim.
        let prompt_text = loop {
            let text = compose(
                &system_section,
                &identity_section,
                &capability_section,
                &guidance_section,
                &insights,
                &recent,
                &retrieved,
                request,
                working_limit,
            );
            let total = self.estimator.estimate(&text);
            if total <= usable {
                break text;
            }

            if retrieved.iter().any(|s| s.score < RELEVANCE_FLOOR) {
                retrieved.retain(|s| s.score >= RELEVANCE_FLOOR);
                optimizations.push("drop-low-relevance-retrieved".to_string());
                continue;
            }
            if !recent.is_empty() {
                // Oldest first in the input ordering.
                recent.remove(0);
                if !optimizations.iter().any(|o| o == "drop-oldest-recent") {
                    optimizations.push("drop-oldest-recent".to_string());
                }
                continue;
            }
            if insights.iter().any(|i| i.len() > 80) {
                insights = insights.iter().map(|i| headline(i)).collect();
                optimizations.push("compress-insights".to_string());
                continue;
            }
            if working_limit.is_none() {
                // Last resort: hard-truncate the working area.
                let working_tokens = self.budget.tokens_for(BudgetSlot::Working);
                working_limit = Some(working_tokens.saturating_mul(4));
                optimizations.push("truncate-working".to_string());
                truncated = true;
                continue;
            }
            // Nothing left to trim; ship what we have.
            break text;
        };

        let total_tokens = self.estimator.estimate(&prompt_text);
        AssembledPrompt {
            prompt_text,
            total_tokens,
            truncated,
            optimizations_applied: optimizations,
        }
    }

    fn render_identity(
        &self,
        state: IdentityState,
        body: &BodySchema,
        hormones: &HormoneSnapshot,
    ) -> String {
        let template = self
            .variants
            .active(NS_SELF_DESCRIPTION)
            .map(|v| v.template.clone())
            .unwrap_or_else(|| BASELINE_SELF.to_string());

        let mood = format!(
            "alert {:.2}, stress {:.2}, reward {:.2}, stability {:.2}, curiosity {:.2}, fatigue {:.2}",
            hormones.alert,
            hormones.stress,
            hormones.reward,
            hormones.stability,
            hormones.curiosity,
            hormones.fatigue
        );
        let tone = match state {
            IdentityState::Confident => {
                "Operating with well-calibrated capabilities."
            }
            IdentityState::Learning => {
                "Still building evidence about capability reliability; prefer verified paths."
            }
            IdentityState::Uncertain => {
                "Some capabilities are unreliable; route around them where possible."
            }
            IdentityState::Stressed => {
                "Capability estimates are volatile; act conservatively and verify results."
            }
        };

        let rendered = template
            .replace("{state}", state.as_str())
            .replace("{body}", &body.describe())
            .replace("{mood}", &mood);
        format!("{rendered}\n{tone}")
    }
}

// ============================================================================
// SECTION RENDERING
// ============================================================================

fn render_capabilities(overview: &ConfidenceOverview, _min_confidence: f64) -> String {
    let mut section = String::from("Capabilities:\n");
    if overview.strong.is_empty() && overview.weak.is_empty() {
        section.push_str("- none recorded yet\n");
        return section;
    }
    for (name, conf) in &overview.strong {
        section.push_str(&format!("- {name}: reliable ({:.0}%)\n", conf * 100.0));
    }
    for (name, conf) in &overview.weak {
        section.push_str(&format!("- {name}: unreliable ({:.0}%)\n", conf * 100.0));
    }
    section
}

fn render_guidance(_state: IdentityState, overview: &ConfidenceOverview) -> String {
    let mut guidance =
        String::from("Guidance: answer from memory where possible; cite capability limits.");
    if overview.overall_uncertainty > 0.15 {
        guidance.push_str(" Uncertainty is elevated: double-check tool outputs before trusting them.");
    }
    if !overview.weak.is_empty() {
        guidance.push_str(" Avoid weak capabilities unless no alternative exists.");
    }
    guidance
}

#[allow(clippy::too_many_arguments)]
fn compose(
    system: &str,
    identity: &str,
    capabilities: &str,
    guidance: &str,
    insights: &[String],
    recent: &[&MemoryRecord],
    retrieved: &[&ScoredMemory],
    request: &AssembleRequest,
    working_char_limit: Option<usize>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(system);
    prompt.push_str("\n\n");
    prompt.push_str(identity);
    prompt.push_str("\n\n");
    prompt.push_str(capabilities);
    prompt.push('\n');
    prompt.push_str(guidance);
    prompt.push_str("\n\n");

    if !insights.is_empty() {
        prompt.push_str("Recent insights:\n");
        for insight in insights {
            prompt.push_str(&format!("- {insight}\n"));
        }
        prompt.push('\n');
    }

    if !retrieved.is_empty() || !recent.is_empty() {
        prompt.push_str("Relevant memories:\n");
        for scored in retrieved {
            prompt.push_str(&format!(
                "- [{:.2}] {}\n",
                scored.score,
                scored.record.payload.text()
            ));
        }
        for record in recent {
            prompt.push_str(&format!("- {}\n", record.payload.text()));
        }
        prompt.push('\n');
    }

    let mut working = String::new();
    if let Some(summary) = &request.recent_summary {
        working.push_str(&format!("Conversation so far: {summary}\n"));
    }
    if let Some(topic) = &request.topic_hint {
        working.push_str(&format!("Topic: {topic}\n"));
    }
    working.push_str(&request.user_message);

    if let Some(limit) = working_char_limit {
        if working.len() > limit {
            let cut = working
                .char_indices()
                .take_while(|(i, _)| *i < limit.saturating_sub(16))
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            working.truncate(cut);
            working.push_str("\n[truncated]");
        }
    }
    prompt.push_str(&working);
    prompt
}

/// First sentence (or first 80 chars) of an insight.
fn headline(insight: &str) -> String {
    let first = insight.split(['.', '\n']).next().unwrap_or(insight).trim();
    let mut head: String = first.chars().take(80).collect();
    if head.len() < first.len() {
        head.push('…');
    }
    head
}
