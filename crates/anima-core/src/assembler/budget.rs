//! Token Budget
//!
//! Five slots carved out of the model context window as fractions summing
//! to at most 1. Fractions can be hot-swapped; the next assemble call
//! honors the new split (no in-flight reconfiguration).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ============================================================================
// SLOTS
// ============================================================================

/// Budget slot names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetSlot {
    /// System preamble
    System,
    /// Dynamic self-description
    SelfDescription,
    /// Retrieved and recent memories
    Memory,
    /// User message and working context
    Working,
    /// Head-room never allocated
    Reserve,
}

/// Slot fractions of the context window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetFractions {
    /// System preamble share
    pub system: f64,
    /// Self-description share
    pub self_description: f64,
    /// Memory share
    pub memory: f64,
    /// Working-area share
    pub working: f64,
    /// Reserved head-room share
    pub reserve: f64,
}

impl Default for BudgetFractions {
    fn default() -> Self {
        Self {
            system: 0.10,
            self_description: 0.20,
            memory: 0.25,
            working: 0.35,
            reserve: 0.10,
        }
    }
}

impl BudgetFractions {
    /// Sum of all five fractions.
    pub fn sum(&self) -> f64 {
        self.system + self.self_description + self.memory + self.working + self.reserve
    }

    /// Validate: every fraction non-negative, total at most 1 (+epsilon).
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("system", self.system),
            ("self", self.self_description),
            ("memory", self.memory),
            ("working", self.working),
            ("reserve", self.reserve),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::Validation(format!(
                    "budget fraction '{name}' must be non-negative, got {value}"
                )));
            }
        }
        if self.sum() > 1.0 + 1e-9 {
            return Err(CoreError::Validation(format!(
                "budget fractions sum to {:.3}, must be <= 1",
                self.sum()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// BUDGET
// ============================================================================

/// The token budget manager.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    context_window: usize,
    fractions: BudgetFractions,
}

impl TokenBudget {
    /// Budget over a context window.
    pub fn new(context_window: usize, fractions: BudgetFractions) -> Result<Self> {
        fractions.validate()?;
        Ok(Self {
            context_window: context_window.max(1),
            fractions,
        })
    }

    /// The full context window.
    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Current fractions.
    pub fn fractions(&self) -> BudgetFractions {
        self.fractions
    }

    /// Hot swap the fractions; takes effect on the next assemble call.
    pub fn set_fractions(&mut self, fractions: BudgetFractions) -> Result<()> {
        fractions.validate()?;
        self.fractions = fractions;
        Ok(())
    }

    /// Hot swap the context window.
    pub fn set_context_window(&mut self, window: usize) {
        self.context_window = window.max(1);
    }

    /// Tokens allocated to one slot.
    pub fn tokens_for(&self, slot: BudgetSlot) -> usize {
        let fraction = match slot {
            BudgetSlot::System => self.fractions.system,
            BudgetSlot::SelfDescription => self.fractions.self_description,
            BudgetSlot::Memory => self.fractions.memory,
            BudgetSlot::Working => self.fractions.working,
            BudgetSlot::Reserve => self.fractions.reserve,
        };
        (self.context_window as f64 * fraction).floor() as usize
    }

    /// Usable tokens: everything except the reserve.
    pub fn usable(&self) -> usize {
        self.context_window - self.tokens_for(BudgetSlot::Reserve)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            context_window: 8192,
            fractions: BudgetFractions::default(),
        }
    }
}

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Estimates token counts for budget accounting.
pub trait TokenEstimator: Send + Sync {
    /// Estimated tokens for a text.
    fn estimate(&self, text: &str) -> usize;
}

/// The chars/4 heuristic. Crude but provider-neutral; callers install a
/// real tokenizer when they have one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenEstimator for CharEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fractions_fill_the_window() {
        let budget = TokenBudget::default();
        assert_eq!(budget.tokens_for(BudgetSlot::System), 819);
        assert_eq!(budget.tokens_for(BudgetSlot::SelfDescription), 1638);
        assert_eq!(budget.tokens_for(BudgetSlot::Memory), 2048);
        assert_eq!(budget.tokens_for(BudgetSlot::Working), 2867);
        assert_eq!(budget.tokens_for(BudgetSlot::Reserve), 819);
        assert!((budget.fractions().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_oversubscribed_fractions_rejected() {
        let bad = BudgetFractions {
            system: 0.5,
            self_description: 0.5,
            memory: 0.5,
            working: 0.0,
            reserve: 0.0,
        };
        assert!(TokenBudget::new(8192, bad).is_err());
    }

    #[test]
    fn test_negative_fraction_rejected() {
        let bad = BudgetFractions {
            system: -0.1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_hot_swap_takes_effect() {
        let mut budget = TokenBudget::default();
        let before = budget.tokens_for(BudgetSlot::Working);
        budget
            .set_fractions(BudgetFractions {
                system: 0.1,
                self_description: 0.1,
                memory: 0.1,
                working: 0.6,
                reserve: 0.1,
            })
            .unwrap();
        assert!(budget.tokens_for(BudgetSlot::Working) > before);
    }

    #[test]
    fn test_char_estimator() {
        let estimator = CharEstimator;
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abcd"), 1);
        assert_eq!(estimator.estimate("abcde"), 2);
    }
}
