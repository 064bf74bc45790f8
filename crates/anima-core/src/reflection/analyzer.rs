//! Reflection Analyzer
//!
//! A pure function of the rolling performance window, current memory
//! statistics, and recent prompt sizes. Produces insights plus concrete
//! config-path actions; it never mutates anything itself.

use serde_json::json;

use super::proposal::{Insight, ProposedAction, RiskLevel};
use super::window::PerformanceWindow;
use crate::memory::MemoryStats;

/// Forgettable-record count that makes cleanup worth proposing.
const CLEANUP_BACKLOG: usize = 100;

/// Average prompt size (tokens, recent 5) that reads as inefficiency.
const PROMPT_SIZE_CEILING: f64 = 4000.0;

/// Current values of the knobs the analyzer may propose changing.
#[derive(Debug, Clone)]
pub struct TuningView {
    /// Working-memory capacity (recent memories per prompt)
    pub max_recent_memories: usize,
    /// Memory maintenance cadence
    pub maintenance_interval_ms: u64,
    /// Current approval mode name
    pub approval_mode: String,
    /// Whether prompt compression is on
    pub prompt_compression: bool,
}

/// Analyzer output.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Findings
    pub insights: Vec<Insight>,
    /// Concrete changes
    pub actions: Vec<ProposedAction>,
}

impl Analysis {
    /// Whether the analyzer found anything actionable.
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty() && self.actions.is_empty()
    }
}

/// Analyze the current performance and memory situation.
pub fn analyze(
    window: &PerformanceWindow,
    memory: &MemoryStats,
    recent_prompt_tokens: &[usize],
    tuning: &TuningView,
) -> Analysis {
    let mut analysis = Analysis::default();

    // Response-time degradation: recent 20 vs the 20 before them.
    if window.len() >= 40 {
        let recent_20 = window.recent_n_average_ms(20);
        let older_20 = (window.recent_n_average_ms(40) * 40.0 - recent_20 * 20.0) / 20.0;
        if older_20 > 0.0 && recent_20 >= 1.5 * older_20 {
            analysis.insights.push(Insight {
                summary: format!(
                    "response time degradation: recent avg {recent_20:.0}ms vs {older_20:.0}ms"
                ),
                category: "latency".to_string(),
                confidence: 0.85,
            });
            analysis.actions.push(ProposedAction::new(
                "reduce working-memory capacity",
                RiskLevel::Low,
                "smaller prompts, faster assembly",
                "assembler.max_recent_memories",
                json!(tuning.max_recent_memories),
                json!((tuning.max_recent_memories / 2).max(2)),
            ));
            analysis.actions.push(ProposedAction::new(
                "increase maintenance frequency",
                RiskLevel::Low,
                "leaner memory store",
                "memory.maintenance_interval_ms",
                json!(tuning.maintenance_interval_ms),
                json!((tuning.maintenance_interval_ms / 2).max(10_000)),
            ));
        }
    }

    // Elevated error rate over the recent 20.
    if window.len() >= 20 && window.recent_n_error_rate(20) > 0.1 {
        analysis.insights.push(Insight {
            summary: format!(
                "error rate elevated: {:.0}% over the last 20 operations",
                window.recent_n_error_rate(20) * 100.0
            ),
            category: "errors".to_string(),
            confidence: 0.8,
        });
        if tuning.approval_mode != "conservative" {
            analysis.actions.push(ProposedAction::new(
                "switch to conservative mode",
                RiskLevel::Medium,
                "human review for medium and high risk changes",
                "reflection.approval_mode",
                json!(tuning.approval_mode),
                json!("conservative"),
            ));
        }
    }

    // Forgettable backlog: cheap cleanup opportunity.
    if memory.forgettable > CLEANUP_BACKLOG {
        analysis.insights.push(Insight {
            summary: format!(
                "memory cleanup opportunity: {} forgettable records",
                memory.forgettable
            ),
            category: "memory".to_string(),
            confidence: 0.9,
        });
        analysis.actions.push(ProposedAction::new(
            "run maintenance more often",
            RiskLevel::Low,
            "reclaim salience-dead records sooner",
            "memory.maintenance_interval_ms",
            json!(tuning.maintenance_interval_ms),
            json!((tuning.maintenance_interval_ms / 2).max(10_000)),
        ));
    }

    // Prompt inefficiency over the recent 5 assemblies.
    if recent_prompt_tokens.len() >= 5 {
        let recent_5 = &recent_prompt_tokens[recent_prompt_tokens.len() - 5..];
        let avg = recent_5.iter().sum::<usize>() as f64 / 5.0;
        if avg > PROMPT_SIZE_CEILING && !tuning.prompt_compression {
            analysis.insights.push(Insight {
                summary: format!("prompt inefficiency: recent average {avg:.0} tokens"),
                category: "prompt".to_string(),
                confidence: 0.75,
            });
            analysis.actions.push(ProposedAction::new(
                "enable prompt compression",
                RiskLevel::Low,
                "reduced token cost per call",
                "assembler.prompt_compression",
                json!(false),
                json!(true),
            ));
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> TuningView {
        TuningView {
            max_recent_memories: 10,
            maintenance_interval_ms: 60_000,
            approval_mode: "auto".to_string(),
            prompt_compression: false,
        }
    }

    fn empty_stats() -> MemoryStats {
        MemoryStats {
            total: 0,
            live: 0,
            tombstoned: 0,
            episodic: 0,
            semantic: 0,
            procedural: 0,
            reflective: 0,
            average_importance: 0.0,
            average_salience: 0.0,
            forgettable: 0,
        }
    }

    #[test]
    fn test_healthy_window_yields_nothing() {
        let mut window = PerformanceWindow::new(50);
        for _ in 0..50 {
            window.record(100.0, true);
        }
        let analysis = analyze(&window, &empty_stats(), &[], &tuning());
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_latency_degradation_detected() {
        let mut window = PerformanceWindow::new(50);
        for _ in 0..20 {
            window.record(100.0, true);
        }
        for _ in 0..20 {
            window.record(400.0, true);
        }
        let analysis = analyze(&window, &empty_stats(), &[], &tuning());
        assert!(analysis
            .insights
            .iter()
            .any(|i| i.category == "latency" && i.confidence == 0.85));
        // Both remediation actions are proposed.
        assert!(analysis
            .actions
            .iter()
            .any(|a| a.target == "assembler.max_recent_memories"));
        assert!(analysis
            .actions
            .iter()
            .any(|a| a.target == "memory.maintenance_interval_ms"));
    }

    #[test]
    fn test_error_rate_proposes_conservative_mode() {
        let mut window = PerformanceWindow::new(50);
        for i in 0..20 {
            window.record(50.0, i % 4 != 0); // 25% errors
        }
        let analysis = analyze(&window, &empty_stats(), &[], &tuning());
        let action = analysis
            .actions
            .iter()
            .find(|a| a.target == "reflection.approval_mode")
            .expect("conservative-mode action");
        assert_eq!(action.proposed, json!("conservative"));
        assert_eq!(action.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_already_conservative_is_not_reproposed() {
        let mut window = PerformanceWindow::new(50);
        for i in 0..20 {
            window.record(50.0, i % 4 != 0);
        }
        let mut tuning = tuning();
        tuning.approval_mode = "conservative".to_string();
        let analysis = analyze(&window, &empty_stats(), &[], &tuning);
        assert!(!analysis
            .actions
            .iter()
            .any(|a| a.target == "reflection.approval_mode"));
    }

    #[test]
    fn test_forgettable_backlog_proposes_cleanup() {
        let window = PerformanceWindow::new(50);
        let mut stats = empty_stats();
        stats.forgettable = 150;
        let analysis = analyze(&window, &stats, &[], &tuning());
        assert!(analysis.insights.iter().any(|i| i.category == "memory"));
        assert!(analysis.actions.iter().all(|a| a.risk == RiskLevel::Low));
    }

    #[test]
    fn test_large_prompts_propose_compression() {
        let window = PerformanceWindow::new(50);
        let tokens = [5000, 4500, 6000, 4800, 5200];
        let analysis = analyze(&window, &empty_stats(), &tokens, &tuning());
        let action = analysis
            .actions
            .iter()
            .find(|a| a.target == "assembler.prompt_compression")
            .expect("compression action");
        assert_eq!(action.proposed, json!(true));
    }
}
