//! Session-level configuration surface.

use serde::{Deserialize, Serialize};

use crate::generator::Quality;
use crate::intelligence::PromotionRules;
use crate::search::SimulationStrategy;

/// Recognized options for a research session. Every knob has a sensible
/// default; hosts override selectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound enforced by the tree store on insert
    pub max_tree_nodes: usize,
    /// Advisory cap for prompt assembly
    pub max_context_tokens: usize,

    /// C in UCB1
    pub exploration_constant: f64,
    pub fact_quality_weight: f64,
    pub coverage_weight: f64,
    pub coverage_adaptive: bool,

    pub xot_weight: f64,
    pub xot_fallback_score: f64,
    /// Ancestor questions included in the prior's path summary
    pub xot_depth: usize,
    pub xot_timeout_ms: u64,

    pub token_budget_total: u64,
    pub token_budget_default_node: u64,
    pub token_budget_min_node: u64,
    pub token_budget_max_node: u64,

    pub promotion: PromotionRules,
    pub conflict_threshold: f64,
    pub similarity_threshold: f64,

    pub axiom_judge_pass_threshold: f64,
    pub axiom_judge_quality: Quality,
    /// Facts scoring below this against the axioms mark their node
    /// axiom-incompatible
    pub axiom_hard_reject_threshold: f64,

    pub simulation_strategy: SimulationStrategy,

    /// Sub-questions requested per decomposition
    pub branching_factor: usize,
    pub max_depth: u32,

    /// TTL for fact-quality caches, seconds
    pub quality_cache_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tree_nodes: 10_000,
            max_context_tokens: 8_192,
            exploration_constant: std::f64::consts::SQRT_2,
            fact_quality_weight: 0.3,
            coverage_weight: 0.5,
            coverage_adaptive: true,
            xot_weight: 0.2,
            xot_fallback_score: 0.5,
            xot_depth: 3,
            xot_timeout_ms: 3_000,
            token_budget_total: 500_000,
            token_budget_default_node: 10_000,
            token_budget_min_node: 1_000,
            token_budget_max_node: 100_000,
            promotion: PromotionRules::default(),
            conflict_threshold: 0.7,
            similarity_threshold: 0.85,
            axiom_judge_pass_threshold: 0.7,
            axiom_judge_quality: Quality::Balanced,
            axiom_hard_reject_threshold: 0.3,
            simulation_strategy: SimulationStrategy::Axiom,
            branching_factor: 3,
            max_depth: 3,
            quality_cache_ttl_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.branching_factor, 3);
        assert_eq!(config.max_depth, 3);
        assert!((config.exploration_constant - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(config.simulation_strategy, SimulationStrategy::Axiom);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"branching_factor": 5, "max_depth": 4}"#).unwrap();
        assert_eq!(config.branching_factor, 5);
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.token_budget_total, 500_000);
    }
}
