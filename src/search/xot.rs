//! XoT prior: fast heuristic score for an unexplored path.
//!
//! Instead of a full simulation, a small fast model is asked for a single
//! 0.0-1.0 number over a terse path summary. The prior is advisory; any
//! failure falls back to a configurable neutral score and is recorded in the
//! stats.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::generator::{Capability, GenerationParams, GeneratorRouter, Quality};
use crate::tree::TreeNode;

const XOT_PROMPT: &str = "You are a research heuristic. Quickly estimate if this path is promising.

Current Path:
{path_summary}

Next Question:
{node_question}

Rate likelihood of success (0.0 = dead end, 1.0 = very promising).
Consider: relevance, actionability, logical flow.

Respond with ONLY a number: 0.0-1.0
";

/// Prior estimation statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XotStats {
    pub total_simulations: u64,
    pub successful_parses: u64,
    pub failed_parses: u64,
    pub avg_score: f64,
    pub avg_latency_ms: f64,
}

impl XotStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_simulations == 0 {
            0.0
        } else {
            self.successful_parses as f64 / self.total_simulations as f64
        }
    }
}

/// Fast low-context prior scorer for MCTS selection.
pub struct XotPrior {
    router: Arc<GeneratorRouter>,
    /// Ancestor questions included in the path summary
    depth: usize,
    fallback_score: f64,
    timeout_ms: u64,
    stats: Mutex<XotStats>,
}

impl XotPrior {
    pub fn new(router: Arc<GeneratorRouter>) -> Self {
        Self {
            router,
            depth: 3,
            fallback_score: 0.5,
            timeout_ms: 3_000,
            stats: Mutex::new(XotStats::default()),
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_fallback_score(mut self, score: f64) -> Self {
        self.fallback_score = score.clamp(0.0, 1.0);
        self
    }

    /// Hard cap on a prior call; the prior is advisory and must not block
    /// selection for long.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Quick prior for a node given its ancestor questions (nearest last).
    /// Never fails; errors return the fallback score.
    pub async fn simulate_quick(&self, node: &TreeNode, ancestor_questions: &[String]) -> f64 {
        let started = Instant::now();

        let path_summary = self.build_path_summary(ancestor_questions);
        let prompt = XOT_PROMPT
            .replace("{path_summary}", &path_summary)
            .replace("{node_question}", &node.question);

        let params = GenerationParams::new()
            .with_max_tokens(50)
            .with_temperature(0.3);

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(self.timeout_ms),
            self.router
                .generate(&prompt, Capability::Reasoning, Quality::Fast, &params),
        )
        .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result
            .ok()
            .and_then(|r| r.ok())
            .and_then(|r| parse_score(&r.content))
        {
            Some(score) => {
                self.record(score, elapsed_ms, true);
                score
            }
            None => {
                debug!(node = %node.id, "prior parse failed, using fallback");
                self.record(self.fallback_score, elapsed_ms, false);
                self.fallback_score
            }
        }
    }

    fn build_path_summary(&self, ancestor_questions: &[String]) -> String {
        if ancestor_questions.is_empty() {
            return "Root node".to_string();
        }

        let start = ancestor_questions.len().saturating_sub(self.depth);
        ancestor_questions[start..]
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}{}", "-> ".repeat(i), q))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn record(&self, score: f64, elapsed_ms: f64, success: bool) {
        if let Ok(mut stats) = self.stats.lock() {
            let total = stats.total_simulations as f64;
            stats.avg_score = (stats.avg_score * total + score) / (total + 1.0);
            stats.avg_latency_ms = (stats.avg_latency_ms * total + elapsed_ms) / (total + 1.0);
            stats.total_simulations += 1;
            if success {
                stats.successful_parses += 1;
            } else {
                stats.failed_parses += 1;
            }
        }
    }

    pub fn stats(&self) -> XotStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn reset_stats(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = XotStats::default();
        }
    }
}

/// Parse a 0-1 score with a regex cascade: bare float, labeled float, any
/// float, first-line float.
fn parse_score(response: &str) -> Option<f64> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

    let fence = FENCE.get_or_init(|| Regex::new(r"```[\w]*\n?").expect("static regex"));
    let cleaned = fence.replace_all(response.trim(), "");
    let cleaned = cleaned.trim();

    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"^(0?\.\d+|1\.0*|0|1)$").expect("static regex"),
            Regex::new(r"(?i)(?:score|rate|likelihood)[:\s]+(0?\.\d+|1\.0*|0|1)")
                .expect("static regex"),
            Regex::new(r"(0?\.\d+|1\.0*|0|1)\s*(?:/|$)").expect("static regex"),
            Regex::new(r"(0?\.\d+|1\.0*|0|1)").expect("static regex"),
        ]
    });

    for pattern in patterns {
        if let Some(score) = pattern
            .captures(cleaned)
            .and_then(|c| c[1].parse::<f64>().ok())
        {
            return Some(score.clamp(0.0, 1.0));
        }
    }

    cleaned
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .map(|score| score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;

    fn prior_with(response: &str) -> XotPrior {
        let mut router = GeneratorRouter::new();
        router.register(
            "scripted",
            Arc::new(ScriptedGenerator::new().with_response(response)),
        );
        XotPrior::new(Arc::new(router))
    }

    fn node() -> TreeNode {
        TreeNode::new("What markets have high friction?", 1, None)
    }

    #[tokio::test]
    async fn test_bare_float() {
        let prior = prior_with("0.85");
        let score = prior.simulate_quick(&node(), &[]).await;
        assert_eq!(score, 0.85);

        let stats = prior.stats();
        assert_eq!(stats.total_simulations, 1);
        assert_eq!(stats.successful_parses, 1);
        assert_eq!(stats.avg_score, 0.85);
    }

    #[tokio::test]
    async fn test_labeled_float() {
        let prior = prior_with("Score: 0.7");
        assert_eq!(prior.simulate_quick(&node(), &[]).await, 0.7);
    }

    #[tokio::test]
    async fn test_float_in_prose() {
        let prior = prior_with("I would rate this path 0.6 overall.");
        assert_eq!(prior.simulate_quick(&node(), &[]).await, 0.6);
    }

    #[tokio::test]
    async fn test_code_fenced_float() {
        let prior = prior_with("```\n0.9\n```");
        assert_eq!(prior.simulate_quick(&node(), &[]).await, 0.9);
    }

    #[tokio::test]
    async fn test_slash_form() {
        let prior = prior_with("0.85/1.0");
        assert_eq!(prior.simulate_quick(&node(), &[]).await, 0.85);
    }

    #[tokio::test]
    async fn test_unparseable_uses_fallback() {
        let prior = prior_with("no number here at all");
        assert_eq!(prior.simulate_quick(&node(), &[]).await, 0.5);

        let stats = prior.stats();
        assert_eq!(stats.failed_parses, 1);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_provider_failure_uses_fallback() {
        let prior = XotPrior::new(Arc::new(GeneratorRouter::new())).with_fallback_score(0.4);
        assert_eq!(prior.simulate_quick(&node(), &[]).await, 0.4);
    }

    #[tokio::test]
    async fn test_path_summary_bounded_by_depth() {
        let prior = prior_with("0.5").with_depth(2);
        let questions: Vec<String> = (0..5).map(|i| format!("question {i}")).collect();
        let summary = prior.build_path_summary(&questions);

        assert!(summary.contains("question 3"));
        assert!(summary.contains("question 4"));
        assert!(!summary.contains("question 0"));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let prior = prior_with("0.8");
        prior.simulate_quick(&node(), &[]).await;
        assert_eq!(prior.stats().total_simulations, 1);

        prior.reset_stats();
        assert_eq!(prior.stats().total_simulations, 0);
    }
}
