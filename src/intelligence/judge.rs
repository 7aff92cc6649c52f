//! LLM-mediated judgment of triplets against active axioms.
//!
//! The model answers in a strict three-line format (`ALIGNMENT` / `SCORE` /
//! `REASONING`), parsed with regular expressions. Model failure defaults to a
//! conservative pass so promotion never stalls on a flaky provider.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

use crate::axioms::{Axiom, AxiomLibrary};
use crate::facts::{Triplet, TripletId};
use crate::generator::{Capability, GenerationParams, GeneratorRouter, Quality};

const EVALUATION_PROMPT: &str = "Evaluate if this fact aligns with our values.

Fact to evaluate:
Subject: {subject}
Predicate: {predicate}
Object: {object}
Confidence: {confidence}

Values to check:
{axioms_text}

Question: Does this fact align with ALL values listed above?

Consider:
1. Does the fact support or contradict any value?
2. Is the fact neutral (neither supports nor contradicts)?
3. Overall alignment with values

Respond in this format:
ALIGNMENT: [YES/NO]
SCORE: [0.0-1.0]
REASONING: [Brief explanation]

Your response:";

/// Result of one axiom evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub triplet_id: TripletId,
    pub passes: bool,
    /// Per-axiom score map
    pub axiom_scores: HashMap<String, f64>,
    pub reasoning: String,
    pub evaluated_at: DateTime<Utc>,
    pub overall_score: f64,
}

/// Aggregate statistics over a batch of judgments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgmentStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub avg_score: f64,
}

impl JudgmentStats {
    pub fn from_judgments(judgments: &[Judgment]) -> Self {
        if judgments.is_empty() {
            return Self::default();
        }

        let passed = judgments.iter().filter(|j| j.passes).count();
        let avg_score =
            judgments.iter().map(|j| j.overall_score).sum::<f64>() / judgments.len() as f64;

        Self {
            total: judgments.len(),
            passed,
            failed: judgments.len() - passed,
            pass_rate: passed as f64 / judgments.len() as f64 * 100.0,
            avg_score,
        }
    }
}

/// Judges triplets against the axiom library via the validation capability.
pub struct AxiomJudge {
    router: Arc<GeneratorRouter>,
    library: AxiomLibrary,
    pass_threshold: f64,
    quality: Quality,
}

impl AxiomJudge {
    pub fn new(router: Arc<GeneratorRouter>, library: AxiomLibrary) -> Self {
        Self {
            router,
            library,
            pass_threshold: 0.7,
            quality: Quality::Balanced,
        }
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Evaluate a triplet against the given axioms (all enabled axioms when
    /// None). An empty axiom set passes with score 1.
    pub async fn evaluate(&self, triplet: &Triplet, axioms: Option<&[Axiom]>) -> Judgment {
        let owned: Vec<Axiom>;
        let axioms: &[Axiom] = match axioms {
            Some(axioms) => axioms,
            None => {
                owned = self.library.all().to_vec();
                &owned
            }
        };

        if axioms.is_empty() {
            return Judgment {
                triplet_id: triplet.id.clone(),
                passes: true,
                axiom_scores: HashMap::new(),
                reasoning: "No axioms to evaluate against".to_string(),
                evaluated_at: Utc::now(),
                overall_score: 1.0,
            };
        }

        let axioms_text = axioms
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {}: {}", i + 1, a.id, a.statement))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = EVALUATION_PROMPT
            .replace("{subject}", &triplet.subject)
            .replace("{predicate}", &triplet.predicate)
            .replace("{object}", &triplet.object)
            .replace("{confidence}", &format!("{:.2}", triplet.confidence))
            .replace("{axioms_text}", &axioms_text);

        let response = self
            .router
            .generate(
                &prompt,
                Capability::Validation,
                self.quality,
                &GenerationParams::new(),
            )
            .await;

        match response {
            Ok(response) => {
                let (score, reasoning) = parse_judgment(&response.content);
                let axiom_scores = axioms.iter().map(|a| (a.id.clone(), score)).collect();

                Judgment {
                    triplet_id: triplet.id.clone(),
                    passes: score >= self.pass_threshold,
                    axiom_scores,
                    reasoning,
                    evaluated_at: Utc::now(),
                    overall_score: score,
                }
            }
            Err(e) => {
                // Conservative default: pass, so a flaky judge never stalls
                // the promotion pipeline
                warn!(error = %e, triplet = %triplet.id, "axiom evaluation failed");
                Judgment {
                    triplet_id: triplet.id.clone(),
                    passes: true,
                    axiom_scores: HashMap::new(),
                    reasoning: format!("Evaluation failed: {e}"),
                    evaluated_at: Utc::now(),
                    overall_score: 0.5,
                }
            }
        }
    }

    /// Evaluate several triplets against a shared axiom set.
    pub async fn batch_evaluate(
        &self,
        triplets: &[Triplet],
        axioms: Option<&[Axiom]>,
    ) -> Vec<Judgment> {
        let mut judgments = Vec::with_capacity(triplets.len());
        for triplet in triplets {
            judgments.push(self.evaluate(triplet, axioms).await);
        }
        judgments
    }
}

/// Parse the three-line judgment format. Missing SCORE falls back to 0.8 for
/// YES and 0.3 for NO; the score is clamped to [0, 1].
fn parse_judgment(response: &str) -> (f64, String) {
    static ALIGNMENT: OnceLock<Regex> = OnceLock::new();
    static SCORE: OnceLock<Regex> = OnceLock::new();
    static REASONING: OnceLock<Regex> = OnceLock::new();

    let alignment_re = ALIGNMENT
        .get_or_init(|| Regex::new(r"(?i)ALIGNMENT:\s*(YES|NO)").expect("static regex"));
    let score_re =
        SCORE.get_or_init(|| Regex::new(r"SCORE:\s*(0?\.\d+|1\.0*|0|1)").expect("static regex"));
    let reasoning_re = REASONING
        .get_or_init(|| Regex::new(r"(?s)REASONING:\s*(.+)").expect("static regex"));

    let response = response.trim();

    let alignment_yes = alignment_re
        .captures(response)
        .map(|c| c[1].eq_ignore_ascii_case("YES"))
        .unwrap_or(true);

    let score = score_re
        .captures(response)
        .and_then(|c| c[1].parse::<f64>().ok())
        .unwrap_or(if alignment_yes { 0.8 } else { 0.3 })
        .clamp(0.0, 1.0);

    let mut reasoning = reasoning_re
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| "No reasoning provided".to_string());
    if reasoning.len() > 500 {
        reasoning.truncate(497);
        reasoning.push_str("...");
    }

    (score, reasoning)
}
