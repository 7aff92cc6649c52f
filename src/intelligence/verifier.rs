//! Multi-source verification for SPO triplets.
//!
//! Each corroborating source raises a triplet's effective source count:
//! two sources make it Silver-eligible, three make it Gold-eligible (with an
//! axiom pass). Similarity between triplets is rule-based: exact matches
//! score full component weight, containment/token-overlap and predicate
//! synonyms score half.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::Result;
use crate::facts::{FactStore, Tier, Triplet, TripletId};

/// Full-store scan bound for similarity searches.
const SCAN_LIMIT: usize = 10_000;

/// Predicate synonym groups (normalized: lowercase, `_`/`-` as spaces).
const PREDICATE_SYNONYMS: &[&[&str]] = &[
    &["has", "contains", "includes", "possesses"],
    &["is", "equals", "represents"],
    &["reduces", "decreases", "lowers", "cuts"],
    &["increases", "raises", "boosts", "improves"],
    &["causes", "leads to", "results in", "produces"],
];

/// Result of attaching a verification source to a triplet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub triplet_id: TripletId,
    pub verified: bool,
    /// Effective source count (original + verifications)
    pub source_count: usize,
    pub verification_sources: Vec<String>,
    /// True when the next tier's source requirement is now met
    pub should_promote: bool,
}

/// Aggregate verification statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationStats {
    pub total_triplets: u64,
    pub verified_count: u64,
    /// Percentage of triplets with at least one verification
    pub verification_rate: f64,
    pub avg_sources_per_triplet: f64,
    pub bronze_count: u64,
    pub silver_count: u64,
    pub gold_count: u64,
}

/// Verifies triplets across sources and finds similar triplets.
pub struct SourceVerifier {
    store: FactStore,
    min_sources_silver: usize,
    min_sources_gold: usize,
    similarity_threshold: f64,
}

impl SourceVerifier {
    pub fn new(store: FactStore) -> Self {
        Self {
            store,
            min_sources_silver: 2,
            min_sources_gold: 3,
            similarity_threshold: 0.85,
        }
    }

    pub fn with_min_sources(mut self, silver: usize, gold: usize) -> Self {
        self.min_sources_silver = silver;
        self.min_sources_gold = gold;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Idempotently attach `new_source` to the triplet's provenance and
    /// report whether the triplet is now promotion-eligible.
    pub fn verify(&self, triplet_id: &TripletId, new_source: &str) -> Result<VerificationOutcome> {
        let Some(triplet) = self.store.get(triplet_id)? else {
            return Ok(VerificationOutcome {
                triplet_id: triplet_id.clone(),
                verified: false,
                source_count: 0,
                verification_sources: Vec::new(),
                should_promote: false,
            });
        };

        let triplet = if triplet
            .provenance
            .verification_sources
            .iter()
            .any(|s| s == new_source)
        {
            triplet
        } else {
            self.store
                .update_provenance(triplet_id, true, Some(new_source))?;
            self.store.get(triplet_id)?.unwrap_or(triplet)
        };

        let source_count = triplet.provenance.effective_source_count();
        let should_promote = match triplet.tier {
            Tier::Bronze => source_count >= self.min_sources_silver,
            Tier::Silver => source_count >= self.min_sources_gold,
            Tier::Gold => false,
        };

        Ok(VerificationOutcome {
            triplet_id: triplet_id.clone(),
            verified: true,
            source_count,
            verification_sources: triplet.provenance.verification_sources,
            should_promote,
        })
    }

    /// Verify a list of (triplet, source) pairs in order.
    pub fn batch_verify(
        &self,
        pairs: &[(TripletId, String)],
    ) -> Result<Vec<VerificationOutcome>> {
        pairs
            .iter()
            .map(|(id, source)| self.verify(id, source))
            .collect()
    }

    /// Other triplets with similarity >= threshold, sorted descending.
    pub fn find_similar(
        &self,
        triplet: &Triplet,
        threshold: Option<f64>,
    ) -> Result<Vec<(Triplet, f64)>> {
        let threshold = threshold.unwrap_or(self.similarity_threshold);

        let mut similar: Vec<(Triplet, f64)> = self
            .store
            .all(SCAN_LIMIT)?
            .into_iter()
            .filter(|other| other.id != triplet.id)
            .filter_map(|other| {
                let score = similarity(triplet, &other);
                (score >= threshold).then_some((other, score))
            })
            .collect();

        similar.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(similar)
    }

    /// Verification statistics across the whole store.
    pub fn stats(&self) -> Result<VerificationStats> {
        let store_stats = self.store.stats()?;
        let all = self.store.all(SCAN_LIMIT)?;

        let mut verified_count = 0u64;
        let mut total_sources = 0usize;
        for triplet in &all {
            total_sources += triplet.provenance.effective_source_count();
            if triplet.provenance.verified {
                verified_count += 1;
            }
        }

        let total = store_stats.total_triplets;
        Ok(VerificationStats {
            total_triplets: total,
            verified_count,
            verification_rate: if total > 0 {
                verified_count as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_sources_per_triplet: if total > 0 {
                total_sources as f64 / total as f64
            } else {
                0.0
            },
            bronze_count: store_stats.by_tier.get(&Tier::Bronze).copied().unwrap_or(0),
            silver_count: store_stats.by_tier.get(&Tier::Silver).copied().unwrap_or(0),
            gold_count: store_stats.by_tier.get(&Tier::Gold).copied().unwrap_or(0),
        })
    }
}

/// Rule-based similarity in [0, 1]: subject up to 0.4, predicate up to 0.3,
/// object up to 0.3. A score of exactly 1.0 requires all three components to
/// match case-insensitively.
pub fn similarity(a: &Triplet, b: &Triplet) -> f64 {
    let mut score: f64 = 0.0;

    if a.subject.eq_ignore_ascii_case(&b.subject) {
        score += 0.4;
    } else if fuzzy_match(&a.subject, &b.subject) {
        score += 0.2;
    }

    if a.predicate.eq_ignore_ascii_case(&b.predicate) {
        score += 0.3;
    } else if predicates_synonymous(&a.predicate, &b.predicate) {
        score += 0.15;
    }

    if a.object.eq_ignore_ascii_case(&b.object) {
        score += 0.3;
    } else if fuzzy_match(&a.object, &b.object) {
        score += 0.15;
    }

    score.min(1.0)
}

/// Containment or token-Jaccard overlap above 0.7.
fn fuzzy_match(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if a.contains(&b) || b.contains(&a) {
        return true;
    }

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return false;
    }

    let overlap = words_a.intersection(&words_b).count();
    let total = words_a.union(&words_b).count();
    total > 0 && (overlap as f64 / total as f64) > 0.7
}

fn normalize_predicate(p: &str) -> String {
    p.to_lowercase().replace(['_', '-'], " ")
}

fn predicates_synonymous(a: &str, b: &str) -> bool {
    let a = normalize_predicate(a);
    let b = normalize_predicate(b);

    if a == b {
        return true;
    }

    PREDICATE_SYNONYMS
        .iter()
        .any(|group| group.contains(&a.as_str()) && group.contains(&b.as_str()))
}
