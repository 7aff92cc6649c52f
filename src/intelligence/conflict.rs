//! Conflict detection and resolution between contradicting triplets.
//!
//! Detection applies to pairs with the same subject (case-insensitive,
//! containment tolerated): negation predicate pairs, semantically opposite
//! objects under the same predicate, and numeric objects differing by more
//! than 20%. Resolution keeps one triplet per a chosen strategy; losers are
//! optionally deleted.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::Result;
use crate::facts::{FactStore, Triplet, TripletId};

const SCAN_LIMIT: usize = 10_000;

/// Semantic opposite object pairs.
const OPPOSITE_PAIRS: &[[&str; 2]] = &[
    ["high", "low"],
    ["yes", "no"],
    ["true", "false"],
    ["increase", "decrease"],
    ["up", "down"],
    ["good", "bad"],
    ["positive", "negative"],
    ["expensive", "cheap"],
    ["hot", "cold"],
    ["fast", "slow"],
];

/// Positive/negative predicate pairs.
const NEGATION_PAIRS: &[[&str; 2]] = &[
    ["is", "is_not"],
    ["has", "lacks"],
    ["contains", "excludes"],
    ["supports", "opposes"],
    ["includes", "omits"],
];

/// Kind of contradiction detected between two triplets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same predicate, objects from a fixed opposite-pair table
    SemanticOpposite,
    /// Predicates form a positive/negative pair, regardless of object
    Negation,
    /// Same predicate, numeric objects with relative difference > 20%
    ValueConflict,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SemanticOpposite => write!(f, "semantic_opposite"),
            Self::Negation => write!(f, "negation"),
            Self::ValueConflict => write!(f, "value_conflict"),
        }
    }
}

/// Strategy for deciding which triplet of a conflicting pair survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Keep higher confidence; tie flags manual review
    Confidence,
    /// Keep higher effective source count; tie falls back to confidence
    Sources,
    /// Keep newer created_at
    Recency,
    /// Keep higher tier; tie falls back to confidence
    Tier,
    /// Keep first, flag for human review
    Manual,
}

/// A detected conflict between two triplets. Transient: lives only while the
/// resolver processes it.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub triplet_a: Triplet,
    pub triplet_b: Triplet,
    pub kind: ConflictKind,
    /// 0.0-1.0, 1.0 = hardest contradiction
    pub severity: f64,
    pub detected_at: DateTime<Utc>,
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub strategy: ResolutionStrategy,
    pub kept: TripletId,
    /// None when nothing is removed (manual review)
    pub removed: Option<TripletId>,
    pub reasoning: String,
    pub manual_review_needed: bool,
}

/// Aggregate results of an auto-resolve pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub total_conflicts: usize,
    pub resolved: usize,
    pub manual_review: usize,
    pub deleted: usize,
}

/// Detected-conflict counts by kind, without mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictStats {
    pub total_conflicts: usize,
    pub by_kind: HashMap<String, usize>,
    pub conflict_threshold: f64,
}

/// Detects and resolves contradictions across the fact store.
pub struct ConflictResolver {
    store: FactStore,
    conflict_threshold: f64,
}

impl ConflictResolver {
    pub fn new(store: FactStore) -> Self {
        Self {
            store,
            conflict_threshold: 0.7,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.conflict_threshold = threshold;
        self
    }

    /// Detect conflicts between `triplet` and everything else in the store.
    pub fn detect_conflicts(&self, triplet: &Triplet) -> Result<Vec<Conflict>> {
        let all = self.store.all(SCAN_LIMIT)?;

        Ok(all
            .into_iter()
            .filter(|other| other.id != triplet.id)
            .filter_map(|other| check_conflict(triplet, &other))
            .filter(|c| c.severity >= self.conflict_threshold)
            .collect())
    }

    /// Resolve a conflict with the given strategy. Mutates nothing; the
    /// caller applies the resolution (deletion) if desired.
    pub fn resolve(&self, conflict: &Conflict, strategy: ResolutionStrategy) -> Resolution {
        let a = &conflict.triplet_a;
        let b = &conflict.triplet_b;

        match strategy {
            ResolutionStrategy::Confidence => resolve_by_confidence(a, b),
            ResolutionStrategy::Sources => {
                let sources_a = a.provenance.effective_source_count();
                let sources_b = b.provenance.effective_source_count();
                if sources_a == sources_b {
                    return resolve_by_confidence(a, b);
                }
                let (kept, removed) = if sources_a > sources_b { (a, b) } else { (b, a) };
                Resolution {
                    strategy,
                    kept: kept.id.clone(),
                    removed: Some(removed.id.clone()),
                    reasoning: format!(
                        "Kept more sources: {} > {}",
                        kept.provenance.effective_source_count(),
                        removed.provenance.effective_source_count()
                    ),
                    manual_review_needed: false,
                }
            }
            ResolutionStrategy::Recency => {
                let (kept, removed) = if a.created_at > b.created_at { (a, b) } else { (b, a) };
                Resolution {
                    strategy,
                    kept: kept.id.clone(),
                    removed: Some(removed.id.clone()),
                    reasoning: format!(
                        "Kept newer triplet: {} >= {}",
                        kept.created_at.to_rfc3339(),
                        removed.created_at.to_rfc3339()
                    ),
                    manual_review_needed: false,
                }
            }
            ResolutionStrategy::Tier => {
                if a.tier == b.tier {
                    return resolve_by_confidence(a, b);
                }
                let (kept, removed) = if a.tier > b.tier { (a, b) } else { (b, a) };
                Resolution {
                    strategy,
                    kept: kept.id.clone(),
                    removed: Some(removed.id.clone()),
                    reasoning: format!("Kept higher tier: {} > {}", kept.tier, removed.tier),
                    manual_review_needed: false,
                }
            }
            ResolutionStrategy::Manual => Resolution {
                strategy,
                kept: a.id.clone(),
                removed: None,
                reasoning: "Flagged for manual review".to_string(),
                manual_review_needed: true,
            },
        }
    }

    /// Detect every unique conflicting pair in the store, resolve each with
    /// the strategy, and optionally delete losers.
    pub fn auto_resolve_all(
        &self,
        strategy: ResolutionStrategy,
        delete_losers: bool,
    ) -> Result<(Vec<Resolution>, ResolutionStats)> {
        let all = self.store.all(SCAN_LIMIT)?;

        let mut conflicts = Vec::new();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

        for triplet in &all {
            for conflict in self.detect_conflicts(triplet)? {
                let mut pair = [
                    conflict.triplet_a.id.to_string(),
                    conflict.triplet_b.id.to_string(),
                ];
                pair.sort();
                let key = (pair[0].clone(), pair[1].clone());
                if seen_pairs.insert(key) {
                    conflicts.push(conflict);
                }
            }
        }

        let mut stats = ResolutionStats {
            total_conflicts: conflicts.len(),
            ..Default::default()
        };

        let mut resolutions = Vec::with_capacity(conflicts.len());
        for conflict in &conflicts {
            let resolution = self.resolve(conflict, strategy);

            if resolution.manual_review_needed {
                stats.manual_review += 1;
            } else {
                stats.resolved += 1;
                if delete_losers {
                    if let Some(ref loser) = resolution.removed {
                        if self.store.delete(loser)? {
                            stats.deleted += 1;
                            debug!(loser = %loser, kept = %resolution.kept, "deleted conflict loser");
                        }
                    }
                }
            }

            resolutions.push(resolution);
        }

        Ok((resolutions, stats))
    }

    /// Counts of currently detectable conflicts, by kind. Read-only.
    pub fn stats(&self) -> Result<ConflictStats> {
        let all = self.store.all(SCAN_LIMIT)?;

        let mut by_kind: HashMap<String, usize> = HashMap::new();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
        for triplet in &all {
            for conflict in self.detect_conflicts(triplet)? {
                let mut pair = [
                    conflict.triplet_a.id.to_string(),
                    conflict.triplet_b.id.to_string(),
                ];
                pair.sort();
                if seen_pairs.insert((pair[0].clone(), pair[1].clone())) {
                    *by_kind.entry(conflict.kind.to_string()).or_default() += 1;
                }
            }
        }

        Ok(ConflictStats {
            total_conflicts: seen_pairs.len(),
            by_kind,
            conflict_threshold: self.conflict_threshold,
        })
    }
}

fn resolve_by_confidence(a: &Triplet, b: &Triplet) -> Resolution {
    if (a.confidence - b.confidence).abs() < f64::EPSILON {
        return Resolution {
            strategy: ResolutionStrategy::Confidence,
            kept: a.id.clone(),
            removed: None,
            reasoning: format!(
                "Equal confidence ({:.2}) - needs manual review",
                a.confidence
            ),
            manual_review_needed: true,
        };
    }

    let (kept, removed) = if a.confidence > b.confidence { (a, b) } else { (b, a) };
    Resolution {
        strategy: ResolutionStrategy::Confidence,
        kept: kept.id.clone(),
        removed: Some(removed.id.clone()),
        reasoning: format!(
            "Kept higher confidence: {:.2} > {:.2}",
            kept.confidence, removed.confidence
        ),
        manual_review_needed: false,
    }
}

/// Check a pair for any conflict kind. Returns None when subjects differ.
fn check_conflict(a: &Triplet, b: &Triplet) -> Option<Conflict> {
    let subj_a = a.subject.to_lowercase();
    let subj_b = b.subject.to_lowercase();
    if !(subj_a == subj_b || subj_a.contains(&subj_b) || subj_b.contains(&subj_a)) {
        return None;
    }

    let pred_a = a.predicate.to_lowercase();
    let pred_b = b.predicate.to_lowercase();
    let obj_a = a.object.to_lowercase();
    let obj_b = b.object.to_lowercase();

    if pred_a == pred_b {
        if is_opposite_object(&obj_a, &obj_b) {
            return Some(conflict(a, b, ConflictKind::SemanticOpposite, 0.9));
        }
        if is_numeric_conflict(&obj_a, &obj_b) {
            return Some(conflict(a, b, ConflictKind::ValueConflict, 0.75));
        }
    }

    if is_negation_pair(&pred_a, &pred_b) {
        return Some(conflict(a, b, ConflictKind::Negation, 1.0));
    }

    None
}

fn conflict(a: &Triplet, b: &Triplet, kind: ConflictKind, severity: f64) -> Conflict {
    Conflict {
        triplet_a: a.clone(),
        triplet_b: b.clone(),
        kind,
        severity,
        detected_at: Utc::now(),
    }
}

fn is_opposite_object(obj_a: &str, obj_b: &str) -> bool {
    obj_a != obj_b
        && OPPOSITE_PAIRS
            .iter()
            .any(|pair| pair.contains(&obj_a) && pair.contains(&obj_b))
}

fn is_negation_pair(pred_a: &str, pred_b: &str) -> bool {
    NEGATION_PAIRS.iter().any(|[pos, neg]| {
        (pred_a == *pos && pred_b == *neg) || (pred_a == *neg && pred_b == *pos)
    })
}

/// Numeric objects whose relative difference exceeds 20%. Identical values
/// never conflict.
fn is_numeric_conflict(obj_a: &str, obj_b: &str) -> bool {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"\d+\.?\d*").expect("static regex"));

    let val_a = number
        .find(obj_a)
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let val_b = number
        .find(obj_b)
        .and_then(|m| m.as_str().parse::<f64>().ok());

    match (val_a, val_b) {
        (Some(a), Some(b)) => {
            let avg = (a + b) / 2.0;
            avg > 0.0 && ((a - b).abs() / avg) > 0.2
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{ExtractionMethod, Provenance, Tier};

    fn triplet(subject: &str, predicate: &str, object: &str, confidence: f64) -> Triplet {
        Triplet::new(
            subject,
            predicate,
            object,
            confidence,
            Provenance::new("n1", ExtractionMethod::LlmStructured),
        )
    }

    fn store_with(triplets: &[Triplet]) -> FactStore {
        let store = FactStore::in_memory().unwrap();
        for t in triplets {
            store.insert(t).unwrap();
        }
        store
    }

    #[test]
    fn test_semantic_opposite_detected() {
        let a = triplet("Solar panels", "cost", "high", 0.7);
        let b = triplet("Solar panels", "cost", "low", 0.85);
        let store = store_with(&[a.clone(), b]);

        let resolver = ConflictResolver::new(store);
        let conflicts = resolver.detect_conflicts(&a).unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::SemanticOpposite);
        assert!((conflicts[0].severity - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_negation_detected_regardless_of_object() {
        let a = triplet("Nuclear power", "supports", "grid stability", 0.8);
        let b = triplet("Nuclear power", "opposes", "decentralization", 0.8);
        let store = store_with(&[a.clone(), b]);

        let resolver = ConflictResolver::new(store);
        let conflicts = resolver.detect_conflicts(&a).unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Negation);
        assert_eq!(conflicts[0].severity, 1.0);
    }

    #[test]
    fn test_value_conflict_over_twenty_percent() {
        let a = triplet("Solar ROI", "period", "15 years", 0.8);
        let b = triplet("Solar ROI", "period", "25 years", 0.7);
        let store = store_with(&[a.clone(), b]);

        let resolver = ConflictResolver::new(store);
        let conflicts = resolver.detect_conflicts(&a).unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::ValueConflict);
    }

    #[test]
    fn test_identical_numbers_do_not_conflict() {
        let a = triplet("Solar ROI", "period", "15 years", 0.8);
        let b = triplet("Solar ROI", "period", "15 yrs approx", 0.7);
        let store = store_with(&[a.clone(), b]);

        let resolver = ConflictResolver::new(store);
        assert!(resolver.detect_conflicts(&a).unwrap().is_empty());
    }

    #[test]
    fn test_different_subjects_never_conflict() {
        let a = triplet("Solar panels", "cost", "high", 0.7);
        let b = triplet("Wind turbines", "cost", "low", 0.85);
        let store = store_with(&[a.clone(), b]);

        let resolver = ConflictResolver::new(store);
        assert!(resolver.detect_conflicts(&a).unwrap().is_empty());
    }

    #[test]
    fn test_severity_threshold_filters() {
        let a = triplet("Solar ROI", "period", "15 years", 0.8);
        let b = triplet("Solar ROI", "period", "25 years", 0.7);
        let store = store_with(&[a.clone(), b]);

        // Value conflicts score 0.75; a 0.8 threshold hides them
        let resolver = ConflictResolver::new(store).with_threshold(0.8);
        assert!(resolver.detect_conflicts(&a).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_by_tier_prefers_silver() {
        let a = triplet("Solar panels", "cost", "high", 0.70);
        let b = triplet("Solar panels", "cost", "low", 0.85).with_tier(Tier::Silver);
        let store = store_with(&[a.clone(), b.clone()]);

        let resolver = ConflictResolver::new(store);
        let conflicts = resolver.detect_conflicts(&a).unwrap();
        let resolution = resolver.resolve(&conflicts[0], ResolutionStrategy::Tier);

        assert_eq!(resolution.kept, b.id);
        assert_eq!(resolution.removed, Some(a.id));
        assert!(!resolution.manual_review_needed);
    }

    #[test]
    fn test_resolve_confidence_tie_flags_manual_review() {
        let a = triplet("Solar panels", "cost", "high", 0.8);
        let b = triplet("Solar panels", "cost", "low", 0.8);
        let store = store_with(&[a.clone(), b]);

        let resolver = ConflictResolver::new(store);
        let conflicts = resolver.detect_conflicts(&a).unwrap();
        let resolution = resolver.resolve(&conflicts[0], ResolutionStrategy::Confidence);

        assert!(resolution.manual_review_needed);
        assert!(resolution.removed.is_none());
    }

    #[test]
    fn test_resolve_by_sources_falls_back_to_confidence() {
        let a = triplet("Solar panels", "cost", "high", 0.9);
        let b = triplet("Solar panels", "cost", "low", 0.6);
        let store = store_with(&[a.clone(), b.clone()]);

        let resolver = ConflictResolver::new(store);
        let conflicts = resolver.detect_conflicts(&a).unwrap();
        let resolution = resolver.resolve(&conflicts[0], ResolutionStrategy::Sources);

        // Equal source counts (1 each): confidence decides
        assert_eq!(resolution.strategy, ResolutionStrategy::Confidence);
        assert_eq!(resolution.kept, a.id);
    }

    #[test]
    fn test_auto_resolve_all_is_idempotent() {
        let a = triplet("Solar panels", "cost", "high", 0.70);
        let b = triplet("Solar panels", "cost", "low", 0.85).with_tier(Tier::Silver);
        let store = store_with(&[a, b]);

        let resolver = ConflictResolver::new(store);
        let (_, first) = resolver
            .auto_resolve_all(ResolutionStrategy::Tier, true)
            .unwrap();
        assert_eq!(first.total_conflicts, 1);
        assert_eq!(first.deleted, 1);

        let (_, second) = resolver
            .auto_resolve_all(ResolutionStrategy::Tier, true)
            .unwrap();
        assert_eq!(second.total_conflicts, 0);
        assert_eq!(second.deleted, 0);
    }

    #[test]
    fn test_pairs_reported_once() {
        let a = triplet("Solar panels", "cost", "high", 0.7);
        let b = triplet("Solar panels", "cost", "low", 0.85);
        let store = store_with(&[a, b]);

        let resolver = ConflictResolver::new(store);
        let (resolutions, stats) = resolver
            .auto_resolve_all(ResolutionStrategy::Manual, false)
            .unwrap();

        assert_eq!(resolutions.len(), 1);
        assert_eq!(stats.manual_review, 1);
    }

    #[test]
    fn test_stats_by_kind() {
        let store = store_with(&[
            triplet("Solar panels", "cost", "high", 0.7),
            triplet("Solar panels", "cost", "low", 0.85),
            triplet("Nuclear power", "supports", "baseload", 0.8),
            triplet("Nuclear power", "opposes", "baseload", 0.9),
        ]);

        let resolver = ConflictResolver::new(store);
        let stats = resolver.stats().unwrap();

        assert_eq!(stats.total_conflicts, 2);
        assert_eq!(stats.by_kind.get("semantic_opposite"), Some(&1));
        assert_eq!(stats.by_kind.get("negation"), Some(&1));
    }
}
