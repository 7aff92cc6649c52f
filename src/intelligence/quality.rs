//! Fact-quality scoring for tree nodes.
//!
//! A node's score reflects the tier mix of triplets attached to it (extracted
//! at the node, or verified by it): gold weighs 1.0, silver 0.6, bronze 0.3,
//! normalized by the all-gold maximum. Scores and distributions are cached
//! with a TTL; callers invalidate eagerly on promotion, extraction, and
//! verification events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::Result;
use crate::facts::{FactStore, Tier};

const SCAN_LIMIT: usize = 10_000;

/// Tier weights for the quality formula.
pub const GOLD_WEIGHT: f64 = 1.0;
pub const SILVER_WEIGHT: f64 = 0.6;
pub const BRONZE_WEIGHT: f64 = 0.3;

/// Per-node tier breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactDistribution {
    pub gold: usize,
    pub silver: usize,
    pub bronze: usize,
    pub total: usize,
    pub weighted_sum: f64,
    /// weighted_sum / (total * gold weight), 0 with no facts
    pub score: f64,
}

/// Store-wide tier summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_facts: u64,
    pub gold_count: u64,
    pub silver_count: u64,
    pub bronze_count: u64,
    pub avg_quality_score: f64,
    pub gold_percentage: f64,
    pub silver_percentage: f64,
    pub bronze_percentage: f64,
}

/// Cache occupancy, for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityCacheStats {
    pub score_entries: usize,
    pub distribution_entries: usize,
    pub ttl_secs: u64,
}

/// Maps a tree node to a 0-1 score from the tiers of its attached facts.
pub struct FactQualityEvaluator {
    store: FactStore,
    ttl: Duration,
    score_cache: Mutex<HashMap<String, (f64, Instant)>>,
    dist_cache: Mutex<HashMap<String, (FactDistribution, Instant)>>,
}

impl FactQualityEvaluator {
    pub fn new(store: FactStore) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(60),
            score_cache: Mutex::new(HashMap::new()),
            dist_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Quality score for a node, cached. Store failures degrade to 0 with a
    /// logged warning so selection never stalls.
    pub fn evaluate(&self, node_id: &str) -> f64 {
        if let Ok(cache) = self.score_cache.lock() {
            if let Some((score, at)) = cache.get(node_id) {
                if at.elapsed() < self.ttl {
                    return *score;
                }
            }
        }

        let score = match self.distribution(node_id) {
            Ok(dist) => dist.score,
            Err(e) => {
                warn!(node = node_id, error = %e, "fact quality evaluation failed");
                0.0
            }
        };

        if let Ok(mut cache) = self.score_cache.lock() {
            cache.insert(node_id.to_string(), (score, Instant::now()));
        }

        score
    }

    /// Detailed tier breakdown for a node, cached.
    pub fn distribution(&self, node_id: &str) -> Result<FactDistribution> {
        if let Ok(cache) = self.dist_cache.lock() {
            if let Some((dist, at)) = cache.get(node_id) {
                if at.elapsed() < self.ttl {
                    return Ok(dist.clone());
                }
            }
        }

        let facts = self.store.facts_for_source(node_id)?;

        let gold = facts.iter().filter(|f| f.tier == Tier::Gold).count();
        let silver = facts.iter().filter(|f| f.tier == Tier::Silver).count();
        let bronze = facts.iter().filter(|f| f.tier == Tier::Bronze).count();
        let total = facts.len();

        let weighted_sum =
            gold as f64 * GOLD_WEIGHT + silver as f64 * SILVER_WEIGHT + bronze as f64 * BRONZE_WEIGHT;
        let score = if total > 0 {
            weighted_sum / (total as f64 * GOLD_WEIGHT)
        } else {
            0.0
        };

        let dist = FactDistribution {
            gold,
            silver,
            bronze,
            total,
            weighted_sum,
            score,
        };

        if let Ok(mut cache) = self.dist_cache.lock() {
            cache.insert(node_id.to_string(), (dist.clone(), Instant::now()));
        }

        Ok(dist)
    }

    /// Drop cached entries for a node. Called on tier promotion, new
    /// extraction, and verification that touches the node.
    pub fn invalidate(&self, node_id: &str) {
        if let Ok(mut cache) = self.score_cache.lock() {
            cache.remove(node_id);
        }
        if let Ok(mut cache) = self.dist_cache.lock() {
            cache.remove(node_id);
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.score_cache.lock() {
            cache.clear();
        }
        if let Ok(mut cache) = self.dist_cache.lock() {
            cache.clear();
        }
    }

    /// Batch scores for several nodes.
    pub fn evaluate_batch(&self, node_ids: &[String]) -> HashMap<String, f64> {
        node_ids
            .iter()
            .map(|id| (id.clone(), self.evaluate(id)))
            .collect()
    }

    /// Store-wide tier breakdown with percentage distribution.
    pub fn summary(&self) -> Result<QualitySummary> {
        let all = self.store.all(SCAN_LIMIT)?;
        let total = all.len() as u64;

        if total == 0 {
            return Ok(QualitySummary::default());
        }

        let gold = all.iter().filter(|f| f.tier == Tier::Gold).count() as u64;
        let silver = all.iter().filter(|f| f.tier == Tier::Silver).count() as u64;
        let bronze = all.iter().filter(|f| f.tier == Tier::Bronze).count() as u64;

        let weighted_sum = gold as f64 * GOLD_WEIGHT
            + silver as f64 * SILVER_WEIGHT
            + bronze as f64 * BRONZE_WEIGHT;

        Ok(QualitySummary {
            total_facts: total,
            gold_count: gold,
            silver_count: silver,
            bronze_count: bronze,
            avg_quality_score: weighted_sum / (total as f64 * GOLD_WEIGHT),
            gold_percentage: gold as f64 / total as f64 * 100.0,
            silver_percentage: silver as f64 / total as f64 * 100.0,
            bronze_percentage: bronze as f64 / total as f64 * 100.0,
        })
    }

    pub fn cache_stats(&self) -> QualityCacheStats {
        QualityCacheStats {
            score_entries: self.score_cache.lock().map(|c| c.len()).unwrap_or(0),
            distribution_entries: self.dist_cache.lock().map(|c| c.len()).unwrap_or(0),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
