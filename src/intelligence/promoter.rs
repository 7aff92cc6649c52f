//! Automatic tier promotion for SPO triplets.
//!
//! Sole writer of tier changes. Bronze → Silver needs two effective sources
//! and confidence >= 0.7; Silver → Gold needs three sources, confidence >=
//! 0.85, and an axiom pass. `force` skips the confidence and axiom checks but
//! never the source-count requirement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::facts::{FactStore, Tier, Triplet, TripletId};
use crate::intelligence::judge::AxiomJudge;

const SCAN_LIMIT: usize = 10_000;

/// Promotion rule thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRules {
    pub min_sources_silver: usize,
    pub min_confidence_silver: f64,
    pub min_sources_gold: usize,
    pub min_confidence_gold: f64,
}

impl Default for PromotionRules {
    fn default() -> Self {
        Self {
            min_sources_silver: 2,
            min_confidence_silver: 0.7,
            min_sources_gold: 3,
            min_confidence_gold: 0.85,
        }
    }
}

/// Result of one promotion attempt. `reason` is always populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionResult {
    pub triplet_id: TripletId,
    pub old_tier: Option<Tier>,
    pub new_tier: Option<Tier>,
    pub promoted: bool,
    pub reason: String,
    pub promoted_at: Option<DateTime<Utc>>,
}

impl PromotionResult {
    fn unchanged(id: &TripletId, tier: Option<Tier>, reason: impl Into<String>) -> Self {
        Self {
            triplet_id: id.clone(),
            old_tier: tier,
            new_tier: tier,
            promoted: false,
            reason: reason.into(),
            promoted_at: None,
        }
    }
}

/// Aggregate counts for a batch promotion pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionBatchStats {
    pub total: usize,
    pub promoted: usize,
    pub bronze_to_silver: usize,
    pub silver_to_gold: usize,
    pub unchanged: usize,
}

/// Promoter statistics: tier distribution plus current candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoterStats {
    pub bronze_count: u64,
    pub silver_count: u64,
    pub gold_count: u64,
    pub silver_candidates: usize,
    pub gold_candidates: usize,
}

/// Enforces Bronze → Silver → Gold promotion rules.
pub struct TierPromoter {
    store: FactStore,
    judge: Option<Arc<AxiomJudge>>,
    rules: PromotionRules,
}

impl TierPromoter {
    pub fn new(store: FactStore) -> Self {
        Self {
            store,
            judge: None,
            rules: PromotionRules::default(),
        }
    }

    /// Wire the axiom judge required for Gold promotion.
    pub fn with_judge(mut self, judge: Arc<AxiomJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_rules(mut self, rules: PromotionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &PromotionRules {
        &self.rules
    }

    /// Check and promote a triplet if eligible. A failed attempt leaves the
    /// triplet unchanged with a documented reason.
    pub async fn promote_if_eligible(
        &self,
        triplet_id: &TripletId,
        force: bool,
    ) -> Result<PromotionResult> {
        let Some(triplet) = self.store.get(triplet_id)? else {
            return Ok(PromotionResult::unchanged(
                triplet_id,
                None,
                "Triplet not found",
            ));
        };

        let source_count = triplet.provenance.effective_source_count();

        match triplet.tier {
            Tier::Bronze => self.try_promote_to_silver(&triplet, source_count, force),
            Tier::Silver => {
                self.try_promote_to_gold(&triplet, source_count, force)
                    .await
            }
            Tier::Gold => Ok(PromotionResult::unchanged(
                triplet_id,
                Some(Tier::Gold),
                "Already at gold tier",
            )),
        }
    }

    fn try_promote_to_silver(
        &self,
        triplet: &Triplet,
        source_count: usize,
        force: bool,
    ) -> Result<PromotionResult> {
        if source_count < self.rules.min_sources_silver {
            return Ok(PromotionResult::unchanged(
                &triplet.id,
                Some(Tier::Bronze),
                format!(
                    "Need {} sources, have {}",
                    self.rules.min_sources_silver, source_count
                ),
            ));
        }

        if !force && triplet.confidence < self.rules.min_confidence_silver {
            return Ok(PromotionResult::unchanged(
                &triplet.id,
                Some(Tier::Bronze),
                format!(
                    "Confidence {:.2} below threshold {}",
                    triplet.confidence, self.rules.min_confidence_silver
                ),
            ));
        }

        self.apply(triplet, Tier::Bronze, Tier::Silver, source_count)
    }

    async fn try_promote_to_gold(
        &self,
        triplet: &Triplet,
        source_count: usize,
        force: bool,
    ) -> Result<PromotionResult> {
        if source_count < self.rules.min_sources_gold {
            return Ok(PromotionResult::unchanged(
                &triplet.id,
                Some(Tier::Silver),
                format!(
                    "Need {} sources for gold, have {}",
                    self.rules.min_sources_gold, source_count
                ),
            ));
        }

        if !force && triplet.confidence < self.rules.min_confidence_gold {
            return Ok(PromotionResult::unchanged(
                &triplet.id,
                Some(Tier::Silver),
                format!(
                    "Confidence {:.2} below gold threshold {}",
                    triplet.confidence, self.rules.min_confidence_gold
                ),
            ));
        }

        if !force {
            match &self.judge {
                Some(judge) => {
                    let judgment = judge.evaluate(triplet, None).await;
                    if !judgment.passes {
                        return Ok(PromotionResult::unchanged(
                            &triplet.id,
                            Some(Tier::Silver),
                            format!(
                                "Axiom evaluation failed with score {:.2}: {}",
                                judgment.overall_score, judgment.reasoning
                            ),
                        ));
                    }
                }
                None => {
                    return Ok(PromotionResult::unchanged(
                        &triplet.id,
                        Some(Tier::Silver),
                        "Deferred: gold promotion requires an axiom judge, none configured",
                    ));
                }
            }
        }

        self.apply(triplet, Tier::Silver, Tier::Gold, source_count)
    }

    fn apply(
        &self,
        triplet: &Triplet,
        from: Tier,
        to: Tier,
        source_count: usize,
    ) -> Result<PromotionResult> {
        if !self.store.update_tier(&triplet.id, to)? {
            return Ok(PromotionResult::unchanged(
                &triplet.id,
                Some(from),
                "Store update failed",
            ));
        }

        debug!(triplet = %triplet.id, %from, %to, "promoted triplet");
        Ok(PromotionResult {
            triplet_id: triplet.id.clone(),
            old_tier: Some(from),
            new_tier: Some(to),
            promoted: true,
            reason: format!(
                "Promoted with {} sources, confidence {:.2}",
                source_count, triplet.confidence
            ),
            promoted_at: Some(Utc::now()),
        })
    }

    /// Ordered batch application with aggregate counts.
    pub async fn auto_promote_batch(
        &self,
        triplet_ids: &[TripletId],
        force: bool,
    ) -> Result<(Vec<PromotionResult>, PromotionBatchStats)> {
        let mut results = Vec::with_capacity(triplet_ids.len());
        let mut stats = PromotionBatchStats {
            total: triplet_ids.len(),
            ..Default::default()
        };

        for id in triplet_ids {
            let result = self.promote_if_eligible(id, force).await?;

            if result.promoted {
                stats.promoted += 1;
                match (result.old_tier, result.new_tier) {
                    (Some(Tier::Bronze), Some(Tier::Silver)) => stats.bronze_to_silver += 1,
                    (Some(Tier::Silver), Some(Tier::Gold)) => stats.silver_to_gold += 1,
                    _ => {}
                }
            } else {
                stats.unchanged += 1;
            }

            results.push(result);
        }

        Ok((results, stats))
    }

    /// Triplets currently satisfying the source and confidence rules for the
    /// target tier. Does not mutate and does not consult the judge.
    pub fn promotion_candidates(&self, target_tier: Tier) -> Result<Vec<Triplet>> {
        let all = self.store.all(SCAN_LIMIT)?;

        Ok(all
            .into_iter()
            .filter(|t| {
                let sources = t.provenance.effective_source_count();
                match target_tier {
                    Tier::Silver => {
                        t.tier == Tier::Bronze
                            && sources >= self.rules.min_sources_silver
                            && t.confidence >= self.rules.min_confidence_silver
                    }
                    Tier::Gold => {
                        t.tier == Tier::Silver
                            && sources >= self.rules.min_sources_gold
                            && t.confidence >= self.rules.min_confidence_gold
                    }
                    Tier::Bronze => false,
                }
            })
            .collect())
    }

    pub fn stats(&self) -> Result<PromoterStats> {
        let store_stats = self.store.stats()?;
        Ok(PromoterStats {
            bronze_count: store_stats.by_tier.get(&Tier::Bronze).copied().unwrap_or(0),
            silver_count: store_stats.by_tier.get(&Tier::Silver).copied().unwrap_or(0),
            gold_count: store_stats.by_tier.get(&Tier::Gold).copied().unwrap_or(0),
            silver_candidates: self.promotion_candidates(Tier::Silver)?.len(),
            gold_candidates: self.promotion_candidates(Tier::Gold)?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axioms::{Axiom, AxiomApplication, AxiomLibrary};
    use crate::facts::{ExtractionMethod, Provenance};
    use crate::generator::{GeneratorRouter, ScriptedGenerator};

    fn triplet_with_sources(confidence: f64, extra_sources: &[&str]) -> Triplet {
        let mut provenance = Provenance::new("n1", ExtractionMethod::LlmStructured);
        for source in extra_sources {
            provenance.add_verification_source(*source);
        }
        Triplet::new("Solar panels", "reduces", "emissions", confidence, provenance)
    }

    fn judge_answering(response: &str) -> Arc<AxiomJudge> {
        let mut router = GeneratorRouter::new();
        router.register(
            "scripted",
            Arc::new(ScriptedGenerator::new().with_default_response(response)),
        );
        let library = AxiomLibrary::from_axioms([Axiom::new(
            "sustainability",
            AxiomApplication::Scorer,
            "Prefer sustainable options",
        )]);
        Arc::new(AxiomJudge::new(Arc::new(router), library))
    }

    #[tokio::test]
    async fn test_bronze_to_silver_requires_sources() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &[]);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store);
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(!result.promoted);
        assert!(result.reason.contains("sources"));
    }

    #[tokio::test]
    async fn test_bronze_to_silver_requires_confidence() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.5, &["n2"]);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store);
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(!result.promoted);
        assert!(result.reason.contains("Confidence"));
    }

    #[tokio::test]
    async fn test_bronze_to_silver_promotes() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2"]);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store.clone());
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(result.promoted);
        assert_eq!(result.new_tier, Some(Tier::Silver));
        assert_eq!(store.get(&t.id).unwrap().unwrap().tier, Tier::Silver);
    }

    #[tokio::test]
    async fn test_force_skips_confidence_but_not_sources() {
        let store = FactStore::in_memory().unwrap();
        let low_conf = triplet_with_sources(0.4, &["n2"]);
        store.insert(&low_conf).unwrap();

        let promoter = TierPromoter::new(store.clone());
        let result = promoter
            .promote_if_eligible(&low_conf.id, true)
            .await
            .unwrap();
        assert!(result.promoted);

        let no_sources = triplet_with_sources(0.99, &[]).with_id(crate::facts::TripletId::generate());
        store.insert(&no_sources).unwrap();
        let result = promoter
            .promote_if_eligible(&no_sources.id, true)
            .await
            .unwrap();
        assert!(!result.promoted);
        assert!(result.reason.contains("sources"));
    }

    #[tokio::test]
    async fn test_gold_deferred_without_judge() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2", "n3"]).with_tier(Tier::Silver);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store);
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(!result.promoted);
        assert!(result.reason.contains("Deferred"));
    }

    #[tokio::test]
    async fn test_gold_with_passing_judge() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2", "n3"]).with_tier(Tier::Silver);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store.clone())
            .with_judge(judge_answering("ALIGNMENT: YES\nSCORE: 0.9\nREASONING: fine"));
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(result.promoted);
        assert_eq!(store.get(&t.id).unwrap().unwrap().tier, Tier::Gold);
    }

    #[tokio::test]
    async fn test_gold_blocked_by_failing_judge() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2", "n3"]).with_tier(Tier::Silver);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store.clone())
            .with_judge(judge_answering("ALIGNMENT: NO\nSCORE: 0.2\nREASONING: conflict"));
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(!result.promoted);
        assert!(result.reason.contains("Axiom evaluation failed"));
        assert_eq!(store.get(&t.id).unwrap().unwrap().tier, Tier::Silver);
    }

    #[tokio::test]
    async fn test_gold_force_skips_judge() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2", "n3"]).with_tier(Tier::Silver);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store.clone());
        let result = promoter.promote_if_eligible(&t.id, true).await.unwrap();

        assert!(result.promoted);
        assert_eq!(result.new_tier, Some(Tier::Gold));
    }

    #[tokio::test]
    async fn test_already_gold_unchanged() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2", "n3"]).with_tier(Tier::Gold);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store);
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();

        assert!(!result.promoted);
        assert_eq!(result.old_tier, Some(Tier::Gold));
    }

    #[tokio::test]
    async fn test_missing_triplet() {
        let promoter = TierPromoter::new(FactStore::in_memory().unwrap());
        let result = promoter
            .promote_if_eligible(&crate::facts::TripletId::new("spo_missing"), false)
            .await
            .unwrap();

        assert!(!result.promoted);
        assert_eq!(result.reason, "Triplet not found");
        assert!(result.old_tier.is_none());
    }

    #[tokio::test]
    async fn test_batch_counts() {
        let store = FactStore::in_memory().unwrap();
        let eligible = triplet_with_sources(0.9, &["n2"]);
        let ineligible = triplet_with_sources(0.9, &[]).with_id(crate::facts::TripletId::generate());
        store.insert(&eligible).unwrap();
        store.insert(&ineligible).unwrap();

        let promoter = TierPromoter::new(store);
        let (results, stats) = promoter
            .auto_promote_batch(&[eligible.id.clone(), ineligible.id.clone()], false)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.promoted, 1);
        assert_eq!(stats.bronze_to_silver, 1);
        assert_eq!(stats.unchanged, 1);
    }

    #[tokio::test]
    async fn test_corroboration_ladder_to_gold() {
        // Bronze with two sources and confidence 0.9 promotes to Silver; a
        // third source alone does not reach Gold while confidence sits below
        // 0.85; force then lifts it
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n3"]);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store.clone());

        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();
        assert!(result.promoted);
        assert_eq!(result.new_tier, Some(Tier::Silver));

        store.update_provenance(&t.id, true, Some("n5")).unwrap();

        // Three sources now, but no judge is wired: Gold defers
        let result = promoter.promote_if_eligible(&t.id, false).await.unwrap();
        assert!(!result.promoted);
        assert_eq!(store.get(&t.id).unwrap().unwrap().tier, Tier::Silver);

        let result = promoter.promote_if_eligible(&t.id, true).await.unwrap();
        assert!(result.promoted);
        assert_eq!(store.get(&t.id).unwrap().unwrap().tier, Tier::Gold);
    }

    #[tokio::test]
    async fn test_tier_never_decreases_across_attempts() {
        let store = FactStore::in_memory().unwrap();
        let t = triplet_with_sources(0.9, &["n2", "n3"]);
        store.insert(&t).unwrap();

        let promoter = TierPromoter::new(store.clone());

        let mut highest = Tier::Bronze;
        for force in [false, true, false, true, false] {
            promoter.promote_if_eligible(&t.id, force).await.unwrap();
            let tier = store.get(&t.id).unwrap().unwrap().tier;
            assert!(tier >= highest);
            highest = tier;
        }
        assert_eq!(highest, Tier::Gold);
    }

    #[tokio::test]
    async fn test_promotion_candidates() {
        let store = FactStore::in_memory().unwrap();
        let silver_ready = triplet_with_sources(0.9, &["n2"]);
        let gold_ready = triplet_with_sources(0.9, &["n2", "n3"])
            .with_id(crate::facts::TripletId::generate())
            .with_tier(Tier::Silver);
        let not_ready = triplet_with_sources(0.9, &[]).with_id(crate::facts::TripletId::generate());
        store.insert(&silver_ready).unwrap();
        store.insert(&gold_ready).unwrap();
        store.insert(&not_ready).unwrap();

        let promoter = TierPromoter::new(store);

        let silver = promoter.promotion_candidates(Tier::Silver).unwrap();
        assert_eq!(silver.len(), 1);
        assert_eq!(silver[0].id, silver_ready.id);

        let gold = promoter.promotion_candidates(Tier::Gold).unwrap();
        assert_eq!(gold.len(), 1);
        assert_eq!(gold[0].id, gold_ready.id);

        let stats = promoter.stats().unwrap();
        assert_eq!(stats.silver_candidates, 1);
        assert_eq!(stats.gold_candidates, 1);
    }
}
