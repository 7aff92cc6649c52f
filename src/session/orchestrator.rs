//! Research session: tree expansion orchestration over the fact store,
//! intelligence layer, and search engine.
//!
//! One expansion step: the engine picks a leaf, `expand` answers its
//! question, the extractor derives SPO triplets, the store ingests them, the
//! verifier accumulates cross-branch corroboration, the promoter raises
//! tiers, the conflict resolver reconciles contradictions, and the
//! fact-quality caches for touched nodes are invalidated. Any intelligence
//! step that fails logs a warning and moves on; expansion itself fails only
//! when the primary answer generation fails.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::axioms::AxiomLibrary;
use crate::error::{Error, Result};
use crate::extract::{ExtractionContext, ExtractorConfig, FactExtractor};
use crate::facts::{FactStore, FactStoreStats, Triplet};
use crate::generator::{Capability, GenerationParams, GeneratorRouter, Quality, RouterStats};
use crate::intelligence::{
    AxiomJudge, ConflictResolver, FactQualityEvaluator, ResolutionStrategy, SourceVerifier,
    TierPromoter,
};
use crate::search::{
    BudgetStats, MctsConfig, MctsEngine, TokenBudgetGovernor, XotPrior,
};
use crate::session::config::SessionConfig;
use crate::tree::{
    CoverageAnalyzer, EntityGraph, NodeId, NodeStatus, TreeStats, TreeStore,
};

const DECOMPOSITION_PROMPT: &str = "You are a research question decomposer. Break down complex questions into simpler sub-questions.

Main Question: \"{question}\"

Generate exactly {n} sub-questions that, when answered, would help answer the main question.
Each sub-question should be:
- Specific and focused
- Answerable independently
- Complementary (covering different aspects)

Format your response as a numbered list:
1. [First sub-question]
2. [Second sub-question]
3. [Third sub-question]

Sub-questions:";

/// Confidence recorded for freshly generated answers, pending refinement.
const DEFAULT_ANSWER_CONFIDENCE: f64 = 0.8;

/// Result of expanding one node.
#[derive(Debug, Clone, Default)]
pub struct ExpansionOutcome {
    pub triplets_stored: usize,
    pub verifications: usize,
    pub promotions: usize,
    pub conflicts_resolved: usize,
    pub conflicts_manual_review: usize,
}

/// Session counters surfaced through [`SessionStats`].
#[derive(Debug, Clone, Copy, Default)]
struct SessionCounters {
    manual_review_conflicts: u64,
    decomposition_failures: u64,
    expansion_failures: u64,
}

/// The partial-failure surface: how external code observes fallbacks,
/// prunes, unresolved conflicts, and tier distribution.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub tree: TreeStats,
    pub facts: FactStoreStats,
    pub budget: BudgetStats,
    pub router: RouterStats,
    pub manual_review_conflicts: u64,
    pub decomposition_failures: u64,
    pub expansion_failures: u64,
}

/// A self-contained research session over one fact store and one tree.
pub struct ResearchSession {
    config: SessionConfig,
    router: Arc<GeneratorRouter>,
    store: FactStore,
    tree: Arc<RwLock<TreeStore>>,
    entity_graph: Arc<RwLock<EntityGraph>>,
    axioms: Option<Arc<AxiomLibrary>>,

    extractor: FactExtractor,
    verifier: SourceVerifier,
    resolver: ConflictResolver,
    promoter: Arc<TierPromoter>,
    quality: Arc<FactQualityEvaluator>,
    budget: Arc<Mutex<TokenBudgetGovernor>>,
    engine: MctsEngine,

    counters: Mutex<SessionCounters>,
}

impl ResearchSession {
    pub fn new(
        router: Arc<GeneratorRouter>,
        store: FactStore,
        axioms: Option<AxiomLibrary>,
        config: SessionConfig,
    ) -> Self {
        let axioms = axioms.map(Arc::new);
        let tree = Arc::new(RwLock::new(
            TreeStore::new().with_max_nodes(config.max_tree_nodes),
        ));
        let entity_graph = Arc::new(RwLock::new(EntityGraph::new()));

        let extractor = FactExtractor::new(Arc::clone(&router))
            .with_config(ExtractorConfig::default());

        let verifier = SourceVerifier::new(store.clone())
            .with_min_sources(
                config.promotion.min_sources_silver,
                config.promotion.min_sources_gold,
            )
            .with_similarity_threshold(config.similarity_threshold);

        let resolver = ConflictResolver::new(store.clone())
            .with_threshold(config.conflict_threshold);

        let judge = axioms.as_ref().map(|library| {
            Arc::new(
                AxiomJudge::new(Arc::clone(&router), (**library).clone())
                    .with_pass_threshold(config.axiom_judge_pass_threshold)
                    .with_quality(config.axiom_judge_quality),
            )
        });

        let mut promoter =
            TierPromoter::new(store.clone()).with_rules(config.promotion.clone());
        if let Some(judge) = judge {
            promoter = promoter.with_judge(judge);
        }
        let promoter = Arc::new(promoter);

        let quality = Arc::new(
            FactQualityEvaluator::new(store.clone())
                .with_ttl(std::time::Duration::from_secs(config.quality_cache_ttl_secs)),
        );

        let budget = Arc::new(Mutex::new(
            TokenBudgetGovernor::new(config.token_budget_total, config.token_budget_default_node)
                .with_node_bounds(config.token_budget_min_node, config.token_budget_max_node),
        ));

        let xot = Arc::new(
            XotPrior::new(Arc::clone(&router))
                .with_depth(config.xot_depth)
                .with_fallback_score(config.xot_fallback_score)
                .with_timeout_ms(config.xot_timeout_ms),
        );

        let engine = MctsEngine::new(
            Arc::clone(&tree),
            Arc::clone(&entity_graph),
            Arc::clone(&router),
        )
        .with_config(MctsConfig {
            exploration_constant: config.exploration_constant,
            fact_quality_weight: config.fact_quality_weight,
            coverage_weight: config.coverage_weight,
            coverage_adaptive: config.coverage_adaptive,
            xot_weight: config.xot_weight,
            simulation_strategy: config.simulation_strategy,
        })
        .with_quality_evaluator(Arc::clone(&quality))
        .with_coverage(CoverageAnalyzer::new(config.max_depth), axioms.clone())
        .with_xot(xot)
        .with_budget(Arc::clone(&budget));

        Self {
            config,
            router,
            store,
            tree,
            entity_graph,
            axioms,
            extractor,
            verifier,
            resolver,
            promoter,
            quality,
            budget,
            engine,
            counters: Mutex::new(SessionCounters::default()),
        }
    }

    /// Create the root node for the main research question.
    pub fn create_root(&self, question: impl Into<String>) -> Result<NodeId> {
        let mut tree = self
            .tree
            .write()
            .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
        tree.create_root(question)
    }

    /// Decompose a node's question into sub-questions and create children.
    /// Returns the new child ids; empty at the depth limit or on generation
    /// failure.
    pub async fn decompose(&self, node_id: &NodeId) -> Result<Vec<NodeId>> {
        let question = {
            let mut tree = self
                .tree
                .write()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            let Some(node) = tree.get(node_id) else {
                return Ok(Vec::new());
            };
            if node.depth >= self.config.max_depth {
                debug!(node = %node_id, "depth limit reached, not decomposing");
                return Ok(Vec::new());
            }
            let question = node.question.clone();
            tree.set_status(node_id, NodeStatus::Exploring);
            question
        };

        let prompt = DECOMPOSITION_PROMPT
            .replace("{question}", &question)
            .replace("{n}", &self.config.branching_factor.to_string());

        let response = match self
            .router
            .generate(
                &prompt,
                Capability::Reasoning,
                Quality::Fast,
                &GenerationParams::new(),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(node = %node_id, error = %e, "decomposition failed");
                if let Ok(mut counters) = self.counters.lock() {
                    counters.decomposition_failures += 1;
                }
                let mut tree = self
                    .tree
                    .write()
                    .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
                tree.set_status(node_id, NodeStatus::Pending);
                return Ok(Vec::new());
            }
        };

        self.charge_tokens(node_id, response.tokens_used);

        let sub_questions = parse_sub_questions(&response.content);
        let mut child_ids = Vec::new();
        {
            let mut tree = self
                .tree
                .write()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            for question in sub_questions.into_iter().take(self.config.branching_factor) {
                match tree.add_child(node_id, question) {
                    Ok(child) => child_ids.push(child),
                    Err(e) => {
                        warn!(node = %node_id, error = %e, "could not add child");
                        break;
                    }
                }
            }
            tree.set_status(node_id, NodeStatus::Evaluated);
        }

        info!(node = %node_id, children = child_ids.len(), "decomposed question");
        Ok(child_ids)
    }

    /// Expand a node: answer its question with graph context, extract SPO
    /// facts, and run the intelligence pipeline over them.
    pub async fn expand(&self, node_id: &NodeId, quality: Quality) -> Result<ExpansionOutcome> {
        let question = {
            let mut tree = self
                .tree
                .write()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            let Some(node) = tree.get(node_id) else {
                return Err(Error::invalid_argument(format!("Node {node_id} not found")));
            };
            let question = node.question.clone();
            tree.set_status(node_id, NodeStatus::Exploring);
            question
        };

        let context_block = self.assemble_context(node_id);
        let prompt = if context_block.is_empty() {
            format!(
                "Answer the following research question.\n\nQuestion: {question}\n\n\
                 Provide a clear, concise answer (2-3 sentences). Focus on actionable insights."
            )
        } else {
            format!(
                "Answer the following research question based on the provided context.\n\n\
                 Context:\n{context_block}\n\nQuestion: {question}\n\n\
                 Provide a clear, concise answer (2-3 sentences). Focus on actionable insights."
            )
        };

        let response = match self
            .router
            .generate(&prompt, Capability::Reasoning, quality, &GenerationParams::new())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if let Ok(mut counters) = self.counters.lock() {
                    counters.expansion_failures += 1;
                }
                let mut tree = self
                    .tree
                    .write()
                    .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
                tree.set_status(node_id, NodeStatus::Pending);
                return Err(e);
            }
        };

        self.charge_tokens(node_id, response.tokens_used);

        let entities = extract_entities(&response.content);
        {
            let mut tree = self
                .tree
                .write()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            if let Some(node) = tree.get_mut(node_id) {
                node.answer = Some(response.content.clone());
                node.confidence = DEFAULT_ANSWER_CONFIDENCE;
                node.reasoning = Some(format!("Generated by {}", response.model_id));
                node.entities = entities.clone();
                node.touch();
            }
        }
        {
            let mut graph = self
                .entity_graph
                .write()
                .map_err(|e| Error::Internal(format!("graph lock: {e}")))?;
            for entity in &entities {
                graph.add_entity(entity.clone());
            }
        }

        // Fact derivation
        let extraction_context =
            ExtractionContext::new(node_id.to_string()).with_model(response.model_id.clone());
        let triplets = self
            .extractor
            .extract(&response.content, &extraction_context, Quality::Fast)
            .await;

        let mut outcome = ExpansionOutcome::default();
        let mut stored = Vec::new();
        for triplet in triplets {
            match self.store.insert(&triplet) {
                Ok(id) => {
                    let mut tree = self
                        .tree
                        .write()
                        .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
                    if let Some(node) = tree.get_mut(node_id) {
                        node.triplet_ids.push(id.clone());
                    }
                    drop(tree);

                    if let Ok(mut graph) = self.entity_graph.write() {
                        graph.add_edge(
                            triplet.subject.to_lowercase(),
                            triplet.object.to_lowercase(),
                            triplet.predicate.to_lowercase(),
                            triplet.confidence,
                        );
                    }
                    stored.push(triplet);
                }
                Err(e) => warn!(error = %e, "failed to store extracted triplet"),
            }
        }
        outcome.triplets_stored = stored.len();

        // Intelligence pipeline per new triplet
        for triplet in &stored {
            self.run_intelligence_pipeline(node_id, triplet, &mut outcome)
                .await;
        }

        // Axiom screening of the node
        if let Some(library) = &self.axioms {
            let (confidence, metadata) = {
                let tree = self
                    .tree
                    .read()
                    .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
                let node = tree.get(node_id);
                (
                    node.map(|n| n.confidence).unwrap_or(0.0),
                    node.map(|n| n.metadata.clone()).unwrap_or_default(),
                )
            };
            let axiom_scores = library.score_per_axiom(confidence, &metadata);

            let hard_reject = stored.iter().any(|t| {
                library.score_node(t.confidence, &t.metadata)
                    < self.config.axiom_hard_reject_threshold
            });

            let mut tree = self
                .tree
                .write()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            if let Some(node) = tree.get_mut(node_id) {
                node.axiom_scores = axiom_scores;
                if hard_reject {
                    node.axiom_compatible = false;
                }
            }
        }

        self.quality.invalidate(&node_id.to_string());
        {
            let mut tree = self
                .tree
                .write()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            tree.set_status(node_id, NodeStatus::Evaluated);
        }

        info!(
            node = %node_id,
            triplets = outcome.triplets_stored,
            verifications = outcome.verifications,
            promotions = outcome.promotions,
            "expanded node"
        );
        Ok(outcome)
    }

    /// Cross-branch verification, promotion, and conflict resolution for one
    /// new triplet. Every step degrades to a logged warning.
    async fn run_intelligence_pipeline(
        &self,
        node_id: &NodeId,
        triplet: &Triplet,
        outcome: &mut ExpansionOutcome,
    ) {
        let mut touched_sources: HashSet<String> = HashSet::new();

        // Verify -> promote, both directions, before conflicts: a conflict
        // loser must not be promoted in the same step that removes it
        match self.verifier.find_similar(triplet, None) {
            Ok(similar) => {
                for (other, score) in similar {
                    debug!(a = %triplet.id, b = %other.id, score, "similar triplet found");

                    if let Err(e) = self
                        .verifier
                        .verify(&other.id, &triplet.provenance.source_id)
                    {
                        warn!(error = %e, "verification failed");
                        continue;
                    }
                    if let Err(e) = self.verifier.verify(&triplet.id, &other.provenance.source_id) {
                        warn!(error = %e, "verification failed");
                    }
                    outcome.verifications += 2;
                    touched_sources.insert(other.provenance.source_id.clone());

                    for id in [&other.id, &triplet.id] {
                        match self.promoter.promote_if_eligible(id, false).await {
                            Ok(result) if result.promoted => outcome.promotions += 1,
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "promotion failed"),
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "similarity search failed"),
        }

        match self.resolver.detect_conflicts(triplet) {
            Ok(conflicts) => {
                for conflict in conflicts {
                    let resolution = self.resolver.resolve(&conflict, ResolutionStrategy::Tier);
                    if resolution.manual_review_needed {
                        outcome.conflicts_manual_review += 1;
                        if let Ok(mut counters) = self.counters.lock() {
                            counters.manual_review_conflicts += 1;
                        }
                        info!(
                            kept = %resolution.kept,
                            reason = %resolution.reasoning,
                            "conflict flagged for manual review"
                        );
                    } else if let Some(loser) = &resolution.removed {
                        match self.store.delete(loser) {
                            Ok(true) => {
                                outcome.conflicts_resolved += 1;
                                debug!(loser = %loser, "conflict loser deleted");
                            }
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "conflict deletion failed"),
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "conflict detection failed"),
        }

        self.quality.invalidate(&node_id.to_string());
        for source in touched_sources {
            self.quality.invalidate(&source);
        }
    }

    /// Build the expansion context block from the parent's entities: an ego
    /// subgraph rendering plus the most confident related facts that pass
    /// the axiom filters.
    fn assemble_context(&self, node_id: &NodeId) -> String {
        let parent_entities: Vec<String> = {
            let Ok(tree) = self.tree.read() else {
                return String::new();
            };
            let Some(parent_id) = tree.get(node_id).and_then(|n| n.parent_id.clone()) else {
                return String::new();
            };
            match tree.get(&parent_id) {
                Some(parent) => parent.entities.clone(),
                None => return String::new(),
            }
        };

        if parent_entities.is_empty() {
            return String::new();
        }

        let Ok(graph) = self.entity_graph.read() else {
            return String::new();
        };

        let mut ego: Vec<String> = Vec::new();
        for entity in parent_entities.iter().take(3) {
            for label in graph.ego_subgraph(entity, 1) {
                if !ego.contains(&label) {
                    ego.push(label);
                }
            }
        }
        if ego.is_empty() {
            return String::new();
        }

        let mut block = graph.to_markdown(&ego, 10);
        drop(graph);

        // Attach the strongest related facts, axiom-filtered
        let ego_set: HashSet<String> = ego.into_iter().collect();
        let facts = match self.store.all(1_000) {
            Ok(facts) => facts,
            Err(e) => {
                warn!(error = %e, "context fact lookup failed");
                return block;
            }
        };

        let mut related: Vec<&Triplet> = facts
            .iter()
            .filter(|t| ego_set.contains(&t.subject.to_lowercase()))
            .filter(|t| {
                self.axioms
                    .as_ref()
                    .map(|lib| lib.passes_filters(&t.metadata))
                    .unwrap_or(true)
            })
            .collect();
        related.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if !related.is_empty() {
            block.push_str("\n\n# Established facts\n");
            for t in related.iter().take(10) {
                block.push_str(&format!(
                    "- {} {} {} ({:.2}, {})\n",
                    t.subject, t.predicate, t.object, t.confidence, t.tier
                ));
            }
        }

        // max_context_tokens is advisory; cap at ~4 chars per token
        let char_budget = self.config.max_context_tokens.saturating_mul(4);
        if block.len() > char_budget {
            block.truncate(
                block
                    .char_indices()
                    .take_while(|(i, _)| *i < char_budget)
                    .last()
                    .map(|(i, c)| i + c.len_utf8())
                    .unwrap_or(0),
            );
        }

        block
    }

    fn charge_tokens(&self, node_id: &NodeId, tokens: u64) {
        if tokens == 0 {
            return;
        }
        if let Ok(mut governor) = self.budget.lock() {
            governor.track(&node_id.to_string(), tokens);
        }
    }

    /// Run search iterations; see [`MctsEngine::iterate`].
    pub async fn iterate(&self, n: usize) -> crate::search::IterationReport {
        self.engine.iterate(n).await
    }

    pub fn engine(&self) -> &MctsEngine {
        &self.engine
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    pub fn tree(&self) -> &Arc<RwLock<TreeStore>> {
        &self.tree
    }

    pub fn entity_graph(&self) -> &Arc<RwLock<EntityGraph>> {
        &self.entity_graph
    }

    pub fn quality_evaluator(&self) -> &Arc<FactQualityEvaluator> {
        &self.quality
    }

    pub fn promoter(&self) -> &Arc<TierPromoter> {
        &self.promoter
    }

    pub fn verifier(&self) -> &SourceVerifier {
        &self.verifier
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session statistics: the contract through which external code observes
    /// partial failure.
    pub fn stats(&self) -> Result<SessionStats> {
        let counters = self.counters.lock().map(|c| *c).unwrap_or_default();

        Ok(SessionStats {
            tree: self
                .tree
                .read()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?
                .stats(),
            facts: self.store.stats()?,
            budget: self
                .budget
                .lock()
                .map_err(|e| Error::Internal(format!("budget lock: {e}")))?
                .stats(),
            router: self.router.stats(),
            manual_review_conflicts: counters.manual_review_conflicts,
            decomposition_failures: counters.decomposition_failures,
            expansion_failures: counters.expansion_failures,
        })
    }

    /// Snapshot the session to JSON: full tree, fact-store statistics,
    /// budget ledger, and axiom references. Tree nodes round-trip through
    /// their serde representation.
    pub fn snapshot(&self) -> Result<Value> {
        let tree_nodes: Vec<Value> = {
            let tree = self
                .tree
                .read()
                .map_err(|e| Error::Internal(format!("tree lock: {e}")))?;
            tree.iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<_, _>>()?
        };

        let ledger: Value = {
            let governor = self
                .budget
                .lock()
                .map_err(|e| Error::Internal(format!("budget lock: {e}")))?;
            serde_json::to_value(governor.ledger())?
        };

        let axiom_ids: Vec<String> = self
            .axioms
            .as_ref()
            .map(|lib| lib.all().iter().map(|a| a.id.clone()).collect())
            .unwrap_or_default();

        Ok(json!({
            "tree": tree_nodes,
            "fact_stats": serde_json::to_value(self.store.stats()?)?,
            "budget_ledger": ledger,
            "axioms": axiom_ids,
        }))
    }
}

/// Parse a numbered sub-question list, keeping lines long enough to be
/// plausible questions.
fn parse_sub_questions(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && (line.starts_with('-') || line.chars().next().is_some_and(|c| c.is_ascii_digit()))
        })
        .filter_map(|line| {
            let stripped = line.trim_start_matches(|c: char| c.is_ascii_digit());
            let stripped = stripped
                .strip_prefix('.')
                .or_else(|| stripped.strip_prefix(')'))
                .unwrap_or(stripped);
            let question = stripped
                .trim_start_matches(['-', ' ', '['])
                .trim_end_matches(']')
                .trim();
            (question.len() > 10).then(|| question.to_string())
        })
        .collect()
}

/// Lightweight entity extraction: tokens longer than two characters starting
/// with an uppercase letter, lowercased, deduplicated, capped at ten.
fn extract_entities(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for word in text.split_whitespace() {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric());
        if cleaned.len() > 2 && cleaned.chars().next().is_some_and(|c| c.is_uppercase()) {
            let lower = cleaned.to_lowercase();
            if seen.insert(lower.clone()) {
                entities.push(lower);
                if entities.len() == 10 {
                    break;
                }
            }
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axioms::{Axiom, AxiomApplication};
    use crate::facts::{ExtractionMethod, FactQuery, Provenance, Tier};
    use crate::generator::ScriptedGenerator;
    use serde_json::json as j;

    fn session_with(responses: &[&str]) -> ResearchSession {
        session_with_axioms(responses, None)
    }

    fn session_with_axioms(responses: &[&str], axioms: Option<AxiomLibrary>) -> ResearchSession {
        let mut router = GeneratorRouter::new();
        let scripted = ScriptedGenerator::new()
            .with_default_response("0.5")
            .with_tokens_per_response(100);
        for r in responses {
            scripted.push_response(*r);
        }
        router.register("scripted", Arc::new(scripted));

        ResearchSession::new(
            Arc::new(router),
            FactStore::in_memory().unwrap(),
            axioms,
            SessionConfig::default(),
        )
    }

    #[test]
    fn test_parse_sub_questions() {
        let response = "\
1. What markets have high customer friction?
2) What markets have low competition?
- What markets align with my skills?
3. too short
not a list line";

        let questions = parse_sub_questions(response);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "What markets have high customer friction?");
        assert_eq!(questions[1], "What markets have low competition?");
        assert_eq!(questions[2], "What markets align with my skills?");
    }

    #[test]
    fn test_extract_entities_rule() {
        let text = "Solar adoption in Germany and Spain outpaces the UK. Germany leads.";
        let entities = extract_entities(text);

        assert!(entities.contains(&"solar".to_string()));
        assert!(entities.contains(&"germany".to_string()));
        assert!(entities.contains(&"spain".to_string()));
        // Deduplicated
        assert_eq!(entities.iter().filter(|e| *e == "germany").count(), 1);
        // Two-letter tokens dropped even when capitalized
        assert!(!entities.contains(&"uk".to_string()));
    }

    #[test]
    fn test_extract_entities_capped_at_ten() {
        let text = "Alpha Bravo Charlie Delta Echo Foxtrot Golf Hotel India Juliett Kilo Lima";
        assert_eq!(extract_entities(text).len(), 10);
    }

    #[tokio::test]
    async fn test_decompose_creates_children() {
        let session = session_with(&[
            "1. What markets have high friction?\n2. What markets have low competition?\n3. What markets fit my skills?",
        ]);
        let root = session.create_root("What e-commerce niche should I pursue?").unwrap();

        let children = session.decompose(&root).await.unwrap();
        assert_eq!(children.len(), 3);

        let tree = session.tree().read().unwrap();
        assert_eq!(tree.get(&root).unwrap().status, NodeStatus::Evaluated);
        for child in &children {
            let node = tree.get(child).unwrap();
            assert_eq!(node.depth, 1);
            assert_eq!(node.status, NodeStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_decompose_respects_depth_limit() {
        let mut config = SessionConfig::default();
        config.max_depth = 0;

        let mut router = GeneratorRouter::new();
        router.register("scripted", Arc::new(ScriptedGenerator::new()));
        let session = ResearchSession::new(
            Arc::new(router),
            FactStore::in_memory().unwrap(),
            None,
            config,
        );

        let root = session.create_root("root").unwrap();
        assert!(session.decompose(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decompose_failure_restores_pending() {
        // Router with no provider: generation fails
        let session = ResearchSession::new(
            Arc::new(GeneratorRouter::new()),
            FactStore::in_memory().unwrap(),
            None,
            SessionConfig::default(),
        );
        let root = session.create_root("root question").unwrap();

        let children = session.decompose(&root).await.unwrap();
        assert!(children.is_empty());

        let tree = session.tree().read().unwrap();
        assert_eq!(tree.get(&root).unwrap().status, NodeStatus::Pending);
        assert_eq!(session.stats().unwrap().decomposition_failures, 1);
    }

    #[tokio::test]
    async fn test_expand_stores_answer_entities_and_facts() {
        let session = session_with(&[
            // Answer generation
            "Solar panels reduce carbon emissions significantly in Germany.",
            // Extraction response
            r#"[{"subject":"solar panels","predicate":"reduces","object":"carbon emissions","confidence":0.9}]"#,
        ]);
        let root = session.create_root("Does solar reduce emissions?").unwrap();

        let outcome = session.expand(&root, Quality::Balanced).await.unwrap();
        assert_eq!(outcome.triplets_stored, 1);

        let tree = session.tree().read().unwrap();
        let node = tree.get(&root).unwrap();
        assert_eq!(node.status, NodeStatus::Evaluated);
        assert!(node.answer.as_deref().unwrap().contains("Solar panels"));
        assert!((node.confidence - 0.8).abs() < 1e-9);
        assert!(node.entities.contains(&"solar".to_string()));
        assert_eq!(node.triplet_ids.len(), 1);
        drop(tree);

        let stored = session
            .store()
            .query(&FactQuery::new().subject("solar panels"))
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].provenance.source_id, root.to_string());

        // Subject -> object edge lands in the entity graph
        let graph = session.entity_graph().read().unwrap();
        assert!(graph.contains("solar panels"));
        assert!(graph
            .neighbors("solar panels")
            .contains(&"carbon emissions".to_string()));
    }

    #[tokio::test]
    async fn test_expand_failure_is_fatal_to_the_call() {
        let session = ResearchSession::new(
            Arc::new(GeneratorRouter::new()),
            FactStore::in_memory().unwrap(),
            None,
            SessionConfig::default(),
        );
        let root = session.create_root("root question").unwrap();

        assert!(session.expand(&root, Quality::Balanced).await.is_err());
        let tree = session.tree().read().unwrap();
        assert_eq!(tree.get(&root).unwrap().status, NodeStatus::Pending);
        assert_eq!(session.stats().unwrap().expansion_failures, 1);
    }

    #[tokio::test]
    async fn test_corroboration_promotes_to_silver() {
        // Scenario: same fact extracted at two nodes promotes to Silver
        let session = session_with(&[
            // First expansion: answer + extraction
            "Solar panels reduce carbon emissions.",
            r#"[{"subject":"Solar panels","predicate":"reduces","object":"carbon emissions","confidence":0.9}]"#,
            // Second expansion: same fact from another branch
            "Studies confirm solar panels reduce carbon emissions.",
            r#"[{"subject":"solar panels","predicate":"reduces","object":"carbon emissions","confidence":0.9}]"#,
        ]);

        let root = session.create_root("Does solar reduce emissions?").unwrap();
        let (a, b) = {
            let mut tree = session.tree().write().unwrap();
            let a = tree.add_child(&root, "What do lifecycle studies say?").unwrap();
            let b = tree.add_child(&root, "What do field deployments show?").unwrap();
            (a, b)
        };

        session.expand(&a, Quality::Balanced).await.unwrap();
        let outcome = session.expand(&b, Quality::Balanced).await.unwrap();

        assert!(outcome.verifications >= 2);
        assert!(outcome.promotions >= 1);

        let first = session
            .store()
            .query(&FactQuery::new().subject("Solar panels"))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tier, Tier::Silver);
        assert_eq!(first[0].provenance.effective_source_count(), 2);
    }

    #[tokio::test]
    async fn test_conflict_resolved_by_tier_deletes_loser() {
        // Scenario B: pre-existing Silver "low" beats fresh Bronze "high"
        let session = session_with(&[
            "Solar panel costs are high in some regions.",
            r#"[{"subject":"Solar panels","predicate":"cost","object":"high","confidence":0.70}]"#,
        ]);

        let silver = Triplet::new(
            "Solar panels",
            "cost",
            "low",
            0.85,
            Provenance::new("n2", ExtractionMethod::LlmStructured),
        )
        .with_tier(Tier::Silver);
        session.store().insert(&silver).unwrap();

        let root = session.create_root("What do solar panels cost?").unwrap();
        let outcome = session.expand(&root, Quality::Balanced).await.unwrap();

        assert_eq!(outcome.conflicts_resolved, 1);

        let remaining = session
            .store()
            .query(&FactQuery::new().subject("Solar panels"))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].object, "low");

        // Second pass over the whole store finds nothing left to resolve
        let (_, stats) = session
            .resolver()
            .auto_resolve_all(ResolutionStrategy::Tier, true)
            .unwrap();
        assert_eq!(stats.total_conflicts, 0);
    }

    #[tokio::test]
    async fn test_axiom_hard_reject_marks_node_incompatible() {
        // Every extracted fact carries original_text_length metadata; a
        // scorer axiom keyed on it drags the fact score to 0, below the
        // hard-reject threshold
        let library = AxiomLibrary::from_axioms([Axiom::new(
            "reject_everything",
            AxiomApplication::Scorer,
            "Synthetic axiom that rejects all extractions",
        )
        .with_condition("if_original_text_length > 0", -1.0)]);

        let session = session_with_axioms(
            &[
                "Returns in basket weaving stay low.",
                r#"[{"subject":"basket weaving","predicate":"yields","object":"low returns","confidence":0.9}]"#,
            ],
            Some(library),
        );

        let root = session.create_root("Is basket weaving worth it?").unwrap();
        session.expand(&root, Quality::Balanced).await.unwrap();

        let tree = session.tree().read().unwrap();
        let node = tree.get(&root).unwrap();
        assert!(!node.axiom_compatible);
        assert!(node.axiom_scores.contains_key("reject_everything"));
    }

    #[tokio::test]
    async fn test_axiom_filter_excludes_fact_from_context() {
        // Scenario F: a fact whose metadata fails a filter axiom is left out
        // of the context block
        let library = AxiomLibrary::from_axioms([Axiom::new(
            "roi_floor",
            AxiomApplication::Filter,
            "Demand a minimum return per hour",
        )
        .with_condition("if_roi_per_hour < 50", -1.0)]);

        let session = session_with_axioms(&[], Some(library));
        let root = session.create_root("root question").unwrap();
        let child = {
            let mut tree = session.tree().write().unwrap();
            let child = tree.add_child(&root, "child question").unwrap();
            tree.get_mut(&root).unwrap().entities = vec!["ventures".to_string()];
            child
        };

        {
            let mut graph = session.entity_graph().write().unwrap();
            graph.add_entity("ventures");
        }

        let rejected = Triplet::new(
            "ventures",
            "yields",
            "30 per hour",
            0.9,
            Provenance::new("n1", ExtractionMethod::Manual),
        )
        .with_metadata("roi_per_hour", j!(30));
        let accepted = Triplet::new(
            "ventures",
            "yields",
            "120 per hour",
            0.8,
            Provenance::new("n2", ExtractionMethod::Manual),
        )
        .with_metadata("roi_per_hour", j!(120));
        session.store().insert(&rejected).unwrap();
        session.store().insert(&accepted).unwrap();

        let context = session.assemble_context(&child);
        assert!(context.contains("120 per hour"));
        assert!(!context.contains("30 per hour"));
    }

    #[tokio::test]
    async fn test_stats_surface() {
        let session = session_with(&[
            "Solar panels reduce carbon emissions.",
            r#"[{"subject":"solar panels","predicate":"reduces","object":"carbon emissions","confidence":0.9}]"#,
        ]);
        let root = session.create_root("Does solar reduce emissions?").unwrap();
        session.expand(&root, Quality::Balanced).await.unwrap();

        let stats = session.stats().unwrap();
        assert_eq!(stats.tree.total_nodes, 1);
        assert_eq!(stats.facts.total_triplets, 1);
        assert!(stats.budget.total_consumed > 0);
        assert!(stats.router.total_requests >= 2);
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_tree_nodes() {
        let session = session_with(&[
            "Solar panels reduce carbon emissions.",
            r#"[{"subject":"solar panels","predicate":"reduces","object":"carbon emissions","confidence":0.9}]"#,
        ]);
        let root = session.create_root("Does solar reduce emissions?").unwrap();
        session.expand(&root, Quality::Balanced).await.unwrap();

        let snapshot = session.snapshot().unwrap();
        let nodes = snapshot["tree"].as_array().unwrap();
        assert_eq!(nodes.len(), 1);

        let restored: crate::tree::TreeNode =
            serde_json::from_value(nodes[0].clone()).unwrap();
        let tree = session.tree().read().unwrap();
        assert_eq!(&restored, tree.get(&root).unwrap());

        assert!(snapshot["budget_ledger"].is_object());
        assert!(snapshot["axioms"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_budget_exhaustion_halts_search() {
        // Tiny session budget with llm simulation: the first simulation
        // charges ~1k tokens, blowing the budget, and the next step boundary
        // halts the loop
        let mut config = SessionConfig::default();
        config.token_budget_total = 500;
        config.token_budget_default_node = 100;
        config.token_budget_min_node = 10;
        config.token_budget_max_node = 200;
        config.simulation_strategy = crate::search::SimulationStrategy::Llm;

        let mut router = GeneratorRouter::new();
        router.register(
            "scripted",
            Arc::new(
                ScriptedGenerator::new()
                    .with_response("1. What reduces friction here?\n2. What raises margins here?")
                    .with_default_response("0.5")
                    .with_tokens_per_response(100),
            ),
        );
        let session = ResearchSession::new(
            Arc::new(router),
            FactStore::in_memory().unwrap(),
            None,
            config,
        );

        let root = session.create_root("What niche should I pursue?").unwrap();
        let children = session.decompose(&root).await.unwrap();
        assert_eq!(children.len(), 2);

        let report = session.iterate(5).await;
        assert_eq!(report.iterations_run, 1);
        assert_eq!(
            report.stopped,
            Some(crate::search::StopCause::SessionBudgetExceeded)
        );

        let stats = session.stats().unwrap();
        assert!(stats.budget.total_consumed > stats.budget.total_budget);
    }

    #[tokio::test]
    async fn test_end_to_end_iteration_over_expanded_tree() {
        let session = session_with(&[
            "1. What reduces friction?\n2. What raises margins?\n3. What scales well?",
        ]);
        let root = session.create_root("What niche should I pursue?").unwrap();
        let children = session.decompose(&root).await.unwrap();
        assert_eq!(children.len(), 3);

        let report = session.iterate(3).await;
        assert_eq!(report.iterations_run, 3);
        assert_eq!(report.nodes_selected.len(), 3);

        let best = session.engine().best_path();
        assert!(!best.is_empty());
        assert_eq!(best[0], root);
    }
}
