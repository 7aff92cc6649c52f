//! MCTS engine: selection, simulation, and backpropagation over the
//! tree-of-thoughts, guided by fact quality, coverage, and XoT priors.
//!
//! Extended UCB1 per child:
//!
//! ```text
//! ucb1 = value/visits
//!      + C * sqrt(ln(parent_visits) / visits)
//!      + fact_quality_weight * quality(child)
//!      + (1 - coverage(child)) * coverage_weight
//!      + xot_weight * prior(child)
//! ```
//!
//! Unvisited children score +inf, so every non-pruned leaf is eventually
//! considered. Each bonus is active only when its component is wired.
//! Budget exhaustion prunes nodes (node level) or stops iteration (session
//! level); pruning decisions are irrevocable within a session.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::axioms::AxiomLibrary;
use crate::generator::{Capability, GenerationParams, GeneratorRouter, Quality};
use crate::intelligence::FactQualityEvaluator;
use crate::search::budget::{BudgetStats, TokenBudgetGovernor};
use crate::search::xot::{XotPrior, XotStats};
use crate::tree::{CoverageAnalyzer, CoverageGap, EntityGraph, NodeId, TreeNode, TreeStore};

/// How leaf values are estimated during simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStrategy {
    /// Mean of the node's stored axiom scores, or its confidence
    Axiom,
    /// Ask the generator for a single 0-1 float; charges ~1k tokens
    Llm,
    /// Uniform random (testing only)
    Random,
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct MctsConfig {
    pub exploration_constant: f64,
    pub fact_quality_weight: f64,
    pub coverage_weight: f64,
    /// Scale the coverage weight by session-wide coverage phase
    pub coverage_adaptive: bool,
    pub xot_weight: f64,
    pub simulation_strategy: SimulationStrategy,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            exploration_constant: std::f64::consts::SQRT_2,
            fact_quality_weight: 0.3,
            coverage_weight: 0.5,
            coverage_adaptive: true,
            xot_weight: 0.2,
            simulation_strategy: SimulationStrategy::Axiom,
        }
    }
}

/// Result of an `iterate` call.
#[derive(Debug, Clone, Default)]
pub struct IterationReport {
    pub iterations_run: usize,
    pub nodes_selected: Vec<NodeId>,
    pub nodes_pruned: usize,
    pub avg_value: f64,
    /// Set when iteration halted before `n` steps
    pub stopped: Option<StopCause>,
}

/// Why iteration halted early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    SessionBudgetExceeded,
    Cancelled,
    EmptyTree,
}

/// Engine statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MctsStats {
    pub total_visits: u64,
    pub total_value: f64,
    pub avg_value: f64,
    pub max_depth_visited: u32,
    pub num_leaves: usize,
    pub best_leaf_visits: u64,
    pub current_coverage_weight: Option<f64>,
    pub session_coverage: Option<f64>,
    pub xot: Option<XotStats>,
    pub budget: Option<BudgetStats>,
}

/// Snapshot of one child taken under the tree lock, so bonus terms can be
/// computed without holding it.
struct ChildSnapshot {
    node: TreeNode,
    coverage_overall: Option<f64>,
    ancestor_questions: Vec<String>,
    base_ucb: f64,
}

/// Monte Carlo Tree Search over the session tree.
pub struct MctsEngine {
    tree: Arc<RwLock<TreeStore>>,
    entity_graph: Arc<RwLock<EntityGraph>>,
    router: Arc<GeneratorRouter>,
    config: MctsConfig,

    quality: Option<Arc<FactQualityEvaluator>>,
    coverage: Option<CoverageAnalyzer>,
    axioms: Option<Arc<AxiomLibrary>>,
    xot: Option<Arc<XotPrior>>,
    budget: Option<Arc<Mutex<TokenBudgetGovernor>>>,

    stop: Arc<AtomicBool>,
}

impl MctsEngine {
    pub fn new(
        tree: Arc<RwLock<TreeStore>>,
        entity_graph: Arc<RwLock<EntityGraph>>,
        router: Arc<GeneratorRouter>,
    ) -> Self {
        Self {
            tree,
            entity_graph,
            router,
            config: MctsConfig::default(),
            quality: None,
            coverage: None,
            axioms: None,
            xot: None,
            budget: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: MctsConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire the fact-quality bonus.
    pub fn with_quality_evaluator(mut self, quality: Arc<FactQualityEvaluator>) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Wire the coverage bonus.
    pub fn with_coverage(
        mut self,
        analyzer: CoverageAnalyzer,
        axioms: Option<Arc<AxiomLibrary>>,
    ) -> Self {
        self.coverage = Some(analyzer);
        self.axioms = axioms;
        self
    }

    /// Wire the XoT prior bonus.
    pub fn with_xot(mut self, xot: Arc<XotPrior>) -> Self {
        self.xot = Some(xot);
        self
    }

    /// Wire the token budget governor.
    pub fn with_budget(mut self, budget: Arc<Mutex<TokenBudgetGovernor>>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Handle for external cancellation; `iterate` returns at the next step
    /// boundary once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Run up to `n` selection -> simulation -> backpropagation steps.
    pub async fn iterate(&self, n: usize) -> IterationReport {
        let mut report = IterationReport::default();
        let mut value_sum = 0.0;

        for _ in 0..n {
            if self.stop.load(Ordering::Relaxed) {
                report.stopped = Some(StopCause::Cancelled);
                break;
            }

            if self.session_budget_exceeded() {
                debug!("session token budget exceeded, stopping iteration");
                report.stopped = Some(StopCause::SessionBudgetExceeded);
                break;
            }

            let Some(leaf_id) = self.select().await else {
                report.stopped = Some(StopCause::EmptyTree);
                break;
            };

            // Node-budget gate: exhausted leaves are pruned and the step
            // yields no simulation
            if !self.node_budget_ok(&leaf_id) {
                let pruned = self
                    .tree
                    .write()
                    .map(|mut t| t.prune_subtree(&leaf_id, "token_budget_exceeded"))
                    .unwrap_or(0);
                report.nodes_pruned += pruned;
                report.iterations_run += 1;
                continue;
            }

            self.allocate_for(&leaf_id);
            report.nodes_selected.push(leaf_id.clone());

            let value = self.simulate(&leaf_id).await;
            self.backpropagate(&leaf_id, value);

            value_sum += value;
            report.iterations_run += 1;
        }

        if !report.nodes_selected.is_empty() {
            report.avg_value = value_sum / report.nodes_selected.len() as f64;
        }
        report
    }

    fn session_budget_exceeded(&self) -> bool {
        self.budget
            .as_ref()
            .and_then(|b| b.lock().ok().map(|g| g.total_exceeded()))
            .unwrap_or(false)
    }

    fn node_budget_ok(&self, node_id: &NodeId) -> bool {
        self.budget
            .as_ref()
            .and_then(|b| b.lock().ok().map(|g| g.check(&node_id.to_string())))
            .unwrap_or(true)
    }

    fn allocate_for(&self, node_id: &NodeId) {
        let Some(budget) = &self.budget else { return };
        let last_ucb = self
            .tree
            .read()
            .ok()
            .and_then(|t| t.get(node_id).map(|n| n.last_ucb))
            .unwrap_or(0.0);
        if let Ok(mut governor) = budget.lock() {
            governor.allocate(&node_id.to_string(), last_ucb);
        }
    }

    /// Walk from the root picking the non-pruned child with the highest
    /// extended UCB1 until reaching a leaf. None on an empty/pruned tree.
    async fn select(&self) -> Option<NodeId> {
        let session_coverage_weight = self.current_coverage_weight();

        let mut current = {
            let tree = self.tree.read().ok()?;
            let root = tree.root_id()?.clone();
            if tree.get(&root)?.is_pruned() {
                return None;
            }
            root
        };

        loop {
            let snapshots = self.snapshot_children(&current)?;
            if snapshots.is_empty() {
                return Some(current);
            }

            let mut best: Option<(NodeId, f64)> = None;
            for snapshot in snapshots {
                let ucb = self
                    .extended_ucb(&snapshot, session_coverage_weight)
                    .await;
                // Strictly-greater keeps insertion order on ties
                if best.as_ref().map(|(_, b)| ucb > *b).unwrap_or(true) {
                    best = Some((snapshot.node.id.clone(), ucb));
                }
            }

            let (chosen, ucb) = best?;
            if let Ok(mut tree) = self.tree.write() {
                if let Some(node) = tree.get_mut(&chosen) {
                    node.last_ucb = ucb;
                }
            }
            current = chosen;
        }
    }

    /// Snapshot the non-pruned children of a node, with everything the bonus
    /// terms need, so no lock is held across awaits.
    fn snapshot_children(&self, parent_id: &NodeId) -> Option<Vec<ChildSnapshot>> {
        let tree = self.tree.read().ok()?;
        let graph = self.entity_graph.read().ok()?;
        let parent = tree.get(parent_id)?;

        let ancestor_questions: Vec<String> = tree
            .path_to_root(parent_id)
            .iter()
            .filter_map(|id| tree.get(id).map(|n| n.question.clone()))
            .collect();

        let snapshots = parent
            .children
            .iter()
            .filter_map(|cid| tree.get(cid))
            .filter(|child| !child.is_pruned())
            .map(|child| {
                let coverage_overall = self
                    .coverage
                    .as_ref()
                    .map(|analyzer| {
                        analyzer
                            .analyze(child, &tree, &graph, self.axioms.as_deref())
                            .overall
                    });

                let base_ucb = base_ucb1(
                    child.visits,
                    child.value,
                    parent.visits,
                    self.config.exploration_constant,
                );

                ChildSnapshot {
                    node: child.clone(),
                    coverage_overall,
                    ancestor_questions: ancestor_questions.clone(),
                    base_ucb,
                }
            })
            .collect();

        Some(snapshots)
    }

    async fn extended_ucb(&self, snapshot: &ChildSnapshot, coverage_weight: f64) -> f64 {
        let mut ucb = snapshot.base_ucb;
        if ucb.is_infinite() {
            return ucb;
        }

        if let Some(quality) = &self.quality {
            ucb += self.config.fact_quality_weight * quality.evaluate(&snapshot.node.id.to_string());
        }

        if let Some(overall) = snapshot.coverage_overall {
            ucb += (1.0 - overall) * coverage_weight;
        }

        if let Some(xot) = &self.xot {
            let prior = xot
                .simulate_quick(&snapshot.node, &snapshot.ancestor_questions)
                .await;
            ucb += self.config.xot_weight * prior;
        }

        ucb
    }

    /// Coverage weight for this selection wave: 0.7 below 0.4 session
    /// coverage, 0.5 below 0.7, 0.3 above, or the static weight.
    fn current_coverage_weight(&self) -> f64 {
        if !self.config.coverage_adaptive {
            return self.config.coverage_weight;
        }

        match self.session_coverage() {
            Some(coverage) if coverage < 0.4 => 0.7,
            Some(coverage) if coverage < 0.7 => 0.5,
            Some(_) => 0.3,
            None => self.config.coverage_weight,
        }
    }

    fn session_coverage(&self) -> Option<f64> {
        let analyzer = self.coverage.as_ref()?;
        let tree = self.tree.read().ok()?;
        let graph = self.entity_graph.read().ok()?;
        Some(
            analyzer
                .session_report(&tree, &graph, self.axioms.as_deref())
                .overall_coverage,
        )
    }

    /// Estimate the value of a leaf per the configured strategy.
    async fn simulate(&self, node_id: &NodeId) -> f64 {
        match self.config.simulation_strategy {
            SimulationStrategy::Axiom => self.simulate_axiom(node_id),
            SimulationStrategy::Llm => self.simulate_llm(node_id).await,
            SimulationStrategy::Random => rand::thread_rng().gen_range(0.0..1.0),
        }
    }

    /// Mean stored axiom score, or confidence when no axiom was scored.
    fn simulate_axiom(&self, node_id: &NodeId) -> f64 {
        let Ok(tree) = self.tree.read() else {
            return 0.0;
        };
        let Some(node) = tree.get(node_id) else {
            return 0.0;
        };

        if node.axiom_scores.is_empty() {
            node.confidence
        } else {
            node.axiom_scores.values().sum::<f64>() / node.axiom_scores.len() as f64
        }
    }

    /// Ask the generator to rate the path; ~1k tokens are charged to the
    /// node. Any failure falls back to 0.5.
    async fn simulate_llm(&self, node_id: &NodeId) -> f64 {
        const SIMULATION_TOKEN_ESTIMATE: u64 = 1_000;

        let prompt = {
            let Ok(tree) = self.tree.read() else {
                return 0.5;
            };
            let questions: Vec<String> = tree
                .path_to_root(node_id)
                .iter()
                .filter_map(|id| tree.get(id).map(|n| n.question.clone()))
                .collect();

            format!(
                "Evaluate the following research path and estimate its probability of leading to a valuable insight.\n\n\
                 Path:\n{}\n\n\
                 Estimate the probability of success (0.0 = very unlikely, 1.0 = very likely) based on:\n\
                 - Question quality\n- Logical progression\n- Actionability\n\n\
                 Respond with ONLY a number between 0.0 and 1.0.",
                questions
                    .iter()
                    .enumerate()
                    .map(|(i, q)| format!("{}. {}", i + 1, q))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };

        if let Some(budget) = &self.budget {
            if let Ok(mut governor) = budget.lock() {
                governor.track(&node_id.to_string(), SIMULATION_TOKEN_ESTIMATE);
            }
        }

        let result = self
            .router
            .generate(
                &prompt,
                Capability::Reasoning,
                Quality::Fast,
                &GenerationParams::new().with_max_tokens(10),
            )
            .await;

        match result {
            Ok(response) => response
                .content
                .trim()
                .parse::<f64>()
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(0.5),
            Err(e) => {
                warn!(error = %e, "llm simulation failed");
                0.5
            }
        }
    }

    /// Add the simulation value to every node on the root path. The whole
    /// path updates under one write lock, so readers never see a partially
    /// updated path.
    fn backpropagate(&self, leaf_id: &NodeId, value: f64) {
        let Ok(mut tree) = self.tree.write() else {
            return;
        };

        let path = tree.path_to_root(leaf_id);
        for id in path {
            if let Some(node) = tree.get_mut(&id) {
                node.visits += 1;
                node.value += value;
                node.touch();
            }
        }
    }

    /// Root-to-leaf path of greatest average value among non-pruned leaves.
    pub fn best_path(&self) -> Vec<NodeId> {
        self.path_by(|node| node.avg_value())
    }

    /// Root-to-leaf path of the most visited non-pruned leaf.
    pub fn most_visited_path(&self) -> Vec<NodeId> {
        self.path_by(|node| node.visits as f64)
    }

    fn path_by(&self, key: impl Fn(&TreeNode) -> f64) -> Vec<NodeId> {
        let Ok(tree) = self.tree.read() else {
            return Vec::new();
        };

        let best = tree
            .leaves()
            .into_iter()
            .max_by(|a, b| {
                key(a)
                    .partial_cmp(&key(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|n| n.id.clone());

        match best {
            Some(id) => tree.path_to_root(&id),
            None => Vec::new(),
        }
    }

    /// Top-k coverage gaps to explore next. Empty without a coverage
    /// analyzer.
    pub fn coverage_suggestions(&self, k: usize) -> Vec<CoverageGap> {
        let Some(analyzer) = &self.coverage else {
            return Vec::new();
        };
        let (Ok(tree), Ok(graph)) = (self.tree.read(), self.entity_graph.read()) else {
            return Vec::new();
        };

        analyzer
            .identify_gaps(0.5, &tree, &graph, self.axioms.as_deref())
            .into_iter()
            .take(k)
            .collect()
    }

    pub fn stats(&self) -> MctsStats {
        let mut stats = MctsStats::default();

        if let Ok(tree) = self.tree.read() {
            stats.total_visits = tree.iter().map(|n| n.visits).sum();
            stats.total_value = tree.iter().map(|n| n.value).sum();
            stats.avg_value = if stats.total_visits > 0 {
                stats.total_value / stats.total_visits as f64
            } else {
                0.0
            };
            stats.max_depth_visited = tree
                .iter()
                .filter(|n| n.visits > 0)
                .map(|n| n.depth)
                .max()
                .unwrap_or(0);
            let leaves = tree.leaves();
            stats.num_leaves = leaves.len();
            stats.best_leaf_visits = leaves.iter().map(|n| n.visits).max().unwrap_or(0);
        }

        if self.coverage.is_some() {
            stats.current_coverage_weight = Some(self.current_coverage_weight());
            stats.session_coverage = self.session_coverage();
        }
        if let Some(xot) = &self.xot {
            stats.xot = Some(xot.stats());
        }
        if let Some(budget) = &self.budget {
            stats.budget = budget.lock().ok().map(|g| g.stats());
        }

        stats
    }
}

/// Classic UCB1: exploitation + exploration. Unvisited children score +inf;
/// an unvisited parent contributes no exploration term.
fn base_ucb1(visits: u64, value: f64, parent_visits: u64, c: f64) -> f64 {
    if visits == 0 {
        return f64::INFINITY;
    }
    if parent_visits == 0 {
        return 0.0;
    }

    let exploitation = value / visits as f64;
    let exploration = c * ((parent_visits as f64).ln() / visits as f64).sqrt();
    exploitation + exploration
}
