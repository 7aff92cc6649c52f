//! Coverage analysis: scores a node's exploration breadth so MCTS knows
//! where to dig.
//!
//! Four dimensions, each in [0, 1]: entity density in the context graph,
//! exploration depth, axiom coverage, and neighborhood coverage. The overall
//! score is the weighted mix 0.3/0.2/0.3/0.2.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::axioms::AxiomLibrary;
use crate::tree::entity_graph::EntityGraph;
use crate::tree::node::TreeNode;
use crate::tree::store::TreeStore;

/// Per-node coverage scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageScores {
    pub entity_density: f64,
    pub exploration_depth: f64,
    pub axiom_coverage: f64,
    pub neighbor_coverage: f64,
    pub overall: f64,
}

/// A node flagged as under-explored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageGap {
    pub node_id: String,
    pub question: String,
    pub depth: u32,
    pub scores: CoverageScores,
    /// 1 - overall; higher means more urgent
    pub priority: f64,
    pub reason: String,
}

/// Session-wide coverage report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCoverage {
    pub overall_coverage: f64,
    pub total_nodes: usize,
    pub avg_entity_density: f64,
    pub avg_exploration_depth: f64,
    pub avg_axiom_coverage: f64,
    pub gaps_count: usize,
    pub top_gaps: Vec<CoverageGap>,
    pub recommendations: Vec<String>,
}

/// Scores exploration breadth along entity, depth, axiom, and neighborhood
/// dimensions.
#[derive(Debug, Clone)]
pub struct CoverageAnalyzer {
    max_depth: u32,
}

impl CoverageAnalyzer {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    /// Coverage scores for one node.
    pub fn analyze(
        &self,
        node: &TreeNode,
        tree: &TreeStore,
        graph: &EntityGraph,
        axioms: Option<&AxiomLibrary>,
    ) -> CoverageScores {
        let entity_density = self.entity_density(node, graph);
        let exploration_depth = self.exploration_depth(node, tree);
        let axiom_coverage = self.axiom_coverage(node, axioms);
        let neighbor_coverage = self.neighbor_coverage(node, tree, graph);

        let overall = entity_density * 0.3
            + exploration_depth * 0.2
            + axiom_coverage * 0.3
            + neighbor_coverage * 0.2;

        CoverageScores {
            entity_density,
            exploration_depth,
            axiom_coverage,
            neighbor_coverage,
            overall,
        }
    }

    /// Edge density of the subgraph induced by the node's entities and their
    /// neighbors, mapped into [0.3, 1.0] once any entity exists.
    fn entity_density(&self, node: &TreeNode, graph: &EntityGraph) -> f64 {
        if node.entities.is_empty() {
            return 0.0;
        }

        let mut subgraph: HashSet<String> = HashSet::new();
        for entity in &node.entities {
            if graph.contains(entity) {
                subgraph.insert(entity.clone());
                subgraph.extend(graph.neighbors(entity));
            }
        }

        if subgraph.is_empty() {
            // Entities extracted but not linked into the graph yet
            return 0.1;
        }

        let labels: Vec<String> = subgraph.into_iter().collect();
        match graph.edge_density(&labels) {
            Some(density) => 0.3 + density * 0.7,
            None => 0.2,
        }
    }

    /// min(depth / max_depth, 1) * 0.6 + evaluated-children ratio * 0.4.
    fn exploration_depth(&self, node: &TreeNode, tree: &TreeStore) -> f64 {
        let depth_score = (node.depth as f64 / self.max_depth as f64).min(1.0);

        let children_ratio = if node.children.is_empty() {
            0.0
        } else {
            let evaluated = tree
                .children_of(&node.id)
                .iter()
                .filter(|c| c.is_explored())
                .count();
            evaluated as f64 / node.children.len() as f64
        };

        depth_score * 0.6 + children_ratio * 0.4
    }

    /// Fraction of active scorer axioms scored on this node, plus up to +0.3
    /// proportional to their mean score. 1 when no axioms are configured.
    fn axiom_coverage(&self, node: &TreeNode, axioms: Option<&AxiomLibrary>) -> f64 {
        let Some(library) = axioms else {
            return 1.0;
        };

        let scorers = library.scorer_axioms();
        if scorers.is_empty() {
            return 1.0;
        }

        let tested = node.axiom_scores.len();
        let basic = tested as f64 / scorers.len() as f64;

        let bonus = if node.axiom_scores.is_empty() {
            0.0
        } else {
            let avg: f64 =
                node.axiom_scores.values().sum::<f64>() / node.axiom_scores.len() as f64;
            avg * 0.3
        };

        (basic + bonus).min(1.0)
    }

    /// Fraction of the node's neighbor entities also covered by some other
    /// tree node's extractions.
    fn neighbor_coverage(&self, node: &TreeNode, tree: &TreeStore, graph: &EntityGraph) -> f64 {
        if node.entities.is_empty() {
            return 0.0;
        }

        let mut neighbor_entities: HashSet<String> = HashSet::new();
        for entity in &node.entities {
            neighbor_entities.extend(graph.neighbors(entity));
        }

        if neighbor_entities.is_empty() {
            return 0.0;
        }

        let covered = neighbor_entities
            .iter()
            .filter(|neighbor| {
                tree.iter()
                    .any(|other| other.id != node.id && other.entities.contains(neighbor))
            })
            .count();

        covered as f64 / neighbor_entities.len() as f64
    }

    /// Non-pruned nodes with overall coverage below the threshold, sorted by
    /// descending priority (1 - overall).
    pub fn identify_gaps(
        &self,
        threshold: f64,
        tree: &TreeStore,
        graph: &EntityGraph,
        axioms: Option<&AxiomLibrary>,
    ) -> Vec<CoverageGap> {
        let mut gaps: Vec<CoverageGap> = tree
            .iter()
            .filter(|node| !node.is_pruned())
            .filter_map(|node| {
                let scores = self.analyze(node, tree, graph, axioms);
                if scores.overall >= threshold {
                    return None;
                }
                let reason = explain_low_coverage(&scores);
                Some(CoverageGap {
                    node_id: node.id.to_string(),
                    question: node.question.clone(),
                    depth: node.depth,
                    priority: 1.0 - scores.overall,
                    scores,
                    reason,
                })
            })
            .collect();

        gaps.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        gaps
    }

    /// Session-wide coverage report with recommendations.
    pub fn session_report(
        &self,
        tree: &TreeStore,
        graph: &EntityGraph,
        axioms: Option<&AxiomLibrary>,
    ) -> SessionCoverage {
        let nodes: Vec<&TreeNode> = tree.iter().collect();

        if nodes.is_empty() {
            return SessionCoverage {
                recommendations: vec![
                    "Start exploring by decomposing the root question".to_string()
                ],
                ..Default::default()
            };
        }

        let mut total_overall = 0.0;
        let mut total_entity = 0.0;
        let mut total_depth = 0.0;
        let mut total_axiom = 0.0;

        for node in &nodes {
            let scores = self.analyze(node, tree, graph, axioms);
            total_overall += scores.overall;
            total_entity += scores.entity_density;
            total_depth += scores.exploration_depth;
            total_axiom += scores.axiom_coverage;
        }

        let n = nodes.len() as f64;
        let gaps = self.identify_gaps(0.5, tree, graph, axioms);
        let recommendations = recommendations_for(&gaps, nodes.len(), axioms.is_some());

        SessionCoverage {
            overall_coverage: total_overall / n,
            total_nodes: nodes.len(),
            avg_entity_density: total_entity / n,
            avg_exploration_depth: total_depth / n,
            avg_axiom_coverage: total_axiom / n,
            gaps_count: gaps.len(),
            top_gaps: gaps.into_iter().take(5).collect(),
            recommendations,
        }
    }
}

fn explain_low_coverage(scores: &CoverageScores) -> String {
    let mut reasons = Vec::new();

    if scores.entity_density < 0.3 {
        reasons.push("few entities extracted");
    }
    if scores.exploration_depth < 0.4 {
        reasons.push("shallow exploration");
    }
    if scores.axiom_coverage < 0.5 {
        reasons.push("axioms not tested");
    }
    if scores.neighbor_coverage < 0.3 {
        reasons.push("isolated from graph");
    }

    if reasons.is_empty() {
        "general low coverage".to_string()
    } else {
        reasons.join(", ")
    }
}

fn recommendations_for(gaps: &[CoverageGap], total_nodes: usize, has_axioms: bool) -> Vec<String> {
    let mut recommendations = Vec::new();

    if total_nodes == 0 {
        recommendations.push("Start exploring by decomposing the root question".to_string());
        return recommendations;
    }

    if gaps.is_empty() {
        recommendations.push("Coverage is solid. Consider a synthesis phase.".to_string());
        return recommendations;
    }

    let shallow: Vec<&CoverageGap> = gaps.iter().filter(|g| g.depth <= 1).collect();
    let deep: Vec<&CoverageGap> = gaps.iter().filter(|g| g.depth >= 2).collect();

    if shallow.len() as f64 > gaps.len() as f64 * 0.6 {
        recommendations.push(format!(
            "Focus on depth: {} shallow nodes need deeper exploration",
            shallow.len()
        ));
    }

    if let Some(top_deep) = deep.first() {
        let question: String = top_deep.question.chars().take(50).collect();
        recommendations.push(format!(
            "High-priority gap at depth {}: \"{}...\"",
            top_deep.depth, question
        ));
    }

    let low_entities = gaps
        .iter()
        .filter(|g| g.scores.entity_density < 0.3)
        .count();
    if low_entities > 3 {
        recommendations.push(format!(
            "{low_entities} nodes have low entity density - consider more detailed responses"
        ));
    }

    if has_axioms {
        let low_axioms = gaps
            .iter()
            .filter(|g| g.scores.axiom_coverage < 0.5)
            .count();
        if low_axioms > 2 {
            recommendations.push(format!(
                "{low_axioms} nodes need axiom validation - run more search iterations"
            ));
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axioms::{Axiom, AxiomApplication};
    use crate::tree::node::NodeStatus;

    fn setup() -> (TreeStore, EntityGraph) {
        let mut tree = TreeStore::new();
        let root = tree.create_root("root question").unwrap();
        let child = tree.add_child(&root, "child question").unwrap();
        tree.get_mut(&child).unwrap().entities =
            vec!["solar".to_string(), "emissions".to_string()];

        let mut graph = EntityGraph::new();
        graph.add_edge("solar", "emissions", "reduces", 0.9);
        graph.add_edge("emissions", "climate", "affects", 0.8);

        (tree, graph)
    }

    #[test]
    fn test_entity_density_zero_without_entities() {
        let (tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);

        let root = tree.iter().find(|n| n.depth == 0).unwrap();
        let scores = analyzer.analyze(root, &tree, &graph, None);
        assert_eq!(scores.entity_density, 0.0);
    }

    #[test]
    fn test_entity_density_mapped_above_threshold() {
        let (tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);

        let child = tree.iter().find(|n| n.depth == 1).unwrap();
        let scores = analyzer.analyze(child, &tree, &graph, None);
        assert!(scores.entity_density >= 0.3);
        assert!(scores.entity_density <= 1.0);
    }

    #[test]
    fn test_entities_not_in_graph_score_low() {
        let (mut tree, graph) = setup();
        let orphan_id = {
            let root = tree.root_id().unwrap().clone();
            tree.add_child(&root, "orphan").unwrap()
        };
        tree.get_mut(&orphan_id).unwrap().entities = vec!["unlinked".to_string()];

        let analyzer = CoverageAnalyzer::new(3);
        let orphan = tree.get(&orphan_id).unwrap();
        let scores = analyzer.analyze(orphan, &tree, &graph, None);
        assert!((scores.entity_density - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_exploration_depth_mixes_depth_and_children() {
        let (mut tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);

        let child_id = tree.iter().find(|n| n.depth == 1).unwrap().id.clone();
        let gc1 = tree.add_child(&child_id, "grandchild one").unwrap();
        tree.add_child(&child_id, "grandchild two").unwrap();
        tree.set_status(&gc1, NodeStatus::Evaluated);

        let child = tree.get(&child_id).unwrap();
        let scores = analyzer.analyze(child, &tree, &graph, None);
        // depth 1/3 * 0.6 + 1/2 evaluated * 0.4
        let expected = (1.0 / 3.0) * 0.6 + 0.5 * 0.4;
        assert!((scores.exploration_depth - expected).abs() < 1e-9);
    }

    #[test]
    fn test_axiom_coverage_without_library_is_full() {
        let (tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);
        let child = tree.iter().find(|n| n.depth == 1).unwrap();
        let scores = analyzer.analyze(child, &tree, &graph, None);
        assert_eq!(scores.axiom_coverage, 1.0);
    }

    #[test]
    fn test_axiom_coverage_with_scores_and_bonus() {
        let (mut tree, graph) = setup();
        let library = AxiomLibrary::from_axioms([
            Axiom::new("a1", AxiomApplication::Scorer, "one"),
            Axiom::new("a2", AxiomApplication::Scorer, "two"),
        ]);

        let child_id = tree.iter().find(|n| n.depth == 1).unwrap().id.clone();
        tree.get_mut(&child_id)
            .unwrap()
            .axiom_scores
            .insert("a1".to_string(), 0.8);

        let analyzer = CoverageAnalyzer::new(3);
        let child = tree.get(&child_id).unwrap();
        let scores = analyzer.analyze(child, &tree, &graph, Some(&library));
        // 1/2 tested + 0.8 * 0.3 bonus
        assert!((scores.axiom_coverage - (0.5 + 0.24)).abs() < 1e-9);
    }

    #[test]
    fn test_neighbor_coverage_counts_other_nodes() {
        let (mut tree, graph) = setup();
        // Another node covering the "climate" neighbor of "emissions"
        let sibling_id = {
            let root = tree.root_id().unwrap().clone();
            tree.add_child(&root, "sibling").unwrap()
        };
        tree.get_mut(&sibling_id).unwrap().entities = vec!["climate".to_string()];

        let analyzer = CoverageAnalyzer::new(3);
        let child = tree.iter().find(|n| n.question == "child question").unwrap();
        let scores = analyzer.analyze(child, &tree, &graph, None);

        // Neighbors of {solar, emissions} = {emissions, climate}; "emissions"
        // is held by the child itself only, "climate" by the sibling
        assert!((scores.neighbor_coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overall_weighting() {
        let (tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);
        let child = tree.iter().find(|n| n.depth == 1).unwrap();
        let s = analyzer.analyze(child, &tree, &graph, None);

        let expected = s.entity_density * 0.3
            + s.exploration_depth * 0.2
            + s.axiom_coverage * 0.3
            + s.neighbor_coverage * 0.2;
        assert!((s.overall - expected).abs() < 1e-9);
    }

    #[test]
    fn test_identify_gaps_sorted_and_below_threshold() {
        let (tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);

        let gaps = analyzer.identify_gaps(0.9, &tree, &graph, None);
        assert!(!gaps.is_empty());
        for gap in &gaps {
            assert!(gap.scores.overall < 0.9);
            assert!((gap.priority - (1.0 - gap.scores.overall)).abs() < 1e-9);
        }
        for pair in gaps.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn test_pruned_nodes_excluded_from_gaps() {
        let (mut tree, graph) = setup();
        let child_id = tree.iter().find(|n| n.depth == 1).unwrap().id.clone();
        tree.prune_subtree(&child_id, "low value");

        let analyzer = CoverageAnalyzer::new(3);
        let gaps = analyzer.identify_gaps(0.9, &tree, &graph, None);
        assert!(gaps.iter().all(|g| g.node_id != child_id.to_string()));
    }

    #[test]
    fn test_session_report_empty_tree() {
        let analyzer = CoverageAnalyzer::new(3);
        let report = analyzer.session_report(&TreeStore::new(), &EntityGraph::new(), None);
        assert_eq!(report.total_nodes, 0);
        assert_eq!(report.overall_coverage, 0.0);
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn test_session_report_averages() {
        let (tree, graph) = setup();
        let analyzer = CoverageAnalyzer::new(3);
        let report = analyzer.session_report(&tree, &graph, None);

        assert_eq!(report.total_nodes, 2);
        assert!(report.overall_coverage > 0.0);
        assert!(report.top_gaps.len() <= 5);
    }
}
