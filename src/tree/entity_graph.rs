//! Entity context graph.
//!
//! A possibly-cyclic directed graph over entity labels, used only as a
//! session-scoped context index: ego subgraphs feed prompt assembly and the
//! coverage analyzer reads edge density and neighborhoods. Stable labels are
//! the sole cross-reference; nothing here holds tree pointers.

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Edge payload between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEdge {
    pub kind: String,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

impl EntityEdge {
    pub fn new(kind: impl Into<String>, weight: f64) -> Self {
        Self {
            kind: kind.into(),
            weight,
            created_at: Utc::now(),
        }
    }
}

/// Directed graph over entity labels with label-based lookup.
#[derive(Debug, Default)]
pub struct EntityGraph {
    graph: DiGraph<String, EntityEdge>,
    index: HashMap<String, NodeIndex>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity if absent; returns its index either way.
    pub fn add_entity(&mut self, label: impl Into<String>) -> NodeIndex {
        let label = label.into();
        if let Some(&idx) = self.index.get(&label) {
            return idx;
        }
        let idx = self.graph.add_node(label.clone());
        self.index.insert(label, idx);
        idx
    }

    /// Add a directed edge between two entities, creating them as needed.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        weight: f64,
    ) {
        let from = self.add_entity(from);
        let to = self.add_entity(to);
        self.graph.add_edge(from, to, EntityEdge::new(kind, weight));
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn entity_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Outgoing neighbors of an entity.
    pub fn neighbors(&self, label: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(label) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Labels reachable from `center` within `depth` hops (center included).
    pub fn ego_subgraph(&self, center: &str, depth: usize) -> Vec<String> {
        let Some(&start) = self.index.get(center) else {
            return Vec::new();
        };

        let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);

        while let Some((idx, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(next) {
                    queue.push_back((next, dist + 1));
                }
            }
        }

        seen.into_iter().map(|idx| self.graph[idx].clone()).collect()
    }

    /// Entities ranked by total degree, descending.
    pub fn top_entities(&self, n: usize) -> Vec<String> {
        let mut ranked: Vec<(NodeIndex, usize)> = self
            .graph
            .node_indices()
            .map(|idx| {
                let degree = self
                    .graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .count()
                    + self
                        .graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .count();
                (idx, degree)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| self.graph[a.0].cmp(&self.graph[b.0])));
        ranked
            .into_iter()
            .take(n)
            .map(|(idx, _)| self.graph[idx].clone())
            .collect()
    }

    /// Edge density of the subgraph induced by `labels`:
    /// actual edges over n·(n−1)/2. None when fewer than two labels resolve.
    pub fn edge_density(&self, labels: &[String]) -> Option<f64> {
        let indices: HashSet<NodeIndex> = labels
            .iter()
            .filter_map(|l| self.index.get(l).copied())
            .collect();

        if indices.len() < 2 {
            return None;
        }

        let actual = self
            .graph
            .edge_references()
            .filter(|e| indices.contains(&e.source()) && indices.contains(&e.target()))
            .count();

        let n = indices.len();
        let possible = n * (n - 1) / 2;
        Some((actual as f64 / possible as f64).min(1.0))
    }

    /// Render a short markdown summary of the given entities and their
    /// relations, for prompt context. Bounded by `max_entities`.
    pub fn to_markdown(&self, labels: &[String], max_entities: usize) -> String {
        let labels: Vec<&String> = labels
            .iter()
            .filter(|l| self.contains(l))
            .take(max_entities)
            .collect();

        if labels.is_empty() {
            return String::new();
        }

        let mut lines = vec!["# Known entities".to_string()];
        let selected: HashSet<&str> = labels.iter().map(|l| l.as_str()).collect();

        for label in &labels {
            let idx = self.index[label.as_str()];
            let mut line = format!("- **{label}**");

            let relations: Vec<String> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .filter(|e| selected.contains(self.graph[e.target()].as_str()))
                .map(|e| format!("{} {}", e.weight().kind, self.graph[e.target()]))
                .collect();

            if !relations.is_empty() {
                line.push_str(&format!(" ({})", relations.join("; ")));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}
