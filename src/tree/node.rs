//! Search tree node: a question with exploration state and MCTS counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::facts::TripletId;

/// Unique identifier for a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exploration status. Transitions follow
/// pending -> exploring -> (evaluated | pruned), with no cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet explored
    Pending,
    /// Currently being explored
    Exploring,
    /// Exploration complete
    Evaluated,
    /// Branch cut; descendants are logically pruned too
    Pruned,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Exploring => write!(f, "exploring"),
            Self::Evaluated => write!(f, "evaluated"),
            Self::Pruned => write!(f, "pruned"),
        }
    }
}

/// A node in the tree-of-thoughts exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    /// Ordered child ids
    pub children: Vec<NodeId>,
    /// The question this node explores
    pub question: String,
    /// Distance from root (root = 0)
    pub depth: u32,
    pub status: NodeStatus,

    /// Answer produced on expansion
    pub answer: Option<String>,
    pub confidence: f64,
    /// Short note on how the answer/state came about (pruning reason, model)
    pub reasoning: Option<String>,

    /// Entity labels extracted from the answer
    pub entities: Vec<String>,
    /// Ids of triplets derived from this node
    pub triplet_ids: Vec<TripletId>,

    /// MCTS counters
    pub visits: u64,
    pub value: f64,
    pub last_ucb: f64,

    /// Per-axiom score map
    pub axiom_scores: HashMap<String, f64>,
    pub axiom_compatible: bool,

    /// Open attribute map consulted by axiom conditions
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn new(question: impl Into<String>, depth: u32, parent_id: Option<NodeId>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            parent_id,
            children: Vec::new(),
            question: question.into(),
            depth,
            status: NodeStatus::Pending,
            answer: None,
            confidence: 0.0,
            reasoning: None,
            entities: Vec::new(),
            triplet_ids: Vec::new(),
            visits: 0,
            value: 0.0,
            last_ucb: 0.0,
            axiom_scores: HashMap::new(),
            axiom_compatible: true,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_pruned(&self) -> bool {
        self.status == NodeStatus::Pruned
    }

    pub fn is_explored(&self) -> bool {
        self.status == NodeStatus::Evaluated
    }

    /// Average value per visit, 0 if unvisited.
    pub fn avg_value(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value / self.visits as f64
        }
    }

    pub fn add_child(&mut self, child_id: NodeId) {
        if !self.children.contains(&child_id) {
            self.children.push(child_id);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_defaults() {
        let node = TreeNode::new("What niche should I pursue?", 0, None);
        assert_eq!(node.status, NodeStatus::Pending);
        assert!(node.is_leaf());
        assert!(!node.is_pruned());
        assert_eq!(node.visits, 0);
        assert_eq!(node.avg_value(), 0.0);
        assert!(node.axiom_compatible);
    }

    #[test]
    fn test_avg_value() {
        let mut node = TreeNode::new("q", 1, None);
        node.visits = 4;
        node.value = 3.0;
        assert!((node.avg_value() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_add_child_deduplicates() {
        let mut node = TreeNode::new("q", 0, None);
        let child = NodeId::new();
        node.add_child(child.clone());
        node.add_child(child.clone());
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn test_serde_roundtrip_preserves_all_fields() {
        let mut node = TreeNode::new("What markets have high friction?", 2, Some(NodeId::new()));
        node.status = NodeStatus::Evaluated;
        node.answer = Some("Several niches show friction.".to_string());
        node.confidence = 0.8;
        node.entities = vec!["markets".to_string(), "friction".to_string()];
        node.triplet_ids = vec![TripletId::new("spo_abc123def456")];
        node.visits = 7;
        node.value = 4.2;
        node.last_ucb = 1.3;
        node.axiom_scores.insert("opportunity_cost".to_string(), 0.6);
        node.metadata
            .insert("roi_per_hour".to_string(), serde_json::json!(120));

        let json = serde_json::to_string(&node).unwrap();
        let back: TreeNode = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
