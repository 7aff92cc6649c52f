//! Token budget governor for the search.
//!
//! Allocates per-node budgets proportional to UCB1 promise, tracks
//! consumption at node and session level, and reports exhaustion. Pruning is
//! the search engine's reaction to `check`/`total_exceeded`; the governor
//! only keeps the ledger.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-node ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBudget {
    pub allocated: u64,
    pub consumed: u64,
    pub exhausted: bool,
}

impl NodeBudget {
    pub fn remaining(&self) -> u64 {
        self.allocated.saturating_sub(self.consumed)
    }
}

/// Governor statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetStats {
    pub nodes_tracked: usize,
    pub nodes_exhausted: usize,
    pub total_consumed: u64,
    pub total_remaining: u64,
    pub total_budget: u64,
    /// Percent of the session budget consumed
    pub utilization: f64,
    /// Percent of tracked nodes that hit their allocation
    pub exhaustion_rate: f64,
}

/// Allocates, tracks, and enforces per-node and session token budgets.
#[derive(Debug)]
pub struct TokenBudgetGovernor {
    total_budget: u64,
    default_node_budget: u64,
    min_node_budget: u64,
    max_node_budget: u64,
    ledger: HashMap<String, NodeBudget>,
    total_consumed: u64,
}

impl TokenBudgetGovernor {
    pub fn new(total_budget: u64, default_node_budget: u64) -> Self {
        Self {
            total_budget,
            default_node_budget,
            min_node_budget: 1_000,
            max_node_budget: 100_000,
            ledger: HashMap::new(),
            total_consumed: 0,
        }
    }

    pub fn with_node_bounds(mut self, min: u64, max: u64) -> Self {
        self.min_node_budget = min;
        self.max_node_budget = max;
        self
    }

    /// Allocate a budget for a node: `default * (1 + ucb1)` clamped to
    /// [min, max]; infinite UCB maps to the max budget. When the session
    /// remainder is smaller, the allocation shrinks to the remainder.
    pub fn allocate(&mut self, node_id: &str, ucb1: f64) -> u64 {
        let raw = if ucb1.is_infinite() {
            self.max_node_budget
        } else {
            (self.default_node_budget as f64 * (1.0 + ucb1.max(0.0))) as u64
        };

        let mut budget = raw.clamp(self.min_node_budget, self.max_node_budget);

        let remaining = self.session_remaining();
        if budget > remaining {
            budget = remaining;
        }

        self.ledger.insert(
            node_id.to_string(),
            NodeBudget {
                allocated: budget,
                consumed: 0,
                exhausted: budget == 0,
            },
        );

        budget
    }

    /// Charge tokens to a node (allocating a default-sized budget first if
    /// the node was never allocated) and to the session total.
    pub fn track(&mut self, node_id: &str, tokens: u64) {
        if !self.ledger.contains_key(node_id) {
            self.allocate(node_id, 0.5);
        }

        let entry = self
            .ledger
            .get_mut(node_id)
            .expect("entry inserted by allocate");
        entry.consumed += tokens;
        if entry.consumed >= entry.allocated {
            entry.exhausted = true;
        }

        self.total_consumed += tokens;
    }

    /// True iff the node was never allocated or still has budget.
    pub fn check(&self, node_id: &str) -> bool {
        self.ledger.get(node_id).map(|b| !b.exhausted).unwrap_or(true)
    }

    /// Remaining budget for a node; the default allocation if untracked.
    pub fn remaining(&self, node_id: &str) -> u64 {
        self.ledger
            .get(node_id)
            .map(|b| b.remaining())
            .unwrap_or(self.default_node_budget)
    }

    pub fn session_remaining(&self) -> u64 {
        self.total_budget.saturating_sub(self.total_consumed)
    }

    /// True iff session consumption reached the session budget.
    pub fn total_exceeded(&self) -> bool {
        self.total_consumed >= self.total_budget
    }

    pub fn total_consumed(&self) -> u64 {
        self.total_consumed
    }

    /// Ledger entry for a node, if tracked.
    pub fn node_info(&self, node_id: &str) -> Option<&NodeBudget> {
        self.ledger.get(node_id)
    }

    /// Full ledger view, for snapshots.
    pub fn ledger(&self) -> &HashMap<String, NodeBudget> {
        &self.ledger
    }

    pub fn stats(&self) -> BudgetStats {
        let exhausted = self.ledger.values().filter(|b| b.exhausted).count();
        BudgetStats {
            nodes_tracked: self.ledger.len(),
            nodes_exhausted: exhausted,
            total_consumed: self.total_consumed,
            total_remaining: self.session_remaining(),
            total_budget: self.total_budget,
            utilization: if self.total_budget > 0 {
                self.total_consumed as f64 / self.total_budget as f64 * 100.0
            } else {
                0.0
            },
            exhaustion_rate: if self.ledger.is_empty() {
                0.0
            } else {
                exhausted as f64 / self.ledger.len() as f64 * 100.0
            },
        }
    }

    /// Drop all ledger state (new session).
    pub fn reset(&mut self) {
        self.ledger.clear();
        self.total_consumed = 0;
    }
}
