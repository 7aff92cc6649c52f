//! Tree-of-thoughts storage and coverage analysis.
//!
//! The [`TreeStore`] is the single authority for parent/child relations; the
//! [`EntityGraph`] is a session-scoped context index over entity labels; the
//! [`CoverageAnalyzer`] scores exploration breadth to guide selection.

mod coverage;
mod entity_graph;
mod node;
mod store;

pub use coverage::{CoverageAnalyzer, CoverageGap, CoverageScores, SessionCoverage};
pub use entity_graph::{EntityEdge, EntityGraph};
pub use node::{NodeId, NodeStatus, TreeNode};
pub use store::{TreeStats, TreeStore};
