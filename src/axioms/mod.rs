//! User-authored value axioms for node scoring and filtering.
//!
//! Axioms encode the user's decision framework as JSON objects with a
//! condition-to-modifier table. Scorer axioms shift a node's base score;
//! filter axioms reject nodes outright. Axioms are read-only at session
//! scope.

mod library;
mod types;

pub use library::{AxiomLibrary, AxiomLibraryStats};
pub use types::{Axiom, AxiomApplication};
