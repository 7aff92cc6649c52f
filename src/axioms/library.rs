//! Axiom library: loading, scoring, and filtering.

use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::axioms::types::{Axiom, AxiomApplication};
use crate::error::{Error, Result};

/// Read-only (at session scope) collection of enabled axioms.
#[derive(Debug, Clone, Default)]
pub struct AxiomLibrary {
    axioms: Vec<Axiom>,
}

/// Library-level statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AxiomLibraryStats {
    pub total_axioms: usize,
    pub scorers: usize,
    pub filters: usize,
    pub by_category: HashMap<String, usize>,
}

impl AxiomLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library from an in-memory set; disabled axioms are dropped.
    pub fn from_axioms(axioms: impl IntoIterator<Item = Axiom>) -> Self {
        Self {
            axioms: axioms.into_iter().filter(|a| a.enabled).collect(),
        }
    }

    /// Load all enabled axioms from `<dir>/*.json`, one JSON object per file.
    /// Malformed or disabled files are skipped with a warning.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let pattern = dir.as_ref().join("*.json");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| Error::Config("axiom directory path is not valid UTF-8".into()))?;

        let mut axioms = Vec::new();
        for entry in
            glob(pattern).map_err(|e| Error::Config(format!("bad axiom glob: {e}")))?
        {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "unreadable axiom file");
                    continue;
                }
            };

            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read axiom file");
                    continue;
                }
            };

            match serde_json::from_str::<Axiom>(&content) {
                Ok(axiom) if axiom.enabled => {
                    debug!(axiom = %axiom.id, category = %axiom.category, "loaded axiom");
                    axioms.push(axiom);
                }
                Ok(axiom) => {
                    debug!(axiom = %axiom.id, "skipping disabled axiom");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse axiom file");
                }
            }
        }

        Ok(Self { axioms })
    }

    pub fn get(&self, id: &str) -> Option<&Axiom> {
        self.axioms.iter().find(|a| a.id == id)
    }

    pub fn all(&self) -> &[Axiom] {
        &self.axioms
    }

    pub fn is_empty(&self) -> bool {
        self.axioms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.axioms.len()
    }

    pub fn by_category(&self, category: &str) -> Vec<&Axiom> {
        self.axioms
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    pub fn scorer_axioms(&self) -> Vec<&Axiom> {
        self.axioms
            .iter()
            .filter(|a| a.application == AxiomApplication::Scorer)
            .collect()
    }

    pub fn filter_axioms(&self) -> Vec<&Axiom> {
        self.axioms
            .iter()
            .filter(|a| a.application == AxiomApplication::Filter)
            .collect()
    }

    /// Score a node: base confidence plus the first matching modifier of each
    /// scorer axiom, clamped to [0, 1].
    pub fn score_node(&self, confidence: f64, metadata: &HashMap<String, Value>) -> f64 {
        let mut score = confidence;
        for axiom in self.scorer_axioms() {
            score += axiom.evaluate(metadata);
        }
        score.clamp(0.0, 1.0)
    }

    /// Per-axiom scores for a node (scorer axioms only).
    pub fn score_per_axiom(
        &self,
        confidence: f64,
        metadata: &HashMap<String, Value>,
    ) -> HashMap<String, f64> {
        self.scorer_axioms()
            .into_iter()
            .map(|axiom| {
                let score = (confidence + axiom.evaluate(metadata)).clamp(0.0, 1.0);
                (axiom.id.clone(), score)
            })
            .collect()
    }

    /// True unless some filter axiom matches with modifier -1.
    pub fn passes_filters(&self, metadata: &HashMap<String, Value>) -> bool {
        !self
            .filter_axioms()
            .iter()
            .any(|axiom| axiom.evaluate(metadata) == -1.0)
    }

    pub fn stats(&self) -> AxiomLibraryStats {
        let mut by_category: HashMap<String, usize> = HashMap::new();
        for axiom in &self.axioms {
            *by_category.entry(axiom.category.clone()).or_default() += 1;
        }

        AxiomLibraryStats {
            total_axioms: self.axioms.len(),
            scorers: self.scorer_axioms().len(),
            filters: self.filter_axioms().len(),
            by_category,
        }
    }
}
