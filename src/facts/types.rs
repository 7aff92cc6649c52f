//! Core data model for SPO triplets: identity, tiers, and provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Predicates for which subject == object is permitted. Empty by default;
/// sessions that need reflexive assertions extend this at their own layer.
pub const REFLEXIVE_PREDICATES: &[&str] = &[];

/// Minimum length for subject/predicate/object tokens.
pub const MIN_TOKEN_LEN: usize = 2;

/// Unique identifier for an SPO triplet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripletId(pub String);

impl TripletId {
    /// Generate a fresh id (`spo_` + 12 hex chars).
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("spo_{}", &hex[..12]))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TripletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quality tier of a triplet. Ordered: Bronze < Silver < Gold.
///
/// Tier transitions are monotonic upward; nothing in the crate demotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Raw extraction, single source
    Bronze = 0,
    /// Corroborated by a second source
    Silver = 1,
    /// Multi-source, high confidence, axiom-aligned
    Gold = 2,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }

    /// Parse a stored tier string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            other => Err(Error::invalid_argument(format!(
                "Invalid tier: {other}. Must be bronze|silver|gold"
            ))),
        }
    }

    /// Next tier up, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a triplet entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Structured extraction from a model response
    LlmStructured,
    /// Entered by a human
    Manual,
    /// Imported from an earlier store format
    LegacyMigration,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LlmStructured => write!(f, "llm_structured"),
            Self::Manual => write!(f, "manual"),
            Self::LegacyMigration => write!(f, "legacy_migration"),
        }
    }
}

/// Extraction record plus accumulated verification sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Origin source id, typically a tree-node id
    pub source_id: String,
    pub extraction_method: ExtractionMethod,
    /// Model that produced the extraction, if any
    #[serde(default)]
    pub model_used: Option<String>,
    pub extracted_at: DateTime<Utc>,
    /// True once at least one additional source corroborated the triplet
    #[serde(default)]
    pub verified: bool,
    /// Derived: always equals `verification_sources.len()`
    #[serde(default)]
    pub verification_count: usize,
    /// Additional corroborating source ids, insertion-ordered, no duplicates
    #[serde(default)]
    pub verification_sources: Vec<String>,
}

impl Provenance {
    pub fn new(source_id: impl Into<String>, extraction_method: ExtractionMethod) -> Self {
        Self {
            source_id: source_id.into(),
            extraction_method,
            model_used: None,
            extracted_at: Utc::now(),
            verified: false,
            verification_count: 0,
            verification_sources: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    /// Original source plus all verification sources.
    pub fn effective_source_count(&self) -> usize {
        1 + self.verification_sources.len()
    }

    /// Append a verification source if not already present. Returns true if
    /// the set changed.
    pub fn add_verification_source(&mut self, source: impl Into<String>) -> bool {
        let source = source.into();
        if self.verification_sources.contains(&source) {
            return false;
        }
        self.verification_sources.push(source);
        self.verification_count = self.verification_sources.len();
        self.verified = true;
        true
    }
}

/// A Subject-Predicate-Object assertion with confidence, tier, and provenance.
///
/// Identity (`id`, S/P/O) is immutable once stored; tier and provenance are
/// mutated only through the fact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub id: TripletId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub tier: Tier,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Open extension map, serialized as JSON
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        confidence: f64,
        provenance: Provenance,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TripletId::generate(),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence,
            tier: Tier::Bronze,
            provenance,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: TripletId) -> Self {
        self.id = id;
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate the triplet invariants: non-empty tokens of at least
    /// [`MIN_TOKEN_LEN`] chars, subject != object (case-sensitive, unless the
    /// predicate is reflexive), confidence within [0, 1].
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("subject", &self.subject),
            ("predicate", &self.predicate),
            ("object", &self.object),
        ] {
            if value.trim().len() < MIN_TOKEN_LEN {
                return Err(Error::invalid_argument(format!(
                    "Triplet {field} must be at least {MIN_TOKEN_LEN} characters"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::invalid_argument(format!(
                "Confidence must be between 0 and 1, got {}",
                self.confidence
            )));
        }

        if self.subject == self.object
            && !REFLEXIVE_PREDICATES.contains(&self.predicate.as_str())
        {
            return Err(Error::invalid_argument(
                "Triplet subject and object must differ",
            ));
        }

        Ok(())
    }
}

/// Filter set for [`FactStore::query`](crate::facts::FactStore::query).
///
/// All supplied filters are exact matches; results are ordered by confidence
/// descending, then created_at descending.
#[derive(Debug, Clone, Default)]
pub struct FactQuery {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
    pub tier: Option<Tier>,
    pub min_confidence: f64,
    pub limit: usize,
}

impl FactQuery {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Self::default()
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Aggregate statistics over the fact store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactStoreStats {
    pub total_triplets: u64,
    pub by_tier: HashMap<Tier, u64>,
    pub verified_count: u64,
    pub avg_confidence: f64,
}
