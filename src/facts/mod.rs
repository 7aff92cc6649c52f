//! Tiered SPO fact store.
//!
//! Knowledge is stored as Subject-Predicate-Object triplets in an embedded
//! SQLite database with tier-based quality classes:
//!
//! - **Bronze**: raw extraction from a single source
//! - **Silver**: corroborated by at least two sources
//! - **Gold**: three or more sources, high confidence, axiom-aligned
//!
//! ## Example
//!
//! ```rust,ignore
//! use sro_core::facts::{FactStore, FactQuery, Triplet, Provenance, ExtractionMethod};
//!
//! let store = FactStore::in_memory()?;
//!
//! let triplet = Triplet::new(
//!     "Solar panels", "reduces", "carbon emissions", 0.9,
//!     Provenance::new("tot_node_1", ExtractionMethod::LlmStructured),
//! );
//! let id = store.insert(&triplet)?;
//!
//! // Exact-filter query
//! let hits = store.query(&FactQuery::new().subject("Solar panels"))?;
//!
//! // Full-text search
//! let hits = store.search("emissions", 10)?;
//! ```

mod schema;
mod store;
mod types;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::FactStore;
pub use types::{
    ExtractionMethod, FactQuery, FactStoreStats, Provenance, Tier, Triplet, TripletId,
    MIN_TOKEN_LEN, REFLEXIVE_PREDICATES,
};
