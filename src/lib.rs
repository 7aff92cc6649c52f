//! # sro-core
//!
//! A sovereign research orchestration library: drives a language model
//! through a tree of sub-questions, extracts structured
//! Subject-Predicate-Object facts from the answers, and maintains a tiered,
//! provenance-tracked fact store whose quality feeds back into search.
//!
//! ## Core Components
//!
//! - **Facts**: embedded tiered SPO store (Bronze/Silver/Gold) with
//!   provenance and full-text search
//! - **Generator**: capability-tagged provider abstraction with routing and
//!   fallback
//! - **Intelligence**: multi-source verification, conflict resolution,
//!   axiom judgment, tier promotion, fact-quality scoring
//! - **Tree / Search**: tree-of-thoughts store, coverage analysis, and MCTS
//!   selection with fact-quality, coverage, and XoT-prior bonuses under a
//!   token budget
//! - **Session**: the orchestrator wiring one expansion step through all of
//!   the above
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sro_core::facts::FactStore;
//! use sro_core::generator::GeneratorRouter;
//! use sro_core::session::{ResearchSession, SessionConfig};
//!
//! let mut router = GeneratorRouter::new();
//! // router.register("local", Arc::new(provider));
//!
//! let session = ResearchSession::new(
//!     Arc::new(router),
//!     FactStore::open("session/facts.db")?,
//!     None,
//!     SessionConfig::default(),
//! );
//!
//! let root = session.create_root("What e-commerce niche should I pursue?")?;
//! session.decompose(&root).await?;
//! session.iterate(50).await;
//! let best = session.engine().best_path();
//! ```

pub mod axioms;
pub mod error;
pub mod extract;
pub mod facts;
pub mod generator;
pub mod intelligence;
pub mod search;
pub mod session;
pub mod tree;

// Re-exports for convenience
pub use axioms::{Axiom, AxiomApplication, AxiomLibrary, AxiomLibraryStats};
pub use error::{Error, Result};
pub use extract::{ExtractionContext, ExtractorConfig, FactExtractor};
pub use facts::{
    ExtractionMethod, FactQuery, FactStore, FactStoreStats, Provenance, Tier, Triplet, TripletId,
};
pub use generator::{
    Capability, CapabilityMap, ChatGenerator, ChatGeneratorConfig, GenerationParams,
    GenerationResponse, Generator, GeneratorRouter, HttpGenerator, HttpGeneratorConfig, Quality,
    RouterStats, ScriptedGenerator,
};
pub use intelligence::{
    AxiomJudge, Conflict, ConflictKind, ConflictResolver, ConflictStats, FactDistribution,
    FactQualityEvaluator, Judgment, JudgmentStats, PromoterStats, PromotionBatchStats,
    PromotionResult, PromotionRules, QualitySummary, Resolution, ResolutionStats,
    ResolutionStrategy, SourceVerifier, TierPromoter, VerificationOutcome, VerificationStats,
};
pub use search::{
    BudgetStats, IterationReport, MctsConfig, MctsEngine, MctsStats, NodeBudget,
    SimulationStrategy, StopCause, TokenBudgetGovernor, XotPrior, XotStats,
};
pub use session::{ExpansionOutcome, ResearchSession, SessionConfig, SessionStats};
pub use tree::{
    CoverageAnalyzer, CoverageGap, CoverageScores, EntityEdge, EntityGraph, NodeId, NodeStatus,
    SessionCoverage, TreeNode, TreeStats, TreeStore,
};
