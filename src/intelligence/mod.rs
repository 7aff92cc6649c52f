//! Intelligence layer over the fact store.
//!
//! The pipeline run after every extraction: the verifier discovers
//! cross-branch matches and accumulates verification sources, the promoter
//! raises tiers (consulting the axiom judge for gold), and the conflict
//! resolver reconciles contradictions. The fact-quality evaluator feeds the
//! resulting tier mix back into MCTS selection.

mod conflict;
mod judge;
mod promoter;
mod quality;
mod verifier;

pub use conflict::{
    Conflict, ConflictKind, ConflictResolver, ConflictStats, Resolution, ResolutionStats,
    ResolutionStrategy,
};
pub use judge::{AxiomJudge, Judgment, JudgmentStats};
pub use promoter::{
    PromoterStats, PromotionBatchStats, PromotionResult, PromotionRules, TierPromoter,
};
pub use quality::{
    FactDistribution, FactQualityEvaluator, QualityCacheStats, QualitySummary, BRONZE_WEIGHT,
    GOLD_WEIGHT, SILVER_WEIGHT,
};
pub use verifier::{similarity, SourceVerifier, VerificationOutcome, VerificationStats};
