//! Generator abstraction with capability-aware routing.
//!
//! The core never talks to a model API directly; it consumes the
//! [`Generator`] trait, a capability-tagged text producer, through a
//! [`GeneratorRouter`] that registers named providers and falls back between
//! them. Hosts must wire at least extraction/fast, reasoning/fast,
//! reasoning/balanced, and validation/balanced.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sro_core::generator::{
//!     Capability, GeneratorRouter, GenerationParams, HttpGenerator,
//!     HttpGeneratorConfig, Quality,
//! };
//!
//! let provider = HttpGenerator::new(
//!     HttpGeneratorConfig::new("http://localhost:11434")
//!         .with_model(Capability::Extraction, Quality::Fast, "llama3.1:8b")
//!         .with_model(Capability::Reasoning, Quality::Balanced, "deepseek-r1:14b"),
//! );
//!
//! let mut router = GeneratorRouter::new();
//! router.register("local", Arc::new(provider));
//!
//! let response = router
//!     .generate("Summarize...", Capability::Reasoning, Quality::Balanced,
//!               &GenerationParams::new())
//!     .await?;
//! ```

mod cache;
mod chat;
mod provider;
mod router;
mod scripted;
mod types;

pub use cache::{CacheKey, ResponseCache, ResponseCacheStats};
pub use chat::{ChatGenerator, ChatGeneratorConfig};
pub use provider::{Generator, HttpGenerator, HttpGeneratorConfig};
pub use router::{GeneratorRouter, RouterStats};
pub use scripted::ScriptedGenerator;
pub use types::{Capability, CapabilityMap, GenerationParams, GenerationResponse, Quality};
