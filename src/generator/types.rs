//! Generator types: capabilities, quality tiers, requests, and responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Task capability a model is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Fast entity/fact extraction
    Extraction,
    /// Deep analysis, decomposition, answering
    Reasoning,
    /// Combining information
    Synthesis,
    /// Checking contradictions and value alignment
    Validation,
}

impl Capability {
    /// Default per-call timeout in milliseconds, keyed by use case: long
    /// extractions get 120 s regardless of tier, fast heuristic calls (the
    /// XoT prior) 3 s, balanced/quality reasoning and validation 30 s.
    pub fn default_timeout_ms(&self, quality: Quality) -> u64 {
        match (self, quality) {
            (Self::Extraction, _) => 120_000,
            (_, Quality::Fast) => 3_000,
            _ => 30_000,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extraction => write!(f, "extraction"),
            Self::Reasoning => write!(f, "reasoning"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Quality/speed tradeoff for a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Small models, quick responses
    Fast,
    /// Mid-size models, good quality
    Balanced,
    /// Largest models, best results
    Quality,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::Quality => write!(f, "quality"),
        }
    }
}

/// Optional sampling parameters for a generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Temperature (0.0 - 1.0)
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

impl GenerationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Standardized response from any provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text
    pub content: String,
    /// Model that produced it
    pub model_id: String,
    /// Best-effort token count reported by the provider
    pub tokens_used: u64,
    /// Wall-clock latency of the call
    pub latency_ms: f64,
    /// Provider-specific extras
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl GenerationResponse {
    pub fn new(content: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model_id: model_id.into(),
            tokens_used: 0,
            latency_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Capability table: which quality tiers a provider serves per capability.
pub type CapabilityMap = HashMap<Capability, Vec<Quality>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts_follow_use_case() {
        // Extractions run long regardless of tier
        assert_eq!(
            Capability::Extraction.default_timeout_ms(Quality::Fast),
            120_000
        );
        assert_eq!(
            Capability::Extraction.default_timeout_ms(Quality::Quality),
            120_000
        );
        // Fast heuristic calls stay snappy
        assert_eq!(
            Capability::Reasoning.default_timeout_ms(Quality::Fast),
            3_000
        );
        // Balanced/quality reasoning and validation sit at 30 s
        assert_eq!(
            Capability::Reasoning.default_timeout_ms(Quality::Balanced),
            30_000
        );
        assert_eq!(
            Capability::Reasoning.default_timeout_ms(Quality::Quality),
            30_000
        );
        assert_eq!(
            Capability::Validation.default_timeout_ms(Quality::Balanced),
            30_000
        );
    }

    #[test]
    fn test_params_builder_clamps_temperature() {
        let params = GenerationParams::new().with_temperature(1.7).with_max_tokens(50);
        assert_eq!(params.temperature, Some(1.0));
        assert_eq!(params.max_tokens, Some(50));
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Extraction.to_string(), "extraction");
        assert_eq!(Quality::Balanced.to_string(), "balanced");
    }
}
