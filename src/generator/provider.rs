//! Generator trait and the HTTP provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::generator::types::{
    Capability, CapabilityMap, GenerationParams, GenerationResponse, Quality,
};

/// Capability-tagged text producer.
///
/// Concrete providers are interchangeable; the router composes them by
/// capability + quality + preference rather than by subclassing.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Which quality tiers this provider serves per capability.
    fn capabilities(&self) -> CapabilityMap;

    /// Generate a completion for the prompt.
    async fn generate(
        &self,
        prompt: &str,
        capability: Capability,
        quality: Quality,
        params: &GenerationParams,
    ) -> Result<GenerationResponse>;

    /// Whether the provider is currently reachable.
    fn is_available(&self) -> bool;

    /// Introspection only: provider resource usage (VRAM, RAM, ...).
    fn resource_usage(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

/// Configuration for [`HttpGenerator`].
#[derive(Debug, Clone)]
pub struct HttpGeneratorConfig {
    /// Base URL of the generation endpoint
    pub base_url: String,
    /// Model id per (capability, quality) pair
    pub models: HashMap<(Capability, Quality), String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl HttpGeneratorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            models: HashMap::new(),
            timeout_secs: 120,
        }
    }

    /// Register a model for a capability/quality pair.
    pub fn with_model(
        mut self,
        capability: Capability,
        quality: Quality,
        model: impl Into<String>,
    ) -> Self {
        self.models.insert((capability, quality), model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP provider speaking the local-inference generate API
/// (`POST {base_url}/api/generate`).
pub struct HttpGenerator {
    config: HttpGeneratorConfig,
    http: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u64,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, http }
    }

    fn model_for(&self, capability: Capability, quality: Quality) -> Result<&str> {
        self.config
            .models
            .get(&(capability, quality))
            .map(String::as_str)
            .ok_or_else(|| Error::NoProvider {
                capability: capability.to_string(),
                quality: quality.to_string(),
            })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn capabilities(&self) -> CapabilityMap {
        let mut caps: CapabilityMap = HashMap::new();
        for (capability, quality) in self.config.models.keys() {
            let entry = caps.entry(*capability).or_default();
            if !entry.contains(quality) {
                entry.push(*quality);
            }
        }
        caps
    }

    async fn generate(
        &self,
        prompt: &str,
        capability: Capability,
        quality: Quality,
        params: &GenerationParams,
    ) -> Result<GenerationResponse> {
        let model = self.model_for(capability, quality)?.to_string();
        let started = Instant::now();

        let options = if params.temperature.is_some()
            || params.max_tokens.is_some()
            || params.stop.is_some()
        {
            Some(GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                stop: params.stop.clone(),
            })
        } else {
            None
        };

        let body = GenerateRequest {
            model: &model,
            prompt,
            stream: false,
            options,
        };

        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::generation(&model, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::generation(
                &model,
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: GenerateResponseBody = response
            .json()
            .await
            .map_err(|e| Error::generation(&model, e.to_string()))?;

        Ok(GenerationResponse::new(parsed.response, model)
            .with_tokens(parsed.eval_count)
            .with_latency(started.elapsed().as_secs_f64() * 1000.0))
    }

    fn is_available(&self) -> bool {
        // Reachability is probed lazily on the first generate call; a
        // configured model table is the static precondition.
        !self.config.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_map_from_model_table() {
        let config = HttpGeneratorConfig::new("http://localhost:11434")
            .with_model(Capability::Extraction, Quality::Fast, "llama3.1:8b")
            .with_model(Capability::Reasoning, Quality::Fast, "llama3.1:8b")
            .with_model(Capability::Reasoning, Quality::Balanced, "deepseek-r1:14b");

        let provider = HttpGenerator::new(config);
        let caps = provider.capabilities();

        assert_eq!(caps[&Capability::Extraction], vec![Quality::Fast]);
        assert_eq!(caps[&Capability::Reasoning].len(), 2);
        assert!(provider.is_available());
    }

    #[test]
    fn test_unconfigured_pair_is_rejected() {
        let config = HttpGeneratorConfig::new("http://localhost:11434")
            .with_model(Capability::Extraction, Quality::Fast, "llama3.1:8b");
        let provider = HttpGenerator::new(config);

        let err = provider
            .model_for(Capability::Validation, Quality::Quality)
            .unwrap_err();
        assert!(matches!(err, Error::NoProvider { .. }));
    }
}
