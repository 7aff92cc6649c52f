//! Chat-completions provider for OpenAI-compatible endpoints.
//!
//! Covers hosted APIs and local inference servers (llama.cpp server, vLLM,
//! and friends) that expose `POST {base_url}/v1/chat/completions`. Models are
//! selected per capability/quality pair, with an optional system prompt per
//! capability.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::generator::types::{
    Capability, CapabilityMap, GenerationParams, GenerationResponse, Quality,
};
use crate::generator::Generator;

/// Configuration for [`ChatGenerator`].
#[derive(Debug, Clone)]
pub struct ChatGeneratorConfig {
    /// Base URL of the chat-completions server
    pub base_url: String,
    /// Bearer token; omitted for unauthenticated local servers
    pub api_key: Option<String>,
    /// Model id per (capability, quality) pair
    pub models: HashMap<(Capability, Quality), String>,
    /// System prompt prepended per capability
    pub system_prompts: HashMap<Capability, String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ChatGeneratorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            models: HashMap::new(),
            system_prompts: HashMap::new(),
            timeout_secs: 120,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
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

    /// Set the system prompt used for a capability.
    pub fn with_system_prompt(
        mut self,
        capability: Capability,
        prompt: impl Into<String>,
    ) -> Self {
        self.system_prompts.insert(capability, prompt.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Provider speaking the OpenAI-compatible chat-completions API.
pub struct ChatGenerator {
    config: ChatGeneratorConfig,
    http: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl ChatGenerator {
    pub fn new(config: ChatGeneratorConfig) -> Self {
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
impl Generator for ChatGenerator {
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

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_prompts.get(&capability) {
            messages.push(ChatRequestMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatRequestMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop.as_deref(),
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::generation(&model, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::generation(
                &model,
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| Error::generation(&model, e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::generation(&model, "response carried no choices"))?;

        let tokens = parsed
            .usage
            .map(|u| {
                if u.completion_tokens > 0 {
                    u.completion_tokens
                } else {
                    u.total_tokens
                }
            })
            .unwrap_or(0);

        Ok(GenerationResponse::new(content, model)
            .with_tokens(tokens)
            .with_latency(started.elapsed().as_secs_f64() * 1000.0))
    }

    fn is_available(&self) -> bool {
        !self.config.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChatGeneratorConfig {
        ChatGeneratorConfig::new("http://localhost:8080/")
            .with_model(Capability::Reasoning, Quality::Balanced, "qwen2.5:14b")
            .with_model(Capability::Validation, Quality::Balanced, "qwen2.5:14b")
            .with_system_prompt(Capability::Validation, "You check facts against values.")
    }

    #[test]
    fn test_capability_map() {
        let provider = ChatGenerator::new(config());
        let caps = provider.capabilities();

        assert_eq!(caps.len(), 2);
        assert_eq!(caps[&Capability::Reasoning], vec![Quality::Balanced]);
        assert!(provider.is_available());
    }

    #[test]
    fn test_missing_pair_rejected() {
        let provider = ChatGenerator::new(config());
        assert!(matches!(
            provider.model_for(Capability::Extraction, Quality::Fast),
            Err(Error::NoProvider { .. })
        ));
    }

    #[test]
    fn test_request_serialization_shape() {
        let body = ChatRequest {
            model: "qwen2.5:14b",
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: "You check facts.",
                },
                ChatRequestMessage {
                    role: "user",
                    content: "Is this aligned?",
                },
            ],
            temperature: Some(0.3),
            max_tokens: Some(100),
            stop: None,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "qwen2.5:14b");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Is this aligned?");
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn test_response_parsing_with_and_without_usage() {
        let body: ChatResponseBody = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"ALIGNMENT: YES"}}],
                "usage":{"prompt_tokens":50,"completion_tokens":12,"total_tokens":62}}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content, "ALIGNMENT: YES");
        assert_eq!(body.usage.as_ref().unwrap().completion_tokens, 12);

        let body: ChatResponseBody = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"0.7"}}]}"#,
        )
        .unwrap();
        assert!(body.usage.is_none());
    }
}
