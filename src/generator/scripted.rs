//! Deterministic provider replaying canned responses.
//!
//! Useful for tests and for offline sessions where responses are prepared by
//! hand. Responses are consumed in FIFO order; when the queue runs dry the
//! provider falls back to a fixed default.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::Result;
use crate::generator::types::{
    Capability, CapabilityMap, GenerationParams, GenerationResponse, Quality,
};
use crate::generator::Generator;

/// Queue-backed deterministic generator.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    tokens_per_response: u64,
    model_id: String,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: String::new(),
            tokens_per_response: 100,
            model_id: "scripted".to_string(),
        }
    }

    /// Queue a response to be returned by a future `generate` call.
    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response.into());
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Response returned once the queue is empty.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Token count reported for every response.
    pub fn with_tokens_per_response(mut self, tokens: u64) -> Self {
        self.tokens_per_response = tokens;
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Responses still queued.
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn capabilities(&self) -> CapabilityMap {
        let all = vec![Quality::Fast, Quality::Balanced, Quality::Quality];
        let mut caps = HashMap::new();
        for capability in [
            Capability::Extraction,
            Capability::Reasoning,
            Capability::Synthesis,
            Capability::Validation,
        ] {
            caps.insert(capability, all.clone());
        }
        caps
    }

    async fn generate(
        &self,
        _prompt: &str,
        _capability: Capability,
        _quality: Quality,
        _params: &GenerationParams,
    ) -> Result<GenerationResponse> {
        let content = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default_response.clone());

        Ok(GenerationResponse::new(content, self.model_id.clone())
            .with_tokens(self.tokens_per_response)
            .with_latency(0.0))
    }

    fn is_available(&self) -> bool {
        true
    }
}
