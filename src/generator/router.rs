//! Capability-aware routing across registered generator providers.
//!
//! Providers are addressed by name; routing picks the first available
//! provider serving the requested capability/quality pair, in registration
//! order (or preference-first), falling through on failure. Every routed call
//! runs under the capability/quality timeout; timeouts surface as errors so
//! callers can substitute their component-specific neutral result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::generator::cache::{CacheKey, ResponseCache};
use crate::generator::types::{
    Capability, CapabilityMap, GenerationParams, GenerationResponse, Quality,
};
use crate::generator::Generator;

/// Router request statistics: the surface through which sessions observe
/// provider fallbacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterStats {
    pub total_requests: u64,
    pub requests_by_capability: HashMap<String, u64>,
    pub requests_by_provider: HashMap<String, u64>,
    /// Count of provider calls that failed and fell through to the next
    pub fallbacks: u64,
    /// Count of responses served from the cache
    pub cache_hits: u64,
}

/// Registry of named providers with fallback routing.
pub struct GeneratorRouter {
    providers: Vec<(String, Arc<dyn Generator>)>,
    preferred: Option<String>,
    cache: Option<ResponseCache>,
    timeout_overrides: HashMap<(Capability, Quality), u64>,
    stats: Mutex<RouterStats>,
}

impl GeneratorRouter {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            preferred: None,
            cache: None,
            timeout_overrides: HashMap::new(),
            stats: Mutex::new(RouterStats::default()),
        }
    }

    /// Register a provider. Registration order is fallback order.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Generator>) {
        self.providers.push((name.into(), provider));
    }

    /// Name of the provider tried first regardless of registration order.
    pub fn with_preferred(mut self, name: impl Into<String>) -> Self {
        self.preferred = Some(name.into());
        self
    }

    /// Enable response caching with the given TTL.
    pub fn with_cache(mut self, ttl_secs: i64) -> Self {
        self.cache = Some(ResponseCache::new(ttl_secs));
        self
    }

    /// Override the timeout for a capability/quality pair (milliseconds).
    pub fn with_timeout_ms(
        mut self,
        capability: Capability,
        quality: Quality,
        timeout_ms: u64,
    ) -> Self {
        self.timeout_overrides
            .insert((capability, quality), timeout_ms);
        self
    }

    fn timeout_for(&self, capability: Capability, quality: Quality) -> Duration {
        let ms = self
            .timeout_overrides
            .get(&(capability, quality))
            .copied()
            .unwrap_or_else(|| capability.default_timeout_ms(quality));
        Duration::from_millis(ms)
    }

    /// Merged capability table across all registered providers.
    pub fn capabilities(&self) -> CapabilityMap {
        let mut merged: CapabilityMap = HashMap::new();
        for (_, provider) in &self.providers {
            for (capability, qualities) in provider.capabilities() {
                let entry = merged.entry(capability).or_default();
                for q in qualities {
                    if !entry.contains(&q) {
                        entry.push(q);
                    }
                }
            }
        }
        merged
    }

    fn suitable_providers(
        &self,
        capability: Capability,
        quality: Quality,
    ) -> Vec<(String, Arc<dyn Generator>)> {
        let mut suitable: Vec<(String, Arc<dyn Generator>)> = self
            .providers
            .iter()
            .filter(|(_, p)| {
                p.is_available()
                    && p.capabilities()
                        .get(&capability)
                        .is_some_and(|qs| qs.contains(&quality))
            })
            .map(|(n, p)| (n.clone(), Arc::clone(p)))
            .collect();

        if let Some(ref preferred) = self.preferred {
            if let Some(pos) = suitable.iter().position(|(n, _)| n == preferred) {
                let entry = suitable.remove(pos);
                suitable.insert(0, entry);
            }
        }

        suitable
    }

    /// Route a generation to the first provider serving the pair, falling
    /// through to the next on failure or timeout.
    pub async fn generate(
        &self,
        prompt: &str,
        capability: Capability,
        quality: Quality,
        params: &GenerationParams,
    ) -> Result<GenerationResponse> {
        {
            let mut stats = self
                .stats
                .lock()
                .map_err(|e| Error::Internal(format!("router stats lock: {e}")))?;
            stats.total_requests += 1;
            *stats
                .requests_by_capability
                .entry(capability.to_string())
                .or_default() += 1;
        }

        let cache_key = self
            .cache
            .as_ref()
            .map(|_| CacheKey::generate(prompt, capability, quality));
        if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key.as_ref()) {
            if let Some(response) = cache.get(key) {
                if let Ok(mut stats) = self.stats.lock() {
                    stats.cache_hits += 1;
                }
                return Ok(response);
            }
        }

        let suitable = self.suitable_providers(capability, quality);
        if suitable.is_empty() {
            return Err(Error::NoProvider {
                capability: capability.to_string(),
                quality: quality.to_string(),
            });
        }

        let timeout = self.timeout_for(capability, quality);
        let mut last_error = None;

        for (name, provider) in suitable {
            let attempt =
                tokio::time::timeout(timeout, provider.generate(prompt, capability, quality, params))
                    .await;

            let result = match attempt {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(timeout.as_millis() as u64)),
            };

            match result {
                Ok(response) => {
                    if let Ok(mut stats) = self.stats.lock() {
                        *stats.requests_by_provider.entry(name).or_default() += 1;
                    }
                    if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key.as_ref()) {
                        cache.put(key.clone(), response.clone());
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "provider failed, trying next");
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.fallbacks += 1;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoProvider {
            capability: capability.to_string(),
            quality: quality.to_string(),
        }))
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Cache statistics, if a cache is enabled.
    pub fn cache_stats(&self) -> Option<crate::generator::cache::ResponseCacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }
}

impl Default for GeneratorRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;
    use async_trait::async_trait;

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn capabilities(&self) -> CapabilityMap {
            let mut caps = HashMap::new();
            caps.insert(Capability::Reasoning, vec![Quality::Fast]);
            caps
        }

        async fn generate(
            &self,
            _prompt: &str,
            _capability: Capability,
            _quality: Quality,
            _params: &GenerationParams,
        ) -> Result<GenerationResponse> {
            Err(Error::generation("failing", "always down"))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_routes_to_capable_provider() {
        let mut router = GeneratorRouter::new();
        router.register(
            "scripted",
            Arc::new(ScriptedGenerator::new().with_response("hello")),
        );

        let response = router
            .generate(
                "p",
                Capability::Reasoning,
                Quality::Fast,
                &GenerationParams::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "hello");

        let stats = router.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.requests_by_provider.get("scripted"), Some(&1));
        assert_eq!(stats.fallbacks, 0);
    }

    #[tokio::test]
    async fn test_falls_through_on_failure() {
        let mut router = GeneratorRouter::new();
        router.register("failing", Arc::new(FailingGenerator));
        router.register(
            "backup",
            Arc::new(ScriptedGenerator::new().with_response("rescued")),
        );

        let response = router
            .generate(
                "p",
                Capability::Reasoning,
                Quality::Fast,
                &GenerationParams::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "rescued");
        assert_eq!(router.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_no_provider_for_pair() {
        let mut router = GeneratorRouter::new();
        router.register("failing", Arc::new(FailingGenerator));

        let err = router
            .generate(
                "p",
                Capability::Extraction,
                Quality::Quality,
                &GenerationParams::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoProvider { .. }));
    }

    #[tokio::test]
    async fn test_preferred_provider_wins() {
        let mut router = GeneratorRouter::new();
        router.register(
            "first",
            Arc::new(ScriptedGenerator::new().with_default_response("from-first")),
        );
        router.register(
            "second",
            Arc::new(ScriptedGenerator::new().with_default_response("from-second")),
        );
        let router = router.with_preferred("second");

        let response = router
            .generate(
                "p",
                Capability::Synthesis,
                Quality::Balanced,
                &GenerationParams::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "from-second");
    }

    #[test]
    fn test_timeout_keyed_by_capability_and_quality() {
        let router = GeneratorRouter::new();

        // Extractions run long even on the fast tier
        assert_eq!(
            router.timeout_for(Capability::Extraction, Quality::Fast),
            Duration::from_millis(120_000)
        );
        // Fast reasoning (the prior path) stays snappy
        assert_eq!(
            router.timeout_for(Capability::Reasoning, Quality::Fast),
            Duration::from_millis(3_000)
        );
        // Balanced/quality reasoning sits at 30 s
        assert_eq!(
            router.timeout_for(Capability::Reasoning, Quality::Quality),
            Duration::from_millis(30_000)
        );

        let router = router.with_timeout_ms(Capability::Extraction, Quality::Fast, 5_000);
        assert_eq!(
            router.timeout_for(Capability::Extraction, Quality::Fast),
            Duration::from_millis(5_000)
        );
        // Other pairs keep their defaults
        assert_eq!(
            router.timeout_for(Capability::Extraction, Quality::Balanced),
            Duration::from_millis(120_000)
        );
    }

    #[tokio::test]
    async fn test_cache_short_circuits_second_call() {
        let mut router = GeneratorRouter::new();
        let scripted = Arc::new(
            ScriptedGenerator::new()
                .with_response("one")
                .with_response("two"),
        );
        router.register("scripted", Arc::clone(&scripted) as Arc<dyn Generator>);
        let router = router.with_cache(60);

        let params = GenerationParams::new();
        let r1 = router
            .generate("same", Capability::Reasoning, Quality::Fast, &params)
            .await
            .unwrap();
        let r2 = router
            .generate("same", Capability::Reasoning, Quality::Fast, &params)
            .await
            .unwrap();

        assert_eq!(r1.content, "one");
        assert_eq!(r2.content, "one");
        assert_eq!(scripted.remaining(), 1);
        assert_eq!(router.stats().cache_hits, 1);
    }
}
