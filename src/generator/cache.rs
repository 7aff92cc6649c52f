//! Response caching for routed generations.
//!
//! Keys are content hashes of (prompt, capability, quality); entries expire
//! after a TTL. The main consumer is the XoT prior, which re-scores the same
//! unexplored children on every selection walk.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::generator::types::{Capability, GenerationResponse, Quality};

/// Cache key for a generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    /// Generate a cache key from prompt and routing coordinates.
    pub fn generate(prompt: &str, capability: Capability, quality: Quality) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(capability.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(quality.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(prompt.as_bytes());

        let hash = hasher.finalize();
        CacheKey(format!("{:x}", hash))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..16]) // Short form for display
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: GenerationResponse,
    created_at: DateTime<Utc>,
    hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.created_at > ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl ResponseCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL cache over generation responses.
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    stats: Mutex<ResponseCacheStats>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache with the given entry TTL in seconds.
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(ResponseCacheStats::default()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Look up a cached response; expired entries count as misses.
    pub fn get(&self, key: &CacheKey) -> Option<GenerationResponse> {
        let mut entries = self.entries.lock().ok()?;
        let mut stats = self.stats.lock().ok()?;

        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                entry.hit_count += 1;
                stats.hits += 1;
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(key);
                stats.misses += 1;
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a response under the key.
    pub fn put(&self, key: CacheKey, response: GenerationResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CacheEntry {
                    response,
                    created_at: Utc::now(),
                    hit_count: 0,
                },
            );
        }
    }

    pub fn stats(&self) -> ResponseCacheStats {
        let mut stats = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.entry_count = self.entries.lock().map(|e| e.len() as u64).unwrap_or(0);
        stats
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_routing_sensitive() {
        let a = CacheKey::generate("prompt", Capability::Reasoning, Quality::Fast);
        let b = CacheKey::generate("prompt", Capability::Reasoning, Quality::Fast);
        let c = CacheKey::generate("prompt", Capability::Reasoning, Quality::Balanced);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = ResponseCache::new(60);
        let key = CacheKey::generate("p", Capability::Reasoning, Quality::Fast);

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), GenerationResponse::new("0.7", "m"));
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.content, "0.7");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache = ResponseCache::new(0);
        let key = CacheKey::generate("p", Capability::Reasoning, Quality::Fast);
        cache.put(key.clone(), GenerationResponse::new("x", "m"));

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().entry_count, 0);
    }
}
