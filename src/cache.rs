//! Embedding cache: keyed by `sha256(text || "|" || model)`, with LRU
//! eviction by `last_accessed` and optional per-entry TTL. Adapted from the
//! teacher's `rag/cache.rs::LruEmbeddingCache`, kept dependency-light (no
//! external cache crate) since the teacher itself hand-rolls this.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size_bytes: u64,
    pub entry_count: usize,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size_bytes: u64,
    pub default_ttl: Option<Duration>,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 256 * 1024 * 1024,
            default_ttl: None,
            enabled: true,
        }
    }
}

/// Caches embeddings by a caller-supplied key (normally
/// [`EmbeddingCache::compute_key`]'s output), so repeated ingestion or query
/// calls for the same `(text, model)` pair skip the embedder entirely.
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<f32>>;
    fn set(&self, key: &str, embedding: Vec<f32>, ttl: Option<Duration>) -> Result<()>;
    fn invalidate(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn stats(&self) -> CacheStats;
    fn is_enabled(&self) -> bool;

    /// `sha256(text || "|" || model)`, hex-encoded.
    fn compute_key(&self, text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(b"|");
        hasher.update(model.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

struct CacheEntry {
    embedding: Vec<f32>,
    created_at: Instant,
    last_accessed: Instant,
    expires_at: Option<Instant>,
    size_bytes: usize,
}

impl CacheEntry {
    fn new(embedding: Vec<f32>, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        let size_bytes = embedding.len() * std::mem::size_of::<f32>();
        Self {
            embedding,
            created_at: now,
            last_accessed: now,
            expires_at: ttl.map(|d| now + d),
            size_bytes,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// The default cache: a bounded in-memory LRU keyed by `compute_key`,
/// evicting by `last_accessed` when a `set` would exceed `max_size_bytes`.
pub struct LruEmbeddingCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    current_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LruEmbeddingCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            config,
            current_size: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn with_max_size(max_size_bytes: u64) -> Self {
        Self::new(CacheConfig {
            max_size_bytes,
            ..Default::default()
        })
    }

    fn evict_lru(&self, needed_bytes: usize) {
        loop {
            if self.current_size.load(Ordering::Relaxed) + needed_bytes as u64 <= self.config.max_size_bytes {
                return;
            }
            let victim = {
                let cache = self.cache.read();
                cache.iter().min_by_key(|(_, entry)| entry.last_accessed).map(|(k, _)| k.clone())
            };
            let Some(key) = victim else { break };
            let mut cache = self.cache.write();
            if let Some(entry) = cache.remove(&key) {
                self.current_size.fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    pub fn cleanup_expired(&self) {
        let mut cache = self.cache.write();
        let expired: Vec<String> = cache.iter().filter(|(_, e)| e.is_expired()).map(|(k, _)| k.clone()).collect();
        for key in expired {
            if let Some(entry) = cache.remove(&key) {
                self.current_size.fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
            }
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl EmbeddingCache for LruEmbeddingCache {
    fn get(&self, key: &str) -> Option<Vec<f32>> {
        if !self.config.enabled {
            return None;
        }
        {
            let cache = self.cache.read();
            match cache.get(key) {
                Some(entry) if entry.is_expired() => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
        let mut cache = self.cache.write();
        if let Some(entry) = cache.get_mut(key) {
            if entry.is_expired() {
                cache.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.touch();
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.embedding.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    fn set(&self, key: &str, embedding: Vec<f32>, ttl: Option<Duration>) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let entry = CacheEntry::new(embedding, ttl.or(self.config.default_ttl));
        let entry_size = entry.size_bytes;

        if self.current_size.load(Ordering::Relaxed) + entry_size as u64 > self.config.max_size_bytes {
            self.evict_lru(entry_size);
        }

        let mut cache = self.cache.write();
        if let Some(old) = cache.remove(key) {
            self.current_size.fetch_sub(old.size_bytes as u64, Ordering::Relaxed);
        }
        self.current_size.fetch_add(entry_size as u64, Ordering::Relaxed);
        cache.insert(key.to_string(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.write();
        if let Some(entry) = cache.remove(key) {
            self.current_size.fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write();
        cache.clear();
        self.current_size.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size_bytes: self.current_size.load(Ordering::Relaxed),
            entry_count: self.cache.read().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Disables caching without forcing callers to branch on an `Option<dyn
/// EmbeddingCache>`.
#[derive(Debug, Default)]
pub struct NoOpCache;

impl NoOpCache {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingCache for NoOpCache {
    fn get(&self, _key: &str) -> Option<Vec<f32>> {
        None
    }

    fn set(&self, _key: &str, _embedding: Vec<f32>, _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    fn invalidate(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_computation_is_stable_and_sensitive_to_inputs() {
        let cache = LruEmbeddingCache::with_defaults();
        let key1 = cache.compute_key("hello world", "hash-384");
        let key2 = cache.compute_key("hello world", "hash-384");
        let key3 = cache.compute_key("hello world", "hash-768");
        let key4 = cache.compute_key("different text", "hash-384");
        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert_ne!(key1, key4);
    }

    #[test]
    fn set_and_get_round_trips() {
        let cache = LruEmbeddingCache::with_defaults();
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().misses, 1);

        cache.set("k", vec![1.0, 2.0, 3.0], None).unwrap();
        assert_eq!(cache.get("k").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = LruEmbeddingCache::with_defaults();
        cache.set("k", vec![1.0], None).unwrap();
        cache.invalidate("k").unwrap();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn clear_resets_size_and_count() {
        let cache = LruEmbeddingCache::with_defaults();
        cache.set("a", vec![1.0, 2.0], None).unwrap();
        cache.set("b", vec![3.0, 4.0], None).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear().unwrap();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn lru_eviction_drops_the_least_recently_used_entry() {
        let cache = LruEmbeddingCache::with_max_size(32);
        cache.set("key1", vec![1.0, 2.0, 3.0, 4.0], None).unwrap();
        cache.set("key2", vec![5.0, 6.0, 7.0, 8.0], None).unwrap();
        assert!(cache.get("key1").is_some());
        assert!(cache.get("key2").is_some());

        cache.set("key3", vec![9.0, 10.0, 11.0, 12.0], None).unwrap();
        assert!(cache.get("key1").is_none());
        assert!(cache.get("key2").is_some());
        assert!(cache.get("key3").is_some());
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn ttl_expiry_invalidates_on_read() {
        let cache = LruEmbeddingCache::with_defaults();
        cache.set("k", vec![1.0], Some(Duration::from_nanos(1))).unwrap();
        std::thread::sleep(Duration::from_millis(1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn hit_rate_is_a_percentage() {
        let stats = CacheStats {
            hits: 75,
            misses: 25,
            size_bytes: 0,
            entry_count: 0,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 75.0).abs() < 0.001);
    }

    #[test]
    fn noop_cache_never_stores() {
        let cache = NoOpCache::new();
        cache.set("k", vec![1.0, 2.0], None).unwrap();
        assert!(cache.get("k").is_none());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = LruEmbeddingCache::new(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        cache.set("k", vec![1.0, 2.0], None).unwrap();
        assert!(cache.get("k").is_none());
    }
}
