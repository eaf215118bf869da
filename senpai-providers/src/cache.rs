//! Shared response cache
//!
//! Process-wide key → entry map used by the API client. Each entry carries its
//! own TTL (call sites pick 5–15 minutes depending on the query), expiry is
//! lazy on read, and the entry count is bounded by an LRU eviction policy.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics;

/// Default number of entries kept before the least recently used is evicted.
pub const DEFAULT_CAPACITY: u64 = 512;

/// One cached upstream response.
#[derive(Clone)]
pub struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    timestamp: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Any + Send + Sync>(data: T, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            timestamp: Instant::now(),
            ttl,
        }
    }

    /// When the entry was stored.
    #[must_use]
    pub const fn timestamp(&self) -> Instant {
        self.timestamp
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.timestamp.elapsed() >= self.ttl
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("timestamp", &self.timestamp)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Per-entry expiry: every entry lives exactly as long as its own TTL.
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Response cache shared by every upstream client.
///
/// Cloning is cheap; clones share the same underlying map.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, CacheEntry>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl)
            .build();
        Self { inner }
    }

    /// Deterministic fingerprint of an endpoint and its query/variables.
    ///
    /// `serde_json::Value` objects serialize with sorted keys, so two calls
    /// with the same parameters always hash identically.
    #[must_use]
    pub fn fingerprint(endpoint: &str, params: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hasher.update(b"\n");
        hasher.update(params.to_string().as_bytes());
        format!("{endpoint}:{}", hex::encode(&hasher.finalize()[..12]))
    }

    /// Look up a live entry and downcast it to `T`.
    ///
    /// A stored value of a different type is treated as a miss.
    pub fn get<T: Any + Clone + Send + Sync>(&self, key: &str) -> Option<T> {
        let hit = self
            .inner
            .get(key)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.data.downcast_ref::<T>().cloned());

        let result = if hit.is_some() { "hit" } else { "miss" };
        metrics::RESPONSE_CACHE_TOTAL.with_label_values(&[result]).inc();
        tracing::trace!(key, result, "Response cache lookup");
        hit
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, data: T, ttl: Duration) {
        self.inner.insert(key.into(), CacheEntry::new(data, ttl));
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of live entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let cache = ResponseCache::new(16);
        cache.set("k", vec![1u32, 2, 3], Duration::from_secs(60));
        assert_eq!(cache.get::<Vec<u32>>("k"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<u32>>("missing"), None);
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let cache = ResponseCache::new(16);
        cache.set("k", "text".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get::<u64>("k"), None);
        assert_eq!(cache.get::<String>("k"), Some("text".to_string()));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ResponseCache::new(16);
        cache.set("short", 7u8, Duration::from_millis(100));
        assert_eq!(cache.get::<u8>("short"), Some(7));

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get::<u8>("short"), None);
    }

    #[test]
    fn test_entries_keep_their_own_ttl() {
        let cache = ResponseCache::new(16);
        cache.set("short", 1u8, Duration::from_millis(50));
        cache.set("long", 2u8, Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(cache.get::<u8>("short"), None);
        assert_eq!(cache.get::<u8>("long"), Some(2));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = ResponseCache::new(4);
        for i in 0..32u32 {
            cache.set(format!("k{i}"), i, Duration::from_secs(60));
        }
        assert!(cache.entry_count() <= 4);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = ResponseCache::new(16);
        cache.set("a", 1u8, Duration::from_secs(60));
        cache.set("b", 2u8, Duration::from_secs(60));

        cache.invalidate("a");
        assert_eq!(cache.get::<u8>("a"), None);
        assert_eq!(cache.get::<u8>("b"), Some(2));

        cache.clear();
        assert_eq!(cache.get::<u8>("b"), None);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = ResponseCache::fingerprint("search", &json!({"externalId": 21, "malId": 21}));
        let b = ResponseCache::fingerprint("search", &json!({"malId": 21, "externalId": 21}));
        let c = ResponseCache::fingerprint("search", &json!({"externalId": 22}));
        let d = ResponseCache::fingerprint("episodes", &json!({"externalId": 21, "malId": 21}));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.starts_with("search:"));
    }
}
