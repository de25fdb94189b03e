//! Key/value cache with per-entry expiry.
//!
//! Expiry is checked lazily on read and eagerly by an optional background
//! sweeper. Time comes from `tokio::time`, so paused-clock tests can drive it.

use super::stats::{CacheSnapshot, CacheStats};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent TTL cache keyed by string.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    stats: CacheStats,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Return the value for `key` if present and not yet expired.
    ///
    /// An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.stats.record_hit();
                    tracing::debug!(key, "cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.stats.record_miss();
                    tracing::debug!(key, "cache miss");
                    return None;
                }
            }
        }

        // Re-check under the write lock: a concurrent `set` may have refreshed it.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(now) {
                self.stats.record_hit();
                return Some(entry.value.clone());
            }
            entries.remove(key);
            self.stats.record_evictions(1);
        }
        self.stats.record_miss();
        tracing::debug!(key, "cache miss (expired)");
        None
    }

    /// Insert or overwrite `key`, expiring `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    pub fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.stats.record_evictions(removed);
        removed
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.stats.snapshot(self.len())
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Spawn a task that purges expired entries every `interval`.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    tracing::debug!("cache dropped, sweeper exiting");
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "cache sweep");
                }
            }
        })
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn value_visible_until_ttl() {
        let cache = TtlCache::new();
        cache.set("Reports:rows", 7_u32, TTL);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("Reports:rows"), Some(7));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("Reports:rows"), None);
        assert!(cache.is_empty(), "expired entry is removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_refreshes_expiry() {
        let cache = TtlCache::new();
        cache.set("k", "old".to_string(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", "new".to_string(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn delete_by_prefix_only_touches_matching_keys() {
        let cache = TtlCache::new();
        cache.set("Reports:rows", 1, TTL);
        cache.set("Reports:header", 2, TTL);
        cache.set("Users:rows", 3, TTL);

        assert_eq!(cache.delete_by_prefix("Reports:"), 2);
        assert_eq!(cache.get("Reports:rows"), None);
        assert_eq!(cache.get("Users:rows"), Some(3));
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = TtlCache::new();
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = TtlCache::new();
        cache.set("short", 1, Duration::from_secs(5));
        cache.set("long", 2, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_in_background_and_stops_on_drop() {
        let cache = Arc::new(TtlCache::new());
        cache.set("k", 1, Duration::from_secs(5));
        let handle = cache.spawn_sweeper(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(cache.len(), 0);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = TtlCache::new();
        cache.set("k", 1, TTL);
        let _ = cache.get("k");
        let _ = cache.get("k");
        let _ = cache.get("missing");

        let snap = cache.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert!((snap.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }
}
