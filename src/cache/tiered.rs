//! Tiered read-through cache
//!
//! Two tiers in front of every ranking read:
//!
//! - **Edge**: in-process, per-entry expiry capped at a short TTL, bounded
//!   entry count with oldest-first eviction. Close to the request path.
//! - **Shared**: a [`CacheBackend`] shared across edge nodes, longer TTLs.
//!
//! Read path checks the edge tier first, then the shared tier; a shared-tier
//! hit repopulates the edge tier under the edge TTL cap. Writes land in both
//! tiers. Shared-tier failures never propagate to the read/write caller: the
//! engine degrades to edge-only operation, logs, and counts the error.
//! Deletes are the exception - the invalidator needs to observe purge
//! failures, so `delete`/`delete_prefix` purge the edge tier unconditionally
//! and then surface the shared-tier result.
//!
//! Invariant: no entry is served past its expiry. Both tiers check expiry on
//! every read; the background sweeper only reclaims memory earlier.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::backend::CacheBackend;
use crate::config::CacheTierConfig;
use crate::types::Result;

// ============================================================================
// Entries & Statistics
// ============================================================================

struct EdgeEntry {
    value: Bytes,
    cached_at: Instant,
    expires_at: Instant,
}

/// Statistics for the edge tier
#[derive(Debug, Clone, Default)]
pub struct EdgeTierStats {
    /// Number of live entries
    pub item_count: usize,
    /// Maximum entries before eviction
    pub max_entries: usize,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Evictions due to the entry limit
    pub evictions: u64,
    /// Expirations dropped on read or sweep
    pub expirations: u64,
}

impl EdgeTierStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Statistics for the shared tier as seen from this node
#[derive(Debug, Clone, Default)]
pub struct SharedTierStats {
    pub hits: u64,
    pub misses: u64,
    /// Backend failures absorbed by degraded operation
    pub errors: u64,
}

/// Combined statistics for both tiers
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub edge: EdgeTierStats,
    pub shared: SharedTierStats,
}

// ============================================================================
// Tiered Cache
// ============================================================================

/// Edge-plus-shared cache for ranked lists and artwork state
pub struct TieredCache {
    edge: DashMap<String, EdgeEntry>,
    backend: Arc<dyn CacheBackend>,
    config: CacheTierConfig,

    edge_hits: AtomicU64,
    edge_misses: AtomicU64,
    edge_evictions: AtomicU64,
    edge_expirations: AtomicU64,

    shared_hits: AtomicU64,
    shared_misses: AtomicU64,
    shared_errors: AtomicU64,
}

impl TieredCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheTierConfig) -> Self {
        info!(
            list_ttl_secs = config.list_ttl.as_secs(),
            artwork_ttl_secs = config.artwork_ttl.as_secs(),
            edge_max_ttl_secs = config.edge_max_ttl.as_secs(),
            edge_max_entries = config.edge_max_entries,
            "TieredCache initialized"
        );

        Self {
            edge: DashMap::new(),
            backend,
            config,
            edge_hits: AtomicU64::new(0),
            edge_misses: AtomicU64::new(0),
            edge_evictions: AtomicU64::new(0),
            edge_expirations: AtomicU64::new(0),
            shared_hits: AtomicU64::new(0),
            shared_misses: AtomicU64::new(0),
            shared_errors: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheTierConfig {
        &self.config
    }

    /// Fetch a live entry: edge tier first, then shared, repopulating the
    /// edge tier on a shared hit. `None` on miss; backend failures degrade to
    /// a miss so the caller falls through to recompute.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if let Some(entry) = self.edge.get(key) {
            if Instant::now() < entry.expires_at {
                self.edge_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Edge cache hit");
                return Some(entry.value.clone());
            }
            // Expired
            drop(entry);
            self.edge.remove(key);
            self.edge_expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.edge_misses.fetch_add(1, Ordering::Relaxed);

        match self.backend.get(key).await {
            Ok(Some(value)) => {
                self.shared_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Shared cache hit");
                // Remaining shared TTL is unknown here, so the repopulated
                // edge entry gets at most the edge cap.
                self.insert_edge(key, value.clone(), self.config.edge_max_ttl);
                Some(value)
            }
            Ok(None) => {
                self.shared_misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                self.shared_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = key, error = %e, "Shared cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store an entry in both tiers with an explicit TTL.
    ///
    /// The edge copy's TTL is capped at `edge_max_ttl`. A shared-tier failure
    /// is absorbed: the entry stays edge-cached and the error is counted.
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        self.insert_edge(key, value.clone(), ttl.min(self.config.edge_max_ttl));

        if let Err(e) = self.backend.set(key, value, ttl).await {
            self.shared_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = key, error = %e, "Shared cache write failed, entry is edge-only");
        }
    }

    /// Drop one entry from both tiers.
    ///
    /// The edge copy is always removed; the shared-tier result is surfaced so
    /// the invalidator can count purge failures.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.edge.remove(key);
        self.backend.delete(key).await
    }

    /// Drop every entry under a prefix from both tiers.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        self.edge.retain(|key, _| !key.starts_with(prefix));
        self.backend.delete_prefix(prefix).await
    }

    /// Remove expired edge entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.edge.len();
        self.edge.retain(|_, entry| now < entry.expires_at);
        let removed = before - self.edge.len();
        if removed > 0 {
            self.edge_expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed = removed, "Cleaned up expired edge entries");
        }
        removed
    }

    /// Current edge-tier entry count
    pub fn edge_len(&self) -> usize {
        self.edge.len()
    }

    /// Snapshot of both tiers' counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            edge: EdgeTierStats {
                item_count: self.edge.len(),
                max_entries: self.config.edge_max_entries,
                hits: self.edge_hits.load(Ordering::Relaxed),
                misses: self.edge_misses.load(Ordering::Relaxed),
                evictions: self.edge_evictions.load(Ordering::Relaxed),
                expirations: self.edge_expirations.load(Ordering::Relaxed),
            },
            shared: SharedTierStats {
                hits: self.shared_hits.load(Ordering::Relaxed),
                misses: self.shared_misses.load(Ordering::Relaxed),
                errors: self.shared_errors.load(Ordering::Relaxed),
            },
        }
    }

    fn insert_edge(&self, key: &str, value: Bytes, ttl: Duration) {
        if self.edge.len() >= self.config.edge_max_entries && !self.edge.contains_key(key) {
            self.evict_oldest_edge();
        }

        let now = Instant::now();
        self.edge.insert(
            key.to_string(),
            EdgeEntry {
                value,
                cached_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Evict the oldest edge entry to stay under the entry limit
    fn evict_oldest_edge(&self) {
        let oldest_key = self
            .edge
            .iter()
            .min_by_key(|entry| entry.cached_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest_key {
            self.edge.remove(&key);
            self.edge_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ============================================================================
// Background Cleanup Task
// ============================================================================

/// Spawn a background task that periodically sweeps expired edge entries
pub fn spawn_cache_cleanup_task(cache: Arc<TieredCache>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = cache.cleanup_expired();
            let stats = cache.stats();
            debug!(
                removed = removed,
                edge_items = stats.edge.item_count,
                edge_hit_rate = format!("{:.1}%", stats.edge.hit_rate()),
                "Cache cleanup completed"
            );
        }
    });

    info!(
        interval_secs = interval.as_secs(),
        "Cache cleanup task started"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCacheBackend;
    use crate::types::LimelightError;
    use async_trait::async_trait;

    /// Backend that fails every operation, for degradation tests
    struct UnreachableBackend;

    #[async_trait]
    impl CacheBackend for UnreachableBackend {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
            Err(LimelightError::Unavailable("backend down".into()))
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<()> {
            Err(LimelightError::Unavailable("backend down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(LimelightError::Unavailable("backend down".into()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<usize> {
            Err(LimelightError::Unavailable("backend down".into()))
        }
    }

    fn cache_with(config: CacheTierConfig) -> (Arc<MemoryCacheBackend>, TieredCache) {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = TieredCache::new(backend.clone(), config);
        (backend, cache)
    }

    #[tokio::test]
    async fn test_set_then_get_hits_edge() {
        let (_, cache) = cache_with(CacheTierConfig::default());

        cache
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k1").await, Some(Bytes::from_static(b"v1")));

        let stats = cache.stats();
        assert_eq!(stats.edge.hits, 1);
        assert_eq!(stats.shared.hits, 0);
    }

    #[tokio::test]
    async fn test_shared_hit_repopulates_edge() {
        let (backend, cache) = cache_with(CacheTierConfig::default());

        // Entry only in the shared tier (written by another edge node)
        backend
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.edge_len(), 0);

        assert_eq!(cache.get("k1").await, Some(Bytes::from_static(b"v1")));
        assert_eq!(cache.stats().shared.hits, 1);
        assert_eq!(cache.edge_len(), 1);

        // Second read is served from the repopulated edge tier
        cache.get("k1").await.unwrap();
        assert_eq!(cache.stats().edge.hits, 1);
    }

    #[tokio::test]
    async fn test_edge_entry_never_served_past_expiry() {
        let config = CacheTierConfig {
            edge_max_ttl: Duration::from_millis(10),
            ..CacheTierConfig::default()
        };
        let (backend, cache) = cache_with(config);

        cache
            .set("k1", Bytes::from_static(b"v1"), Duration::from_millis(10))
            .await;
        // Let both tiers lapse; nothing may serve the entry afterwards
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get("k1").await.is_none());
        assert!(backend.get("k1").await.unwrap().is_none());
        assert_eq!(cache.stats().edge.expirations, 1);
    }

    #[tokio::test]
    async fn test_edge_ttl_capped() {
        let config = CacheTierConfig {
            edge_max_ttl: Duration::from_millis(10),
            ..CacheTierConfig::default()
        };
        let (_, cache) = cache_with(config);

        cache
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Edge copy lapsed at the cap, shared copy still live
        assert_eq!(cache.get("k1").await, Some(Bytes::from_static(b"v1")));
        let stats = cache.stats();
        assert_eq!(stats.edge.expirations, 1);
        assert_eq!(stats.shared.hits, 1);
    }

    #[tokio::test]
    async fn test_edge_eviction_at_capacity() {
        let config = CacheTierConfig {
            edge_max_entries: 2,
            ..CacheTierConfig::default()
        };
        let (_, cache) = cache_with(config);
        let ttl = Duration::from_secs(60);

        cache.set("k1", Bytes::from_static(b"1"), ttl).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("k2", Bytes::from_static(b"2"), ttl).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("k3", Bytes::from_static(b"3"), ttl).await;

        assert_eq!(cache.edge_len(), 2);
        assert_eq!(cache.stats().edge.evictions, 1);
        // Oldest entry went first; shared tier still has it
        assert_eq!(cache.get("k1").await, Some(Bytes::from_static(b"1")));
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_edge_only() {
        let cache = TieredCache::new(Arc::new(UnreachableBackend), CacheTierConfig::default());

        // Write absorbs the backend failure; the value still serves from edge
        cache
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k1").await, Some(Bytes::from_static(b"v1")));

        // Read of an uncached key degrades to a miss
        assert!(cache.get("other").await.is_none());

        let stats = cache.stats();
        assert!(stats.shared.errors >= 2);
    }

    #[tokio::test]
    async fn test_delete_purges_both_tiers() {
        let (backend, cache) = cache_with(CacheTierConfig::default());
        let ttl = Duration::from_secs(60);

        cache.set("feed:a", Bytes::from_static(b"1"), ttl).await;
        cache.set("feed:b", Bytes::from_static(b"2"), ttl).await;
        cache.set("art:1", Bytes::from_static(b"3"), ttl).await;

        assert!(cache.delete("art:1").await.unwrap());
        assert!(cache.get("art:1").await.is_none());

        let removed = cache.delete_prefix("feed:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.edge_len(), 0);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delete_surfaces_backend_failure() {
        let cache = TieredCache::new(Arc::new(UnreachableBackend), CacheTierConfig::default());
        cache
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await;

        let err = cache.delete("k1").await.unwrap_err();
        assert!(matches!(err, LimelightError::Unavailable(_)));
        // The edge copy was still purged
        assert_eq!(cache.edge_len(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_sweeps_edge() {
        let config = CacheTierConfig {
            edge_max_ttl: Duration::from_millis(10),
            ..CacheTierConfig::default()
        };
        let (_, cache) = cache_with(config);

        cache
            .set("k1", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await;
        cache
            .set("k2", Bytes::from_static(b"2"), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.edge_len(), 0);
    }
}
