//! Shared cache tier port and in-memory implementation
//!
//! [`CacheBackend`] is the contract for the shared tier: any key/value store
//! with expiry semantics satisfies it. Adapters own their transport timeouts;
//! every operation is fallible with `Unavailable` and the tiered cache above
//! treats the backend as never guaranteed reachable.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::Result;

/// Key/value store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry. `Ok(None)` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store an entry with an explicit TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Drop one entry. Returns whether an entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop every entry under a key prefix. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

struct StoredEntry {
    value: Bytes,
    expires_at: Instant,
}

/// DashMap-backed shared tier for tests and single-node deployments
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop every expired entry. Returns the number removed.
    ///
    /// Reads already evict lazily; the sweep reclaims entries nobody re-reads.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
            // Expired
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let entry = StoredEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in &keys {
            if self.entries.remove(key).is_some() {
                removed += 1;
            }
        }

        debug!(prefix = prefix, removed = removed, "Prefix purge");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = MemoryCacheBackend::new();

        assert!(backend.get("k1").await.unwrap().is_none());

        backend
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            backend.get("k1").await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );

        assert!(backend.delete("k1").await.unwrap());
        assert!(!backend.delete("k1").await.unwrap());
        assert!(backend.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_never_served_past_ttl() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k1", Bytes::from_static(b"v1"), Duration::from_millis(10))
            .await
            .unwrap();

        assert!(backend.get("k1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let backend = MemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);

        backend.set("feed:a", Bytes::from_static(b"1"), ttl).await.unwrap();
        backend.set("feed:b", Bytes::from_static(b"2"), ttl).await.unwrap();
        backend.set("art:1", Bytes::from_static(b"3"), ttl).await.unwrap();

        let removed = backend.delete_prefix("feed:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(backend.get("feed:a").await.unwrap().is_none());
        assert!(backend.get("art:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("short", Bytes::from_static(b"1"), Duration::from_millis(10))
            .await
            .unwrap();
        backend
            .set("long", Bytes::from_static(b"2"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }
}
