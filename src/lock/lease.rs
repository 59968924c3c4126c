//! Lease-based recompute locks
//!
//! Serializes score recomputation per artwork or ranking bucket so concurrent
//! like bursts cannot interleave counter-read-then-cache-write sequences.
//! Acquisition is non-blocking: callers get `Busy` and decide their own
//! retry/backoff. Every lease carries a hard TTL, so a crashed holder's lock
//! self-releases instead of deadlocking the resource.
//!
//! [`MemoryLockBackend`] is the in-process implementation; any lease-based
//! coordinator (with acquire/release/renew and TTL expiry) satisfies
//! [`LockBackend`] for multi-node deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{LimelightError, Result};

/// A held lease on one resource.
///
/// At most one live token exists per resource at any instant while the
/// backend is reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockToken {
    /// Resource key, e.g. `art:{id}` or `bucket:{kind}:{window}`
    pub resource: String,
    /// Holder identity; distinguishes this lease from a successor on the
    /// same resource
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockToken {
    fn new(resource: &str, ttl: chrono::Duration, now: DateTime<Utc>) -> Self {
        Self {
            resource: resource.to_string(),
            holder: Uuid::new_v4(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the lease has lapsed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Mutual exclusion with TTL-bounded leases
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Take the lease on `resource`, or `Busy` if a live lease exists.
    /// Non-blocking; an expired lease is replaced atomically.
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockToken>;

    /// Give the lease back. `NotHeld` if the token no longer owns the resource.
    async fn release(&self, token: &LockToken) -> Result<()>;

    /// Extend a held lease by `ttl` from now. `Expired` if the lease already
    /// lapsed or was taken over.
    async fn renew(&self, token: &LockToken, ttl: Duration) -> Result<LockToken>;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// DashMap-backed lock backend for tests and single-node deployments
#[derive(Default)]
pub struct MemoryLockBackend {
    leases: DashMap<String, LockToken>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self {
            leases: DashMap::new(),
        }
    }

    /// Drop every lapsed lease. Returns the number removed.
    ///
    /// Acquire already replaces expired leases in place; this sweep keeps the
    /// map from accumulating leases nobody contends for again.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| !lease.is_expired_at(now));
        let removed = before - self.leases.len();
        if removed > 0 {
            debug!(removed = removed, "Swept expired leases");
        }
        removed
    }

    /// Number of tracked leases, expired or not
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

fn lease_duration(ttl: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(ttl)
        .map_err(|_| LimelightError::Invalid(format!("lease ttl out of range: {ttl:?}")))
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockToken> {
        let ttl = lease_duration(ttl)?;
        let now = Utc::now();

        // The entry guard holds the shard lock, making replace-if-expired atomic.
        match self.leases.entry(resource.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired_at(now) {
                    let token = LockToken::new(resource, ttl, now);
                    debug!(resource = resource, holder = %token.holder, "Expired lease replaced");
                    occupied.insert(token.clone());
                    Ok(token)
                } else {
                    Err(LimelightError::Busy(resource.to_string()))
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let token = LockToken::new(resource, ttl, now);
                debug!(resource = resource, holder = %token.holder, "Lease acquired");
                vacant.insert(token.clone());
                Ok(token)
            }
        }
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        let removed = self
            .leases
            .remove_if(&token.resource, |_, lease| lease.holder == token.holder);

        match removed {
            Some(_) => {
                debug!(resource = %token.resource, holder = %token.holder, "Lease released");
                Ok(())
            }
            None => Err(LimelightError::NotHeld(token.resource.clone())),
        }
    }

    async fn renew(&self, token: &LockToken, ttl: Duration) -> Result<LockToken> {
        let ttl = lease_duration(ttl)?;
        let now = Utc::now();

        let mut entry = self
            .leases
            .get_mut(&token.resource)
            .ok_or_else(|| LimelightError::Expired(token.resource.clone()))?;

        // A different holder means the lease lapsed and was taken over.
        if entry.holder != token.holder || entry.is_expired_at(now) {
            return Err(LimelightError::Expired(token.resource.clone()));
        }

        entry.expires_at = now + ttl;
        debug!(resource = %token.resource, holder = %token.holder, "Lease renewed");
        Ok(entry.clone())
    }
}

// ============================================================================
// Background Sweep Task
// ============================================================================

/// Spawn a background task that periodically drops lapsed leases
pub fn spawn_lease_sweep_task(backend: Arc<MemoryLockBackend>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = backend.sweep_expired();
            if removed > 0 {
                debug!(removed = removed, tracked = backend.len(), "Lease sweep completed");
            }
        }
    });

    info!(
        interval_secs = interval.as_secs(),
        "Lease sweep task started"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let backend = MemoryLockBackend::new();
        let ttl = Duration::from_secs(5);

        let token = backend.acquire("art:1", ttl).await.unwrap();
        let err = backend.acquire("art:1", ttl).await.unwrap_err();
        assert!(matches!(err, LimelightError::Busy(_)));

        // A different resource is independent
        backend.acquire("art:2", ttl).await.unwrap();

        backend.release(&token).await.unwrap();
        backend.acquire("art:1", ttl).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_self_releases() {
        let backend = MemoryLockBackend::new();

        let stale = backend
            .acquire("art:1", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Holder never released; the next acquirer takes over
        let fresh = backend
            .acquire("art:1", Duration::from_secs(5))
            .await
            .unwrap();
        assert_ne!(stale.holder, fresh.holder);
    }

    #[tokio::test]
    async fn test_release_not_held() {
        let backend = MemoryLockBackend::new();

        let stale = backend
            .acquire("art:1", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _fresh = backend
            .acquire("art:1", Duration::from_secs(5))
            .await
            .unwrap();

        // The superseded token no longer owns the resource
        let err = backend.release(&stale).await.unwrap_err();
        assert!(matches!(err, LimelightError::NotHeld(_)));
    }

    #[tokio::test]
    async fn test_renew_extends_lease() {
        let backend = MemoryLockBackend::new();

        let token = backend
            .acquire("art:1", Duration::from_millis(40))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let renewed = backend
            .renew(&token, Duration::from_millis(40))
            .await
            .unwrap();
        assert!(renewed.expires_at > token.expires_at);
        assert_eq!(renewed.holder, token.holder);

        // Still held past the original expiry
        tokio::time::sleep(Duration::from_millis(30)).await;
        let err = backend
            .acquire("art:1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LimelightError::Busy(_)));
    }

    #[tokio::test]
    async fn test_renew_after_expiry_fails() {
        let backend = MemoryLockBackend::new();

        let token = backend
            .acquire("art:1", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = backend
            .renew(&token, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LimelightError::Expired(_)));
    }

    #[tokio::test]
    async fn test_renew_after_takeover_fails() {
        let backend = MemoryLockBackend::new();

        let stale = backend
            .acquire("art:1", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.acquire("art:1", Duration::from_secs(5)).await.unwrap();

        let err = backend
            .renew(&stale, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LimelightError::Expired(_)));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let backend = MemoryLockBackend::new();

        backend
            .acquire("art:1", Duration::from_millis(10))
            .await
            .unwrap();
        backend
            .acquire("art:2", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.sweep_expired(), 1);
        assert_eq!(backend.len(), 1);
    }
}
