//! Event-driven cache invalidation
//!
//! [`purge_targets`] is the pure mapping from a write event to the cache
//! entries it renders stale; [`Invalidator`] executes those targets against
//! the [`TieredCache`] best-effort. Purges never fail the originating write:
//! a shared-tier failure is logged, counted, and left to TTL expiry, so the
//! worst case after a mutating event is one stale TTL window.
//!
//! Target map:
//!
//! | event | purged |
//! |---|---|
//! | like/unlike | artwork state; feed pages; trending lists; the artwork's category lists |
//! | favorite/unfavorite | artwork state; the acting user's favorites list |
//! | publish | feed pages; the publishing user's artworks list |
//! | unpublish | artwork state; feed pages; all ranked lists; the owner's artworks list |
//! | view | nothing (TTL alone bounds view-count staleness) |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::keys;
use super::tiered::TieredCache;
use crate::scoring::Category;
use crate::signal::WriteEvent;
use crate::types::ListKind;

/// One cache entry or entry family to drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeTarget {
    /// Exact key
    Key(String),
    /// Every key under a prefix
    Prefix(String),
}

/// The ranked list a category feeds, if any
fn category_list(category: Category) -> Option<ListKind> {
    match category {
        Category::Viral => Some(ListKind::Viral),
        Category::Hot => Some(ListKind::Hot),
        Category::Rising => Some(ListKind::Rising),
        Category::Normal => None,
    }
}

/// Map a write event to the cache entries it invalidates.
///
/// `category` is the artwork's category where the caller knows it (score
/// events); `None` widens nothing, since only the kind-specific list purge
/// depends on it.
pub fn purge_targets(event: &WriteEvent, category: Option<Category>) -> Vec<PurgeTarget> {
    match event {
        WriteEvent::Like { artwork_id } | WriteEvent::Unlike { artwork_id } => {
            let mut targets = vec![
                PurgeTarget::Key(keys::artwork_state(artwork_id)),
                PurgeTarget::Prefix(keys::FEED_PREFIX.to_string()),
                PurgeTarget::Prefix(keys::list_prefix(ListKind::Trending)),
            ];
            if let Some(kind) = category.and_then(category_list) {
                targets.push(PurgeTarget::Prefix(keys::list_prefix(kind)));
            }
            targets
        }
        WriteEvent::Favorite {
            artwork_id,
            user_id,
        }
        | WriteEvent::Unfavorite {
            artwork_id,
            user_id,
        } => vec![
            PurgeTarget::Key(keys::artwork_state(artwork_id)),
            PurgeTarget::Key(keys::user_favorites(user_id)),
        ],
        WriteEvent::View { .. } => Vec::new(),
        WriteEvent::Publish { user_id, .. } => vec![
            PurgeTarget::Prefix(keys::FEED_PREFIX.to_string()),
            PurgeTarget::Key(keys::user_artworks(user_id)),
        ],
        WriteEvent::Unpublish {
            artwork_id,
            user_id,
        } => vec![
            PurgeTarget::Key(keys::artwork_state(artwork_id)),
            PurgeTarget::Prefix(keys::FEED_PREFIX.to_string()),
            PurgeTarget::Prefix(keys::LIST_PREFIX.to_string()),
            PurgeTarget::Key(keys::user_artworks(user_id)),
        ],
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Best-effort purge executor with a failure counter
pub struct Invalidator {
    cache: Arc<TieredCache>,
    failures: AtomicU64,
}

impl Invalidator {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self {
            cache,
            failures: AtomicU64::new(0),
        }
    }

    /// Purge everything a write event renders stale.
    ///
    /// Targets run concurrently; shared-tier failures are counted and logged
    /// but never surfaced (edge copies are gone either way, and TTL bounds
    /// the shared-tier staleness).
    pub async fn apply(&self, event: &WriteEvent, category: Option<Category>) {
        let targets = purge_targets(event, category);
        if targets.is_empty() {
            return;
        }

        let results = futures::future::join_all(targets.iter().map(|target| async move {
            match target {
                PurgeTarget::Key(key) => self.cache.delete(key).await.map(|_| ()),
                PurgeTarget::Prefix(prefix) => {
                    self.cache.delete_prefix(prefix).await.map(|_| ())
                }
            }
        }))
        .await;

        let mut failed = 0u64;
        for (target, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                warn!(
                    event = event.kind(),
                    target = ?target,
                    error = %e,
                    "Cache purge failed, entry expires by TTL"
                );
            }
        }

        if failed > 0 {
            self.failures.fetch_add(failed, Ordering::Relaxed);
        } else {
            debug!(
                event = event.kind(),
                artwork_id = event.artwork_id(),
                targets = targets.len(),
                "Cache invalidated"
            );
        }
    }

    /// Total purge-target failures since construction
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{CacheBackend, MemoryCacheBackend};
    use crate::config::CacheTierConfig;
    use crate::types::{LimelightError, Result, TimeWindow};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;

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

    fn like(id: &str) -> WriteEvent {
        WriteEvent::Like {
            artwork_id: id.into(),
        }
    }

    #[test]
    fn test_like_targets_follow_category() {
        let normal = purge_targets(&like("a1"), Some(Category::Normal));
        assert_eq!(
            normal,
            vec![
                PurgeTarget::Key("art:a1".into()),
                PurgeTarget::Prefix("feed:".into()),
                PurgeTarget::Prefix("list:trending:".into()),
            ]
        );

        let hot = purge_targets(&like("a1"), Some(Category::Hot));
        assert!(hot.contains(&PurgeTarget::Prefix("list:hot:".into())));
        assert!(!hot.contains(&PurgeTarget::Prefix("list:rising:".into())));

        // Unknown category purges no kind-specific list
        let unknown = purge_targets(&like("a1"), None);
        assert_eq!(unknown.len(), 3);
    }

    #[test]
    fn test_favorite_targets_scoped_to_artwork_and_user() {
        let event = WriteEvent::Favorite {
            artwork_id: "a1".into(),
            user_id: "u9".into(),
        };
        assert_eq!(
            purge_targets(&event, None),
            vec![
                PurgeTarget::Key("art:a1".into()),
                PurgeTarget::Key("user:u9:favorites".into()),
            ]
        );
    }

    #[test]
    fn test_view_purges_nothing() {
        assert!(purge_targets(
            &WriteEvent::View {
                artwork_id: "a1".into()
            },
            Some(Category::Viral)
        )
        .is_empty());
    }

    #[test]
    fn test_unpublish_covers_all_lists() {
        let event = WriteEvent::Unpublish {
            artwork_id: "a1".into(),
            user_id: "u9".into(),
        };
        let targets = purge_targets(&event, None);
        assert!(targets.contains(&PurgeTarget::Prefix("list:".into())));
        assert!(targets.contains(&PurgeTarget::Prefix("feed:".into())));
        assert!(targets.contains(&PurgeTarget::Key("art:a1".into())));
        assert!(targets.contains(&PurgeTarget::Key("user:u9:artworks".into())));
    }

    #[tokio::test]
    async fn test_apply_purges_targets_and_spares_the_rest() {
        let cache = Arc::new(TieredCache::new(
            Arc::new(MemoryCacheBackend::new()),
            CacheTierConfig::default(),
        ));
        let invalidator = Invalidator::new(cache.clone());
        let ttl = Duration::from_secs(60);

        cache
            .set(&keys::artwork_state("a1"), Bytes::from_static(b"x"), ttl)
            .await;
        cache
            .set(&keys::artwork_state("a2"), Bytes::from_static(b"y"), ttl)
            .await;
        cache
            .set(&keys::user_favorites("u9"), Bytes::from_static(b"f"), ttl)
            .await;
        cache
            .set(
                &keys::ranked_list(ListKind::Trending, TimeWindow::Day, 50, None),
                Bytes::from_static(b"l"),
                ttl,
            )
            .await;

        let event = WriteEvent::Favorite {
            artwork_id: "a1".into(),
            user_id: "u9".into(),
        };
        invalidator.apply(&event, None).await;

        assert!(cache.get(&keys::artwork_state("a1")).await.is_none());
        assert!(cache.get(&keys::user_favorites("u9")).await.is_none());
        // Unrelated artwork and list survive a favorite
        assert!(cache.get(&keys::artwork_state("a2")).await.is_some());
        assert!(cache
            .get(&keys::ranked_list(ListKind::Trending, TimeWindow::Day, 50, None))
            .await
            .is_some());
        assert_eq!(invalidator.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_counts_failures_without_surfacing() {
        let cache = Arc::new(TieredCache::new(
            Arc::new(UnreachableBackend),
            CacheTierConfig::default(),
        ));
        let invalidator = Invalidator::new(cache);

        invalidator
            .apply(&like("a1"), Some(Category::Normal))
            .await;

        // Three targets, three backend failures, no panic and no error
        assert_eq!(invalidator.failure_count(), 3);
    }
}
