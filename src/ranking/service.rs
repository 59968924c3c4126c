//! Ranking orchestration
//!
//! [`RankingService`] ties the engine together: reads serve ranked lists and
//! per-artwork state through the tiered cache, recomputing under a
//! per-resource lock on miss; write events apply counter deltas and purge the
//! cache entries they render stale.
//!
//! Read path per request:
//!
//! 1. Cache hit: respond.
//! 2. Miss: acquire the resource lock (`bucket:{kind}:{window}` for lists,
//!    `art:{id}` for artwork state).
//! 3. Acquired: recompute, populate, release, respond. Long recomputes renew
//!    the lease once past its midpoint.
//! 4. Busy: bounded jittered backoff, re-checking the cache before each
//!    retry since the holder usually populates it. Retries exhausted:
//!    recompute for this response alone, without populating, so herds
//!    collapse into one writer.
//! 5. Lock backend unreachable: recompute unsynchronized with a warning;
//!    duplicate work is accepted over unavailability.
//!
//! Every read carries a deadline. When it lapses mid-wait or mid-recompute
//! the service re-checks the cache one final time and serves that, else fails
//! fast with a retryable error. A wrong score is never silently returned:
//! store errors propagate, they are not papered over with stale data.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::{keys, CacheBackend, Invalidator, TieredCache};
use crate::config::RankingConfig;
use crate::lock::{LockBackend, LockToken};
use crate::scoring::{Category, HotnessScorer};
use crate::signal::{CounterField, SignalStore, WriteEvent};
use crate::types::{LimelightError, ListKind, Result, TimeWindow};

// ============================================================================
// Queries & Responses
// ============================================================================

/// Parameters of a ranked-list read
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub kind: ListKind,
    pub window: TimeWindow,
    /// Maximum entries returned
    pub limit: usize,
    /// Restrict to artworks generated by one model
    pub model: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            kind: ListKind::Trending,
            window: TimeWindow::Day,
            limit: 50,
            model: None,
        }
    }
}

/// One artwork's position in a ranked list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub artwork_id: String,
    pub score: f64,
    pub category: Category,
}

/// A computed ranked list, ordered by descending score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedList {
    pub kind: ListKind,
    pub window: TimeWindow,
    pub entries: Vec<RankedEntry>,
    pub computed_at: DateTime<Utc>,
}

/// One artwork's score, category, and counters at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkState {
    pub artwork_id: String,
    pub score: f64,
    pub category: Category,
    pub like_count: u64,
    pub favorite_count: u64,
    pub view_count: u64,
    pub computed_at: DateTime<Utc>,
}

/// Counter snapshot for observability
#[derive(Debug, Clone, Default)]
pub struct RankingStats {
    /// Reads served from either cache tier
    pub cache_hits: u64,
    /// Recomputations (locked or contended)
    pub recomputes: u64,
    /// Recomputations without lock coverage (lock backend unreachable)
    pub degraded_recomputes: u64,
    /// Lock acquisition attempts that found the resource held
    pub contention_waits: u64,
    /// Lapsed deadlines resolved by a final cached value
    pub deadline_fallbacks: u64,
    /// Cache purge targets that failed (entry expires by TTL instead)
    pub invalidation_failures: u64,
}

// ============================================================================
// Service
// ============================================================================

/// What a cache miss recomputes
enum ReadTarget<'a> {
    List(&'a ListQuery),
    Artwork(&'a str),
}

impl ReadTarget<'_> {
    fn cache_key(&self) -> String {
        match self {
            ReadTarget::List(query) => keys::ranked_list(
                query.kind,
                query.window,
                query.limit,
                query.model.as_deref(),
            ),
            ReadTarget::Artwork(artwork_id) => keys::artwork_state(artwork_id),
        }
    }

    /// Lock scope: per ranking bucket for lists, per artwork for state
    fn lock_resource(&self) -> String {
        match self {
            ReadTarget::List(query) => {
                format!("bucket:{}:{}", query.kind.as_str(), query.window.as_str())
            }
            ReadTarget::Artwork(artwork_id) => format!("art:{artwork_id}"),
        }
    }
}

/// Outcome of trying to become the recompute writer for a resource
enum AcquireOutcome {
    /// This request holds the lock and recomputes
    Acquired(LockToken),
    /// The lock holder populated the cache while this request waited
    CacheFilled(Bytes),
    /// Retries exhausted while the resource stayed held
    Contended,
    /// Lock backend unreachable
    Degraded,
    /// The read deadline lapsed during the wait
    DeadlineLapsed,
}

/// Orchestrates ranked reads and write events over the store, lock, and cache
pub struct RankingService {
    store: Arc<dyn SignalStore>,
    lock: Arc<dyn LockBackend>,
    cache: Arc<TieredCache>,
    invalidator: Invalidator,
    scorer: HotnessScorer,
    config: RankingConfig,

    cache_hits: AtomicU64,
    recomputes: AtomicU64,
    degraded_recomputes: AtomicU64,
    contention_waits: AtomicU64,
    deadline_fallbacks: AtomicU64,
}

impl RankingService {
    pub fn new(
        store: Arc<dyn SignalStore>,
        lock: Arc<dyn LockBackend>,
        cache_backend: Arc<dyn CacheBackend>,
        config: RankingConfig,
    ) -> Self {
        let cache = Arc::new(TieredCache::new(cache_backend, config.cache.clone()));
        let invalidator = Invalidator::new(cache.clone());
        let scorer = HotnessScorer::new(config.score.clone());

        info!(
            scan_limit = config.scan_limit,
            read_deadline_ms = config.read_deadline.as_millis() as u64,
            lease_ttl_secs = config.lock.lease_ttl.as_secs(),
            "RankingService initialized"
        );

        Self {
            store,
            lock,
            cache,
            invalidator,
            scorer,
            config,
            cache_hits: AtomicU64::new(0),
            recomputes: AtomicU64::new(0),
            degraded_recomputes: AtomicU64::new(0),
            contention_waits: AtomicU64::new(0),
            deadline_fallbacks: AtomicU64::new(0),
        }
    }

    /// The tiered cache behind this service.
    ///
    /// The surrounding layer caches its own entries (feed pages, per-user
    /// lists) through the same instance so invalidation coverage holds.
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Serve a ranked list, recomputing under the bucket lock on cache miss.
    pub async fn get_ranked_list(&self, query: &ListQuery) -> Result<RankedList> {
        let bytes = self.fetch(&ReadTarget::List(query)).await?;
        decode(&bytes)
    }

    /// Serve one artwork's score, category, and counters.
    pub async fn get_artwork_state(&self, artwork_id: &str) -> Result<ArtworkState> {
        let bytes = self.fetch(&ReadTarget::Artwork(artwork_id)).await?;
        decode(&bytes)
    }

    /// Per-read state machine shared by both read endpoints.
    async fn fetch(&self, target: &ReadTarget<'_>) -> Result<Bytes> {
        let key = target.cache_key();
        let deadline = Instant::now() + self.config.read_deadline;

        if let Some(bytes) = self.cache.get(&key).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }

        let resource = target.lock_resource();
        match self.acquire_or_wait(&resource, &key, deadline).await? {
            AcquireOutcome::CacheFilled(bytes) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                Ok(bytes)
            }
            AcquireOutcome::Acquired(token) => {
                let computed = self.recompute_holding(&token, target, deadline).await;
                if let Ok(Some(bytes)) = &computed {
                    self.cache
                        .set(&key, bytes.clone(), self.entry_ttl(target))
                        .await;
                }
                if let Err(e) = self.lock.release(&token).await {
                    debug!(resource = %token.resource, error = %e, "Lock release failed, lease may have lapsed");
                }
                match computed {
                    Ok(Some(bytes)) => {
                        self.recomputes.fetch_add(1, Ordering::Relaxed);
                        debug!(resource = resource, "Recomputed under lock");
                        Ok(bytes)
                    }
                    Ok(None) => self.deadline_fallback(&key).await,
                    Err(e) => Err(e),
                }
            }
            AcquireOutcome::Contended => {
                // The holder populates the cache; this response is computed
                // privately so waiting herds never amplify writes.
                match self.recompute_bounded(target, deadline).await? {
                    Some(bytes) => {
                        self.recomputes.fetch_add(1, Ordering::Relaxed);
                        debug!(resource = resource, "Recomputed without populating (contended)");
                        Ok(bytes)
                    }
                    None => self.deadline_fallback(&key).await,
                }
            }
            AcquireOutcome::Degraded => {
                warn!(
                    resource = resource,
                    "Lock backend unavailable, recomputing unsynchronized"
                );
                match self.recompute_bounded(target, deadline).await? {
                    Some(bytes) => {
                        self.cache
                            .set(&key, bytes.clone(), self.entry_ttl(target))
                            .await;
                        self.degraded_recomputes.fetch_add(1, Ordering::Relaxed);
                        Ok(bytes)
                    }
                    None => self.deadline_fallback(&key).await,
                }
            }
            AcquireOutcome::DeadlineLapsed => self.deadline_fallback(&key).await,
        }
    }

    /// Try to become the recompute writer, backing off while the resource is
    /// held and re-checking the cache between attempts.
    async fn acquire_or_wait(
        &self,
        resource: &str,
        key: &str,
        deadline: Instant,
    ) -> Result<AcquireOutcome> {
        let lock_config = &self.config.lock;
        let mut attempt: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                return Ok(AcquireOutcome::DeadlineLapsed);
            }

            match self.lock.acquire(resource, lock_config.lease_ttl).await {
                Ok(token) => return Ok(AcquireOutcome::Acquired(token)),
                Err(LimelightError::Busy(_)) => {
                    self.contention_waits.fetch_add(1, Ordering::Relaxed);
                    if attempt >= lock_config.acquire_retries {
                        return Ok(AcquireOutcome::Contended);
                    }

                    let delay = backoff_delay(lock_config.retry_base_delay, attempt);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    tokio::time::sleep(delay.min(remaining)).await;

                    // The holder usually finishes during the wait
                    if let Some(bytes) = self.cache.get(key).await {
                        return Ok(AcquireOutcome::CacheFilled(bytes));
                    }
                    attempt += 1;
                }
                Err(LimelightError::Unavailable(_)) => return Ok(AcquireOutcome::Degraded),
                Err(e) => return Err(e),
            }
        }
    }

    /// Recompute while holding the lock, renewing the lease once past its
    /// midpoint. `Ok(None)` when the read deadline lapses first.
    async fn recompute_holding(
        &self,
        token: &LockToken,
        target: &ReadTarget<'_>,
        deadline: Instant,
    ) -> Result<Option<Bytes>> {
        let lease_ttl = self.config.lock.lease_ttl;
        let remaining = deadline.saturating_duration_since(Instant::now());

        let work = async {
            let fut = self.recompute_serialized(target);
            tokio::pin!(fut);
            let mut renewed = false;
            loop {
                tokio::select! {
                    result = &mut fut => break result,
                    _ = tokio::time::sleep(lease_ttl / 2), if !renewed => {
                        renewed = true;
                        match self.lock.renew(token, lease_ttl).await {
                            Ok(_) => debug!(resource = %token.resource, "Lease renewed during recompute"),
                            Err(e) => {
                                warn!(resource = %token.resource, error = %e, "Lease renewal failed, recompute continues")
                            }
                        }
                    }
                }
            }
        };

        match tokio::time::timeout(remaining, work).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Recompute bounded by the read deadline; `Ok(None)` when it lapses.
    async fn recompute_bounded(
        &self,
        target: &ReadTarget<'_>,
        deadline: Instant,
    ) -> Result<Option<Bytes>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, self.recompute_serialized(target)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Last resort after a lapsed deadline: serve whatever the cache holds,
    /// else fail fast with a retryable error.
    async fn deadline_fallback(&self, key: &str) -> Result<Bytes> {
        if let Some(bytes) = self.cache.get(key).await {
            self.deadline_fallbacks.fetch_add(1, Ordering::Relaxed);
            debug!(key = key, "Deadline lapsed, serving cached entry");
            return Ok(bytes);
        }
        Err(LimelightError::Unavailable(
            "read deadline exceeded".to_string(),
        ))
    }

    async fn recompute_serialized(&self, target: &ReadTarget<'_>) -> Result<Bytes> {
        match target {
            ReadTarget::List(query) => encode(&self.recompute_list(query).await?),
            ReadTarget::Artwork(artwork_id) => encode(&self.recompute_artwork(artwork_id).await?),
        }
    }

    /// Score the candidate set and assemble a ranked list.
    async fn recompute_list(&self, query: &ListQuery) -> Result<RankedList> {
        let now = Utc::now();
        let cutoff = query.window.cutoff(now);
        let signals = self
            .store
            .published_since(cutoff, self.config.scan_limit)
            .await?;

        let floor = min_category(query.kind);
        let mut entries = Vec::new();
        for signal in &signals {
            if let Some(model) = &query.model {
                if &signal.model != model {
                    continue;
                }
            }
            let scored = self.scorer.score(signal, now);
            if scored.category < floor {
                continue;
            }
            entries.push(RankedEntry {
                artwork_id: signal.id.clone(),
                score: scored.score,
                category: scored.category,
            });
        }

        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(query.limit);

        debug!(
            kind = %query.kind,
            window = %query.window,
            candidates = signals.len(),
            entries = entries.len(),
            "Ranked list recomputed"
        );

        Ok(RankedList {
            kind: query.kind,
            window: query.window,
            entries,
            computed_at: now,
        })
    }

    async fn recompute_artwork(&self, artwork_id: &str) -> Result<ArtworkState> {
        let signal = self.store.read_signal(artwork_id).await?;
        let scored = self.scorer.score(&signal, Utc::now());
        Ok(ArtworkState {
            artwork_id: signal.id,
            score: scored.score,
            category: scored.category,
            like_count: signal.like_count,
            favorite_count: signal.favorite_count,
            view_count: signal.view_count,
            computed_at: scored.computed_at,
        })
    }

    fn entry_ttl(&self, target: &ReadTarget<'_>) -> Duration {
        match target {
            ReadTarget::List(_) => self.config.cache.list_ttl,
            ReadTarget::Artwork(_) => self.config.cache.artwork_ttl,
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Apply a write event: counter delta or seed first, then best-effort
    /// cache invalidation.
    ///
    /// Store errors propagate; a failed purge never fails the write (the
    /// stale entries expire by TTL and the failure is counted).
    pub async fn on_write_event(&self, event: &WriteEvent) -> Result<()> {
        let category = match event {
            WriteEvent::Like { artwork_id } => {
                self.store
                    .apply_delta(artwork_id, CounterField::Likes, 1)
                    .await?;
                self.category_of(artwork_id).await
            }
            WriteEvent::Unlike { artwork_id } => {
                self.store
                    .apply_delta(artwork_id, CounterField::Likes, -1)
                    .await?;
                self.category_of(artwork_id).await
            }
            WriteEvent::Favorite { artwork_id, .. } => {
                self.store
                    .apply_delta(artwork_id, CounterField::Favorites, 1)
                    .await?;
                None
            }
            WriteEvent::Unfavorite { artwork_id, .. } => {
                self.store
                    .apply_delta(artwork_id, CounterField::Favorites, -1)
                    .await?;
                None
            }
            WriteEvent::View { artwork_id } => {
                self.store
                    .apply_delta(artwork_id, CounterField::Views, 1)
                    .await?;
                None
            }
            WriteEvent::Publish { seed, .. } => {
                self.store.init_signal(seed.clone()).await?;
                None
            }
            // Row removal is the persistence collaborator's CRUD; this layer
            // owns the purge coverage.
            WriteEvent::Unpublish { .. } => None,
        };

        self.invalidator.apply(event, category).await;
        debug!(
            event = event.kind(),
            artwork_id = event.artwork_id(),
            "Write event applied"
        );
        Ok(())
    }

    /// Current category for kind-specific list invalidation. Best-effort: an
    /// unreadable signal widens nothing.
    async fn category_of(&self, artwork_id: &str) -> Option<Category> {
        match self.store.read_signal(artwork_id).await {
            Ok(signal) => Some(self.scorer.score(&signal, Utc::now()).category),
            Err(e) => {
                debug!(artwork_id = artwork_id, error = %e, "Category lookup failed, purging category-agnostic targets only");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    pub fn stats(&self) -> RankingStats {
        RankingStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            degraded_recomputes: self.degraded_recomputes.load(Ordering::Relaxed),
            contention_waits: self.contention_waits.load(Ordering::Relaxed),
            deadline_fallbacks: self.deadline_fallbacks.load(Ordering::Relaxed),
            invalidation_failures: self.invalidator.failure_count(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Lowest category a list kind admits
fn min_category(kind: ListKind) -> Category {
    match kind {
        ListKind::Trending => Category::Normal,
        ListKind::Rising => Category::Rising,
        ListKind::Hot => Category::Hot,
        ListKind::Viral => Category::Viral,
    }
}

/// Exponential backoff with full jitter on top
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(6));
    let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64).max(1));
    exp + Duration::from_millis(jitter_ms)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| LimelightError::Invalid(format!("Failed to encode cache entry: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LimelightError::Invalid(format!("Failed to decode cache entry: {e}")))
}
