//! Signal store port and in-memory implementation
//!
//! [`SignalStore`] is the narrow interface this crate consumes from the
//! persistence collaborator: read one signal row, apply an atomic counter
//! delta, seed a row at publish time, and scan recent publications for
//! ranked-list recomputes.
//!
//! [`MemorySignalStore`] backs tests and single-node deployments. Production
//! deployments implement the trait over the platform's artwork store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::model::{ArtworkSignal, CounterField, SignalSeed, DEFAULT_ENGAGEMENT_WEIGHT};
use crate::types::{LimelightError, Result};

/// Read/write access to per-artwork engagement signals
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Read one artwork's signal row. `NotFound` if absent.
    async fn read_signal(&self, artwork_id: &str) -> Result<ArtworkSignal>;

    /// Atomically adjust a counter and return the new value.
    ///
    /// `NotFound` if the artwork does not exist; `Invalid` if the delta would
    /// take the counter below zero. Never partially applies: concurrent deltas
    /// on the same artwork are commutative and lose no updates.
    async fn apply_delta(&self, artwork_id: &str, field: CounterField, delta: i64) -> Result<u64>;

    /// Create the signal row for a newly published artwork.
    ///
    /// `engagement_weight` defaults to 10 unless the seed overrides it; a zero
    /// override is rejected as `Invalid` because the score formula divides by
    /// it. `Invalid` if the id already exists, so re-publishing cannot reset
    /// counters.
    async fn init_signal(&self, seed: SignalSeed) -> Result<()>;

    /// Artworks published at or after `cutoff` (all artworks when `None`),
    /// most recent first, at most `limit` rows.
    async fn published_since(
        &self,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ArtworkSignal>>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// DashMap-backed signal store
#[derive(Default)]
pub struct MemorySignalStore {
    signals: DashMap<String, ArtworkSignal>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self {
            signals: DashMap::new(),
        }
    }

    /// Remove a signal row, mirroring an unpublish/delete in the outer CRUD layer.
    ///
    /// Returns true if a row was removed.
    pub fn remove(&self, artwork_id: &str) -> bool {
        self.signals.remove(artwork_id).is_some()
    }

    /// Number of stored signal rows
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn read_signal(&self, artwork_id: &str) -> Result<ArtworkSignal> {
        self.signals
            .get(artwork_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| LimelightError::NotFound(artwork_id.to_string()))
    }

    async fn apply_delta(&self, artwork_id: &str, field: CounterField, delta: i64) -> Result<u64> {
        // get_mut holds the shard lock for the whole read-modify-write, so the
        // increment is atomic with respect to concurrent deltas.
        let mut entry = self
            .signals
            .get_mut(artwork_id)
            .ok_or_else(|| LimelightError::NotFound(artwork_id.to_string()))?;

        let current = entry.counter(field);
        let updated = if delta >= 0 {
            current.saturating_add(delta as u64)
        } else {
            let decrement = delta.unsigned_abs();
            current.checked_sub(decrement).ok_or_else(|| {
                LimelightError::Invalid(format!(
                    "delta {delta} would underflow {field} ({current}) for {artwork_id}"
                ))
            })?
        };

        match field {
            CounterField::Likes => entry.like_count = updated,
            CounterField::Favorites => entry.favorite_count = updated,
            CounterField::Views => entry.view_count = updated,
        }

        debug!(artwork_id = artwork_id, field = %field, delta = delta, value = updated, "Counter delta applied");
        Ok(updated)
    }

    async fn init_signal(&self, seed: SignalSeed) -> Result<()> {
        if seed.engagement_weight == Some(0) {
            return Err(LimelightError::Invalid(format!(
                "engagement_weight must be positive for {}",
                seed.id
            )));
        }

        let signal = ArtworkSignal {
            id: seed.id.clone(),
            published_at: seed.published_at.unwrap_or_else(Utc::now),
            like_count: 0,
            favorite_count: 0,
            view_count: 0,
            engagement_weight: seed.engagement_weight.unwrap_or(DEFAULT_ENGAGEMENT_WEIGHT),
            width: seed.width,
            height: seed.height,
            prompt_length: seed.prompt_length,
            model: seed.model,
        };

        match self.signals.entry(seed.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(LimelightError::Invalid(format!(
                "signal already initialized for {}",
                seed.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                debug!(artwork_id = %seed.id, weight = signal.engagement_weight, "Signal initialized");
                vacant.insert(signal);
                Ok(())
            }
        }
    }

    async fn published_since(
        &self,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ArtworkSignal>> {
        let mut rows: Vec<ArtworkSignal> = self
            .signals
            .iter()
            .filter(|entry| match cutoff {
                Some(cutoff) => entry.published_at >= cutoff,
                None => true,
            })
            .map(|entry| entry.clone())
            .collect();

        rows.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
