//! Tiered caching and invalidation
//!
//! Provides:
//! - [`keys`] - the cache key grammar, one builder per endpoint
//! - [`CacheBackend`] - the shared-tier port ([`MemoryCacheBackend`] provided)
//! - [`TieredCache`] - edge tier in front of the shared tier, read-through
//! - [`Invalidator`] - event-driven purge executor with a failure counter

pub mod backend;
pub mod invalidation;
pub mod keys;
pub mod tiered;

pub use backend::{CacheBackend, MemoryCacheBackend};
pub use invalidation::{purge_targets, Invalidator, PurgeTarget};
pub use tiered::{
    spawn_cache_cleanup_task, CacheStats, EdgeTierStats, SharedTierStats, TieredCache,
};
