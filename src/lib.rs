//! Limelight - hotness ranking and cache consistency for the Atelier feed
//!
//! Limelight computes a decayed hotness score per artwork from engagement
//! signals and serves ranked lists (trending/hot/rising/viral) through
//! tiered caches kept coherent under concurrent score updates.
//!
//! ## Modules
//!
//! - **Scoring**: the hotness formula - weighted engagement, quality factor,
//!   time decay, category thresholds
//! - **Signal**: per-artwork counters behind an atomic-delta store port
//! - **Lock**: TTL-leased locks bounding recompute concurrency per resource
//! - **Cache**: edge + shared tiers, key grammar, event-driven invalidation
//! - **Ranking**: the orchestrator - cache-or-recompute-under-lock reads,
//!   delta-then-purge writes
//!
//! Derived state is disposable: every cached score and list is recomputable
//! from the signal rows, so cache loss degrades latency, never correctness.

pub mod cache;
pub mod config;
pub mod lock;
pub mod ranking;
pub mod scoring;
pub mod signal;
pub mod types;

pub use config::RankingConfig;
pub use ranking::{ArtworkState, ListQuery, RankedList, RankingService, RankingStats};
pub use types::{LimelightError, ListKind, Result, TimeWindow};
