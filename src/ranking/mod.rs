//! Ranked read and write-event orchestration
//!
//! Provides:
//! - [`RankingService`] - cache-or-recompute-under-lock reads, delta-then-purge writes
//! - [`ListQuery`] / [`RankedList`] / [`ArtworkState`] - request and response types
//! - [`RankingStats`] - counter snapshot for observability

pub mod service;

pub use service::{ArtworkState, ListQuery, RankedEntry, RankedList, RankingService, RankingStats};
