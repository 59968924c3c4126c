//! Engagement signals and their store
//!
//! Provides:
//! - [`ArtworkSignal`] - per-artwork counters and quality inputs
//! - [`WriteEvent`] - state-changing events from the API layer
//! - [`SignalStore`] - the port to the persistence collaborator
//! - [`MemorySignalStore`] - DashMap implementation for tests and single-node use

pub mod model;
pub mod store;

pub use model::{ArtworkSignal, CounterField, SignalSeed, WriteEvent, DEFAULT_ENGAGEMENT_WEIGHT};
pub use store::{MemorySignalStore, SignalStore};
