//! Hotness scoring
//!
//! Pure computation of decayed engagement scores and their categories.

pub mod hotness;

pub use hotness::{Category, HotnessScore, HotnessScorer};
