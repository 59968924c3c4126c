//! Hotness score computation
//!
//! Pure and deterministic: one [`ArtworkSignal`] snapshot plus a clock reading
//! in, one [`HotnessScore`] out. No I/O, so the ranking service can recompute
//! a score wherever it holds a fresh signal.
//!
//! Formula shape (engagement-weighted, time-decayed):
//!
//! ```text
//! raw     = likes*W_like + favorites*W_fav + views*W_view
//! quality = 0.5 + 0.5*resolution + 0.3*prompt + 0.2*model     clamped to [0.5, 1.5]
//! decay   = 1 / (1 + age_hours / half_life)
//! score   = raw * quality * decay / max(engagement_weight, min_weight)
//! ```
//!
//! The divisor floor guards the documented division-by-zero failure: a signal
//! row whose engagement weight was persisted as zero or never set still
//! produces a finite score. Age clamps at zero so clock skew or a future-dated
//! publish cannot flip the decay negative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ScoreConfig;
use crate::signal::ArtworkSignal;

/// Megapixel count at which the resolution component of quality saturates
const RESOLUTION_CAP_PIXELS: f64 = 1_048_576.0;

/// Prompt length at which the prompt component of quality saturates
const PROMPT_CAP_CHARS: f64 = 200.0;

/// Category an artwork's score places it in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Normal,
    Rising,
    Hot,
    Viral,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Normal => "normal",
            Category::Rising => "rising",
            Category::Hot => "hot",
            Category::Viral => "viral",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived hotness for one artwork at one instant.
///
/// Never ground truth: always recomputable from the signal row, cached only
/// with a staleness bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotnessScore {
    pub artwork_id: String,
    pub score: f64,
    pub computed_at: DateTime<Utc>,
    pub category: Category,
}

// ============================================================================
// Scorer
// ============================================================================

/// Computes hotness scores under a [`ScoreConfig`]
#[derive(Debug, Clone)]
pub struct HotnessScorer {
    config: ScoreConfig,
}

impl HotnessScorer {
    pub fn new(config: ScoreConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScoreConfig::default())
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// Score one signal snapshot at `now`.
    pub fn score(&self, signal: &ArtworkSignal, now: DateTime<Utc>) -> HotnessScore {
        let raw_engagement = signal.like_count as f64 * self.config.like_weight
            + signal.favorite_count as f64 * self.config.favorite_weight
            + signal.view_count as f64 * self.config.view_weight;

        let quality = self.quality_factor(signal);
        let decay = self.decay_factor(signal.published_at, now);

        // The floor keeps a zero or unset weight out of the divisor.
        let divisor = (signal.engagement_weight as f64).max(self.config.min_engagement_weight);

        let score = raw_engagement * quality * decay / divisor;

        trace!(
            artwork_id = %signal.id,
            raw = raw_engagement,
            quality = quality,
            decay = decay,
            score = score,
            "Hotness computed"
        );

        HotnessScore {
            artwork_id: signal.id.clone(),
            score,
            computed_at: now,
            category: self.categorize(score),
        }
    }

    /// Map a score onto its category via the configured thresholds.
    pub fn categorize(&self, score: f64) -> Category {
        if score >= self.config.viral_threshold {
            Category::Viral
        } else if score >= self.config.hot_threshold {
            Category::Hot
        } else if score >= self.config.rising_threshold {
            Category::Rising
        } else {
            Category::Normal
        }
    }

    /// Quality multiplier in [0.5, 1.5].
    ///
    /// Resolution saturates at one megapixel, prompt length at 200 characters;
    /// featured generator models earn a fixed bonus. The clamp keeps degenerate
    /// artworks (zero dimensions, empty prompt) finite and non-negative.
    fn quality_factor(&self, signal: &ArtworkSignal) -> f64 {
        let pixels = signal.width as f64 * signal.height as f64;
        let resolution = (pixels / RESOLUTION_CAP_PIXELS).min(1.0);
        let prompt = (signal.prompt_length as f64 / PROMPT_CAP_CHARS).min(1.0);
        let model = if self.config.featured_models.iter().any(|m| m == &signal.model) {
            1.0
        } else {
            0.0
        };

        (0.5 + 0.5 * resolution + 0.3 * prompt + 0.2 * model).clamp(0.5, 1.5)
    }

    /// Time decay in (0, 1]. Age clamps at zero for future-dated publishes.
    fn decay_factor(&self, published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_ms = (now - published_at).num_milliseconds();
        let age_hours = (age_ms as f64 / 3_600_000.0).max(0.0);
        1.0 / (1.0 + age_hours / self.config.half_life_hours)
    }
}

impl Default for HotnessScorer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
