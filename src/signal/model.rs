//! Engagement signal model
//!
//! [`ArtworkSignal`] is the per-artwork row the score formula reads: raw
//! engagement counters plus the quality inputs captured at publish time. Rows
//! are owned by the persistence collaborator; this crate reads them and
//! applies atomic counter deltas through [`SignalStore`](super::SignalStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default engagement weight applied when a seed leaves it unset.
///
/// The score formula divides by this field, so it must never be zero; the
/// store rejects explicit zero overrides as `Invalid`.
pub const DEFAULT_ENGAGEMENT_WEIGHT: u32 = 10;

/// Engagement signals and quality inputs for one artwork
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkSignal {
    /// Artwork identifier
    pub id: String,
    /// When the artwork was published
    pub published_at: DateTime<Utc>,
    /// Like counter
    pub like_count: u64,
    /// Favorite counter
    pub favorite_count: u64,
    /// View counter
    pub view_count: u64,
    /// Normalization divisor for the score formula; never zero
    pub engagement_weight: u32,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Length of the generation prompt in characters
    pub prompt_length: u32,
    /// Generator model name (e.g. "flux-dev")
    pub model: String,
}

impl ArtworkSignal {
    /// Read the named counter
    pub fn counter(&self, field: CounterField) -> u64 {
        match field {
            CounterField::Likes => self.like_count,
            CounterField::Favorites => self.favorite_count,
            CounterField::Views => self.view_count,
        }
    }
}

/// Counter fields addressable by [`SignalStore::apply_delta`](super::SignalStore::apply_delta)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterField {
    Likes,
    Favorites,
    Views,
}

impl CounterField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterField::Likes => "likes",
            CounterField::Favorites => "favorites",
            CounterField::Views => "views",
        }
    }
}

impl std::fmt::Display for CounterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seed for initializing an artwork's signal row at publish time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSeed {
    pub id: String,
    /// Publication timestamp; defaults to now when omitted
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Override for the engagement weight; a zero override is rejected
    #[serde(default)]
    pub engagement_weight: Option<u32>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub prompt_length: u32,
    #[serde(default)]
    pub model: String,
}

impl SignalSeed {
    /// Minimal seed with defaults for everything but the id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            published_at: None,
            engagement_weight: None,
            width: 0,
            height: 0,
            prompt_length: 0,
            model: String::new(),
        }
    }
}

// ============================================================================
// Write Events
// ============================================================================

/// State-changing events delivered by the surrounding API layer.
///
/// Each event maps to one counter delta or seed operation on the store plus a
/// set of cache purge targets (see [`cache::invalidation`](crate::cache::invalidation)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteEvent {
    Like {
        artwork_id: String,
    },
    Unlike {
        artwork_id: String,
    },
    Favorite {
        artwork_id: String,
        user_id: String,
    },
    Unfavorite {
        artwork_id: String,
        user_id: String,
    },
    View {
        artwork_id: String,
    },
    Publish {
        seed: SignalSeed,
        user_id: String,
    },
    Unpublish {
        artwork_id: String,
        user_id: String,
    },
}

impl WriteEvent {
    /// The artwork the event concerns
    pub fn artwork_id(&self) -> &str {
        match self {
            WriteEvent::Like { artwork_id }
            | WriteEvent::Unlike { artwork_id }
            | WriteEvent::Favorite { artwork_id, .. }
            | WriteEvent::Unfavorite { artwork_id, .. }
            | WriteEvent::View { artwork_id }
            | WriteEvent::Unpublish { artwork_id, .. } => artwork_id,
            WriteEvent::Publish { seed, .. } => &seed.id,
        }
    }

    /// Short event name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WriteEvent::Like { .. } => "like",
            WriteEvent::Unlike { .. } => "unlike",
            WriteEvent::Favorite { .. } => "favorite",
            WriteEvent::Unfavorite { .. } => "unfavorite",
            WriteEvent::View { .. } => "view",
            WriteEvent::Publish { .. } => "publish",
            WriteEvent::Unpublish { .. } => "unpublish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_artwork_id() {
        let like = WriteEvent::Like {
            artwork_id: "art-1".into(),
        };
        assert_eq!(like.artwork_id(), "art-1");
        assert_eq!(like.kind(), "like");

        let publish = WriteEvent::Publish {
            seed: SignalSeed::new("art-2"),
            user_id: "user-9".into(),
        };
        assert_eq!(publish.artwork_id(), "art-2");
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = WriteEvent::Favorite {
            artwork_id: "art-1".into(),
            user_id: "user-2".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "favorite");
        assert_eq!(json["artwork_id"], "art-1");
    }

    #[test]
    fn test_seed_defaults_deserialize() {
        let seed: SignalSeed = serde_json::from_str(r#"{"id":"art-3"}"#).unwrap();
        assert_eq!(seed.id, "art-3");
        assert!(seed.engagement_weight.is_none());
        assert_eq!(seed.width, 0);
    }

    #[test]
    fn test_counter_lookup() {
        let signal = ArtworkSignal {
            id: "art-1".into(),
            published_at: Utc::now(),
            like_count: 3,
            favorite_count: 5,
            view_count: 7,
            engagement_weight: DEFAULT_ENGAGEMENT_WEIGHT,
            width: 0,
            height: 0,
            prompt_length: 0,
            model: String::new(),
        };
        assert_eq!(signal.counter(CounterField::Likes), 3);
        assert_eq!(signal.counter(CounterField::Favorites), 5);
        assert_eq!(signal.counter(CounterField::Views), 7);
    }
}
