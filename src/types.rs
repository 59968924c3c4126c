//! Shared types for the ranking engine
//!
//! Crate-wide error enum, `Result` alias, and the list/window identifiers
//! used in cache keys and queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for ranking engine operations
#[derive(Debug, Clone, Error)]
pub enum LimelightError {
    /// Artwork or signal does not exist. Propagated to the caller, never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock contention. Retried internally with bounded backoff; surfaced only
    /// from the lock API itself, never from a ranking read.
    #[error("Resource busy: {0}")]
    Busy(String),

    /// Cache or lock backend unreachable. The engine degrades gracefully;
    /// retryable from the caller's side.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Malformed input (negative counter, zero engagement weight, duplicate
    /// publish). Rejected at the store boundary, never clamped into the formula.
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Released a lock token that no longer owns its resource.
    #[error("Lock not held: {0}")]
    NotHeld(String),

    /// Renewed a lease that already lapsed or was taken over.
    #[error("Lock expired: {0}")]
    Expired(String),
}

impl LimelightError {
    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LimelightError::Busy(_) | LimelightError::Unavailable(_)
        )
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, LimelightError>;

// ============================================================================
// List Identifiers
// ============================================================================

/// Ranked list variants served by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// All published artworks ordered by score
    Trending,
    /// Artworks at or above the hot threshold
    Hot,
    /// Artworks at or above the rising threshold
    Rising,
    /// Artworks at or above the viral threshold
    Viral,
}

impl ListKind {
    /// Stable name used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Trending => "trending",
            ListKind::Hot => "hot",
            ListKind::Rising => "rising",
            ListKind::Viral => "viral",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window a ranked list is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Last 24 hours
    Day,
    /// Last 7 days
    Week,
    /// Last 30 days
    Month,
    /// No publication cutoff
    All,
}

impl TimeWindow {
    /// Stable name used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::All => "all",
        }
    }

    /// Publication cutoff for this window, or `None` for an unbounded scan.
    pub fn cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            TimeWindow::Day => Some(now - chrono::Duration::hours(24)),
            TimeWindow::Week => Some(now - chrono::Duration::days(7)),
            TimeWindow::Month => Some(now - chrono::Duration::days(30)),
            TimeWindow::All => None,
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(LimelightError::Busy("lock".into()).is_retryable());
        assert!(LimelightError::Unavailable("cache".into()).is_retryable());
        assert!(!LimelightError::NotFound("art-1".into()).is_retryable());
        assert!(!LimelightError::Invalid("bad delta".into()).is_retryable());
    }

    #[test]
    fn test_window_cutoff() {
        let now = chrono::Utc::now();

        let day = TimeWindow::Day.cutoff(now).unwrap();
        assert_eq!((now - day).num_hours(), 24);

        assert!(TimeWindow::All.cutoff(now).is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ListKind::Trending.as_str(), "trending");
        assert_eq!(ListKind::Viral.to_string(), "viral");
        assert_eq!(TimeWindow::Week.as_str(), "week");
    }
}
