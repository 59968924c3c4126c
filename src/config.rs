//! Configuration for the ranking engine
//!
//! Every numeric knob of the engine lives here: scoring weights and category
//! thresholds, cache TTLs, lock lease timing, and read deadlines. Defaults are
//! tuned for the Atelier feed; deployments override via `LIMELIGHT_*`
//! environment variables.

use std::time::Duration;

// ============================================================================
// Scoring
// ============================================================================

/// Weights, decay, and category thresholds for the hotness formula
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Weight per like
    pub like_weight: f64,
    /// Weight per favorite
    pub favorite_weight: f64,
    /// Weight per view
    pub view_weight: f64,
    /// Hours for the decay factor to halve a score
    pub half_life_hours: f64,
    /// Floor applied to `engagement_weight` before division (never zero)
    pub min_engagement_weight: f64,
    /// Score at or above which an artwork is viral
    pub viral_threshold: f64,
    /// Score at or above which an artwork is hot
    pub hot_threshold: f64,
    /// Score at or above which an artwork is rising
    pub rising_threshold: f64,
    /// Generator models that earn the quality-factor model bonus
    pub featured_models: Vec<String>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            like_weight: 4.0,
            favorite_weight: 6.0,
            view_weight: 0.05,
            half_life_hours: 24.0,
            min_engagement_weight: 10.0,
            viral_threshold: 50.0,
            hot_threshold: 20.0,
            rising_threshold: 10.0,
            featured_models: Vec::new(),
        }
    }
}

impl ScoreConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LIMELIGHT_LIKE_WEIGHT") {
            if let Ok(w) = val.parse::<f64>() {
                config.like_weight = w;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_FAVORITE_WEIGHT") {
            if let Ok(w) = val.parse::<f64>() {
                config.favorite_weight = w;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_VIEW_WEIGHT") {
            if let Ok(w) = val.parse::<f64>() {
                config.view_weight = w;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_HALF_LIFE_HOURS") {
            if let Ok(h) = val.parse::<f64>() {
                if h > 0.0 {
                    config.half_life_hours = h;
                }
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_MIN_ENGAGEMENT_WEIGHT") {
            if let Ok(w) = val.parse::<f64>() {
                if w > 0.0 {
                    config.min_engagement_weight = w;
                }
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_VIRAL_THRESHOLD") {
            if let Ok(t) = val.parse::<f64>() {
                config.viral_threshold = t;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_HOT_THRESHOLD") {
            if let Ok(t) = val.parse::<f64>() {
                config.hot_threshold = t;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_RISING_THRESHOLD") {
            if let Ok(t) = val.parse::<f64>() {
                config.rising_threshold = t;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_FEATURED_MODELS") {
            config.featured_models = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config
    }
}

// ============================================================================
// Cache Tiers
// ============================================================================

/// TTLs and limits for the two cache tiers
#[derive(Debug, Clone)]
pub struct CacheTierConfig {
    /// TTL for ranked/feed list entries (default: 5 minutes)
    pub list_ttl: Duration,
    /// TTL for per-artwork state entries (default: 10 minutes)
    pub artwork_ttl: Duration,
    /// Cap on any edge-tier entry's TTL (default: 30 seconds)
    pub edge_max_ttl: Duration,
    /// Maximum edge-tier entries before oldest-first eviction
    pub edge_max_entries: usize,
    /// How often the background sweeper drops expired edge entries
    pub cleanup_interval: Duration,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            list_ttl: Duration::from_secs(5 * 60),     // 5 minutes
            artwork_ttl: Duration::from_secs(10 * 60), // 10 minutes
            edge_max_ttl: Duration::from_secs(30),
            edge_max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheTierConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LIMELIGHT_LIST_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.list_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_ARTWORK_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.artwork_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_EDGE_MAX_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.edge_max_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_EDGE_MAX_ENTRIES") {
            if let Ok(n) = val.parse::<usize>() {
                config.edge_max_entries = n;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_CACHE_CLEANUP_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.cleanup_interval = Duration::from_secs(secs);
            }
        }

        config
    }
}

// ============================================================================
// Locking
// ============================================================================

/// Lease timing and contention backoff for recompute locks
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease TTL; a crashed holder's lock self-releases after this
    pub lease_ttl: Duration,
    /// Bounded retry attempts while a resource is contended
    pub acquire_retries: u32,
    /// Base delay between retries; doubled per attempt plus jitter
    pub retry_base_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(10),
            acquire_retries: 3,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

impl LockConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LIMELIGHT_LOCK_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.lease_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_LOCK_RETRIES") {
            if let Ok(n) = val.parse::<u32>() {
                config.acquire_retries = n;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_LOCK_RETRY_BASE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.retry_base_delay = Duration::from_millis(ms);
            }
        }

        config
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Top-level configuration for [`RankingService`](crate::ranking::RankingService)
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub score: ScoreConfig,
    pub cache: CacheTierConfig,
    pub lock: LockConfig,
    /// Maximum candidates fetched per ranked-list recompute
    pub scan_limit: usize,
    /// Per-read deadline; a lapsed read serves the last cached value or fails fast
    pub read_deadline: Duration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            score: ScoreConfig::default(),
            cache: CacheTierConfig::default(),
            lock: LockConfig::default(),
            scan_limit: 500,
            read_deadline: Duration::from_secs(2),
        }
    }
}

impl RankingConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            score: ScoreConfig::from_env(),
            cache: CacheTierConfig::from_env(),
            lock: LockConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("LIMELIGHT_SCAN_LIMIT") {
            if let Ok(n) = val.parse::<usize>() {
                config.scan_limit = n;
            }
        }

        if let Ok(val) = std::env::var("LIMELIGHT_READ_DEADLINE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.read_deadline = Duration::from_millis(ms);
            }
        }

        config
    }
}
