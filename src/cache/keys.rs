//! Cache key derivation
//!
//! Every cache key in the engine is produced here, as a pure function of the
//! endpoint and its parameters. Centralizing the grammar keeps invalidation
//! coverage exhaustively testable: the invalidator purges by the same
//! constants and builders the read path populates with.
//!
//! Key grammar:
//!
//! ```text
//! art:{artwork_id}                         per-artwork state
//! list:{kind}:{window}:{limit}             ranked list
//! list:{kind}:{window}:{limit}:f:{digest}  ranked list with a model filter
//! feed:{digest}                            feed page variant
//! user:{user_id}:favorites                 a user's favorites list
//! user:{user_id}:artworks                  a user's published artworks list
//! ```
//!
//! Free-form parameters are folded in through a SHA-256 digest (first 8
//! bytes, hex), so arbitrary filters cannot produce unbounded or ambiguous
//! keys.

use sha2::{Digest, Sha256};

use crate::types::{ListKind, TimeWindow};

/// Prefix covering every feed page variant
pub const FEED_PREFIX: &str = "feed:";

/// Prefix covering every ranked list
pub const LIST_PREFIX: &str = "list:";

/// Digest free-form arguments into a short stable token
pub fn args_digest(args: &str) -> String {
    if args.is_empty() {
        return "empty".to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(args.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8]) // First 8 bytes = 16 hex chars
}

/// Key for one artwork's cached state
pub fn artwork_state(artwork_id: &str) -> String {
    format!("art:{artwork_id}")
}

/// Key for a ranked list under (kind, window, limit) and an optional model filter
pub fn ranked_list(
    kind: ListKind,
    window: TimeWindow,
    limit: usize,
    model: Option<&str>,
) -> String {
    match model {
        Some(model) => format!(
            "list:{}:{}:{}:f:{}",
            kind.as_str(),
            window.as_str(),
            limit,
            args_digest(model)
        ),
        None => format!("list:{}:{}:{}", kind.as_str(), window.as_str(), limit),
    }
}

/// Prefix covering every variant of one list kind
pub fn list_prefix(kind: ListKind) -> String {
    format!("list:{}:", kind.as_str())
}

/// Key for a feed page variant (query string, page cursor, ...)
pub fn feed_page(variant: &str) -> String {
    format!("feed:{}", args_digest(variant))
}

/// Key for a user's favorites list
pub fn user_favorites(user_id: &str) -> String {
    format!("user:{user_id}:favorites")
}

/// Key for a user's published-artworks list
pub fn user_artworks(user_id: &str) -> String {
    format!("user:{user_id}:artworks")
}
