//! Audio caching with TTL, LRU eviction, and on-disk persistence.

pub mod clock;
mod disk;
pub mod index;
pub mod payload;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use index::{CacheStats, EntryMeta};
pub use payload::CachedAudio;
pub use store::{AudioCache, CacheOptions, CacheStatsReport, EntrySummary};

use thiserror::Error;

/// Internal cache failures. Logged and absorbed by [`AudioCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// A payload or header could not be decoded.
    #[error("corrupt cache data: {0}")]
    Corrupt(String),

    /// Writing a payload or the index failed.
    #[error("cache write failed: {0}")]
    Write(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Longest key accepted as an on-disk identifier.
pub const MAX_KEY_LEN: usize = 128;

/// Keys double as file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Display form of a key: its first 16 characters.
pub fn short_key(key: &str) -> &str {
    key.get(..16).unwrap_or(key)
}
