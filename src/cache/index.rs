//! Cache index and stats persistence.
//!
//! Current format (version 2):
//!
//! ```json
//! { "version": 2, "entries": { "<key>": { ... } }, "stats": { ... } }
//! ```
//!
//! Version 1 files are a bare `{ "<key>": { ... } }` map without stats. They
//! are recognized on load and wrapped with zeroed counters; the next save
//! rewrites them as version 2.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::disk::write_atomic;
use super::CacheError;

/// File name of the index inside the cache directory.
pub const INDEX_FILE: &str = "index.json";

/// Version written by this build.
pub const INDEX_VERSION: u32 = 2;

/// Per-entry bookkeeping kept in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// When the entry was inserted. Reset on overwrite.
    pub created_at: DateTime<Utc>,
    /// When the entry was last returned by a tracked read.
    pub last_accessed: DateTime<Utc>,
    /// Payload size on disk at insertion time.
    #[serde(alias = "size")]
    pub size_bytes: u64,
}

/// Running request counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl CacheStats {
    /// Fraction of tracked requests that were hits, `0.0` when none were made.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// In-memory image of `index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub version: u32,
    pub entries: HashMap<String, EntryMeta>,
    #[serde(default)]
    pub stats: CacheStats,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }
}

/// Every shape of index file we know how to read.
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexFile {
    Current(CacheIndex),
    Legacy(HashMap<String, EntryMeta>),
}

/// How the index was obtained on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLoad {
    /// No index file existed.
    Fresh,
    /// Current-format file read as-is.
    Loaded,
    /// Version 1 file wrapped with fresh stats.
    Migrated,
    /// File existed but could not be read; started empty.
    Discarded,
}

impl CacheIndex {
    /// Load the index from `path`, never failing.
    ///
    /// Unreadable or unparseable files are logged and replaced by an empty
    /// index.
    pub fn load(path: &Path) -> (Self, IndexLoad) {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (Self::default(), IndexLoad::Fresh)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache index, starting empty");
                return (Self::default(), IndexLoad::Discarded);
            }
        };

        match serde_json::from_str::<IndexFile>(&data) {
            Ok(IndexFile::Current(mut index)) => {
                if index.version > INDEX_VERSION {
                    warn!(
                        version = index.version,
                        "Cache index written by a newer version; fields may be dropped on save"
                    );
                }
                index.version = INDEX_VERSION;
                (index, IndexLoad::Loaded)
            }
            Ok(IndexFile::Legacy(entries)) => {
                info!(entries = entries.len(), "Migrating legacy cache index");
                let index = Self {
                    entries,
                    ..Self::default()
                };
                (index, IndexLoad::Migrated)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache index is corrupt, starting empty");
                (Self::default(), IndexLoad::Discarded)
            }
        }
    }

    /// Write the index atomically.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| CacheError::Write(format!("failed to serialize cache index: {}", e)))?;
        write_atomic(path, &data)
    }

    /// Sum of `size_bytes` over every indexed entry, saturating at `u64::MAX`.
    pub fn total_size_bytes(&self) -> u64 {
        self.entries
            .values()
            .fold(0u64, |total, m| total.saturating_add(m.size_bytes))
    }
}
