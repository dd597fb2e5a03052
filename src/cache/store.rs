//! Disk-backed audio cache with TTL expiry and LRU eviction.
//!
//! One payload file per key (`<key>.vxc`) plus `index.json` holding per-entry
//! bookkeeping and request counters. The index is persisted after every
//! mutation. Storage failures never reach the caller: a failed read is a
//! miss, a failed write means "not cached".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::disk::{remove_if_exists, write_atomic, TEMP_PREFIX};
use super::index::{CacheIndex, EntryMeta, IndexLoad, INDEX_FILE};
use super::payload::{self, CachedAudio};
use super::{is_valid_key, short_key, CacheError};

/// Extension of payload files.
pub const PAYLOAD_EXT: &str = "vxc";

/// Default capacity in megabytes.
pub const DEFAULT_MAX_SIZE_MB: f64 = 100.0;

/// Default time-to-live in days.
pub const DEFAULT_TTL_DAYS: u64 = 30;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Options for [`AudioCache::open`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Directory holding the index and payload files.
    pub dir: PathBuf,
    /// Capacity bound in megabytes (1 MB = 1024 * 1024 bytes).
    pub max_size_mb: f64,
    /// Entries older than this many days are treated as absent.
    pub ttl_days: u64,
}

impl CacheOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }

    pub fn with_max_size_mb(mut self, max_size_mb: f64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    pub fn with_ttl_days(mut self, ttl_days: u64) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    /// Capacity in bytes. Negative or NaN sizes clamp to zero.
    pub fn max_size_bytes(&self) -> u64 {
        if self.max_size_mb.is_nan() || self.max_size_mb <= 0.0 {
            0
        } else {
            (self.max_size_mb * BYTES_PER_MB) as u64
        }
    }
}

/// Point-in-time statistics derived from the index and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsReport {
    pub items: usize,
    pub size_mb: f64,
    pub max_size_mb: f64,
    pub usage_percent: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

/// One row of the inspection listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub key: String,
    /// First 16 characters of the key, for display.
    pub short_key: String,
    /// `None` when the payload header could not be read.
    pub text_preview: Option<String>,
    pub voice: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Persistent audio cache.
pub struct AudioCache {
    dir: PathBuf,
    index_path: PathBuf,
    index: CacheIndex,
    max_size_mb: f64,
    capacity_bytes: u64,
    ttl_days: u64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCache")
            .field("dir", &self.dir)
            .field("entries", &self.index.entries.len())
            .field("capacity_bytes", &self.capacity_bytes)
            .field("ttl_days", &self.ttl_days)
            .finish()
    }
}

impl AudioCache {
    /// Open (or create) the cache in `options.dir` using wall-clock time.
    ///
    /// Loads the index, migrating a legacy file if needed, then removes
    /// expired entries and stray files.
    pub fn open(options: CacheOptions) -> Result<Self, CacheError> {
        Self::open_with_clock(options, Arc::new(SystemClock))
    }

    /// Open the cache with an explicit time source.
    pub fn open_with_clock(options: CacheOptions, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&options.dir)?;
        let index_path = options.dir.join(INDEX_FILE);
        let (index, how) = CacheIndex::load(&index_path);

        let ttl = i64::try_from(options.ttl_days)
            .ok()
            .and_then(Duration::try_days)
            .unwrap_or(Duration::MAX);

        let mut cache = Self {
            capacity_bytes: options.max_size_bytes(),
            max_size_mb: options.max_size_mb.max(0.0),
            ttl_days: options.ttl_days,
            dir: options.dir,
            index_path,
            index,
            ttl,
            clock,
        };

        if how == IndexLoad::Migrated {
            cache.persist();
        }
        let expired = cache.sweep_expired();
        let orphans = cache.sweep_orphans();
        debug!(
            dir = %cache.dir.display(),
            entries = cache.index.entries.len(),
            expired,
            orphans,
            "Audio cache opened"
        );
        Ok(cache)
    }

    /// Look up `key`.
    ///
    /// Absent, expired, missing or unreadable entries all read as `None`;
    /// broken entries are removed on the way. With `track_stats` the lookup
    /// is counted and a hit refreshes `last_accessed`. Without it, counters
    /// and recency are left alone.
    pub fn get(&mut self, key: &str, track_stats: bool) -> Option<CachedAudio> {
        let now = self.clock.now();

        let expired = match self.index.entries.get(key) {
            Some(meta) => self.is_expired(meta, now),
            None => {
                self.record_miss(track_stats);
                return None;
            }
        };

        if expired {
            debug!(key = %short_key(key), "Cache entry expired, removing");
            self.record_miss(track_stats);
            self.delete(key);
            return None;
        }

        match self.read_payload(key) {
            Ok(value) => {
                if track_stats {
                    if let Some(meta) = self.index.entries.get_mut(key) {
                        meta.last_accessed = now;
                    }
                    self.index.stats.total_requests += 1;
                    self.index.stats.cache_hits += 1;
                    self.persist();
                }
                Some(value)
            }
            Err(e) => {
                warn!(key = %short_key(key), error = %e, "Dropping unreadable cache entry");
                self.record_miss(track_stats);
                self.delete(key);
                None
            }
        }
    }

    /// Store `value` under `key`, evicting least-recently-used entries first.
    ///
    /// Returns `true` if the value was cached. Values larger than the whole
    /// capacity and failed writes are logged and skipped; the index is only
    /// updated after the payload is on disk.
    pub fn set(&mut self, key: &str, value: &CachedAudio) -> bool {
        if !is_valid_key(key) {
            warn!(key = %short_key(key), "Refusing to cache under an invalid key");
            return false;
        }

        let bytes = match payload::encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %short_key(key), error = %e, "Failed to encode cache payload");
                return false;
            }
        };
        let new_size = bytes.len() as u64;

        if new_size > self.capacity_bytes {
            warn!(
                key = %short_key(key),
                size_bytes = new_size,
                capacity_bytes = self.capacity_bytes,
                "Payload larger than cache capacity, not caching"
            );
            return false;
        }

        self.make_room(key, new_size);

        let path = self.payload_path(key);
        if let Err(e) = write_atomic(&path, &bytes) {
            warn!(key = %short_key(key), error = %e, "Cache write failed, item not cached");
            return false;
        }

        let now = self.clock.now();
        self.index.entries.insert(
            key.to_string(),
            EntryMeta {
                created_at: now,
                last_accessed: now,
                size_bytes: new_size,
            },
        );
        self.persist();
        debug!(key = %short_key(key), size_bytes = new_size, "Cached audio");
        true
    }

    /// Remove `key` from disk and the index. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.remove_entry(key);
        if removed {
            self.persist();
        }
        removed
    }

    /// Remove every entry. Counters are kept; see [`AudioCache::reset_stats`].
    pub fn clear(&mut self) -> usize {
        let keys: Vec<String> = self.index.entries.keys().cloned().collect();
        let removed = keys.iter().filter(|k| self.remove_entry(k)).count();
        self.persist();
        info!(removed, "Cleared audio cache");
        removed
    }

    /// Zero the request counters.
    pub fn reset_stats(&mut self) {
        self.index.stats = Default::default();
        self.persist();
    }

    /// Remove every entry older than the TTL. Returns the number removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .index
            .entries
            .iter()
            .filter(|(_, meta)| self.is_expired(meta, now))
            .map(|(k, _)| k.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }
        for key in &expired {
            self.remove_entry(key);
        }
        self.persist();
        info!(removed = expired.len(), "Swept expired cache entries");
        expired.len()
    }

    /// Return aggregate statistics. No side effects.
    pub fn get_stats(&self) -> CacheStatsReport {
        let total = self.index.total_size_bytes();
        let usage_percent = if self.capacity_bytes > 0 {
            total as f64 / self.capacity_bytes as f64 * 100.0
        } else {
            0.0
        };
        let stats = &self.index.stats;
        CacheStatsReport {
            items: self.index.entries.len(),
            size_mb: total as f64 / BYTES_PER_MB,
            max_size_mb: self.max_size_mb,
            usage_percent,
            cache_hits: stats.cache_hits,
            cache_misses: stats.cache_misses,
            total_requests: stats.total_requests,
            hit_rate: stats.hit_rate(),
        }
    }

    /// List entries, most recently accessed first.
    ///
    /// Reads only payload headers. Does not touch counters or recency.
    pub fn entries(&self) -> Vec<EntrySummary> {
        let mut rows: Vec<EntrySummary> = self
            .index
            .entries
            .iter()
            .map(|(key, meta)| {
                let header = payload::read_header(&self.payload_path(key)).ok();
                EntrySummary {
                    key: key.clone(),
                    short_key: short_key(key).to_string(),
                    text_preview: header.as_ref().map(|h| h.text_preview.clone()),
                    voice: header.map(|h| h.voice),
                    size_bytes: meta.size_bytes,
                    created_at: meta.created_at,
                    last_accessed: meta.last_accessed,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.last_accessed
                .cmp(&a.last_accessed)
                .then_with(|| a.key.cmp(&b.key))
        });
        rows
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .index
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Whether a live (unexpired) entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.index
            .entries
            .get(key)
            .is_some_and(|meta| !self.is_expired(meta, now))
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.entries.is_empty()
    }

    /// Sum of `size_bytes` over indexed entries.
    pub fn total_size_bytes(&self) -> u64 {
        self.index.total_size_bytes()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // -- private helpers ---------------------------------------------------

    fn is_expired(&self, meta: &EntryMeta, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(meta.created_at) > self.ttl
    }

    fn record_miss(&mut self, track_stats: bool) {
        if track_stats {
            self.index.stats.total_requests += 1;
            self.index.stats.cache_misses += 1;
            self.persist();
        }
    }

    /// Evict LRU entries until `incoming` bytes fit. Never evicts `protect`,
    /// whose current size is excluded since it will be overwritten.
    fn make_room(&mut self, protect: &str, incoming: u64) {
        let protected_size = self
            .index
            .entries
            .get(protect)
            .map(|m| m.size_bytes)
            .unwrap_or(0);

        let mut evicted = 0usize;
        loop {
            // Recomputed each round: saturated totals can't be decremented.
            let current = self.index.total_size_bytes().saturating_sub(protected_size);
            if current.saturating_add(incoming) <= self.capacity_bytes {
                break;
            }
            let Some(victim) = self.lru_candidate(protect) else {
                break;
            };
            let size = self
                .index
                .entries
                .get(&victim)
                .map(|m| m.size_bytes)
                .unwrap_or(0);
            debug!(key = %short_key(&victim), size_bytes = size, "Evicting LRU cache entry");
            self.remove_entry(&victim);
            evicted += 1;
        }
        if evicted > 0 {
            self.persist();
        }
    }

    /// Oldest `last_accessed` first; ties broken by key.
    fn lru_candidate(&self, protect: &str) -> Option<String> {
        self.index
            .entries
            .iter()
            .filter(|(k, _)| k.as_str() != protect)
            .min_by(|(ka, a), (kb, b)| {
                a.last_accessed
                    .cmp(&b.last_accessed)
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone())
    }

    /// Drop payload and index entry without persisting.
    fn remove_entry(&mut self, key: &str) -> bool {
        let mut removed = false;
        if is_valid_key(key) {
            match remove_if_exists(&self.payload_path(key)) {
                Ok(existed) => removed |= existed,
                Err(e) => {
                    warn!(key = %short_key(key), error = %e, "Failed to remove cache payload")
                }
            }
        }
        removed |= self.index.entries.remove(key).is_some();
        removed
    }

    fn read_payload(&self, key: &str) -> Result<CachedAudio, CacheError> {
        let bytes = std::fs::read(self.payload_path(key))?;
        payload::decode(&bytes)
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, PAYLOAD_EXT))
    }

    /// Delete payload files with no index entry and leftover temp files.
    fn sweep_orphans(&mut self) -> usize {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to scan cache directory");
                return 0;
            }
        };

        let mut removed = 0usize;
        for entry in read_dir.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let orphan = if name.starts_with(TEMP_PREFIX) {
                true
            } else if path.extension().and_then(|e| e.to_str()) == Some(PAYLOAD_EXT) {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|stem| !self.index.entries.contains_key(stem))
                    .unwrap_or(false)
            } else {
                false
            };
            if orphan && remove_if_exists(&path).unwrap_or(false) {
                removed += 1;
            }
        }
        removed
    }

    fn persist(&self) {
        if let Err(e) = self.index.save(&self.index_path) {
            warn!(error = %e, "Failed to save cache index");
        }
    }
}
