//! Audio resolution: cache first, synthesis on miss, write-back.
//!
//! Concurrent misses for the same fingerprint are collapsed: the first
//! caller synthesizes while later callers wait on a per-key lock, then
//! find the result in the cache. Synthesis and write-back run as a spawned
//! task, so a caller that gives up still leaves the audio in the cache.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::cache::{short_key, AudioCache, CacheStatsReport, CachedAudio};
use crate::error::{Result, VoxError};
use crate::providers::{SpeechSynthesizer, SynthesisRequest};
use crate::utils::audio::{estimate_duration, text_preview};

type FlightTable = DashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Build the cache key for `(text, voice)`: SHA-256 hex of `text + "_" + voice`.
///
/// Text is NFC-normalized first. Keys match the web player's for the same
/// normalized input, so both can share one cache directory.
pub fn fingerprint(text: &str, voice: &str) -> String {
    let text: String = text.nfc().collect();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"_");
    hasher.update(voice.as_bytes());
    hex::encode(hasher.finalize())
}

/// Audio for one `(text, voice)` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAudio {
    pub audio: Vec<u8>,
    /// Estimated playback length in seconds.
    pub duration_estimate: f64,
    pub was_cache_hit: bool,
}

impl ResolvedAudio {
    fn from_cached(value: CachedAudio) -> Self {
        Self {
            audio: value.audio,
            duration_estimate: value.duration_estimate,
            was_cache_hit: true,
        }
    }
}

/// Outcome of one line in [`AudioResolver::resolve_batch`].
#[derive(Debug)]
pub struct BatchItem {
    pub index: usize,
    pub text: String,
    pub result: Result<ResolvedAudio>,
}

/// Resolves text to audio through the cache and an optional synthesizer.
pub struct AudioResolver {
    cache: Arc<Mutex<AudioCache>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    in_flight: Arc<FlightTable>,
}

impl std::fmt::Debug for AudioResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioResolver")
            .field("has_synthesizer", &self.synthesizer.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl AudioResolver {
    /// Create a resolver. Without a synthesizer only cached audio resolves.
    pub fn new(cache: AudioCache, synthesizer: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            synthesizer,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn has_synthesizer(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Resolve `(text, voice)` to audio.
    ///
    /// Must be called inside a tokio runtime. Dropping the returned future
    /// does not cancel a synthesis already under way; its result is cached.
    ///
    /// # Errors
    ///
    /// - [`VoxError::Config`] on a miss when no synthesizer is configured.
    /// - [`VoxError::Synthesis`] when the provider fails. Failures are never cached.
    pub async fn resolve(&self, text: &str, voice: &str) -> Result<ResolvedAudio> {
        let key = fingerprint(text, voice);

        if let Some(hit) = lock_cache(&self.cache).get(&key, true) {
            debug!(key = %short_key(&key), "Audio cache hit");
            return Ok(ResolvedAudio::from_cached(hit));
        }

        let synthesizer = self
            .synthesizer
            .clone()
            .ok_or_else(|| VoxError::Config("no synthesis credential available".into()))?;

        let flight = InFlight::enter(&self.in_flight, &key);
        let turn = Arc::clone(&flight.slot).lock_owned().await;

        // Filled by another caller while we waited. This request was already
        // counted as a miss, so the re-check is untracked.
        if let Some(hit) = lock_cache(&self.cache).get(&key, false) {
            debug!(key = %short_key(&key), "Audio resolved by concurrent request");
            return Ok(ResolvedAudio::from_cached(hit));
        }

        let job = SynthesisJob {
            cache: Arc::clone(&self.cache),
            synthesizer,
            key,
            text: text.to_string(),
            voice: voice.to_string(),
        };
        let task = tokio::spawn(job.run(turn, flight));
        task.await
            .map_err(|e| VoxError::synthesis(format!("synthesis task failed: {}", e)))?
    }

    /// Resolve lines in order, collecting per-line failures.
    pub async fn resolve_batch<S: AsRef<str>>(&self, texts: &[S], voice: &str) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let text = text.as_ref();
            let result = self.resolve(text, voice).await;
            items.push(BatchItem {
                index,
                text: text.to_string(),
                result,
            });
        }
        items
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> CacheStatsReport {
        lock_cache(&self.cache).get_stats()
    }

    /// Run `f` with exclusive access to the cache (inspection and admin).
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut AudioCache) -> R) -> R {
        f(&mut lock_cache(&self.cache))
    }
}

fn lock_cache(cache: &Mutex<AudioCache>) -> MutexGuard<'_, AudioCache> {
    cache.lock().expect("audio cache lock poisoned")
}

/// One miss being synthesized and written back.
struct SynthesisJob {
    cache: Arc<Mutex<AudioCache>>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    key: String,
    text: String,
    voice: String,
}

impl SynthesisJob {
    /// Holds the key's turn until the cache is written, so waiters find the
    /// result on their re-check.
    async fn run(self, turn: OwnedMutexGuard<()>, flight: InFlight) -> Result<ResolvedAudio> {
        let outcome = self.synthesize_and_store().await;
        drop(turn);
        drop(flight);
        outcome
    }

    async fn synthesize_and_store(&self) -> Result<ResolvedAudio> {
        let request = SynthesisRequest::new(self.text.as_str(), self.voice.as_str());
        let audio = self.synthesizer.synthesize(&request).await.map_err(|e| {
            warn!(key = %short_key(&self.key), voice = %self.voice, error = %e, "Synthesis failed");
            e
        })?;

        let value = CachedAudio {
            audio,
            duration_estimate: estimate_duration(&self.text),
            text_preview: text_preview(&self.text),
            voice: self.voice.clone(),
        };
        let cached = lock_cache(&self.cache).set(&self.key, &value);
        if !cached {
            debug!(key = %short_key(&self.key), "Synthesized audio returned uncached");
        }

        Ok(ResolvedAudio {
            audio: value.audio,
            duration_estimate: value.duration_estimate,
            was_cache_hit: false,
        })
    }
}

/// Membership in the per-key in-flight table. Removes the key's lock when
/// the last interested caller leaves, including on cancellation.
struct InFlight {
    map: Arc<FlightTable>,
    key: String,
    slot: Arc<tokio::sync::Mutex<()>>,
}

impl InFlight {
    fn enter(map: &Arc<FlightTable>, key: &str) -> Self {
        let slot = map.entry(key.to_string()).or_default().clone();
        Self {
            map: Arc::clone(map),
            key: key.to_string(),
            slot,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        // The table's copy plus ours: nobody else is waiting.
        self.map
            .remove_if(self.key.as_str(), |_, slot| Arc::strong_count(slot) <= 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, ManualClock};
    use crate::providers::MockSpeechSynthesizer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_cache(dir: &std::path::Path, max_size_mb: f64) -> AudioCache {
        let options = CacheOptions::new(dir).with_max_size_mb(max_size_mb);
        AudioCache::open_with_clock(options, Arc::new(ManualClock::default())).unwrap()
    }

    fn resolver_with(mock: MockSpeechSynthesizer, dir: &std::path::Path) -> AudioResolver {
        AudioResolver::new(open_cache(dir, 10.0), Some(Arc::new(mock)))
    }

    /// Synthesizer that counts calls and takes a while to answer.
    struct SlowSynth {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for SlowSynth {
        async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(request.text.as_bytes().to_vec())
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let k1 = fingerprint("Hello", "en-US-Standard-F");
        let k2 = fingerprint("Hello", "en-US-Standard-F");
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
        assert!(k1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_text_and_voice_aware() {
        let base = fingerprint("Hello", "en-US-Standard-F");
        assert_ne!(base, fingerprint("Hello!", "en-US-Standard-F"));
        assert_ne!(base, fingerprint("Hello", "en-GB-Standard-F"));
    }

    #[test]
    fn test_fingerprint_known_digest() {
        // sha256("Hello_en-US-Standard-F")
        assert_eq!(
            fingerprint("Hello", "en-US-Standard-F"),
            "26a74c1c1db1e5ae35b94ba16ecbdd361a1efeefc142fa85cda297a4927eb950"
        );
        // sha256("caf\u{e9}_en-US-Standard-F"), reached from the decomposed form too
        assert_eq!(
            fingerprint("cafe\u{301}", "en-US-Standard-F"),
            "09820926ea412b2b3edb6db504126a1560109f193d66decac8b6c601863577cb"
        );
    }

    #[test]
    fn test_fingerprint_normalizes_text() {
        // Precomposed vs combining acute accent.
        assert_eq!(
            fingerprint("caf\u{e9}", "en-US-Standard-F"),
            fingerprint("cafe\u{301}", "en-US-Standard-F")
        );
    }

    #[tokio::test]
    async fn test_miss_synthesizes_then_hits() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize()
            .withf(|req| req.voice == "en-US-Standard-F" && req.language_code == "en-US")
            .times(1)
            .returning(|_| Ok(b"mp3-bytes".to_vec()));
        let resolver = resolver_with(mock, tmp.path());

        let first = resolver.resolve("Good morning", "en-US-Standard-F").await.unwrap();
        assert!(!first.was_cache_hit);
        assert_eq!(first.audio, b"mp3-bytes");
        assert!((first.duration_estimate - 12.0 * 0.15).abs() < 1e-9);

        let second = resolver.resolve("Good morning", "en-US-Standard-F").await.unwrap();
        assert!(second.was_cache_hit);
        assert_eq!(second.audio, first.audio);
        assert_eq!(second.duration_estimate, first.duration_estimate);

        let stats = resolver.cache_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_miss_without_synthesizer_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let resolver = AudioResolver::new(open_cache(tmp.path(), 10.0), None);
        let err = resolver.resolve("Hello", "en-US-Standard-F").await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("no synthesis credential available"));
    }

    #[tokio::test]
    async fn test_cached_audio_resolves_without_synthesizer() {
        let tmp = TempDir::new().unwrap();
        let mut cache = open_cache(tmp.path(), 10.0);
        let key = fingerprint("Hello", "en-US-Standard-F");
        cache.set(
            &key,
            &CachedAudio {
                audio: b"cached".to_vec(),
                duration_estimate: 0.75,
                text_preview: "Hello".into(),
                voice: "en-US-Standard-F".into(),
            },
        );
        let resolver = AudioResolver::new(cache, None);
        let out = resolver.resolve("Hello", "en-US-Standard-F").await.unwrap();
        assert!(out.was_cache_hit);
        assert_eq!(out.audio, b"cached");
    }

    #[tokio::test]
    async fn test_synthesis_error_propagates_and_is_not_cached() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize()
            .times(2)
            .returning(|_| Err(VoxError::synthesis_status(403, "API key not valid.")));
        let resolver = resolver_with(mock, tmp.path());

        for _ in 0..2 {
            let err = resolver.resolve("Hello", "en-US-Standard-F").await.unwrap_err();
            assert!(matches!(err, VoxError::Synthesis { status: Some(403), .. }));
        }
        assert_eq!(resolver.cache_stats().items, 0);
    }

    #[tokio::test]
    async fn test_oversize_audio_still_returned() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize()
            .times(2)
            .returning(|_| Ok(vec![7u8; 64]));
        // Zero capacity: nothing can be cached.
        let resolver = AudioResolver::new(open_cache(tmp.path(), 0.0), Some(Arc::new(mock)));

        let first = resolver.resolve("Hi", "en-US-Standard-F").await.unwrap();
        assert_eq!(first.audio.len(), 64);
        assert!(!first.was_cache_hit);
        let second = resolver.resolve("Hi", "en-US-Standard-F").await.unwrap();
        assert!(!second.was_cache_hit);
    }

    #[tokio::test]
    async fn test_payload_write_failure_still_returns_audio() {
        let tmp = TempDir::new().unwrap();
        let key = fingerprint("Blocked", "en-US-Standard-F");
        // A non-empty directory where the payload file should go.
        let blocker = tmp.path().join(format!("{}.vxc", key));
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize()
            .times(1)
            .returning(|_| Ok(b"fresh".to_vec()));
        let resolver = resolver_with(mock, tmp.path());

        let out = resolver.resolve("Blocked", "en-US-Standard-F").await.unwrap();
        assert_eq!(out.audio, b"fresh");
        assert!(!out.was_cache_hit);
        assert!(resolver.with_cache(|c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_abandoned_resolve_still_caches() {
        let tmp = TempDir::new().unwrap();
        let synth = Arc::new(SlowSynth {
            calls: AtomicUsize::new(0),
        });
        let resolver = AudioResolver::new(open_cache(tmp.path(), 10.0), Some(synth.clone()));

        let attempt = tokio::time::timeout(
            Duration::from_millis(5),
            resolver.resolve("Walk away", "en-US-Standard-F"),
        )
        .await;
        assert!(attempt.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let key = fingerprint("Walk away", "en-US-Standard-F");
        assert!(resolver.with_cache(|c| c.contains(&key)));
        assert!(resolver.in_flight.is_empty());

        let again = resolver.resolve("Walk away", "en-US-Standard-F").await.unwrap();
        assert!(again.was_cache_hit);
        assert_eq!(again.audio, b"Walk away");
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_synthesize_once() {
        let tmp = TempDir::new().unwrap();
        let synth = Arc::new(SlowSynth {
            calls: AtomicUsize::new(0),
        });
        let resolver = Arc::new(AudioResolver::new(
            open_cache(tmp.path(), 10.0),
            Some(synth.clone()),
        ));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver.resolve("Same line", "en-US-Standard-F").await
            }));
        }

        let mut misses = 0;
        for handle in handles {
            let out = handle.await.unwrap().unwrap();
            assert_eq!(out.audio, b"Same line");
            if !out.was_cache_hit {
                misses += 1;
            }
        }

        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(misses, 1);
        assert!(resolver.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_serialize() {
        let tmp = TempDir::new().unwrap();
        let synth = Arc::new(SlowSynth {
            calls: AtomicUsize::new(0),
        });
        let resolver = Arc::new(AudioResolver::new(
            open_cache(tmp.path(), 10.0),
            Some(synth.clone()),
        ));

        let a = {
            let r = resolver.clone();
            tokio::spawn(async move { r.resolve("one", "en-US-Standard-F").await })
        };
        let b = {
            let r = resolver.clone();
            tokio::spawn(async move { r.resolve("two", "en-US-Standard-F").await })
        };
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_batch_collects_errors() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize().returning(|req| {
            if req.text == "bad" {
                Err(VoxError::synthesis("boom"))
            } else {
                Ok(req.text.as_bytes().to_vec())
            }
        });
        let resolver = resolver_with(mock, tmp.path());

        let items = resolver
            .resolve_batch(&["first", "bad", "third"], "en-US-Standard-F")
            .await;
        assert_eq!(items.len(), 3);
        assert!(items[0].result.is_ok());
        assert!(items[1].result.is_err());
        assert_eq!(items[2].index, 2);
        assert_eq!(items[2].result.as_ref().unwrap().audio, b"third");
    }

    #[tokio::test]
    async fn test_with_cache_exposes_inspection() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockSpeechSynthesizer::new();
        mock.expect_synthesize().returning(|_| Ok(vec![1, 2, 3]));
        let resolver = resolver_with(mock, tmp.path());
        resolver.resolve("Listed", "en-GB-Wavenet-A").await.unwrap();

        let rows = resolver.with_cache(|c| c.entries());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text_preview.as_deref(), Some("Listed"));
        assert_eq!(rows[0].voice.as_deref(), Some("en-GB-Wavenet-A"));
    }
}
