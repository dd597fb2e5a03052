//! voxcache: cached text-to-speech.
//!
//! Text and a voice go in, MP3 bytes come out. Audio is looked up in a
//! persistent, size-bounded, expiring cache before the synthesis provider
//! is called, and fresh synthesis results are written back.
//!
//! ```no_run
//! # async fn demo() -> voxcache::Result<()> {
//! let config = voxcache::Config::load()?;
//! let ctx = voxcache::PlayerContext::from_config(config)?;
//! let audio = ctx.speak("Good morning", None).await?;
//! println!("{} bytes, ~{:.1}s", audio.audio.len(), audio.duration_estimate);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod providers;
pub mod resolver;
pub mod utils;

pub use cache::{AudioCache, CacheOptions, CacheStatsReport, CachedAudio, EntrySummary};
pub use config::Config;
pub use context::PlayerContext;
pub use error::{Result, VoxError};
pub use providers::{GoogleTtsProvider, SpeechSynthesizer, SynthesisRequest, VoiceInfo};
pub use resolver::{fingerprint, AudioResolver, BatchItem, ResolvedAudio};
