//! Player context: configuration plus the services built from it.
//!
//! Front-ends construct one [`PlayerContext`] and pass it around instead of
//! reaching for global state.

use std::sync::Arc;

use tracing::info;

use crate::cache::AudioCache;
use crate::config::Config;
use crate::error::{Result, VoxError};
use crate::providers::{GoogleTtsProvider, SpeechSynthesizer};
use crate::resolver::{AudioResolver, ResolvedAudio};

pub struct PlayerContext {
    config: Config,
    provider: Option<Arc<GoogleTtsProvider>>,
    resolver: Arc<AudioResolver>,
}

impl std::fmt::Debug for PlayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerContext")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish()
    }
}

impl PlayerContext {
    /// Open the cache and build the provider described by `config`.
    ///
    /// A missing API key is not an error here: the context runs cache-only
    /// and misses fail with [`VoxError::Config`].
    pub fn from_config(config: Config) -> Result<Self> {
        let options = config.cache.to_options();
        let dir = options.dir.clone();
        let cache = AudioCache::open(options).map_err(|e| {
            VoxError::Config(format!("cache directory {} is unusable: {}", dir.display(), e))
        })?;

        let provider = GoogleTtsProvider::from_config(&config.provider)?.map(Arc::new);
        if provider.is_none() {
            info!("No provider API key configured; serving cached audio only");
        }
        let synthesizer = provider
            .clone()
            .map(|p| p as Arc<dyn SpeechSynthesizer>);

        Ok(Self {
            config,
            provider,
            resolver: Arc::new(AudioResolver::new(cache, synthesizer)),
        })
    }

    /// Assemble a context from prebuilt parts (custom synthesizers, tests).
    pub fn with_resolver(config: Config, resolver: Arc<AudioResolver>) -> Self {
        Self {
            config,
            provider: None,
            resolver,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<AudioResolver> {
        &self.resolver
    }

    /// The Google provider, when an API key is configured.
    pub fn provider(&self) -> Option<&GoogleTtsProvider> {
        self.provider.as_deref()
    }

    /// `voice`, or the configured default when `None` or blank.
    pub fn voice_or_default<'a>(&'a self, voice: Option<&'a str>) -> &'a str {
        match voice.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => &self.config.player.default_voice,
        }
    }

    /// Resolve `text` with `voice` (or the default voice).
    pub async fn speak(&self, text: &str, voice: Option<&str>) -> Result<ResolvedAudio> {
        let voice = self.voice_or_default(voice);
        self.resolver.resolve(text, voice).await
    }
}
