//! Configuration for voxcache.
//!
//! Loaded from `~/.voxcache/config.json` (or the path in `VOXCACHE_CONFIG`),
//! then overridden by environment variables. A `.env` file in the working
//! directory is read first.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `VOXCACHE_CACHE_DIR` | `cache.dir` |
//! | `VOXCACHE_CACHE_MAX_SIZE_MB` | `cache.max_size_mb` |
//! | `VOXCACHE_CACHE_TTL_DAYS` | `cache.ttl_days` |
//! | `VOXCACHE_PROVIDER_API_KEY`, then `GOOGLE_API_KEY` | `provider.api_key` |
//! | `VOXCACHE_PROVIDER_BASE_URL` | `provider.base_url` |
//! | `VOXCACHE_PROVIDER_TIMEOUT_SECS` | `provider.timeout_secs` |
//! | `VOXCACHE_DEFAULT_VOICE` | `player.default_voice` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::store::{DEFAULT_MAX_SIZE_MB, DEFAULT_TTL_DAYS};
use crate::cache::CacheOptions;
use crate::error::{Result, VoxError};
use crate::providers::google::{mask_api_key, DEFAULT_TIMEOUT_SECS};
use crate::providers::DEFAULT_VOICE;

/// Cache section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage location. Defaults to `~/.voxcache/cache`.
    pub dir: Option<PathBuf>,
    /// Capacity bound in megabytes.
    pub max_size_mb: f64,
    /// Expiry bound in days.
    pub ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }
}

impl CacheConfig {
    /// Directory the cache lives in.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| Config::dir().join("cache"))
    }

    pub fn to_options(&self) -> CacheOptions {
        CacheOptions::new(self.resolved_dir())
            .with_max_size_mb(self.max_size_mb)
            .with_ttl_days(self.ttl_days)
    }
}

/// Synthesis provider section.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Google Cloud API key. No key means cache-only operation.
    pub api_key: Option<String>,
    /// Override of the REST API base URL.
    pub base_url: Option<String>,
    /// HTTP timeout for synthesis requests.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_deref().map(mask_api_key))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Player defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Voice used when a command doesn't name one.
    pub default_voice: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_voice: DEFAULT_VOICE.to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub player: PlayerConfig,
}

impl Config {
    /// `~/.voxcache`, or `./.voxcache` when there is no home directory.
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".voxcache")
    }

    /// Config file path, honoring `VOXCACHE_CONFIG`.
    pub fn path() -> PathBuf {
        std::env::var_os("VOXCACHE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::dir().join("config.json"))
    }

    /// Load from the default path and apply environment overrides.
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = Self::path();
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env_with(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a config file without applying environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            VoxError::Config(format!("Failed to read config at {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            VoxError::Config(format!("Failed to parse config at {}: {}", path.display(), e))
        })
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`Config::load`]). Unparseable numbers are logged and ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("VOXCACHE_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(v) = get("VOXCACHE_CACHE_MAX_SIZE_MB") {
            match v.trim().parse::<f64>() {
                Ok(mb) if mb.is_finite() && mb >= 0.0 => self.cache.max_size_mb = mb,
                _ => warn!(value = %v, "Ignoring invalid VOXCACHE_CACHE_MAX_SIZE_MB"),
            }
        }
        if let Some(v) = get("VOXCACHE_CACHE_TTL_DAYS") {
            match v.trim().parse::<u64>() {
                Ok(days) => self.cache.ttl_days = days,
                Err(_) => warn!(value = %v, "Ignoring invalid VOXCACHE_CACHE_TTL_DAYS"),
            }
        }
        if let Some(key) = get("VOXCACHE_PROVIDER_API_KEY").or_else(|| {
            if self.provider.api_key.is_none() {
                get("GOOGLE_API_KEY")
            } else {
                None
            }
        }) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = get("VOXCACHE_PROVIDER_BASE_URL") {
            self.provider.base_url = Some(url);
        }
        if let Some(v) = get("VOXCACHE_PROVIDER_TIMEOUT_SECS") {
            match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.provider.timeout_secs = secs,
                _ => warn!(value = %v, "Ignoring invalid VOXCACHE_PROVIDER_TIMEOUT_SECS"),
            }
        }
        if let Some(voice) = get("VOXCACHE_DEFAULT_VOICE") {
            self.player.default_voice = voice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.max_size_mb, 100.0);
        assert_eq!(cfg.cache.ttl_days, 30);
        assert!(cfg.cache.dir.is_none());
        assert!(cfg.provider.api_key.is_none());
        assert_eq!(cfg.provider.timeout_secs, 30);
        assert_eq!(cfg.player.default_voice, "en-US-Standard-F");
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"cache": {"ttl_days": 7}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.cache.ttl_days, 7);
        assert_eq!(cfg.cache.max_size_mb, 100.0);
        assert_eq!(cfg.provider.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cache": {"dir": "/var/tmp/vox", "max_size_mb": 12.5}, "provider": {"api_key": "k"}}"#,
        )
        .unwrap();
        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.cache.resolved_dir(), PathBuf::from("/var/tmp/vox"));
        assert_eq!(cfg.cache.max_size_mb, 12.5);
        assert_eq!(cfg.provider.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_load_from_path_invalid_json_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[
            ("VOXCACHE_CACHE_DIR", "/tmp/voxcache-test"),
            ("VOXCACHE_CACHE_MAX_SIZE_MB", "5"),
            ("VOXCACHE_CACHE_TTL_DAYS", "2"),
            ("VOXCACHE_PROVIDER_TIMEOUT_SECS", "10"),
            ("VOXCACHE_DEFAULT_VOICE", "en-GB-Wavenet-B"),
        ]));
        assert_eq!(cfg.cache.dir, Some(PathBuf::from("/tmp/voxcache-test")));
        assert_eq!(cfg.cache.max_size_mb, 5.0);
        assert_eq!(cfg.cache.ttl_days, 2);
        assert_eq!(cfg.provider.timeout_secs, 10);
        assert_eq!(cfg.player.default_voice, "en-GB-Wavenet-B");
    }

    #[test]
    fn test_env_invalid_numbers_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[
            ("VOXCACHE_CACHE_MAX_SIZE_MB", "lots"),
            ("VOXCACHE_CACHE_TTL_DAYS", "-1"),
            ("VOXCACHE_PROVIDER_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(cfg.cache.max_size_mb, 100.0);
        assert_eq!(cfg.cache.ttl_days, 30);
        assert_eq!(cfg.provider.timeout_secs, 30);
    }

    #[test]
    fn test_api_key_priority() {
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[("GOOGLE_API_KEY", "google")]));
        assert_eq!(cfg.provider.api_key.as_deref(), Some("google"));

        // Explicit voxcache variable beats GOOGLE_API_KEY.
        let mut cfg = Config::default();
        cfg.apply_env_with(env(&[
            ("GOOGLE_API_KEY", "google"),
            ("VOXCACHE_PROVIDER_API_KEY", "vox"),
        ]));
        assert_eq!(cfg.provider.api_key.as_deref(), Some("vox"));

        // A key from the config file is not replaced by GOOGLE_API_KEY.
        let mut cfg = Config::default();
        cfg.provider.api_key = Some("file".into());
        cfg.apply_env_with(env(&[("GOOGLE_API_KEY", "google")]));
        assert_eq!(cfg.provider.api_key.as_deref(), Some("file"));
    }

    #[test]
    fn test_provider_debug_masks_key() {
        let cfg = ProviderConfig {
            api_key: Some("AIzaSySECRETSECRETSECRET".into()),
            ..ProviderConfig::default()
        };
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("SECRET"));
        assert!(dbg.contains("AIzaSy...****"));
    }

    #[test]
    fn test_to_options() {
        let cfg = CacheConfig {
            dir: Some(PathBuf::from("/tmp/c")),
            max_size_mb: 2.0,
            ttl_days: 1,
        };
        let opts = cfg.to_options();
        assert_eq!(opts.dir, PathBuf::from("/tmp/c"));
        assert_eq!(opts.max_size_bytes(), 2 * 1024 * 1024);
        assert_eq!(opts.ttl_days, 1);
    }
}
