//! Error types for voxcache.
//!
//! Only configuration and synthesis failures cross the resolver boundary.
//! Cache storage problems are absorbed inside [`crate::cache`] and turned
//! into misses or "not cached" outcomes.

use thiserror::Error;

/// Errors surfaced by the library to its callers.
#[derive(Debug, Error)]
pub enum VoxError {
    /// Required credential or configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The synthesis provider call failed (network, auth, bad response).
    #[error("Synthesis failed: {message}")]
    Synthesis {
        /// HTTP-style status returned by the provider, when there was one.
        status: Option<u16>,
        /// Provider-supplied detail.
        message: String,
    },

    /// Filesystem error outside the cache (config files, exports).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error outside the cache.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VoxError {
    /// Build a synthesis error with no HTTP status (transport failures, decode errors).
    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis {
            status: None,
            message: message.into(),
        }
    }

    /// Build a synthesis error carrying the provider's HTTP status.
    pub fn synthesis_status(status: u16, message: impl Into<String>) -> Self {
        Self::Synthesis {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns `true` for errors the user can fix by changing configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, VoxError>;
