//! Speech synthesis providers.
//!
//! [`SpeechSynthesizer`] is the narrow contract the resolver depends on:
//! text + voice + language code in, encoded audio bytes out.

pub mod google;

pub use google::{GoogleTtsProvider, VoiceInfo};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VoxError};

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "en-US-Standard-F";

/// Language code used when the voice name doesn't carry one.
pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";

/// Longest text accepted by a single synthesis request.
pub const MAX_TEXT_CHARS: usize = 5000;

static VOICE_LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]{2,3}-[A-Z]{2})-").expect("valid voice language regex"));

/// One synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub language_code: String,
}

impl SynthesisRequest {
    /// Build a request, deriving the language code from the voice name.
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        let voice = voice.into();
        let language_code = language_code_for_voice(&voice, DEFAULT_LANGUAGE_CODE);
        Self {
            text: text.into(),
            voice,
            language_code,
        }
    }

    pub fn with_language_code(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = language_code.into();
        self
    }

    /// Reject requests the provider would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(VoxError::synthesis_status(400, "Text is required"));
        }
        let chars = self.text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(VoxError::synthesis_status(
                400,
                format!("Text too long ({} characters, max {})", chars, MAX_TEXT_CHARS),
            ));
        }
        Ok(())
    }
}

/// Converts text to encoded audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `request`, returning encoded audio bytes.
    ///
    /// Any failure is a [`VoxError::Synthesis`].
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;
}

/// Extract the language code prefix of a voice name.
///
/// `"en-US-Neural2-D"` gives `"en-US"`; names without that shape give `fallback`.
pub fn language_code_for_voice(voice: &str, fallback: &str) -> String {
    VOICE_LANGUAGE_RE
        .captures(voice)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Map a failed provider response to a synthesis error.
pub fn parse_provider_error(status: u16, detail: &str) -> VoxError {
    let message = match status {
        401 | 403 => format!("Authentication failed (check API key): {}", detail),
        429 => format!("Quota exceeded: {}", detail),
        _ => detail.to_string(),
    };
    VoxError::synthesis_status(status, message)
}
