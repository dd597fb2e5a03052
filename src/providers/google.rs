//! Google Cloud Text-to-Speech provider (REST, API key auth).
//!
//! Auth priority: config key → VOXCACHE_PROVIDER_API_KEY → GOOGLE_API_KEY
//! (resolved in [`crate::config`]). The key is sent as the `?key=` query
//! parameter. Audio is requested as MP3 and returned base64-encoded in
//! `audioContent`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{Result, VoxError};

use super::{parse_provider_error, SpeechSynthesizer, SynthesisRequest};

/// Text-to-Speech v1 REST API base.
pub const GOOGLE_TTS_API_BASE: &str = "https://texttospeech.googleapis.com/v1";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Voice name prefixes offered by [`GoogleTtsProvider::list_voices`].
const SUPPORTED_VOICE_PREFIXES: &[&str] = &[
    "en-US-Standard-",
    "en-GB-Standard-",
    "en-AU-Standard-",
    "en-US-Wavenet-",
    "en-GB-Wavenet-",
    "en-AU-Wavenet-",
    "en-US-Neural2-",
    "en-GB-Neural2-",
    "en-AU-Neural2-",
];

// ── Voices ───────────────────────────────────────────────────────────────────

/// A selectable voice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceInfo {
    pub name: String,
    pub language_code: String,
    /// `Male`, `Female`, `Neutral` or `Unknown`.
    pub ssml_gender: String,
    /// Human label such as `US Female Neural2 (F)`.
    pub description: String,
}

/// Map the API's SSML gender to a display label.
pub fn format_gender(ssml_gender: &str) -> &'static str {
    match ssml_gender {
        "MALE" => "Male",
        "FEMALE" => "Female",
        "NEUTRAL" => "Neutral",
        _ => "Unknown",
    }
}

fn describe_voice(name: &str, ssml_gender: &str) -> String {
    let region = if name.contains("en-US") {
        "US"
    } else if name.contains("en-GB") {
        "UK"
    } else if name.contains("en-AU") {
        "AU"
    } else {
        "EN"
    };
    let kind = if name.contains("Neural2") {
        "Neural2"
    } else if name.contains("Wavenet") {
        "WaveNet"
    } else {
        "Standard"
    };
    let id = name.rsplit('-').next().unwrap_or(name);
    format!("{} {} {} ({})", region, format_gender(ssml_gender), kind, id)
}

/// Keep supported voices from a `voices` list response, sorted by name.
pub fn filter_voices(response: &Value) -> Vec<VoiceInfo> {
    let Some(voices) = response["voices"].as_array() else {
        return Vec::new();
    };

    let mut out: Vec<VoiceInfo> = voices
        .iter()
        .filter_map(|voice| {
            let name = voice["name"].as_str()?;
            if !SUPPORTED_VOICE_PREFIXES.iter().any(|p| name.starts_with(p)) {
                return None;
            }
            let gender = voice["ssmlGender"].as_str().unwrap_or("NEUTRAL");
            let language_code = voice["languageCodes"][0]
                .as_str()
                .unwrap_or(super::DEFAULT_LANGUAGE_CODE)
                .to_string();
            Some(VoiceInfo {
                name: name.to_string(),
                language_code,
                ssml_gender: format_gender(gender).to_string(),
                description: describe_voice(name, gender),
            })
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

// ── Key helpers ──────────────────────────────────────────────────────────────

/// Whether `key` looks like a Google Cloud API key.
pub fn validate_api_key(key: &str) -> bool {
    key.starts_with("AIzaSy") && key.len() >= 39
}

/// Mask a key for display: first 6 characters then `...****`.
pub fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else if key.len() <= 10 {
        "***".to_string()
    } else {
        format!("{}...****", key.get(..6).unwrap_or(""))
    }
}

/// Escape text for embedding in an SSML `<speak>` element.
pub fn escape_ssml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Google Cloud Text-to-Speech over REST.
pub struct GoogleTtsProvider {
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl std::fmt::Debug for GoogleTtsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTtsProvider")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GoogleTtsProvider {
    /// Build a provider that authenticates with `api_key`.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoxError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: GOOGLE_TTS_API_BASE.to_string(),
            timeout,
            client,
        })
    }

    /// Point the provider at a different API base (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from provider config.
    ///
    /// Returns `Ok(None)` when no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Result<Option<Self>> {
        let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        if !validate_api_key(key) {
            warn!(
                key = %mask_api_key(key),
                "API key does not look like a Google Cloud key; using it anyway"
            );
        }
        let provider = Self::new(key, Duration::from_secs(config.timeout_secs))?;
        Ok(Some(match config.base_url.as_deref() {
            Some(url) if !url.is_empty() => provider.with_base_url(url),
            _ => provider,
        }))
    }

    /// Build the `text:synthesize` request body.
    pub fn build_request_body(&self, request: &SynthesisRequest) -> Value {
        json!({
            "input": { "ssml": format!("<speak>{}</speak>", escape_ssml(&request.text)) },
            "voice": {
                "languageCode": request.language_code,
                "name": request.voice
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": 1.0,
                "pitch": 0.0,
                "volumeGainDb": 0.0
            }
        })
    }

    /// Decode `audioContent` from a synthesize response.
    pub fn extract_audio(response: &Value) -> Result<Vec<u8>> {
        let encoded = response["audioContent"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VoxError::synthesis("No audio content in response"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| VoxError::synthesis(format!("Invalid audioContent encoding: {}", e)))
    }

    /// Fetch the supported voices, optionally filtered by language code.
    pub async fn list_voices(&self, language_code: Option<&str>) -> Result<Vec<VoiceInfo>> {
        let mut request = self
            .client
            .get(format!("{}/voices", self.base_url))
            .query(&[("key", self.api_key.as_str())]);
        if let Some(code) = language_code.filter(|c| !c.is_empty()) {
            request = request.query(&[("languageCode", code)]);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let json = self.read_json(response).await?;
        Ok(filter_voices(&json))
    }

    fn synthesize_url(&self) -> String {
        format!("{}/text:synthesize", self.base_url)
    }

    fn transport_error(&self, e: reqwest::Error) -> VoxError {
        if e.is_timeout() {
            VoxError::synthesis(format!(
                "Request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            VoxError::synthesis(format!("Network error: {}", e))
        }
    }

    /// Parse a success body as JSON, or turn an error status into a [`VoxError`].
    async fn read_json(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| VoxError::synthesis(format!("Malformed provider response: {}", e)));
        }

        let error_text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&error_text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from))
            .unwrap_or_else(|| {
                if error_text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    error_text
                }
            });
        Err(parse_provider_error(status.as_u16(), &detail))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsProvider {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        request.validate()?;
        let body = self.build_request_body(request);

        debug!(voice = %request.voice, chars = request.text.chars().count(), "Google TTS request");

        let response = self
            .client
            .post(self.synthesize_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let json = self.read_json(response).await?;
        Self::extract_audio(&json)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
