//! Versioned on-disk payload format for cached audio.
//!
//! # Layout
//!
//! ```text
//! +------+----------------+------------------+-------------------+
//! | VXC1 | header_len u32 | JSON header      | raw audio bytes   |
//! |  4B  | little-endian  | header_len bytes | rest of the file  |
//! +------+----------------+------------------+-------------------+
//! ```
//!
//! The header carries the small metadata (`duration_estimate`,
//! `text_preview`, `voice`). A new layout gets a new magic, so old readers
//! reject it as corrupt instead of misreading it.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::CacheError;

/// Magic prefix of the current payload format.
pub const PAYLOAD_MAGIC: &[u8; 4] = b"VXC1";

/// Upper bound on the JSON header, so a garbage length can't trigger a huge read.
const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Cached value: the audio plus the metadata stored next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAudio {
    /// Encoded audio (MP3 from the default provider).
    pub audio: Vec<u8>,
    /// Estimated playback duration in seconds.
    pub duration_estimate: f64,
    /// Bounded prefix of the source text. Inspection only.
    pub text_preview: String,
    /// Voice the audio was synthesized with.
    pub voice: String,
}

/// Metadata portion of a payload file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadHeader {
    pub duration_estimate: f64,
    pub text_preview: String,
    pub voice: String,
}

/// Serialize a cached value into the on-disk representation.
pub fn encode(value: &CachedAudio) -> Result<Vec<u8>, CacheError> {
    let header = PayloadHeader {
        duration_estimate: value.duration_estimate,
        text_preview: value.text_preview.clone(),
        voice: value.voice.clone(),
    };
    let header_json = serde_json::to_vec(&header)
        .map_err(|e| CacheError::Write(format!("failed to encode payload header: {}", e)))?;
    let header_len = u32::try_from(header_json.len())
        .ok()
        .filter(|len| *len <= MAX_HEADER_LEN)
        .ok_or_else(|| CacheError::Write("payload header too large".into()))?;

    let mut out = Vec::with_capacity(8 + header_json.len() + value.audio.len());
    out.extend_from_slice(PAYLOAD_MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&value.audio);
    Ok(out)
}

/// Parse a full payload file.
pub fn decode(bytes: &[u8]) -> Result<CachedAudio, CacheError> {
    let (header, body_start) = parse_header(bytes)?;
    Ok(CachedAudio {
        audio: bytes[body_start..].to_vec(),
        duration_estimate: header.duration_estimate,
        text_preview: header.text_preview,
        voice: header.voice,
    })
}

/// Read only the header of a payload file, without loading the audio.
pub fn read_header(path: &Path) -> Result<PayloadHeader, CacheError> {
    let mut file = File::open(path)?;
    let mut prefix = [0u8; 8];
    file.read_exact(&mut prefix)
        .map_err(|e| CacheError::Corrupt(format!("truncated payload prefix: {}", e)))?;
    let header_len = check_prefix(&prefix)?;
    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)
        .map_err(|e| CacheError::Corrupt(format!("truncated payload header: {}", e)))?;
    serde_json::from_slice(&header)
        .map_err(|e| CacheError::Corrupt(format!("invalid payload header: {}", e)))
}

fn parse_header(bytes: &[u8]) -> Result<(PayloadHeader, usize), CacheError> {
    let prefix = bytes
        .get(..8)
        .ok_or_else(|| CacheError::Corrupt("truncated payload prefix".into()))?;
    let header_len = check_prefix(prefix)? as usize;
    let header_end = 8 + header_len;
    let header_bytes = bytes
        .get(8..header_end)
        .ok_or_else(|| CacheError::Corrupt("truncated payload header".into()))?;
    let header = serde_json::from_slice(header_bytes)
        .map_err(|e| CacheError::Corrupt(format!("invalid payload header: {}", e)))?;
    Ok((header, header_end))
}

fn check_prefix(prefix: &[u8]) -> Result<u32, CacheError> {
    if &prefix[..4] != PAYLOAD_MAGIC {
        return Err(CacheError::Corrupt("unknown payload magic".into()));
    }
    let header_len = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    if header_len > MAX_HEADER_LEN {
        return Err(CacheError::Corrupt(format!(
            "payload header length {} exceeds limit",
            header_len
        )));
    }
    Ok(header_len)
}
