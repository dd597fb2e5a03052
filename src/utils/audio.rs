//! Audio helpers: duration estimates, time formatting, export naming and
//! ZIP packaging.

use std::io::{Cursor, Write};

use once_cell::sync::Lazy;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Result, VoxError};

/// Seconds of speech per character used by [`estimate_duration`].
pub const SECONDS_PER_CHAR: f64 = 0.15;

/// Length of the text preview stored with cached audio.
pub const TEXT_PREVIEW_CHARS: usize = 100;

/// Characters of the text used in an export filename.
const FILENAME_TEXT_CHARS: usize = 30;

static FILENAME_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid filename strip regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Cheap duration estimate: a fixed time per character.
pub fn estimate_duration(text: &str) -> f64 {
    text.chars().count() as f64 * SECONDS_PER_CHAR
}

/// Format seconds as `MM:SS`. Negative or non-finite input gives `00:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00".to_string();
    }
    let total = seconds as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// First [`TEXT_PREVIEW_CHARS`] characters of `text`.
pub fn text_preview(text: &str) -> String {
    text.chars().take(TEXT_PREVIEW_CHARS).collect()
}

/// Filename for an exported track, e.g. `01_Hello_world.mp3`.
///
/// Uses the first 30 characters of the text with punctuation stripped and
/// whitespace runs turned into underscores. `index` is zero-based.
pub fn generate_filename(text: &str, index: Option<usize>) -> String {
    let head: String = text.chars().take(FILENAME_TEXT_CHARS).collect();
    let stripped = FILENAME_STRIP_RE.replace_all(&head, "");
    let mut clean = WHITESPACE_RE
        .replace_all(stripped.trim(), "_")
        .into_owned();
    if clean.is_empty() {
        clean = "track".to_string();
    }
    match index {
        Some(i) => format!("{:02}_{}.mp3", i + 1, clean),
        None => format!("{}.mp3", clean),
    }
}

/// Package `(filename, bytes)` pairs into an in-memory ZIP (deflate).
pub fn create_zip(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| VoxError::Io(std::io::Error::other(e)))?;
        writer.write_all(bytes)?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| VoxError::Io(std::io::Error::other(e)))?;
    Ok(cursor.into_inner())
}
