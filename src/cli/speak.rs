//! Speak command handler.

use std::path::PathBuf;

use anyhow::{Context, Result};

use voxcache::utils::audio::{format_time, generate_filename};
use voxcache::{Config, PlayerContext};

/// Resolve one utterance and write the MP3.
pub(crate) async fn cmd_speak(
    config: Config,
    text: String,
    voice: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let ctx = PlayerContext::from_config(config).with_context(|| "Failed to initialize voxcache")?;
    let voice = ctx.voice_or_default(voice.as_deref()).to_string();

    let resolved = ctx
        .speak(&text, Some(&voice))
        .await
        .with_context(|| format!("Failed to speak text with voice {}", voice))?;

    let out = out.unwrap_or_else(|| PathBuf::from(generate_filename(&text, None)));
    std::fs::write(&out, &resolved.audio)
        .with_context(|| format!("Failed to write audio to {}", out.display()))?;

    println!(
        "{}  {}  {}  {}",
        out.display(),
        format_time(resolved.duration_estimate),
        voice,
        if resolved.was_cache_hit {
            "cached"
        } else {
            "synthesized"
        }
    );
    Ok(())
}
