//! Export command handler.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use voxcache::utils::audio::{create_zip, format_time, generate_filename};
use voxcache::utils::playlist::load_playlist;
use voxcache::{BatchItem, Config, PlayerContext, VoxError};

/// Speak every line of `input` and write the tracks to a ZIP at `out`.
///
/// Lines that fail are reported and left out; the export fails only when
/// no line could be resolved.
pub(crate) async fn cmd_export(
    config: Config,
    input: PathBuf,
    out: PathBuf,
    voice: Option<String>,
) -> Result<()> {
    let lines = load_playlist(&input)
        .with_context(|| format!("Failed to load lines from {}", input.display()))?;

    let ctx = PlayerContext::from_config(config).with_context(|| "Failed to initialize voxcache")?;
    let voice = ctx.voice_or_default(voice.as_deref()).to_string();

    let items = ctx.resolver().resolve_batch(lines.as_slice(), &voice).await;
    let total = items.len();
    let export = collect_tracks(items);

    for (index, text, err) in &export.failures {
        eprintln!("Line {} failed ({}): {}", index + 1, preview(text), err);
    }
    if export.files.is_empty() {
        bail!("No lines could be spoken; nothing exported");
    }

    let archive = create_zip(&export.files).with_context(|| "Failed to build ZIP archive")?;
    std::fs::write(&out, archive)
        .with_context(|| format!("Failed to write archive to {}", out.display()))?;

    println!(
        "Exported {} of {} tracks ({} total, {} from cache) to {}",
        export.files.len(),
        total,
        format_time(export.duration),
        export.cache_hits,
        out.display()
    );
    Ok(())
}

/// Resolved tracks ready to package, plus the lines that failed.
#[derive(Debug, Default)]
struct Export {
    files: Vec<(String, Vec<u8>)>,
    failures: Vec<(usize, String, VoxError)>,
    duration: f64,
    cache_hits: usize,
}

fn collect_tracks(items: Vec<BatchItem>) -> Export {
    let mut export = Export::default();
    for item in items {
        match item.result {
            Ok(resolved) => {
                export.duration += resolved.duration_estimate;
                if resolved.was_cache_hit {
                    export.cache_hits += 1;
                }
                let name = generate_filename(&item.text, Some(item.index));
                export.files.push((name, resolved.audio));
            }
            Err(e) => export.failures.push((item.index, item.text, e)),
        }
    }
    export
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(40).collect();
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head
    }
}
