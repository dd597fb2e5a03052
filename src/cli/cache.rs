//! Cache inspection and maintenance command handler.

use anyhow::{bail, Context, Result};

use voxcache::cache::short_key;
use voxcache::{AudioCache, Config};

use super::CacheAction;

/// Handle `voxcache cache` subcommands.
pub(crate) fn cmd_cache(config: Config, action: CacheAction) -> Result<()> {
    let options = config.cache.to_options();
    let dir = options.dir.clone();
    let mut cache = AudioCache::open(options)
        .with_context(|| format!("Failed to open cache at {}", dir.display()))?;

    match action {
        CacheAction::Stats { json } => {
            let stats = cache.get_stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            println!("Directory:  {}", cache.dir().display());
            println!("Entries:    {}", stats.items);
            println!(
                "Size:       {:.2} MB of {:.2} MB ({:.1}%)",
                stats.size_mb, stats.max_size_mb, stats.usage_percent
            );
            println!(
                "Requests:   {} ({} hits, {} misses, {:.1}% hit rate)",
                stats.total_requests, stats.cache_hits, stats.cache_misses, stats.hit_rate
            );
        }
        CacheAction::List { limit, json } => {
            let mut rows = cache.entries();
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }

            println!(
                "{:<18} {:<20} {:>10} {:<17} {}",
                "Key", "Voice", "Size", "Last used", "Text"
            );
            println!("{}", "-".repeat(100));
            for row in rows {
                println!(
                    "{:<18} {:<20} {:>10} {:<17} {}",
                    row.short_key,
                    row.voice.as_deref().unwrap_or("?"),
                    format_size(row.size_bytes),
                    row.last_accessed.format("%Y-%m-%d %H:%M").to_string(),
                    row.text_preview.as_deref().map(one_line).unwrap_or_default(),
                );
            }
        }
        CacheAction::Delete { key } => {
            let key = key.trim();
            if key.is_empty() {
                bail!("Key must not be empty");
            }
            let matches = cache.keys_with_prefix(key);
            match matches.as_slice() {
                [] => println!("No cache entry matches {}", key),
                [only] => {
                    cache.delete(only);
                    println!("Deleted {}", short_key(only));
                }
                many => bail!(
                    "Prefix {} matches {} entries; use a longer prefix",
                    key,
                    many.len()
                ),
            }
        }
        CacheAction::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear the cache without --yes");
            }
            let removed = cache.clear();
            println!("Removed {} entries.", removed);
        }
        CacheAction::Sweep => {
            let removed = cache.sweep_expired();
            println!("Removed {} expired entries.", removed);
        }
        CacheAction::ResetStats => {
            cache.reset_stats();
            println!("Cache statistics reset.");
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Collapse newlines so a preview fits on one table row.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
