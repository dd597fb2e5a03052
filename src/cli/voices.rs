//! Voices command handler.

use anyhow::{anyhow, Context, Result};

use voxcache::{Config, GoogleTtsProvider};

/// Print the supported voices as a table.
pub(crate) async fn cmd_voices(config: Config, language: Option<String>) -> Result<()> {
    let provider = GoogleTtsProvider::from_config(&config.provider)?.ok_or_else(|| {
        anyhow!("No provider API key configured. Set VOXCACHE_PROVIDER_API_KEY or GOOGLE_API_KEY.")
    })?;

    let voices = provider
        .list_voices(language.as_deref())
        .await
        .with_context(|| "Failed to list voices")?;

    if voices.is_empty() {
        println!("No voices found.");
        return Ok(());
    }

    println!("{:<28} {:<10} {:<32}", "Name", "Language", "Description");
    println!("{}", "-".repeat(70));
    for voice in &voices {
        println!(
            "{:<28} {:<10} {:<32}",
            voice.name, voice.language_code, voice.description
        );
    }
    Ok(())
}
