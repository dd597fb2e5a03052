//! Command-line interface: argument types and dispatch.

mod cache;
mod export;
mod speak;
mod voices;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxcache::Config;

#[derive(Parser, Debug)]
#[command(name = "voxcache", version, about = "Cached text-to-speech from the command line")]
pub(crate) struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Debug-level logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Cache directory (overrides config and VOXCACHE_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Speak one utterance into an MP3 file
    Speak {
        /// Text to speak
        text: String,
        /// Voice name, e.g. en-US-Neural2-F
        #[arg(short, long)]
        voice: Option<String>,
        /// Output file (defaults to a name derived from the text)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List supported provider voices
    Voices {
        /// Language code filter, e.g. en-GB
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Speak every line of a text file and package the tracks as a ZIP
    Export {
        /// Text file with one utterance per line
        input: PathBuf,
        /// ZIP file to write
        #[arg(short, long)]
        out: PathBuf,
        /// Voice name
        #[arg(short, long)]
        voice: Option<String>,
    },
    /// Inspect and manage the audio cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum CacheAction {
    /// Show size and hit/miss statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// List entries, most recently used first
    List {
        /// Show at most this many entries
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Delete one entry by key or unique key prefix
    Delete { key: String },
    /// Delete every entry
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Remove expired entries now
    Sweep,
    /// Zero the hit/miss/request counters
    ResetStats,
}

/// Install the global tracing subscriber. Logs go to stderr.
///
/// `RUST_LOG` takes precedence over `verbose`.
pub(crate) fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "voxcache=debug" } else { "voxcache=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

/// Load configuration, apply global flags, and run the chosen command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().with_context(|| "Failed to load configuration")?;
    if let Some(dir) = cli.cache_dir {
        config.cache.dir = Some(dir);
    }

    match cli.command {
        Commands::Speak { text, voice, out } => speak::cmd_speak(config, text, voice, out).await,
        Commands::Voices { language } => voices::cmd_voices(config, language).await,
        Commands::Export { input, out, voice } => {
            export::cmd_export(config, input, out, voice).await
        }
        Commands::Cache { action } => cache::cmd_cache(config, action),
    }
}
