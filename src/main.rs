//! voxcache command-line front-end.

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    cli::init_tracing(args.verbose, args.log_json);
    cli::run(args).await
}
