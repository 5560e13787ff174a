//! Filigree CLI - batch watermarking with a concurrent chunked pipeline.
//!
//! Every image in a directory is split into pixel chunks, the chunks are
//! blended with a watermark in parallel, and each image is reassembled and
//! saved exactly once into an output subdirectory.
//!
//! # Usage
//!
//! ```bash
//! # Watermark a directory at 40% intensity
//! filigree mark -s ./photos -w logo.png -i 40
//!
//! # Compare topologies
//! filigree mark -s ./photos -w logo.png -p staged-pool -n 8 --format json
//!
//! # View configuration
//! filigree config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Filigree - batch watermarking with a concurrent chunked pipeline.
#[derive(Parser, Debug)]
#[command(name = "filigree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Watermark every image in a directory
    Mark(cli::mark::MarkArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match filigree_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `filigree config path`."
            );
            filigree_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Filigree v{}", filigree_core::VERSION);

    match cli.command {
        Commands::Mark(args) => cli::mark::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
