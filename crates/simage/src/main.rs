//! simage CLI - batch perceptual hashing for near-duplicate image detection.
//!
//! simage walks files or directories, computes a 64-bit perceptual hash per
//! image, and appends the results to a JSONL record store. Images that cannot
//! be decoded are recorded as bad files so later scans skip them.
//!
//! # Usage
//!
//! ```bash
//! # Hash a directory into the default record store
//! simage hash ./photos/
//!
//! # Write to a specific store, re-hashing everything
//! simage hash ./photos/ --output hashes.jsonl --rescan
//!
//! # Route hashing through the request/result message protocol
//! simage hash ./photos/ --distributed
//!
//! # View configuration
//! simage config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// simage - batch perceptual hashing for near-duplicate image detection.
#[derive(Parser, Debug)]
#[command(name = "simage")]
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
    /// Compute perceptual hashes for images
    Hash(cli::hash::HashArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match simage_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `simage config path`."
            );
            simage_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("simage v{}", simage_core::VERSION);

    match cli.command {
        Commands::Hash(args) => cli::hash::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
