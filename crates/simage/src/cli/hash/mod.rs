//! The `simage hash` command.

mod distributed;
mod local;
mod progress;
mod setup;

use clap::Args;
use simage_core::pipeline::DiscoveredFile;
use simage_core::FileDiscovery;
use simage_core::Config;
use std::path::PathBuf;

use distributed::run_distributed;
use local::run_local;
use setup::setup_hash;

/// Arguments for the `hash` command.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Image file or directory to hash
    #[arg(required = true)]
    pub input: PathBuf,

    /// Record store to append to (defaults to `output.path` from the config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of hashing workers (defaults to one less than the core count)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum batches in flight before submission blocks
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// Images per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Hash every image again, even those already in the record store
    #[arg(long)]
    pub rescan: bool,

    /// Send images through the request/result message protocol instead of
    /// the local pool
    #[arg(long)]
    pub distributed: bool,
}

/// Everything the hashing runs need, assembled by `setup_hash`.
pub(crate) struct HashContext {
    pub config: Config,
    pub output: PathBuf,
    pub files: Vec<DiscoveredFile>,
    /// Images skipped because the record store already knows them
    pub skipped: usize,
}

/// Execute the hash command.
pub async fn execute(args: HashArgs, config: Config) -> anyhow::Result<()> {
    let ctx = setup_hash(&args, config)?;

    if ctx.files.is_empty() {
        if ctx.skipped > 0 {
            tracing::info!(
                "All {} images are already in {:?}; use --rescan to hash them again",
                ctx.skipped,
                ctx.output
            );
        } else {
            tracing::warn!("No supported image files found at {:?}", args.input);
        }
        return Ok(());
    }
    tracing::info!(
        "Found {} image(s) to hash ({:.1} MB)",
        ctx.files.len(),
        FileDiscovery::total_size(&ctx.files) as f64 / (1024.0 * 1024.0)
    );

    let summary = if args.distributed {
        run_distributed(ctx).await?
    } else {
        run_local(ctx).await?
    };
    summary.print();
    Ok(())
}
