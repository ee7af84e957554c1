//! searchsync — incremental search index synchronization.
//!
//! # Usage
//!
//! ```text
//! searchsync sync [--config searchsync.yml] [--local-index-dir <dir>] [--dry-run] [--json]
//! searchsync status [--config searchsync.yml] [--json]
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "searchsync",
    version,
    about = "Reconcile local record sets into search indexes",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload changed records, remove stale ones, and swap rebuilt indexes.
    Sync(SyncArgs),

    /// Show what the hash cache tracks and when the job last synced.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
