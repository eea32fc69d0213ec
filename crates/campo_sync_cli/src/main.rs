//! Campo Sync CLI
//!
//! Operator tools for the sync engine's SQLite store.
//!
//! # Commands
//!
//! - `process` - Replay a batch file against the store
//! - `status` - Show a device's sync status
//! - `log` - Dump a device's sync log

mod commands;

use campo_sync_engine::EngineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Campo offline sync tools.
#[derive(Parser)]
#[command(name = "campo-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite store
    #[arg(global = true, short, long)]
    db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a JSON batch file
    Process {
        /// Batch request body
        batch: PathBuf,

        /// User the batch runs for
        #[arg(short, long, default_value = "operator")]
        actor: String,

        /// Maximum operations per batch
        #[arg(long, default_value_t = campo_sync_protocol::DEFAULT_MAX_BATCH_OPERATIONS)]
        max_operations: usize,

        /// Batch deadline in seconds
        #[arg(long, default_value = "30")]
        deadline_secs: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show sync status of a device
    Status {
        /// Device identifier
        device_id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump the sync log of a device
    Log {
        /// Device identifier
        device_id: String,

        /// Maximum number of entries, newest last
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process {
            batch,
            actor,
            max_operations,
            deadline_secs,
            format,
        } => {
            let db = cli.db.ok_or("Store path required for process")?;
            let config = EngineConfig::default()
                .with_max_batch_operations(max_operations)
                .with_batch_deadline(Duration::from_secs(deadline_secs));
            commands::process::run(&db, &batch, &actor, config, &format)?;
        }
        Commands::Status { device_id, format } => {
            let db = cli.db.ok_or("Store path required for status")?;
            commands::status::run(&db, &device_id, &format)?;
        }
        Commands::Log { device_id, limit } => {
            let db = cli.db.ok_or("Store path required for log")?;
            commands::log::run(&db, &device_id, limit)?;
        }
        Commands::Version => {
            println!("Campo Sync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Store schema v{}",
                campo_sync_store::LATEST_SCHEMA_VERSION
            );
        }
    }

    Ok(())
}
