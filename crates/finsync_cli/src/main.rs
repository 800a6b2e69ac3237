//! finsync CLI
//!
//! Offline-first transaction bookkeeping against a remote finsync service.
//!
//! # Commands
//!
//! - `add` / `edit` / `delete` - Local mutations, applied without the network
//! - `list` - Show cached transactions
//! - `sync` - Run one reconciliation pass
//! - `run` - Sync on a schedule, on reconnect and on request
//! - `interval` - Show or change the sync cadence
//! - `status` - Show pending work and the last successful sync

mod commands;
mod context;
mod error;
mod remote;

use clap::{Parser, Subcommand};
use context::AppContext;
use finsync_engine::EngineConfig;
use finsync_store::SyncInterval;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline-first finance sync client.
#[derive(Parser)]
#[command(name = "finsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local database file
    #[arg(global = true, short, long, default_value = "finsync.db")]
    db: PathBuf,

    /// Base URL of the remote service
    #[arg(
        global = true,
        short,
        long,
        env = "FINSYNC_SERVER",
        default_value = "http://localhost:8080"
    )]
    server: String,

    /// Bearer token for the remote service
    #[arg(global = true, long, env = "FINSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new transaction locally
    Add {
        /// Amount in minor units
        #[arg(short, long)]
        amount: i64,

        /// Category ID
        #[arg(short, long)]
        category: i64,

        /// Transaction date (ISO-8601)
        #[arg(long)]
        date: String,

        /// Optional note
        #[arg(long)]
        comment: Option<String>,

        /// Owning account (defaults to the first cached account)
        #[arg(long)]
        account: Option<i64>,
    },

    /// Replace a transaction's fields locally
    Edit {
        /// Transaction identity (placeholders are negative)
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Amount in minor units
        #[arg(short, long)]
        amount: i64,

        /// Category ID
        #[arg(short, long)]
        category: i64,

        /// Transaction date (ISO-8601)
        #[arg(long)]
        date: String,

        /// Optional note
        #[arg(long)]
        comment: Option<String>,
    },

    /// Delete a transaction locally
    Delete {
        /// Transaction identity (placeholders are negative)
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// List cached transactions
    List {
        /// Only show records waiting to be synced, deleted ones included
        #[arg(long)]
        dirty: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one reconciliation pass now
    Sync,

    /// Keep syncing until interrupted
    Run {
        /// Seconds between reachability probes
        #[arg(long, default_value = "30")]
        probe_interval: u64,
    },

    /// Show or change the periodic sync interval
    Interval {
        /// New interval (15m, 30m, 1h, 2h, 6h, 12h, 24h)
        tier: Option<SyncInterval>,
    },

    /// Show pending work and the last successful sync
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = EngineConfig::new(cli.server.as_str());
    let open = || AppContext::open(&cli.db, config.clone(), cli.token.clone());

    match cli.command {
        Commands::Add {
            amount,
            category,
            date,
            comment,
            account,
        } => {
            let draft = commands::records::draft(amount, category, date, comment);
            commands::records::add(&open()?, account, draft)?;
        }
        Commands::Edit {
            id,
            amount,
            category,
            date,
            comment,
        } => {
            let draft = commands::records::draft(amount, category, date, comment);
            commands::records::edit(&open()?, id, draft)?;
        }
        Commands::Delete { id } => {
            commands::records::delete(&open()?, id)?;
        }
        Commands::List { dirty, format } => {
            commands::records::list(&open()?, dirty, &format)?;
        }
        Commands::Sync => {
            commands::sync::once(&open()?).await?;
        }
        Commands::Run { probe_interval } => {
            let probe_interval = Duration::from_secs(probe_interval.max(1));
            commands::sync::daemon(&open()?, probe_interval).await?;
        }
        Commands::Interval { tier } => {
            commands::settings::interval(&open()?, tier)?;
        }
        Commands::Status { format } => {
            commands::settings::status(&open()?, &format)?;
        }
        Commands::Version => {
            println!("finsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
