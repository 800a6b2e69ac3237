//! Sync settings and status commands.

use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use finsync_store::{
    wall_millis, Account, PreferenceLedger, RecordStore, SyncInterval, Timestamp, Transaction,
};
use serde::Serialize;

/// Output of the status command.
#[derive(Debug, Serialize)]
pub struct StatusView {
    /// End of the last successful pass, Unix milliseconds.
    pub last_sync_timestamp: Option<Timestamp>,
    /// Periodic cadence.
    pub sync_interval: String,
    /// Transactions waiting for the next pass.
    pub pending_transactions: usize,
    /// Accounts waiting for the next pass.
    pub pending_accounts: usize,
    /// Cached accounts.
    pub cached_accounts: usize,
}

/// Runs the interval command.
pub fn interval(ctx: &AppContext, tier: Option<SyncInterval>) -> CliResult<()> {
    let store = ctx.store();
    match tier {
        Some(tier) => {
            store.set_sync_interval(tier)?;
            println!("Sync interval set to {tier}");
        }
        None => {
            let current = store.sync_interval()?;
            for tier in SyncInterval::ALL {
                let marker = if tier == current { "*" } else { " " };
                println!("{marker} {tier}");
            }
        }
    }
    Ok(())
}

/// Collects the status fields.
pub fn status_view(ctx: &AppContext) -> CliResult<StatusView> {
    let store = &**ctx.store();
    let preferences = store.preferences()?;
    Ok(StatusView {
        last_sync_timestamp: preferences.last_sync_timestamp,
        sync_interval: preferences.sync_interval.to_string(),
        pending_transactions: RecordStore::<Transaction>::list_dirty(store)?.len(),
        pending_accounts: RecordStore::<Account>::list_dirty(store)?.len(),
        cached_accounts: RecordStore::<Account>::list(store)?.len(),
    })
}

/// Runs the status command.
pub fn status(ctx: &AppContext, format: &str) -> CliResult<()> {
    let view = status_view(ctx)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        "text" => {
            let last = match view.last_sync_timestamp {
                Some(ts) => format!("{} ago", format_age(wall_millis() - ts)),
                None => "never".to_string(),
            };
            println!("Last successful sync: {last}");
            println!("Sync interval:        {}", view.sync_interval);
            println!("Pending transactions: {}", view.pending_transactions);
            println!("Pending accounts:     {}", view.pending_accounts);
            println!("Cached accounts:      {}", view.cached_accounts);
        }
        other => return Err(CliError::UnknownFormat(other.to_string())),
    }
    Ok(())
}

/// Formats a millisecond age with its largest whole unit.
fn format_age(millis: i64) -> String {
    let secs = millis.max(0) / 1000;
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}
