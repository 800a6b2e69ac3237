//! One-shot sync and the long-running daemon.

use crate::context::AppContext;
use crate::error::CliResult;
use crate::remote::Reachability;
use finsync_engine::{ConnectivityMonitor, SyncCoordinator, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

/// Runs the sync command.
///
/// Does nothing when another process (such as `finsync run`) is mid-pass on
/// the same database.
pub async fn once(ctx: &AppContext) -> CliResult<()> {
    let reachable = ctx.reachability()?.check().await;
    let monitor = Arc::new(ConnectivityMonitor::new(reachable));
    let reconciler = ctx.reconciler(monitor)?;

    let summary = match reconciler.run_pass().await {
        Ok(summary) => summary,
        Err(SyncError::PassInProgress { owner }) => {
            println!("Sync already in progress ({owner}); nothing to do");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    println!(
        "Sync complete: {} created, {} updated, {} deleted, {} discarded, {} left dirty ({} ms)",
        summary.created,
        summary.updated,
        summary.deleted,
        summary.discarded,
        summary.skipped,
        summary.duration.as_millis()
    );
    Ok(())
}

/// Runs the run command until Ctrl-C.
///
/// Passes fire on the stored cadence, when the server becomes reachable,
/// and when Enter is pressed.
pub async fn daemon(ctx: &AppContext, probe_interval: Duration) -> CliResult<()> {
    let probe = ctx.reachability()?;
    // Starts unreachable so the first successful probe fires a pass.
    let monitor = Arc::new(ConnectivityMonitor::new(false));
    let edges = monitor.subscribe();
    let reconciler = ctx.reconciler(Arc::clone(&monitor))?;

    let coordinator = Arc::new(SyncCoordinator::new(reconciler, ctx.config()));
    let mut completions = coordinator.subscribe();
    let handle = Arc::clone(&coordinator).spawn(Arc::clone(ctx.store()), edges);

    let watcher = tokio::spawn(watch_reachability(probe, monitor, probe_interval));
    let reporter = tokio::spawn(async move {
        loop {
            match completions.recv().await {
                Ok(done) => println!("[pass {}] {} ({})", done.sequence, done.outcome, done.source),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("finsync running; press Enter to sync now, Ctrl-C to stop");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(_) => {
                    if !handle.request_sync() {
                        println!("sync already requested");
                    }
                }
                None => stdin_open = false,
            },
        }
    }

    watcher.abort();
    handle.shutdown().await;
    reporter.abort();

    let stats = coordinator.stats();
    println!(
        "Stopped after {} passes ({} failed, {} coalesced)",
        stats.passes, stats.failures, stats.coalesced
    );
    Ok(())
}

async fn watch_reachability(
    probe: Reachability,
    monitor: Arc<ConnectivityMonitor>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        monitor.report(probe.check().await);
    }
}
