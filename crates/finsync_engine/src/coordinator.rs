//! Trigger coordination and single-flight pass execution.

use crate::config::EngineConfig;
use async_trait::async_trait;
use finsync_store::{PreferenceLedger, SyncInterval};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// Result of one reconciliation pass, as seen by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every dirty record was handled without error.
    Success,
    /// At least one record failed; dirty records stay dirty.
    Failure,
}

impl SyncOutcome {
    /// Returns the outcome name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::Failure => "failure",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What asked for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// The periodic cadence elapsed.
    Periodic,
    /// Validated internet came back.
    ConnectivityRegained,
    /// An explicit request.
    Manual,
}

impl TriggerSource {
    /// Returns the trigger name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Periodic => "periodic",
            TriggerSource::ConnectivityRegained => "connectivity",
            TriggerSource::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No pass is running.
    Idle,
    /// A pass is running.
    Running,
}

/// Result of a fire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireResult {
    /// This request ran a pass to completion.
    Completed(SyncOutcome),
    /// A pass was already running, here or in another process; the request
    /// was dropped.
    Coalesced,
}

/// Published after every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassCompleted {
    /// The trigger that started the pass.
    pub source: TriggerSource,
    /// Pass outcome.
    pub outcome: SyncOutcome,
    /// 1-based pass number since the coordinator was created.
    pub sequence: u64,
}

/// Counters kept by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
    /// Passes executed.
    pub passes: u64,
    /// Passes that ended in failure.
    pub failures: u64,
    /// Fire requests dropped because a pass was running, here or in
    /// another process.
    pub coalesced: u64,
    /// Outcome of the most recent pass.
    pub last_outcome: Option<SyncOutcome>,
}

/// Something that can run a reconciliation pass.
#[async_trait]
pub trait PassRunner: Send + Sync {
    /// Runs one pass.
    ///
    /// Returns `None` when the pass did not start because another pass
    /// against the same data is already running elsewhere.
    async fn run(&self) -> Option<SyncOutcome>;
}

/// Resets the running flag when a pass ends, including by cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs at most one pass at a time, whatever fires it.
pub struct SyncCoordinator<R: PassRunner> {
    runner: R,
    running: AtomicBool,
    stats: RwLock<CoordinatorStats>,
    outcomes: broadcast::Sender<PassCompleted>,
    fallback_interval: SyncInterval,
}

impl<R: PassRunner> SyncCoordinator<R> {
    /// Creates an idle coordinator.
    pub fn new(runner: R, config: &EngineConfig) -> Self {
        let (outcomes, _) = broadcast::channel(config.outcome_buffer.max(1));
        Self {
            runner,
            running: AtomicBool::new(false),
            stats: RwLock::new(CoordinatorStats::default()),
            outcomes,
            fallback_interval: config.fallback_interval,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> CoordinatorState {
        if self.running.load(Ordering::Acquire) {
            CoordinatorState::Running
        } else {
            CoordinatorState::Idle
        }
    }

    /// Returns the counters.
    pub fn stats(&self) -> CoordinatorStats {
        self.stats.read().clone()
    }

    /// Subscribes to pass completions.
    pub fn subscribe(&self) -> broadcast::Receiver<PassCompleted> {
        self.outcomes.subscribe()
    }

    /// Runs a pass unless one is already running.
    pub async fn fire(&self, source: TriggerSource) -> FireResult {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.write().coalesced += 1;
            tracing::debug!(trigger = %source, "pass already running, fire coalesced");
            return FireResult::Coalesced;
        }
        let guard = RunningGuard(&self.running);

        tracing::info!(trigger = %source, "sync triggered");
        let Some(outcome) = self.runner.run().await else {
            self.stats.write().coalesced += 1;
            drop(guard);
            tracing::info!(trigger = %source, "pass running elsewhere, fire coalesced");
            return FireResult::Coalesced;
        };

        let sequence = {
            let mut stats = self.stats.write();
            stats.passes += 1;
            if outcome == SyncOutcome::Failure {
                stats.failures += 1;
            }
            stats.last_outcome = Some(outcome);
            stats.passes
        };
        drop(guard);

        tracing::info!(trigger = %source, outcome = %outcome, sequence, "sync pass completed");
        // No subscribers is fine.
        let _ = self.outcomes.send(PassCompleted {
            source,
            outcome,
            sequence,
        });
        FireResult::Completed(outcome)
    }
}

impl<R: PassRunner + 'static> SyncCoordinator<R> {
    /// Starts the trigger loop.
    ///
    /// The periodic cadence is read from `ledger` every time the timer is
    /// re-armed, so interval changes apply from the next tick. Every fire is
    /// dispatched onto its own task, so a fire arriving mid-pass is coalesced
    /// rather than queued.
    pub fn spawn<L>(
        self: Arc<Self>,
        ledger: Arc<L>,
        mut edges: broadcast::Receiver<()>,
    ) -> CoordinatorHandle
    where
        L: PreferenceLedger + 'static,
    {
        let (manual_tx, mut manual_rx) = mpsc::channel(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut passes = JoinSet::new();
            let mut edges_open = true;
            let mut next_tick = Instant::now() + self.current_interval(&*ledger).as_duration();

            loop {
                let source = tokio::select! {
                    _ = tokio::time::sleep_until(next_tick) => {
                        next_tick = Instant::now() + self.current_interval(&*ledger).as_duration();
                        TriggerSource::Periodic
                    }
                    edge = edges.recv(), if edges_open => match edge {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            TriggerSource::ConnectivityRegained
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("connectivity signal closed");
                            edges_open = false;
                            continue;
                        }
                    },
                    Some(()) = manual_rx.recv() => TriggerSource::Manual,
                    Some(_) = passes.join_next(), if !passes.is_empty() => continue,
                    _ = shutdown_rx.changed() => break,
                };

                let coordinator = Arc::clone(&self);
                passes.spawn(async move { coordinator.fire(source).await });
            }

            while passes.join_next().await.is_some() {}
            tracing::debug!("trigger loop stopped");
        });

        CoordinatorHandle {
            manual: manual_tx,
            shutdown: shutdown_tx,
            task,
        }
    }

    fn current_interval<L: PreferenceLedger>(&self, ledger: &L) -> SyncInterval {
        ledger.sync_interval().unwrap_or_else(|err| {
            tracing::warn!(error = %err, fallback = %self.fallback_interval, "cannot read sync interval");
            self.fallback_interval
        })
    }
}

/// Controls a running trigger loop.
pub struct CoordinatorHandle {
    manual: mpsc::Sender<()>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    /// Requests a pass. Returns false if a request is already pending.
    pub fn request_sync(&self) -> bool {
        self.manual.try_send(()).is_ok()
    }

    /// Stops the loop and waits for any in-flight pass to finish.
    pub async fn shutdown(self) {
        // The loop may already be gone.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "trigger loop panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsync_store::SqliteStore;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    struct CountingRunner {
        executions: Arc<AtomicU64>,
        delay: Duration,
        outcome: SyncOutcome,
    }

    #[async_trait]
    impl PassRunner for CountingRunner {
        async fn run(&self) -> Option<SyncOutcome> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Some(self.outcome)
        }
    }

    /// Always finds the pass running in another process.
    struct BusyRunner;

    #[async_trait]
    impl PassRunner for BusyRunner {
        async fn run(&self) -> Option<SyncOutcome> {
            None
        }
    }

    fn coordinator(
        delay: Duration,
        outcome: SyncOutcome,
    ) -> (Arc<SyncCoordinator<CountingRunner>>, Arc<AtomicU64>) {
        let executions = Arc::new(AtomicU64::new(0));
        let runner = CountingRunner {
            executions: executions.clone(),
            delay,
            outcome,
        };
        (
            Arc::new(SyncCoordinator::new(runner, &EngineConfig::default())),
            executions,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fires_run_one_pass() {
        let (coordinator, executions) = coordinator(Duration::from_secs(5), SyncOutcome::Success);

        let (a, b) = tokio::join!(
            coordinator.fire(TriggerSource::Periodic),
            coordinator.fire(TriggerSource::Manual)
        );

        assert_eq!(a, FireResult::Completed(SyncOutcome::Success));
        assert_eq!(b, FireResult::Coalesced);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn state_returns_to_idle_after_failure() {
        let (coordinator, executions) = coordinator(Duration::from_secs(1), SyncOutcome::Failure);

        let running = Arc::clone(&coordinator);
        let pass = tokio::spawn(async move { running.fire(TriggerSource::Manual).await });
        while coordinator.state() == CoordinatorState::Idle {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.fire(TriggerSource::Periodic).await, FireResult::Coalesced);

        assert_eq!(
            pass.await.unwrap(),
            FireResult::Completed(SyncOutcome::Failure)
        );
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        coordinator.fire(TriggerSource::Manual).await;
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        let stats = coordinator.stats();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.last_outcome, Some(SyncOutcome::Failure));
    }

    #[tokio::test]
    async fn pass_running_elsewhere_is_coalesced() {
        let coordinator = SyncCoordinator::new(BusyRunner, &EngineConfig::default());
        let mut rx = coordinator.subscribe();

        assert_eq!(coordinator.fire(TriggerSource::Manual).await, FireResult::Coalesced);

        let stats = coordinator.stats();
        assert_eq!(stats.passes, 0);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.last_outcome, None);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn completion_is_published() {
        let (coordinator, _) = coordinator(Duration::ZERO, SyncOutcome::Success);
        let mut rx = coordinator.subscribe();

        coordinator.fire(TriggerSource::ConnectivityRegained).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            PassCompleted {
                source: TriggerSource::ConnectivityRegained,
                outcome: SyncOutcome::Success,
                sequence: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_tick_uses_ledger_interval() {
        let ledger = Arc::new(SqliteStore::open_in_memory().unwrap());
        ledger
            .set_sync_interval(SyncInterval::FifteenMinutes)
            .unwrap();
        let (coordinator, _) = coordinator(Duration::ZERO, SyncOutcome::Success);
        let mut rx = coordinator.subscribe();
        let (_edges_tx, edges_rx) = broadcast::channel(1);

        let start = Instant::now();
        let handle = Arc::clone(&coordinator).spawn(ledger, edges_rx);

        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.source, TriggerSource::Periodic);
        assert_eq!(start.elapsed(), Duration::from_secs(15 * 60));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_edge_and_manual_request_fire() {
        let ledger = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (coordinator, executions) = coordinator(Duration::ZERO, SyncOutcome::Success);
        let mut rx = coordinator.subscribe();
        let (edges_tx, edges_rx) = broadcast::channel(1);

        let handle = Arc::clone(&coordinator).spawn(ledger, edges_rx);

        edges_tx.send(()).unwrap();
        assert_eq!(
            rx.recv().await.unwrap().source,
            TriggerSource::ConnectivityRegained
        );

        assert!(handle.request_sync());
        assert_eq!(rx.recv().await.unwrap().source, TriggerSource::Manual);

        handle.shutdown().await;
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_pass() {
        let ledger = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (coordinator, executions) = coordinator(Duration::from_secs(30), SyncOutcome::Success);
        let (_edges_tx, edges_rx) = broadcast::channel(1);

        let handle = Arc::clone(&coordinator).spawn(ledger, edges_rx);
        assert!(handle.request_sync());
        while coordinator.state() == CoordinatorState::Idle {
            tokio::task::yield_now().await;
        }

        handle.shutdown().await;
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.stats().passes, 1);
    }
}
