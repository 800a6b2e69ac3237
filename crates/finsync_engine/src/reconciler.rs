//! The reconciliation pass.
//!
//! A pass reads the dirty set once, then pushes each record to the remote
//! service strictly one at a time in store order. A record that changes
//! while its call is in flight is left dirty for the next pass; there is no
//! mid-pass re-scan.
//!
//! The pass holds the store's [`PassLease`] from before the scan until the
//! last commit, renewing it before each record, so two processes sharing a
//! database never push the same dirty row twice.

use crate::coordinator::{PassRunner, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{DeleteOutcome, RemoteGateway};
use async_trait::async_trait;
use finsync_store::{
    wall_millis, Account, CommitOutcome, Identity, LeaseClaim, PassLease, PendingOperation,
    PreferenceLedger, RecordStore, SyncableRecord, Transaction,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lease lifetime when none is configured.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

fn next_lease_owner() -> String {
    format!(
        "pid{}-{}",
        std::process::id(),
        NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Records created remotely and remapped to a server identity.
    pub created: u64,
    /// Records whose update the server confirmed.
    pub updated: u64,
    /// Records deleted remotely (or already gone) and removed locally.
    pub deleted: u64,
    /// Records created and deleted offline, dropped without a remote call.
    pub discarded: u64,
    /// Records left dirty because they changed while their call was in flight.
    pub skipped: u64,
    /// Records whose remote call or commit failed.
    pub failed: u64,
    /// Records not attempted because connectivity or the lease was lost
    /// mid-pass.
    pub deferred: u64,
    /// Accounts received from the account refresh.
    pub accounts_refreshed: u64,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl PassSummary {
    fn count(&mut self, applied: Applied) {
        match applied {
            Applied::Created => self.created += 1,
            Applied::Updated => self.updated += 1,
            Applied::Deleted => self.deleted += 1,
            Applied::Discarded => self.discarded += 1,
            Applied::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Created,
    Updated,
    Deleted,
    Discarded,
    Skipped,
}

/// Accumulates the outcome of a pass.
#[derive(Default)]
struct Pass {
    summary: PassSummary,
    first_error: Option<SyncError>,
}

impl Pass {
    /// Records a failure. Returns true when the rest of the pass must stop.
    fn fail(&mut self, err: SyncError) -> bool {
        let halt = matches!(err, SyncError::NoConnectivity | SyncError::LeaseLost { .. });
        if !halt {
            self.summary.failed += 1;
        }
        self.first_error.get_or_insert(err);
        halt
    }
}

/// Releases the pass lease when the pass ends, however it ends.
struct LeaseGuard<'a, L: PassLease> {
    lease: &'a L,
    owner: &'a str,
}

impl<L: PassLease> Drop for LeaseGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(err) = self.lease.release(self.owner) {
            tracing::warn!(owner = self.owner, error = %err, "failed to release sync lease");
        }
    }
}

/// Pushes dirty local state to the remote service.
pub struct Reconciler<S, G, L> {
    store: Arc<S>,
    gateway: Arc<G>,
    ledger: Arc<L>,
    refresh_accounts: bool,
    owner: String,
    lease_ttl: Duration,
}

impl<S, G, L> Reconciler<S, G, L>
where
    S: RecordStore<Transaction> + RecordStore<Account>,
    G: RemoteGateway,
    L: PreferenceLedger + PassLease,
{
    /// Creates a reconciler that also refreshes the account cache.
    ///
    /// `ledger` also provides the pass lease, so it must be backed by the
    /// same database as `store`.
    pub fn new(store: Arc<S>, gateway: Arc<G>, ledger: Arc<L>) -> Self {
        Self {
            store,
            gateway,
            ledger,
            refresh_accounts: true,
            owner: next_lease_owner(),
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Sets how long the lease lasts between renewals.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Returns the name this reconciler holds the lease under.
    pub fn lease_owner(&self) -> &str {
        &self.owner
    }

    /// Enables or disables the account cache refresh at the end of a pass.
    pub fn with_account_refresh(mut self, enabled: bool) -> Self {
        self.refresh_accounts = enabled;
        self
    }

    /// Runs one pass over every dirty record.
    ///
    /// Fails with `PassInProgress`, touching nothing, when another owner
    /// holds the lease. A failing record does not stop the others, except
    /// `NoConnectivity` and `LeaseLost`, which defer everything left. Any
    /// record failure makes the pass fail with the first error seen, and the
    /// last-sync timestamp is only advanced by a pass with no failure at all.
    /// The account refresh is best effort and never fails the pass.
    pub async fn run_pass(&self) -> SyncResult<PassSummary> {
        let start = Instant::now();
        let _lease = self.acquire_lease()?;
        let store = &*self.store;
        let mut pass = Pass::default();

        let transactions = RecordStore::<Transaction>::list_dirty(store)?;
        let accounts = RecordStore::<Account>::list_dirty(store)?;
        tracing::info!(
            transactions = transactions.len(),
            accounts = accounts.len(),
            "sync pass started"
        );

        let mut halted = false;
        for (index, record) in transactions.iter().enumerate() {
            match self.reconcile_transaction(record).await {
                Ok(applied) => pass.summary.count(applied),
                Err(err) => {
                    tracing::warn!(kind = "transaction", identity = %record.identity, error = %err, "record not synced");
                    if pass.fail(err) {
                        pass.summary.deferred += (transactions.len() - index + accounts.len()) as u64;
                        halted = true;
                        break;
                    }
                }
            }
        }

        if !halted {
            for (index, record) in accounts.iter().enumerate() {
                match self.reconcile_account(record).await {
                    Ok(applied) => pass.summary.count(applied),
                    Err(err) => {
                        tracing::warn!(kind = "account", identity = %record.identity, error = %err, "record not synced");
                        if pass.fail(err) {
                            pass.summary.deferred += (accounts.len() - index) as u64;
                            halted = true;
                            break;
                        }
                    }
                }
            }
        }

        if !halted && self.refresh_accounts {
            match self.refresh_account_cache().await {
                Ok(count) => pass.summary.accounts_refreshed = count,
                Err(SyncError::NoConnectivity) => {
                    tracing::debug!("offline, account refresh skipped");
                }
                Err(err) => tracing::warn!(error = %err, "account refresh failed"),
            }
        }

        let Pass {
            mut summary,
            first_error,
        } = pass;
        summary.duration = start.elapsed();

        match first_error {
            None => {
                self.ledger.record_sync(wall_millis())?;
                tracing::info!(
                    outcome = "success",
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    discarded = summary.discarded,
                    skipped = summary.skipped,
                    duration_ms = summary.duration.as_millis() as u64,
                    "sync pass finished"
                );
                Ok(summary)
            }
            Some(err) => {
                tracing::warn!(
                    outcome = "failure",
                    failed = summary.failed,
                    deferred = summary.deferred,
                    error = %err,
                    "sync pass finished"
                );
                Err(err)
            }
        }
    }

    fn acquire_lease(&self) -> SyncResult<LeaseGuard<'_, L>> {
        match self.claim_lease()? {
            LeaseClaim::Acquired { .. } => Ok(LeaseGuard {
                lease: &*self.ledger,
                owner: &self.owner,
            }),
            LeaseClaim::Held { owner, expires_at } => {
                tracing::info!(holder = %owner, expires_at, "sync pass already running elsewhere");
                Err(SyncError::PassInProgress { owner })
            }
        }
    }

    fn renew_lease(&self) -> SyncResult<()> {
        match self.claim_lease()? {
            LeaseClaim::Acquired { .. } => Ok(()),
            LeaseClaim::Held { owner, .. } => Err(SyncError::LeaseLost { owner }),
        }
    }

    fn claim_lease(&self) -> SyncResult<LeaseClaim> {
        Ok(self
            .ledger
            .try_acquire(&self.owner, wall_millis(), self.lease_ttl)?)
    }

    async fn reconcile_transaction(
        &self,
        record: &SyncableRecord<Transaction>,
    ) -> SyncResult<Applied> {
        self.renew_lease()?;
        let store = &*self.store;
        let identity = record.identity;
        match record.pending_operation() {
            PendingOperation::DiscardLocal => {
                RecordStore::<Transaction>::commit_delete_permanently(store, identity)?;
                tracing::debug!(%identity, "discarded record that never reached the server");
                Ok(Applied::Discarded)
            }
            PendingOperation::Delete => {
                if self.gateway.delete_transaction(identity).await? == DeleteOutcome::AlreadyGone {
                    tracing::debug!(%identity, "record already gone on server");
                }
                RecordStore::<Transaction>::commit_delete_permanently(store, identity)?;
                Ok(Applied::Deleted)
            }
            PendingOperation::Create => {
                let confirmed = self.gateway.create_transaction(&record.payload).await?;
                let outcome =
                    RecordStore::<Transaction>::commit_create_result(store, record, &confirmed)?;
                match outcome {
                    CommitOutcome::Clean => {
                        tracing::debug!(placeholder = %identity, identity = %confirmed.identity, "created");
                    }
                    CommitOutcome::StillDirty => {
                        tracing::debug!(placeholder = %identity, identity = %confirmed.identity, "created, changed in flight, kept dirty");
                    }
                    CommitOutcome::Vanished => {
                        tracing::error!(placeholder = %identity, identity = %confirmed.identity, "created remotely, but local row vanished");
                        return Err(SyncError::LocalRowVanished {
                            local: identity,
                            server: confirmed.identity,
                        });
                    }
                }
                Ok(Applied::Created)
            }
            PendingOperation::Update => {
                let confirmed = self
                    .gateway
                    .update_transaction(identity, &record.payload)
                    .await?;
                let outcome =
                    RecordStore::<Transaction>::commit_update_result(store, record, &confirmed)?;
                applied_update(identity, outcome)
            }
            PendingOperation::None => Ok(Applied::Skipped),
        }
    }

    async fn reconcile_account(&self, record: &SyncableRecord<Account>) -> SyncResult<Applied> {
        self.renew_lease()?;
        let identity = record.identity;
        match record.pending_operation() {
            PendingOperation::Update => {
                let confirmed = self
                    .gateway
                    .update_account(identity, &record.payload)
                    .await?;
                let outcome = RecordStore::<Account>::commit_update_result(
                    &*self.store,
                    record,
                    &confirmed,
                )?;
                applied_update(identity, outcome)
            }
            other => {
                tracing::warn!(%identity, operation = ?other, "account operation cannot be synced, skipped");
                Ok(Applied::Skipped)
            }
        }
    }

    async fn refresh_account_cache(&self) -> SyncResult<u64> {
        let accounts = self.gateway.fetch_accounts().await?;
        RecordStore::<Account>::upsert_clean(&*self.store, &accounts, wall_millis())?;
        tracing::debug!(count = accounts.len(), "account cache refreshed");
        Ok(accounts.len() as u64)
    }
}

fn applied_update(identity: Identity, outcome: CommitOutcome) -> SyncResult<Applied> {
    match outcome {
        CommitOutcome::Clean => Ok(Applied::Updated),
        CommitOutcome::StillDirty => {
            tracing::debug!(%identity, "changed in flight, kept dirty");
            Ok(Applied::Skipped)
        }
        CommitOutcome::Vanished => {
            tracing::error!(%identity, "updated remotely, but local row vanished");
            Err(SyncError::LocalRowVanished {
                local: identity,
                server: identity,
            })
        }
    }
}

#[async_trait]
impl<S, G, L> PassRunner for Reconciler<S, G, L>
where
    S: RecordStore<Transaction> + RecordStore<Account>,
    G: RemoteGateway,
    L: PreferenceLedger + PassLease,
{
    async fn run(&self) -> Option<SyncOutcome> {
        match self.run_pass().await {
            Ok(_) => Some(SyncOutcome::Success),
            Err(SyncError::PassInProgress { .. }) => None,
            Err(_) => Some(SyncOutcome::Failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayCall, MockGateway};
    use finsync_store::{Confirmed, LeaseClaim, MonotonicClock, PassLease, SqliteStore};

    struct Fixture {
        store: Arc<SqliteStore>,
        gateway: Arc<MockGateway>,
        clock: Arc<MonotonicClock>,
        reconciler: Reconciler<SqliteStore, MockGateway, SqliteStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_refresh(true)
    }

    fn fixture_with_refresh(refresh: bool) -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let gateway = Arc::new(MockGateway::new());
        let reconciler = Reconciler::new(store.clone(), gateway.clone(), store.clone())
            .with_account_refresh(refresh);
        Fixture {
            store,
            gateway,
            clock: Arc::new(MonotonicClock::new()),
            reconciler,
        }
    }

    fn tx(amount: i64, category: i64) -> Transaction {
        Transaction {
            account_id: 1,
            category_id: category,
            amount,
            transaction_date: "2026-03-01T10:00:00Z".into(),
            comment: None,
        }
    }

    fn account(balance: i64) -> Account {
        Account {
            name: "Checking".into(),
            balance,
            currency: "EUR".into(),
        }
    }

    fn get_tx(store: &SqliteStore, id: i64) -> Option<SyncableRecord<Transaction>> {
        RecordStore::<Transaction>::get(store, Identity::new(id)).unwrap()
    }

    fn seed_clean_tx(f: &Fixture, id: i64) {
        RecordStore::<Transaction>::upsert_clean(
            &*f.store,
            &[Confirmed {
                identity: Identity::new(id),
                payload: tx(100, 1),
            }],
            f.clock.now(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn create_remaps_placeholder_to_server_identity() {
        let f = fixture();
        let local = f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        assert_eq!(local.identity, Identity::new(-1));
        f.gateway.set_next_identity(87);

        let summary = f.reconciler.run_pass().await.unwrap();

        assert_eq!(summary.created, 1);
        let row = get_tx(&f.store, 87).unwrap();
        assert!(!row.dirty);
        assert_eq!(row.payload, tx(500, 3));
        assert!(get_tx(&f.store, -1).is_none());
        assert_eq!(RecordStore::<Transaction>::list(&*f.store).unwrap().len(), 1);
        assert!(f.store.last_sync_timestamp().unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_before_create_makes_no_call() {
        let f = fixture_with_refresh(false);
        let local = f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        RecordStore::<Transaction>::mark_dirty_deleted(&*f.store, local.identity, f.clock.now())
            .unwrap();

        let summary = f.reconciler.run_pass().await.unwrap();

        assert_eq!(summary.discarded, 1);
        assert_eq!(f.gateway.call_count(), 0);
        assert!(get_tx(&f.store, -1).is_none());
        assert!(RecordStore::<Transaction>::list_dirty(&*f.store)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn empty_pass_is_vacuous_success() {
        let f = fixture();
        let summary = f.reconciler.run_pass().await.unwrap();
        assert_eq!(summary.created + summary.updated + summary.deleted, 0);
        assert!(f.store.last_sync_timestamp().unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_pass_offline_is_vacuous_success() {
        let f = fixture();
        f.gateway.set_connected(false);

        assert_eq!(f.reconciler.run().await, Some(SyncOutcome::Success));
        assert!(f.store.last_sync_timestamp().unwrap().is_some());
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn account_refresh_failure_does_not_fail_pass() {
        let f = fixture();
        f.gateway.fail_next(500);

        let summary = f.reconciler.run_pass().await.unwrap();

        assert_eq!(summary.accounts_refreshed, 0);
        assert_eq!(f.gateway.calls(), vec![GatewayCall::FetchAccounts]);
        assert!(f.store.last_sync_timestamp().unwrap().is_some());
    }

    #[tokio::test]
    async fn pass_refused_while_lease_held_elsewhere() {
        let f = fixture();
        f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        let claim = f
            .store
            .try_acquire("other-process", wall_millis(), Duration::from_secs(60))
            .unwrap();
        assert!(claim.is_acquired());

        let result = f.reconciler.run_pass().await;
        assert!(matches!(
            result,
            Err(SyncError::PassInProgress { ref owner }) if owner == "other-process"
        ));
        assert_eq!(f.reconciler.run().await, None);
        assert_eq!(f.gateway.call_count(), 0);
        assert!(get_tx(&f.store, -1).unwrap().dirty);
        assert_eq!(f.store.last_sync_timestamp().unwrap(), None);
    }

    #[tokio::test]
    async fn lease_is_held_during_pass_and_released_after() {
        let f = fixture();
        f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        f.gateway.set_next_identity(87);

        let store = f.store.clone();
        let holder = f.reconciler.lease_owner().to_string();
        f.gateway.set_hook(move |call| {
            if matches!(call, GatewayCall::CreateTransaction(_)) {
                let claim = store
                    .try_acquire("second-process", wall_millis(), Duration::from_secs(60))
                    .unwrap();
                assert!(matches!(claim, LeaseClaim::Held { ref owner, .. } if *owner == holder));
            }
        });

        f.reconciler.run_pass().await.unwrap();

        assert_eq!(f.gateway.call_count(), 2);
        assert!(f
            .store
            .try_acquire("second-process", wall_millis(), Duration::from_secs(60))
            .unwrap()
            .is_acquired());
    }

    #[tokio::test]
    async fn lease_taken_over_mid_pass_stops_the_pass() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let gateway = Arc::new(MockGateway::new());
        let reconciler = Reconciler::new(store.clone(), gateway.clone(), store.clone())
            .with_account_refresh(false)
            .with_lease_ttl(Duration::ZERO);
        let clock = MonotonicClock::new();
        store.insert_local(tx(500, 3), clock.now()).unwrap();
        store.insert_local(tx(700, 4), clock.now()).unwrap();
        gateway.set_next_identity(87);

        let thief = store.clone();
        gateway.set_hook(move |_| {
            thief
                .try_acquire("other-process", wall_millis(), Duration::from_secs(60))
                .unwrap();
        });

        let result = reconciler.run_pass().await;

        assert!(matches!(result, Err(SyncError::LeaseLost { .. })));
        assert_eq!(gateway.call_count(), 1);
        assert!(get_tx(&store, -2).unwrap().dirty);
        assert_eq!(store.last_sync_timestamp().unwrap(), None);
    }

    #[tokio::test]
    async fn vanished_row_after_create_fails_pass() {
        let f = fixture_with_refresh(false);
        let local = f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        f.gateway.set_next_identity(87);

        let store = f.store.clone();
        let placeholder = local.identity;
        f.gateway.set_hook(move |call| {
            if matches!(call, GatewayCall::CreateTransaction(_)) {
                RecordStore::<Transaction>::commit_delete_permanently(&*store, placeholder)
                    .unwrap();
            }
        });

        let result = f.reconciler.run_pass().await;

        assert!(matches!(
            result,
            Err(SyncError::LocalRowVanished { local, server })
                if local == placeholder && server == Identity::new(87)
        ));
        assert_eq!(f.store.last_sync_timestamp().unwrap(), None);
    }

    #[tokio::test]
    async fn failing_record_does_not_block_others() {
        let f = fixture();
        f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        f.store.insert_local(tx(700, 4), f.clock.now()).unwrap();
        f.gateway.set_next_identity(87);
        f.gateway.fail_next(400);

        let result = f.reconciler.run_pass().await;

        assert!(matches!(
            result,
            Err(SyncError::Unknown { status: Some(400), .. })
        ));
        assert!(get_tx(&f.store, -1).unwrap().dirty);
        assert_eq!(get_tx(&f.store, 87).unwrap().payload, tx(700, 4));
        assert_eq!(f.store.last_sync_timestamp().unwrap(), None);
    }

    #[tokio::test]
    async fn no_connectivity_defers_whole_pass() {
        let f = fixture();
        f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        f.store.insert_local(tx(700, 4), f.clock.now()).unwrap();
        f.gateway.set_connected(false);

        let result = f.reconciler.run_pass().await;

        assert!(matches!(result, Err(SyncError::NoConnectivity)));
        assert_eq!(f.gateway.call_count(), 0);
        assert_eq!(
            RecordStore::<Transaction>::list_dirty(&*f.store).unwrap().len(),
            2
        );
        assert_eq!(f.store.last_sync_timestamp().unwrap(), None);
    }

    #[tokio::test]
    async fn delete_racing_create_is_completed_next_pass() {
        let f = fixture();
        let local = f.store.insert_local(tx(500, 3), f.clock.now()).unwrap();
        f.gateway.set_next_identity(87);

        let store = f.store.clone();
        let clock = f.clock.clone();
        let placeholder = local.identity;
        f.gateway.set_hook(move |call| {
            if matches!(call, GatewayCall::CreateTransaction(_)) {
                RecordStore::<Transaction>::mark_dirty_deleted(&*store, placeholder, clock.now())
                    .unwrap();
            }
        });

        f.reconciler.run_pass().await.unwrap();
        let row = get_tx(&f.store, 87).unwrap();
        assert!(row.dirty);
        assert!(row.deleted);

        f.reconciler.run_pass().await.unwrap();
        assert!(get_tx(&f.store, 87).is_none());
        assert!(f
            .gateway
            .calls()
            .contains(&GatewayCall::DeleteTransaction(Identity::new(87))));
    }

    #[tokio::test]
    async fn update_pushes_payload_and_cleans_row() {
        let f = fixture();
        seed_clean_tx(&f, 5);
        f.store
            .update_local(Identity::new(5), tx(900, 2), f.clock.now())
            .unwrap();

        let summary = f.reconciler.run_pass().await.unwrap();

        assert_eq!(summary.updated, 1);
        assert!(f
            .gateway
            .calls()
            .contains(&GatewayCall::UpdateTransaction(Identity::new(5), tx(900, 2))));
        assert!(!get_tx(&f.store, 5).unwrap().dirty);
    }

    #[tokio::test]
    async fn delete_tolerates_already_gone() {
        let f = fixture();
        seed_clean_tx(&f, 9);
        RecordStore::<Transaction>::mark_dirty_deleted(&*f.store, Identity::new(9), f.clock.now())
            .unwrap();
        f.gateway.mark_missing(Identity::new(9));

        let summary = f.reconciler.run_pass().await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(get_tx(&f.store, 9).is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_row() {
        let f = fixture();
        seed_clean_tx(&f, 9);
        RecordStore::<Transaction>::mark_dirty_deleted(&*f.store, Identity::new(9), f.clock.now())
            .unwrap();
        f.gateway.fail_next(500);

        assert!(f.reconciler.run_pass().await.is_err());
        let row = get_tx(&f.store, 9).unwrap();
        assert!(row.deleted);
        assert!(row.dirty);
    }

    #[tokio::test]
    async fn dirty_account_is_pushed_then_cache_refreshed() {
        let f = fixture();
        let id = Identity::new(1);
        RecordStore::<Account>::upsert_clean(
            &*f.store,
            &[Confirmed {
                identity: id,
                payload: account(100),
            }],
            f.clock.now(),
        )
        .unwrap();
        f.store.update_local(id, account(250), f.clock.now()).unwrap();
        f.gateway.set_accounts(vec![
            Confirmed {
                identity: id,
                payload: account(250),
            },
            Confirmed {
                identity: Identity::new(2),
                payload: account(0),
            },
        ]);

        let summary = f.reconciler.run_pass().await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.accounts_refreshed, 2);
        assert_eq!(
            f.gateway.calls(),
            vec![
                GatewayCall::UpdateAccount(id, account(250)),
                GatewayCall::FetchAccounts
            ]
        );
        let cached = RecordStore::<Account>::list(&*f.store).unwrap();
        assert_eq!(cached.len(), 2);
        assert!(cached.iter().all(|a| !a.dirty));
    }

    #[tokio::test]
    async fn runner_maps_result_to_outcome() {
        let f = fixture();
        assert_eq!(f.reconciler.run().await, Some(SyncOutcome::Success));
        f.store.insert_local(tx(1, 1), f.clock.now()).unwrap();
        f.gateway.fail_next(503);
        assert_eq!(f.reconciler.run().await, Some(SyncOutcome::Failure));
    }
}
