//! The record store contract.

use crate::entity::Entity;
use crate::error::StoreResult;
use crate::record::{CommitOutcome, Confirmed, Identity, SyncableRecord, Timestamp};

/// Durable per-entity table with mutation tracking.
///
/// Every write is point-in-time consistent: readers never observe a
/// partially applied commit. In particular, identity remapping deletes the
/// placeholder row and inserts the server row in one transaction.
///
/// Local mutation methods (`insert_local`, `update_local`,
/// `mark_dirty_deleted`) belong to the interactive write path. The `commit_*`
/// methods belong to the reconciler.
pub trait RecordStore<T: Entity>: Send + Sync {
    /// Returns every dirty record in insertion order.
    fn list_dirty(&self) -> StoreResult<Vec<SyncableRecord<T>>>;

    /// Returns every record that is not soft-deleted, in insertion order.
    fn list(&self) -> StoreResult<Vec<SyncableRecord<T>>>;

    /// Looks up a record by its current identity.
    ///
    /// A placeholder that has been remapped is no longer resolvable here.
    fn get(&self, identity: Identity) -> StoreResult<Option<SyncableRecord<T>>>;

    /// Follows the remap table from a placeholder to its server identity.
    ///
    /// Identities that were never remapped are returned unchanged.
    fn resolve(&self, identity: Identity) -> StoreResult<Identity>;

    /// Inserts a new dirty record under a fresh placeholder identity.
    fn insert_local(&self, payload: T, timestamp: Timestamp) -> StoreResult<SyncableRecord<T>>;

    /// Replaces the payload of an existing record and marks it dirty.
    fn update_local(
        &self,
        identity: Identity,
        payload: T,
        timestamp: Timestamp,
    ) -> StoreResult<SyncableRecord<T>>;

    /// Soft-deletes a record (`dirty = true, deleted = true`).
    ///
    /// Returns the identity the delete was applied to, which differs from the
    /// argument when a stale placeholder was followed to its server identity.
    fn mark_dirty_deleted(&self, identity: Identity, timestamp: Timestamp)
        -> StoreResult<Identity>;

    /// Swaps the placeholder row of `local` for the server row.
    ///
    /// If the row changed after `local` was read, the local payload and
    /// delete flag are carried over to the new identity and the row stays
    /// dirty.
    fn commit_create_result(
        &self,
        local: &SyncableRecord<T>,
        confirmed: &Confirmed<T>,
    ) -> StoreResult<CommitOutcome>;

    /// Stores the server payload for an updated record with `dirty = false`,
    /// unless the row changed after `local` was read.
    fn commit_update_result(
        &self,
        local: &SyncableRecord<T>,
        confirmed: &Confirmed<T>,
    ) -> StoreResult<CommitOutcome>;

    /// Physically removes a record.
    fn commit_delete_permanently(&self, identity: Identity) -> StoreResult<()>;

    /// Upserts clean server records into the cache. Dirty rows are left alone.
    fn upsert_clean(&self, records: &[Confirmed<T>], timestamp: Timestamp) -> StoreResult<()>;
}
