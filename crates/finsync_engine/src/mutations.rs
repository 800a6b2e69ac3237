//! Interactive write path for transactions.
//!
//! These calls only touch the local store. Records they write are dirty and
//! reach the server on the next reconciliation pass.

use crate::error::{DomainError, DomainResult};
use finsync_store::{
    Account, Identity, MonotonicClock, RecordStore, StoreError, SyncableRecord, Transaction,
};
use std::sync::Arc;

/// The account new transactions belong to.
///
/// Resolved explicitly and passed to [`TransactionService::create`]; nothing
/// caches it between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountContext {
    account_id: Identity,
}

impl AccountContext {
    /// Uses the given account.
    pub fn explicit(account_id: Identity) -> Self {
        Self { account_id }
    }

    /// Picks the first cached account.
    pub fn resolve<S: RecordStore<Account>>(store: &S) -> DomainResult<Self> {
        store
            .list()?
            .first()
            .map(|account| Self::explicit(account.identity))
            .ok_or(DomainError::NoAccount)
    }

    /// Returns the account identity.
    pub fn account_id(&self) -> Identity {
        self.account_id
    }
}

/// User-editable transaction fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    /// Category.
    pub category_id: i64,
    /// Amount in minor units; must be positive.
    pub amount: i64,
    /// ISO-8601 date.
    pub transaction_date: String,
    /// Free-form note.
    pub comment: Option<String>,
}

impl TransactionDraft {
    fn into_payload(self, account_id: i64) -> DomainResult<Transaction> {
        if self.amount <= 0 {
            return Err(DomainError::InvalidAmount(self.amount));
        }
        Ok(Transaction {
            account_id,
            category_id: self.category_id,
            amount: self.amount,
            transaction_date: self.transaction_date,
            comment: self.comment,
        })
    }
}

/// Creates, edits and deletes transactions offline.
pub struct TransactionService<S> {
    store: Arc<S>,
    clock: Arc<MonotonicClock>,
}

impl<S> TransactionService<S>
where
    S: RecordStore<Transaction> + RecordStore<Account>,
{
    /// Creates a service. Every write is stamped from `clock`.
    pub fn new(store: Arc<S>, clock: Arc<MonotonicClock>) -> Self {
        Self { store, clock }
    }

    /// Resolves the account new transactions go to.
    pub fn current_account(&self) -> DomainResult<AccountContext> {
        AccountContext::resolve(&*self.store)
    }

    /// Stores a new transaction under a placeholder identity.
    pub fn create(
        &self,
        account: &AccountContext,
        draft: TransactionDraft,
    ) -> DomainResult<SyncableRecord<Transaction>> {
        let payload = draft.into_payload(account.account_id().get())?;
        let record =
            RecordStore::<Transaction>::insert_local(&*self.store, payload, self.clock.now())?;
        tracing::info!(identity = %record.identity, "transaction created locally");
        Ok(record)
    }

    /// Replaces the editable fields of a transaction and marks it dirty.
    ///
    /// A placeholder that has since been remapped is followed to its server
    /// identity.
    pub fn edit(
        &self,
        identity: Identity,
        draft: TransactionDraft,
    ) -> DomainResult<SyncableRecord<Transaction>> {
        let current = self.live(identity)?;
        let payload = draft.into_payload(current.payload.account_id)?;
        let record = RecordStore::<Transaction>::update_local(
            &*self.store,
            current.identity,
            payload,
            self.clock.now(),
        )
        .map_err(|err| not_found_as_domain(err, identity))?;
        tracing::info!(identity = %record.identity, "transaction edited locally");
        Ok(record)
    }

    /// Soft-deletes a transaction. Returns the identity that was deleted.
    pub fn delete(&self, identity: Identity) -> DomainResult<Identity> {
        let current = self.live(identity)?;
        let deleted = RecordStore::<Transaction>::mark_dirty_deleted(
            &*self.store,
            current.identity,
            self.clock.now(),
        )
        .map_err(|err| not_found_as_domain(err, identity))?;
        tracing::info!(identity = %deleted, "transaction deleted locally");
        Ok(deleted)
    }

    /// Returns a live transaction by its current identity.
    pub fn get(&self, identity: Identity) -> DomainResult<SyncableRecord<Transaction>> {
        match RecordStore::<Transaction>::get(&*self.store, identity)? {
            Some(record) if !record.deleted => Ok(record),
            _ => Err(DomainError::NotFound(identity)),
        }
    }

    /// Lists live transactions in insertion order.
    pub fn list(&self) -> DomainResult<Vec<SyncableRecord<Transaction>>> {
        Ok(RecordStore::<Transaction>::list(&*self.store)?)
    }

    /// Lists transactions waiting for the next pass, soft-deleted ones included.
    pub fn pending(&self) -> DomainResult<Vec<SyncableRecord<Transaction>>> {
        Ok(RecordStore::<Transaction>::list_dirty(&*self.store)?)
    }

    fn live(&self, identity: Identity) -> DomainResult<SyncableRecord<Transaction>> {
        let target = RecordStore::<Transaction>::resolve(&*self.store, identity)?;
        match RecordStore::<Transaction>::get(&*self.store, target)? {
            Some(record) if record.deleted => Err(DomainError::AlreadyDeleted(target)),
            Some(record) => Ok(record),
            None => Err(DomainError::NotFound(identity)),
        }
    }
}

/// The reconciler can remove a row between the read and the write.
fn not_found_as_domain(err: StoreError, identity: Identity) -> DomainError {
    match err {
        StoreError::NotFound { .. } => DomainError::NotFound(identity),
        other => other.into(),
    }
}
