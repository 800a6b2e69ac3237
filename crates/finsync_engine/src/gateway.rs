//! Remote gateway abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use finsync_store::{Account, Confirmed, Identity, Transaction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Executes create/update/delete operations against the remote service.
///
/// Implementations check connectivity before every call, attach the bearer
/// credential, and retry transient server failures.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Creates a transaction. Returns the server's copy with its identity.
    async fn create_transaction(&self, payload: &Transaction) -> SyncResult<Confirmed<Transaction>>;

    /// Replaces a transaction's payload.
    async fn update_transaction(
        &self,
        identity: Identity,
        payload: &Transaction,
    ) -> SyncResult<Confirmed<Transaction>>;

    /// Deletes a transaction. "Already gone" is not an error.
    async fn delete_transaction(&self, identity: Identity) -> SyncResult<DeleteOutcome>;

    /// Lists the user's accounts.
    async fn fetch_accounts(&self) -> SyncResult<Vec<Confirmed<Account>>>;

    /// Replaces an account's editable fields.
    async fn update_account(
        &self,
        identity: Identity,
        payload: &Account,
    ) -> SyncResult<Confirmed<Account>>;
}

/// How a remote delete ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The server removed the record.
    Deleted,
    /// The server had no such record.
    AlreadyGone,
}

/// Wire shape of a server record: the payload fields plus `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord<T> {
    /// Server identity.
    pub id: i64,
    /// Payload fields, flattened next to `id`.
    #[serde(flatten)]
    pub fields: T,
}

impl<T> From<ServerRecord<T>> for Confirmed<T> {
    fn from(record: ServerRecord<T>) -> Self {
        Confirmed {
            identity: Identity::new(record.id),
            payload: record.fields,
        }
    }
}

/// Maps a terminal HTTP status to the error taxonomy.
pub(crate) fn status_error(status: u16, message: impl Into<String>) -> SyncError {
    let message = message.into();
    if (500..600).contains(&status) {
        SyncError::ServerError {
            status: Some(status),
            message,
        }
    } else {
        SyncError::Unknown {
            status: Some(status),
            message,
        }
    }
}

/// A call observed by [`MockGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    /// `create_transaction`.
    CreateTransaction(Transaction),
    /// `update_transaction`.
    UpdateTransaction(Identity, Transaction),
    /// `delete_transaction`.
    DeleteTransaction(Identity),
    /// `fetch_accounts`.
    FetchAccounts,
    /// `update_account`.
    UpdateAccount(Identity, Account),
}

type Hook = Box<dyn Fn(&GatewayCall) + Send + Sync>;

struct MockState {
    connected: bool,
    next_identity: i64,
    fail_next: VecDeque<u16>,
    missing: HashSet<Identity>,
    accounts: Vec<Confirmed<Account>>,
    calls: Vec<GatewayCall>,
}

/// An in-memory gateway for testing.
///
/// Creates hand out sequential server identities. Failures are scripted as
/// HTTP statuses consumed one per call.
pub struct MockGateway {
    state: Mutex<MockState>,
    hook: Mutex<Option<Hook>>,
}

impl MockGateway {
    /// Creates a connected mock whose first created identity is 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                connected: true,
                next_identity: 1,
                fail_next: VecDeque::new(),
                missing: HashSet::new(),
                accounts: Vec::new(),
                calls: Vec::new(),
            }),
            hook: Mutex::new(None),
        }
    }

    /// Sets the identity the next create returns.
    pub fn set_next_identity(&self, identity: i64) {
        self.state.lock().next_identity = identity;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Makes the next call fail with the given terminal status.
    pub fn fail_next(&self, status: u16) {
        self.state.lock().fail_next.push_back(status);
    }

    /// Makes deletes of this identity report "already gone".
    pub fn mark_missing(&self, identity: Identity) {
        self.state.lock().missing.insert(identity);
    }

    /// Sets the accounts returned by `fetch_accounts`.
    pub fn set_accounts(&self, accounts: Vec<Confirmed<Account>>) {
        self.state.lock().accounts = accounts;
    }

    /// Runs `hook` inside every call, after it is recorded and before it
    /// returns. Lets tests mutate local state while a call is in flight.
    pub fn set_hook(&self, hook: impl Fn(&GatewayCall) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn begin(&self, call: GatewayCall) -> SyncResult<()> {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(SyncError::NoConnectivity);
            }
            state.calls.push(call.clone());
            if let Some(status) = state.fail_next.pop_front() {
                return Err(status_error(status, "scripted failure"));
            }
        }
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(&call);
        }
        Ok(())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn create_transaction(&self, payload: &Transaction) -> SyncResult<Confirmed<Transaction>> {
        self.begin(GatewayCall::CreateTransaction(payload.clone()))?;
        let mut state = self.state.lock();
        let identity = Identity::new(state.next_identity);
        state.next_identity += 1;
        Ok(Confirmed {
            identity,
            payload: payload.clone(),
        })
    }

    async fn update_transaction(
        &self,
        identity: Identity,
        payload: &Transaction,
    ) -> SyncResult<Confirmed<Transaction>> {
        self.begin(GatewayCall::UpdateTransaction(identity, payload.clone()))?;
        Ok(Confirmed {
            identity,
            payload: payload.clone(),
        })
    }

    async fn delete_transaction(&self, identity: Identity) -> SyncResult<DeleteOutcome> {
        self.begin(GatewayCall::DeleteTransaction(identity))?;
        if self.state.lock().missing.contains(&identity) {
            Ok(DeleteOutcome::AlreadyGone)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    async fn fetch_accounts(&self) -> SyncResult<Vec<Confirmed<Account>>> {
        self.begin(GatewayCall::FetchAccounts)?;
        Ok(self.state.lock().accounts.clone())
    }

    async fn update_account(
        &self,
        identity: Identity,
        payload: &Account,
    ) -> SyncResult<Confirmed<Account>> {
        self.begin(GatewayCall::UpdateAccount(identity, payload.clone()))?;
        Ok(Confirmed {
            identity,
            payload: payload.clone(),
        })
    }
}
