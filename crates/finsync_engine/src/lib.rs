//! # finsync engine
//!
//! Offline-first reconciliation for finsync.
//!
//! This crate provides:
//! - The remote gateway contract and an HTTP implementation with
//!   connectivity precondition, bearer auth and bounded retry
//! - A connectivity observer that signals once per regained connection
//! - The reconciler, which pushes dirty local records to the server
//! - A single-flight trigger coordinator (periodic, connectivity, manual)
//! - The interactive write path for transactions
//!
//! ## Architecture
//!
//! Local writes never wait on the network. They mark rows dirty in the
//! record store and return. A reconciliation pass later reads the dirty set
//! and pushes each record in store order:
//! 1. Pending deletes (placeholders are dropped without a call)
//! 2. Pending creates, remapping the placeholder to the server identity
//! 3. Pending updates
//!
//! ## Key Invariants
//!
//! - No remote call ever references a placeholder identity
//! - At most one pass runs at a time, across processes sharing a database
//! - The last-sync timestamp only moves on a pass with no failures
//! - A gateway call makes at most 3 attempts, and none without validated
//!   internet

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod coordinator;
mod error;
mod gateway;
mod http;
mod mutations;
mod reconciler;

pub use config::{EngineConfig, RetryPolicy};
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, NetworkCapabilities};
pub use coordinator::{
    CoordinatorHandle, CoordinatorState, CoordinatorStats, FireResult, PassCompleted, PassRunner,
    SyncCoordinator, SyncOutcome, TriggerSource,
};
pub use error::{DomainError, DomainResult, SyncError, SyncResult};
pub use gateway::{DeleteOutcome, GatewayCall, MockGateway, RemoteGateway, ServerRecord};
pub use http::{
    CredentialSource, HttpClient, HttpGateway, HttpRequest, HttpResponse, Method, MockHttpClient,
    StaticToken, TransportError,
};
pub use mutations::{AccountContext, TransactionDraft, TransactionService};
pub use reconciler::{PassSummary, Reconciler, DEFAULT_LEASE_TTL};
