//! # finsync store
//!
//! Durable local cache for the finsync offline-first engine.
//!
//! This crate provides:
//! - The mutation-tracking record model (`dirty`, `deleted`, `last_updated`)
//! - Placeholder (negative) identities for records created offline
//! - Atomic identity remapping when the server confirms a create
//! - The preference ledger (last sync time, sync cadence)
//! - A cross-process lease that keeps reconciliation passes single-flight
//!
//! ## Key Invariants
//!
//! - A record with a negative identity is always dirty
//! - Readers never see both the placeholder row and its server row
//! - A spent placeholder is never handed out again
//! - Every write is one SQLite transaction
//! - At most one owner holds the pass lease at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod entity;
mod error;
mod lease;
mod preferences;
mod record;
mod sqlite;
mod store;

pub use clock::{wall_millis, MonotonicClock};
pub use entity::{Account, Entity, EntityKind, Transaction};
pub use error::{StoreError, StoreResult};
pub use lease::{LeaseClaim, PassLease};
pub use preferences::{PreferenceLedger, SyncInterval, SyncPreferences};
pub use record::{
    CommitOutcome, Confirmed, Identity, PendingOperation, SyncableRecord, Timestamp,
};
pub use sqlite::SqliteStore;
pub use store::RecordStore;
