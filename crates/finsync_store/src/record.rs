//! The mutation-tracking record model.

use std::fmt;

/// Milliseconds since the Unix epoch, as written by [`crate::MonotonicClock`].
pub type Timestamp = i64;

/// Record identity.
///
/// Positive values are assigned by the server. Negative values are local
/// placeholders handed out before the first round-trip. Zero is never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(i64);

impl Identity {
    /// Wraps a raw identity value.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns true for a locally generated placeholder.
    pub const fn is_local(self) -> bool {
        self.0 < 0
    }

    /// Returns true for a server-assigned identity.
    pub const fn is_server(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Identity {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// A local row plus its mutation-tracking fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncableRecord<T> {
    /// Server or placeholder identity.
    pub identity: Identity,
    /// Domain fields.
    pub payload: T,
    /// Set while a local mutation is unconfirmed by the server.
    pub dirty: bool,
    /// Set when the user deleted the record locally.
    pub deleted: bool,
    /// Time of the most recent local write. Observability only.
    pub last_updated: Timestamp,
}

impl<T> SyncableRecord<T> {
    /// Classifies the record by the remote operation it is waiting on.
    ///
    /// Delete takes priority over create, which takes priority over update.
    pub fn pending_operation(&self) -> PendingOperation {
        if self.deleted {
            if self.identity.is_local() {
                PendingOperation::DiscardLocal
            } else {
                PendingOperation::Delete
            }
        } else if self.identity.is_local() {
            PendingOperation::Create
        } else if self.dirty {
            PendingOperation::Update
        } else {
            PendingOperation::None
        }
    }
}

/// What a record needs from the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOperation {
    /// Deleted before it ever reached the server; drop it without a network call.
    DiscardLocal,
    /// Deleted locally; delete remotely then remove.
    Delete,
    /// Never synced; create remotely and remap identity.
    Create,
    /// Edited locally; push the new payload.
    Update,
    /// Clean.
    None,
}

/// The server's authoritative version of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmed<T> {
    /// Server identity.
    pub identity: Identity,
    /// Server payload.
    pub payload: T,
}

/// Result of applying a server response to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The row now matches the server and is clean.
    Clean,
    /// The row was mutated locally while the call was in flight; it keeps
    /// the local payload and stays dirty for the next pass.
    StillDirty,
    /// The row disappeared while the call was in flight.
    Vanished,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: i64, dirty: bool, deleted: bool) -> SyncableRecord<()> {
        SyncableRecord {
            identity: Identity::new(identity),
            payload: (),
            dirty,
            deleted,
            last_updated: 0,
        }
    }

    #[test]
    fn classification_priority() {
        assert_eq!(
            record(-1, true, true).pending_operation(),
            PendingOperation::DiscardLocal
        );
        assert_eq!(record(5, true, true).pending_operation(), PendingOperation::Delete);
        assert_eq!(record(-1, true, false).pending_operation(), PendingOperation::Create);
        assert_eq!(record(5, true, false).pending_operation(), PendingOperation::Update);
        assert_eq!(record(5, false, false).pending_operation(), PendingOperation::None);
    }

    #[test]
    fn identity_sides() {
        assert!(Identity::new(-3).is_local());
        assert!(Identity::new(87).is_server());
        assert!(!Identity::new(0).is_local());
        assert!(!Identity::new(0).is_server());
    }
}
