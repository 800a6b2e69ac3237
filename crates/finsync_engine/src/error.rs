//! Error types for the sync engine.

use finsync_store::{Identity, StoreError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the remote gateway and the reconciler.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No validated internet path at call time. Never retried.
    #[error("no validated internet connection")]
    NoConnectivity,

    /// The server kept answering 5xx, or the transport kept failing,
    /// through every attempt.
    #[error("server error (status {status:?}): {message}")]
    ServerError {
        /// Last HTTP status seen, `None` for a transport failure.
        status: Option<u16>,
        /// Last failure message.
        message: String,
    },

    /// Anything else: client errors, auth failures, malformed responses.
    #[error("unexpected sync failure (status {status:?}): {message}")]
    Unknown {
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        /// Underlying cause.
        message: String,
    },

    /// The server confirmed a change for a row that no longer exists locally.
    #[error("local row {local} vanished after the server confirmed {server}")]
    LocalRowVanished {
        /// Identity the pass read.
        local: Identity,
        /// Identity the server returned.
        server: Identity,
    },

    /// Another pass holds the database lease.
    #[error("sync pass already running (held by {owner})")]
    PassInProgress {
        /// Lease holder.
        owner: String,
    },

    /// The pass lease expired and was taken over mid-pass.
    #[error("sync lease lost to {owner}")]
    LeaseLost {
        /// New lease holder.
        owner: String,
    },

    /// Local store failure while applying a result.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Creates an `Unknown` error without a status.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            status: None,
            message: message.into(),
        }
    }

    /// Returns true if this error is transient on the server side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::ServerError { .. })
    }
}

/// Result type for interactive mutations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors surfaced synchronously to callers of the local write path.
#[derive(Error, Debug)]
pub enum DomainError {
    /// No live record with this identity.
    #[error("transaction {0} not found")]
    NotFound(Identity),

    /// The record is already pending deletion.
    #[error("transaction {0} is already deleted")]
    AlreadyDeleted(Identity),

    /// Amount must be positive.
    #[error("invalid amount {0}: must be positive")]
    InvalidAmount(i64),

    /// No account is cached locally, so a new transaction has no owner.
    #[error("no account available")]
    NoAccount,

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
