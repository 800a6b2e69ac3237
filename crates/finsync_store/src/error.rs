//! Error types for the record store.

use crate::entity::EntityKind;
use crate::record::Identity;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing local records.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored payload could not be encoded or decoded.
    #[error("payload codec error: {0}")]
    Payload(#[from] serde_json::Error),

    /// No row exists for the identity.
    #[error("{kind} {identity} not found")]
    NotFound {
        /// Entity kind searched.
        kind: EntityKind,
        /// Identity that was not found.
        identity: Identity,
    },

    /// The entity kind does not support the requested operation.
    #[error("{kind} does not support {operation}")]
    Unsupported {
        /// Entity kind.
        kind: EntityKind,
        /// Operation name.
        operation: &'static str,
    },

    /// An identity was used on the wrong side of the local/server split.
    #[error("invalid identity {identity} for {operation}")]
    InvalidIdentity {
        /// The offending identity.
        identity: Identity,
        /// Operation name.
        operation: &'static str,
    },

    /// A stored preference value could not be parsed.
    #[error("corrupt preference {key}: {value}")]
    CorruptPreference {
        /// Preference key.
        key: String,
        /// Raw stored value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::NotFound {
            kind: EntityKind::Transaction,
            identity: Identity::new(-4),
        };
        assert_eq!(err.to_string(), "transaction -4 not found");

        let err = StoreError::Unsupported {
            kind: EntityKind::Account,
            operation: "soft delete",
        };
        assert_eq!(err.to_string(), "account does not support soft delete");
    }
}
