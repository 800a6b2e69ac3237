//! Cross-process pass lease.
//!
//! Only one reconciliation pass may run against a database at a time, even
//! when several processes have it open. The lease is a single row claimed
//! inside an immediate (write-locking) SQLite transaction, so two claimants
//! can never both see it free.

use crate::error::StoreResult;
use crate::record::Timestamp;
use crate::sqlite::SqliteStore;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::time::Duration;

/// Result of a lease claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseClaim {
    /// The caller holds the lease until `expires_at`.
    Acquired {
        /// Expiry, Unix milliseconds.
        expires_at: Timestamp,
    },
    /// Another owner holds an unexpired lease.
    Held {
        /// Current holder.
        owner: String,
        /// Expiry, Unix milliseconds.
        expires_at: Timestamp,
    },
}

impl LeaseClaim {
    /// Returns true if the caller holds the lease.
    pub fn is_acquired(&self) -> bool {
        matches!(self, LeaseClaim::Acquired { .. })
    }
}

/// Exclusive, expiring permission to run a pass.
pub trait PassLease: Send + Sync {
    /// Claims or renews the lease for `owner`.
    ///
    /// Succeeds when the lease is free, expired, or already held by `owner`.
    fn try_acquire(&self, owner: &str, now: Timestamp, ttl: Duration) -> StoreResult<LeaseClaim>;

    /// Releases the lease if `owner` holds it.
    fn release(&self, owner: &str) -> StoreResult<()>;
}

impl PassLease for SqliteStore {
    fn try_acquire(&self, owner: &str, now: Timestamp, ttl: Duration) -> StoreResult<LeaseClaim> {
        let expires_at = now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current: Option<(String, Timestamp)> = tx
                .query_row(
                    "SELECT owner, expires_at FROM sync_lease WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((holder, held_until)) = current {
                if holder != owner && held_until > now {
                    return Ok(LeaseClaim::Held {
                        owner: holder,
                        expires_at: held_until,
                    });
                }
            }
            tx.execute(
                "INSERT OR REPLACE INTO sync_lease (id, owner, expires_at) VALUES (1, ?1, ?2)",
                params![owner, expires_at],
            )?;
            tx.commit()?;
            Ok(LeaseClaim::Acquired { expires_at })
        })
    }

    fn release(&self, owner: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sync_lease WHERE id = 1 AND owner = ?1",
                params![owner],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn second_owner_is_refused_until_release() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.try_acquire("a", 1_000, TTL).unwrap().is_acquired());

        let claim = store.try_acquire("b", 2_000, TTL).unwrap();
        assert_eq!(
            claim,
            LeaseClaim::Held {
                owner: "a".into(),
                expires_at: 61_000
            }
        );

        store.release("b").unwrap();
        assert!(!store.try_acquire("b", 2_000, TTL).unwrap().is_acquired());

        store.release("a").unwrap();
        assert!(store.try_acquire("b", 2_000, TTL).unwrap().is_acquired());
    }

    #[test]
    fn holder_renews() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.try_acquire("a", 1_000, TTL).unwrap();
        assert_eq!(
            store.try_acquire("a", 50_000, TTL).unwrap(),
            LeaseClaim::Acquired { expires_at: 110_000 }
        );
    }

    #[test]
    fn expired_lease_is_taken_over() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.try_acquire("a", 1_000, TTL).unwrap();
        assert!(store.try_acquire("b", 61_000, TTL).unwrap().is_acquired());
        assert!(!store.try_acquire("a", 62_000, TTL).unwrap().is_acquired());
    }

    #[test]
    fn lease_is_shared_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lease.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        assert!(first.try_acquire("daemon", 1_000, TTL).unwrap().is_acquired());
        assert!(!second.try_acquire("once", 1_500, TTL).unwrap().is_acquired());

        first.release("daemon").unwrap();
        assert!(second.try_acquire("once", 1_500, TTL).unwrap().is_acquired());
    }
}
