//! SQLite-backed record store.
//!
//! One table per entity kind. Each row keeps the JSON payload next to the
//! mutation-tracking columns (`dirty`, `deleted`, `last_updated`), plus a
//! `seq` column that preserves insertion order across identity remapping.
//! A `<table>_remap` side table maps spent placeholders to server identities,
//! and `store_meta` keeps the lowest placeholder ever handed out per table.

use crate::entity::{Account, Entity, Transaction};
use crate::error::{StoreError, StoreResult};
use crate::record::{CommitOutcome, Confirmed, Identity, SyncableRecord, Timestamp};
use crate::store::RecordStore;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Record store and preference ledger on a single SQLite connection.
///
/// The connection is serialized behind a mutex; each public call is one
/// SQLite transaction at most.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a file-backed store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Self::initialize(conn)
    }

    /// Opens an in-memory store (useful for tests).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> StoreResult<Self> {
        create_entity_table::<Transaction>(&conn)?;
        create_entity_table::<Account>(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sync_preferences (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS store_meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sync_lease (
                id         INTEGER PRIMARY KEY CHECK (id = 1),
                owner      TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );",
        )?;
        tracing::debug!("record store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the newest `last_updated` across all tables, or 0 when empty.
    pub fn max_last_updated(&self) -> StoreResult<Timestamp> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT MAX(m) FROM (
                SELECT COALESCE(MAX(last_updated), 0) AS m FROM {}
                UNION ALL
                SELECT COALESCE(MAX(last_updated), 0) AS m FROM {}
            )",
            Transaction::TABLE,
            Account::TABLE
        );
        let max: Option<Timestamp> = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

fn create_entity_table<T: Entity>(conn: &Connection) -> StoreResult<()> {
    let table = T::TABLE;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            identity     INTEGER PRIMARY KEY,
            payload      TEXT NOT NULL,
            dirty        INTEGER NOT NULL DEFAULT 0,
            deleted      INTEGER NOT NULL DEFAULT 0,
            last_updated INTEGER NOT NULL,
            seq          INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_dirty ON {table}(dirty, seq);
        CREATE TABLE IF NOT EXISTS {table}_remap (
            old_identity INTEGER PRIMARY KEY,
            new_identity INTEGER NOT NULL
        );"
    ))?;
    Ok(())
}

/// Undecoded row.
struct RawRow {
    identity: i64,
    payload: String,
    dirty: bool,
    deleted: bool,
    last_updated: Timestamp,
    seq: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identity: row.get(0)?,
            payload: row.get(1)?,
            dirty: row.get(2)?,
            deleted: row.get(3)?,
            last_updated: row.get(4)?,
            seq: row.get(5)?,
        })
    }

    fn decode<T: Entity>(self) -> StoreResult<SyncableRecord<T>> {
        Ok(SyncableRecord {
            identity: Identity::new(self.identity),
            payload: serde_json::from_str(&self.payload)?,
            dirty: self.dirty,
            deleted: self.deleted,
            last_updated: self.last_updated,
        })
    }
}

const COLUMNS: &str = "identity, payload, dirty, deleted, last_updated, seq";

fn select_where<T: Entity>(
    conn: &Connection,
    clause: &str,
    args: impl rusqlite::Params,
) -> StoreResult<Vec<SyncableRecord<T>>> {
    let sql = format!("SELECT {COLUMNS} FROM {} {clause} ORDER BY seq", T::TABLE);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, RawRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(RawRow::decode::<T>).collect()
}

fn fetch_raw<T: Entity>(conn: &Connection, identity: Identity) -> StoreResult<Option<RawRow>> {
    let sql = format!("SELECT {COLUMNS} FROM {} WHERE identity = ?1", T::TABLE);
    Ok(conn
        .query_row(&sql, params![identity.get()], RawRow::from_row)
        .optional()?)
}

fn resolve_in<T: Entity>(conn: &Connection, identity: Identity) -> StoreResult<Identity> {
    if !identity.is_local() {
        return Ok(identity);
    }
    let sql = format!(
        "SELECT new_identity FROM {}_remap WHERE old_identity = ?1",
        T::TABLE
    );
    let remapped: Option<i64> = conn
        .query_row(&sql, params![identity.get()], |row| row.get(0))
        .optional()?;
    Ok(remapped.map(Identity::new).unwrap_or(identity))
}

fn next_seq<T: Entity>(conn: &Connection) -> StoreResult<i64> {
    let sql = format!("SELECT COALESCE(MAX(seq), 0) + 1 FROM {}", T::TABLE);
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

fn placeholder_floor_key<T: Entity>() -> String {
    format!("{}.placeholder_floor", T::TABLE)
}

/// Claims the next unused placeholder and lowers the stored floor to it.
///
/// The floor outlives the rows it was handed out for, so a placeholder that
/// was discarded or remapped (and later pruned) is never reissued. Live rows
/// and remap entries are still consulted for databases written before the
/// floor existed.
fn claim_placeholder<T: Entity>(conn: &Connection) -> StoreResult<Identity> {
    let key = placeholder_floor_key::<T>();
    let sql = format!(
        "SELECT MIN(m) FROM (
            SELECT COALESCE(MIN(identity), 0) AS m FROM {table}
            UNION ALL
            SELECT COALESCE(MIN(old_identity), 0) AS m FROM {table}_remap
            UNION ALL
            SELECT COALESCE(MIN(value), 0) AS m FROM store_meta WHERE key = ?1
        )",
        table = T::TABLE
    );
    let min: Option<i64> = conn.query_row(&sql, params![key], |row| row.get(0))?;
    let next = min.unwrap_or(0).min(0) - 1;
    conn.execute(
        "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?1, ?2)",
        params![key, next],
    )?;
    Ok(Identity::new(next))
}

#[allow(clippy::too_many_arguments)]
fn write_row(
    conn: &Connection,
    table: &str,
    identity: Identity,
    payload: &str,
    dirty: bool,
    deleted: bool,
    last_updated: Timestamp,
    seq: i64,
) -> StoreResult<()> {
    let sql = format!(
        "INSERT OR REPLACE INTO {table} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    );
    conn.execute(
        &sql,
        params![identity.get(), payload, dirty, deleted, last_updated, seq],
    )?;
    Ok(())
}

fn not_found<T: Entity>(identity: Identity) -> StoreError {
    StoreError::NotFound {
        kind: T::KIND,
        identity,
    }
}

impl<T: Entity> RecordStore<T> for SqliteStore {
    fn list_dirty(&self) -> StoreResult<Vec<SyncableRecord<T>>> {
        self.with_conn(|conn| select_where::<T>(conn, "WHERE dirty = 1", []))
    }

    fn list(&self) -> StoreResult<Vec<SyncableRecord<T>>> {
        self.with_conn(|conn| select_where::<T>(conn, "WHERE deleted = 0", []))
    }

    fn get(&self, identity: Identity) -> StoreResult<Option<SyncableRecord<T>>> {
        self.with_conn(|conn| {
            fetch_raw::<T>(conn, identity)?
                .map(RawRow::decode::<T>)
                .transpose()
        })
    }

    fn resolve(&self, identity: Identity) -> StoreResult<Identity> {
        self.with_conn(|conn| resolve_in::<T>(conn, identity))
    }

    fn insert_local(&self, payload: T, timestamp: Timestamp) -> StoreResult<SyncableRecord<T>> {
        if !T::OFFLINE_MUTABLE {
            return Err(StoreError::Unsupported {
                kind: T::KIND,
                operation: "local create",
            });
        }
        let encoded = serde_json::to_string(&payload)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let identity = claim_placeholder::<T>(&tx)?;
            let seq = next_seq::<T>(&tx)?;
            write_row(&tx, T::TABLE, identity, &encoded, true, false, timestamp, seq)?;
            tx.commit()?;
            tracing::debug!(kind = %T::KIND, %identity, "inserted local record");
            Ok(SyncableRecord {
                identity,
                payload,
                dirty: true,
                deleted: false,
                last_updated: timestamp,
            })
        })
    }

    fn update_local(
        &self,
        identity: Identity,
        payload: T,
        timestamp: Timestamp,
    ) -> StoreResult<SyncableRecord<T>> {
        let encoded = serde_json::to_string(&payload)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let target = resolve_in::<T>(&tx, identity)?;
            let sql = format!(
                "UPDATE {} SET payload = ?2, dirty = 1, last_updated = ?3
                 WHERE identity = ?1 AND deleted = 0",
                T::TABLE
            );
            let changed = tx.execute(&sql, params![target.get(), encoded, timestamp])?;
            if changed == 0 {
                return Err(not_found::<T>(identity));
            }
            tx.commit()?;
            tracing::debug!(kind = %T::KIND, identity = %target, "updated local record");
            Ok(SyncableRecord {
                identity: target,
                payload,
                dirty: true,
                deleted: false,
                last_updated: timestamp,
            })
        })
    }

    fn mark_dirty_deleted(
        &self,
        identity: Identity,
        timestamp: Timestamp,
    ) -> StoreResult<Identity> {
        if !T::OFFLINE_MUTABLE {
            return Err(StoreError::Unsupported {
                kind: T::KIND,
                operation: "soft delete",
            });
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let target = resolve_in::<T>(&tx, identity)?;
            let sql = format!(
                "UPDATE {} SET dirty = 1, deleted = 1, last_updated = ?2 WHERE identity = ?1",
                T::TABLE
            );
            let changed = tx.execute(&sql, params![target.get(), timestamp])?;
            if changed == 0 {
                return Err(not_found::<T>(identity));
            }
            tx.commit()?;
            if target != identity {
                tracing::debug!(kind = %T::KIND, placeholder = %identity, identity = %target, "soft delete followed remap");
            }
            Ok(target)
        })
    }

    fn commit_create_result(
        &self,
        local: &SyncableRecord<T>,
        confirmed: &Confirmed<T>,
    ) -> StoreResult<CommitOutcome> {
        if !local.identity.is_local() {
            return Err(StoreError::InvalidIdentity {
                identity: local.identity,
                operation: "commit create",
            });
        }
        if !confirmed.identity.is_server() {
            return Err(StoreError::InvalidIdentity {
                identity: confirmed.identity,
                operation: "commit create",
            });
        }
        let server_payload = serde_json::to_string(&confirmed.payload)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = fetch_raw::<T>(&tx, local.identity)? else {
                return Ok(CommitOutcome::Vanished);
            };

            let delete_sql = format!("DELETE FROM {} WHERE identity = ?1", T::TABLE);
            tx.execute(&delete_sql, params![local.identity.get()])?;

            let outcome = if current.last_updated == local.last_updated {
                write_row(
                    &tx,
                    T::TABLE,
                    confirmed.identity,
                    &server_payload,
                    false,
                    false,
                    current.last_updated,
                    current.seq,
                )?;
                CommitOutcome::Clean
            } else {
                write_row(
                    &tx,
                    T::TABLE,
                    confirmed.identity,
                    &current.payload,
                    true,
                    current.deleted,
                    current.last_updated,
                    current.seq,
                )?;
                CommitOutcome::StillDirty
            };

            let remap_sql = format!(
                "INSERT OR REPLACE INTO {}_remap (old_identity, new_identity) VALUES (?1, ?2)",
                T::TABLE
            );
            tx.execute(
                &remap_sql,
                params![local.identity.get(), confirmed.identity.get()],
            )?;
            tx.commit()?;
            Ok(outcome)
        })
    }

    fn commit_update_result(
        &self,
        local: &SyncableRecord<T>,
        confirmed: &Confirmed<T>,
    ) -> StoreResult<CommitOutcome> {
        let server_payload = serde_json::to_string(&confirmed.payload)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = fetch_raw::<T>(&tx, local.identity)? else {
                return Ok(CommitOutcome::Vanished);
            };
            if current.last_updated != local.last_updated {
                return Ok(CommitOutcome::StillDirty);
            }
            if confirmed.identity != local.identity {
                let delete_sql = format!("DELETE FROM {} WHERE identity = ?1", T::TABLE);
                tx.execute(&delete_sql, params![local.identity.get()])?;
            }
            write_row(
                &tx,
                T::TABLE,
                confirmed.identity,
                &server_payload,
                false,
                false,
                current.last_updated,
                current.seq,
            )?;
            tx.commit()?;
            Ok(CommitOutcome::Clean)
        })
    }

    fn commit_delete_permanently(&self, identity: Identity) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let sql = format!("DELETE FROM {} WHERE identity = ?1", T::TABLE);
            tx.execute(&sql, params![identity.get()])?;
            // A stale placeholder for a gone record resolves to nothing either way.
            let prune = format!("DELETE FROM {}_remap WHERE new_identity = ?1", T::TABLE);
            let pruned = tx.execute(&prune, params![identity.get()])?;
            tx.commit()?;
            if pruned > 0 {
                tracing::debug!(kind = %T::KIND, %identity, pruned, "pruned remap entries");
            }
            Ok(())
        })
    }

    fn upsert_clean(&self, records: &[Confirmed<T>], timestamp: Timestamp) -> StoreResult<()> {
        let encoded = records
            .iter()
            .map(|r| Ok((r.identity, serde_json::to_string(&r.payload)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for (identity, payload) in &encoded {
                let existing = fetch_raw::<T>(&tx, *identity)?;
                match existing {
                    Some(row) if row.dirty => continue,
                    Some(row) => write_row(
                        &tx, T::TABLE, *identity, payload, false, false, timestamp, row.seq,
                    )?,
                    None => {
                        let seq = next_seq::<T>(&tx)?;
                        write_row(&tx, T::TABLE, *identity, payload, false, false, timestamp, seq)?
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}
