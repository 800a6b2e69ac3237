//! Sync preferences: last successful sync and cadence.

use crate::error::{StoreError, StoreResult};
use crate::record::Timestamp;
use crate::sqlite::SqliteStore;
use rusqlite::{params, OptionalExtension};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const LAST_SYNC_KEY: &str = "last_sync_timestamp";
const INTERVAL_KEY: &str = "sync_interval";

/// How often the periodic trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncInterval {
    /// Every 15 minutes.
    FifteenMinutes,
    /// Every 30 minutes.
    ThirtyMinutes,
    /// Every hour.
    #[default]
    OneHour,
    /// Every 2 hours.
    TwoHours,
    /// Every 6 hours.
    SixHours,
    /// Every 12 hours.
    TwelveHours,
    /// Once a day.
    Daily,
}

impl SyncInterval {
    /// Every tier, shortest first.
    pub const ALL: [SyncInterval; 7] = [
        SyncInterval::FifteenMinutes,
        SyncInterval::ThirtyMinutes,
        SyncInterval::OneHour,
        SyncInterval::TwoHours,
        SyncInterval::SixHours,
        SyncInterval::TwelveHours,
        SyncInterval::Daily,
    ];

    /// Returns the tier as a duration.
    pub fn as_duration(&self) -> Duration {
        let minutes = match self {
            SyncInterval::FifteenMinutes => 15,
            SyncInterval::ThirtyMinutes => 30,
            SyncInterval::OneHour => 60,
            SyncInterval::TwoHours => 120,
            SyncInterval::SixHours => 360,
            SyncInterval::TwelveHours => 720,
            SyncInterval::Daily => 1440,
        };
        Duration::from_secs(minutes * 60)
    }

    /// Returns the stable name used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncInterval::FifteenMinutes => "15m",
            SyncInterval::ThirtyMinutes => "30m",
            SyncInterval::OneHour => "1h",
            SyncInterval::TwoHours => "2h",
            SyncInterval::SixHours => "6h",
            SyncInterval::TwelveHours => "12h",
            SyncInterval::Daily => "24h",
        }
    }
}

impl fmt::Display for SyncInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                format!("unknown sync interval {s:?}, expected one of {}", names.join(", "))
            })
    }
}

/// Snapshot of the persisted sync preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncPreferences {
    /// End of the last pass that completed without error.
    pub last_sync_timestamp: Option<Timestamp>,
    /// Periodic trigger cadence.
    pub sync_interval: SyncInterval,
}

/// Durable storage for [`SyncPreferences`].
///
/// Read by the trigger coordinator, written by the reconciler.
pub trait PreferenceLedger: Send + Sync {
    /// Returns the last successful sync time, if any.
    fn last_sync_timestamp(&self) -> StoreResult<Option<Timestamp>>;

    /// Records a successful sync. Never moves the stored value backwards.
    fn record_sync(&self, timestamp: Timestamp) -> StoreResult<()>;

    /// Returns the configured cadence.
    fn sync_interval(&self) -> StoreResult<SyncInterval>;

    /// Changes the cadence.
    fn set_sync_interval(&self, interval: SyncInterval) -> StoreResult<()>;

    /// Reads both preferences.
    fn preferences(&self) -> StoreResult<SyncPreferences> {
        Ok(SyncPreferences {
            last_sync_timestamp: self.last_sync_timestamp()?,
            sync_interval: self.sync_interval()?,
        })
    }
}

fn read_pref(conn: &rusqlite::Connection, key: &str) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM sync_preferences WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_pref(conn: &rusqlite::Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sync_preferences (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn corrupt(key: &str, value: String) -> StoreError {
    StoreError::CorruptPreference {
        key: key.to_string(),
        value,
    }
}

impl PreferenceLedger for SqliteStore {
    fn last_sync_timestamp(&self) -> StoreResult<Option<Timestamp>> {
        self.with_conn(|conn| {
            read_pref(conn, LAST_SYNC_KEY)?
                .map(|raw| raw.parse::<Timestamp>().map_err(|_| corrupt(LAST_SYNC_KEY, raw)))
                .transpose()
        })
    }

    fn record_sync(&self, timestamp: Timestamp) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current =
                read_pref(&tx, LAST_SYNC_KEY)?.and_then(|raw| raw.parse::<Timestamp>().ok());
            if current.map_or(true, |c| timestamp > c) {
                write_pref(&tx, LAST_SYNC_KEY, &timestamp.to_string())?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn sync_interval(&self) -> StoreResult<SyncInterval> {
        self.with_conn(|conn| match read_pref(conn, INTERVAL_KEY)? {
            Some(raw) => raw.parse().map_err(|_| corrupt(INTERVAL_KEY, raw)),
            None => Ok(SyncInterval::default()),
        })
    }

    fn set_sync_interval(&self, interval: SyncInterval) -> StoreResult<()> {
        self.with_conn(|conn| write_pref(conn, INTERVAL_KEY, interval.as_str()))
    }
}
