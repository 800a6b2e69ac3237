//! Monotonic wall-clock timestamps for local writes.

use crate::record::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hands out strictly increasing millisecond timestamps.
///
/// Follows the wall clock, but never repeats or goes backwards, so two local
/// writes to the same row always carry different `last_updated` values.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// Creates a clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose first reading is greater than `floor`.
    ///
    /// Seed with the newest `last_updated` in the store so a wall clock that
    /// moved backwards across a restart cannot reuse a timestamp.
    pub fn starting_after(floor: Timestamp) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Returns the next timestamp.
    pub fn now(&self) -> Timestamp {
        let wall = wall_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn wall_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}
