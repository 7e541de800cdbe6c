//! Derived cache status for UI display
//!
//! Nothing here is persisted or independently mutated; everything is a pure
//! function of the stored timestamp and the current instant.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::policy::DailyCachePolicy;
use super::store::EntryStore;

/// Time remaining until the next daily refresh boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub hours: i64,
    pub minutes: i64,
}

impl Countdown {
    /// Splits a duration into whole hours and leftover minutes
    pub fn from_duration(duration: Duration) -> Self {
        let total_minutes = duration.num_minutes().max(0);
        Self {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
        }
    }
}

/// Snapshot of a cache key's freshness for display ("cached at 09:15,
/// refreshes in 14h 45m"); serializes camelCase for the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatus {
    /// Whether a same-day-valid entry is currently held
    pub is_cached: bool,
    /// Local wall-clock time the entry was fetched, if cached
    pub last_updated: Option<String>,
    /// Countdown to the next day boundary, if cached
    pub next_refresh: Option<Countdown>,
}

impl RefreshStatus {
    fn absent() -> Self {
        Self {
            is_cached: false,
            last_updated: None,
            next_refresh: None,
        }
    }
}

impl<S: EntryStore> DailyCachePolicy<S> {
    /// Status of a key at the current instant
    pub fn status(&self, key: &str) -> RefreshStatus {
        self.status_at(Utc::now(), key)
    }

    /// Status of a key at an explicit instant
    pub fn status_at(&self, now: DateTime<Utc>, key: &str) -> RefreshStatus {
        let clock = self.clock();
        match self.store().read(key) {
            Some(entry) if clock.same_calendar_day(entry.fetched_at, now) => RefreshStatus {
                is_cached: true,
                last_updated: Some(clock.format_local_time(entry.fetched_at)),
                next_refresh: Some(Countdown::from_duration(
                    clock.duration_until_next_midnight(now),
                )),
            },
            _ => RefreshStatus::absent(),
        }
    }
}
