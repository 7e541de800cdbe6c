//! Daily cache policy
//!
//! Decides, per cache key, whether to serve the stored value or invoke the
//! fetch function, anchored to the timezone-local calendar day: a stored
//! entry is valid for the rest of the day it was fetched on. Fetch failures
//! degrade to the stale entry when one exists. No error ever escapes
//! [`DailyCachePolicy::get_or_refresh`]; every path resolves to one of the
//! four [`Freshness`] outcomes.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::store::{EntryStore, StoredEntry};
use crate::clock::DayClock;

/// Why a fetch attempt produced no usable fresh data
///
/// The policy never inspects these beyond logging; the variants exist so
/// callers and tests can distinguish failure classes. Transport-level causes
/// arrive as display strings, keeping this layer free of any HTTP client
/// types.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level or HTTP-status failure talking to the provider
    #[error("provider request failed: {0}")]
    Http(String),

    /// The provider rate-limited the request (HTTP 429)
    #[error("provider rate limited the request")]
    RateLimited,

    /// No provider credential is configured
    #[error("provider is not configured")]
    Unconfigured,

    /// The fetch succeeded but the payload failed to parse into the
    /// expected shape
    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),
}

/// The four-way outcome surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from the store, fetched earlier today
    Fresh,
    /// A new fetch succeeded and was written back
    Refreshed,
    /// The fetch failed; serving a previous day's entry instead
    StaleFallback,
    /// The fetch failed and nothing is cached
    Unavailable,
}

/// Result of a `get_or_refresh` call
#[derive(Debug)]
pub struct CacheResult<T> {
    /// The payload; `None` only for [`Freshness::Unavailable`]
    pub data: Option<T>,
    pub freshness: Freshness,
    /// When the returned data was obtained, if any data was returned
    pub fetched_at: Option<DateTime<Utc>>,
    /// Local wall-clock time of `fetched_at` for display
    pub last_updated: Option<String>,
}

impl<T> CacheResult<T> {
    /// Whether the returned data came from the store rather than a new fetch
    pub fn from_cache(&self) -> bool {
        matches!(self.freshness, Freshness::Fresh | Freshness::StaleFallback)
    }
}

/// Per-call knobs for `get_or_refresh`
pub struct RefreshOptions<'a, T> {
    /// Skip the freshness check and always invoke the fetch function
    pub force_refresh: bool,
    /// Rejects disguised failures: fetches that return without erroring but
    /// whose content shows the provider could not produce genuine fresh data
    /// (e.g., no corroborating sources). Rejected results are never cached.
    pub is_usable: Option<&'a (dyn Fn(&T) -> bool + Send + Sync)>,
}

impl<'a, T> Default for RefreshOptions<'a, T> {
    fn default() -> Self {
        Self {
            force_refresh: false,
            is_usable: None,
        }
    }
}

impl<'a, T> RefreshOptions<'a, T> {
    /// Options that bypass the freshness check
    pub fn force() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    /// Options with a usability predicate
    pub fn with_predicate(is_usable: &'a (dyn Fn(&T) -> bool + Send + Sync)) -> Self {
        Self {
            force_refresh: false,
            is_usable: Some(is_usable),
        }
    }
}

/// Typed view of a stored entry
struct TypedEntry<T> {
    fetched_at: DateTime<Utc>,
    data: T,
}

/// The fetch-or-serve decision engine, written once against [`EntryStore`]
#[derive(Debug, Clone)]
pub struct DailyCachePolicy<S> {
    store: S,
    clock: DayClock,
}

impl<S: EntryStore> DailyCachePolicy<S> {
    pub fn new(store: S, clock: DayClock) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> DayClock {
        self.clock
    }

    /// Serves the cached value if it was fetched today, otherwise fetches.
    ///
    /// Under normal operation this triggers at most one fetch per key per
    /// calendar day: a same-day entry short-circuits before the fetch
    /// function is ever invoked. On fetch failure the previous (stale) entry
    /// is served when present; the store is never overwritten on a failed or
    /// unusable fetch.
    pub async fn get_or_refresh<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        options: RefreshOptions<'_, T>,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.get_or_refresh_at(Utc::now(), key, fetch, options).await
    }

    /// [`Self::get_or_refresh`] with an explicit "now", so tests control the
    /// clock deterministically.
    pub async fn get_or_refresh_at<T, F, Fut>(
        &self,
        now: DateTime<Utc>,
        key: &str,
        fetch: F,
        options: RefreshOptions<'_, T>,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if !options.force_refresh {
            if let Some(entry) = self.read_typed::<T>(key) {
                if self.clock.same_calendar_day(entry.fetched_at, now) {
                    return self.serve(entry, Freshness::Fresh);
                }
            }
        }

        match fetch().await {
            Ok(value) => {
                let usable = options.is_usable.map_or(true, |accepts| accepts(&value));
                if usable {
                    self.write_typed(key, now, &value);
                    CacheResult {
                        data: Some(value),
                        freshness: Freshness::Refreshed,
                        fetched_at: Some(now),
                        last_updated: Some(self.clock.format_local_time(now)),
                    }
                } else {
                    debug!(key, "fetch returned an unusable payload, not caching");
                    self.stale_fallback(key)
                }
            }
            Err(err) => {
                warn!(key, error = %err, "refresh failed, falling back to cached entry");
                self.stale_fallback(key)
            }
        }
    }

    /// Serves whatever the store still holds after a failed refresh
    fn stale_fallback<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        match self.read_typed::<T>(key) {
            Some(entry) => self.serve(entry, Freshness::StaleFallback),
            None => CacheResult {
                data: None,
                freshness: Freshness::Unavailable,
                fetched_at: None,
                last_updated: None,
            },
        }
    }

    fn serve<T>(&self, entry: TypedEntry<T>, freshness: Freshness) -> CacheResult<T> {
        CacheResult {
            data: Some(entry.data),
            freshness,
            fetched_at: Some(entry.fetched_at),
            last_updated: Some(self.clock.format_local_time(entry.fetched_at)),
        }
    }

    /// Entries whose payload no longer parses into `T` count as absent
    fn read_typed<T: DeserializeOwned>(&self, key: &str) -> Option<TypedEntry<T>> {
        let raw = self.store.read(key)?;
        let data = serde_json::from_value(raw.data).ok()?;
        Some(TypedEntry {
            fetched_at: raw.fetched_at,
            data,
        })
    }

    fn write_typed<T: Serialize>(&self, key: &str, now: DateTime<Utc>, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.store.write(key, &StoredEntry::new(now, json)),
            Err(err) => warn!(key, error = %err, "failed to serialize fetched payload"),
        }
    }
}
