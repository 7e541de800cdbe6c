//! Multi-entry cache namespace
//!
//! A keyed collection of independent daily entries (one per shock scenario)
//! persisted as a single JSON object `{ key: {timestamp, data} }` under one
//! store key. Each key obeys the per-entry validity rule on its own; there is
//! no shared timestamp.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::policy::{CacheResult, DailyCachePolicy, FetchError, RefreshOptions};
use super::status::RefreshStatus;
use super::store::{EntryStore, StoredEntry};
use crate::clock::DayClock;

type EntryMap = BTreeMap<String, StoredEntry>;

/// A view over one namespace blob that itself behaves as an [`EntryStore`],
/// so the daily policy applies unchanged to namespaced keys.
struct NamespaceView<'a, S> {
    base: &'a S,
    namespace_key: &'a str,
}

impl<'a, S: EntryStore> NamespaceView<'a, S> {
    fn load(&self) -> EntryMap {
        self.base
            .read_value(self.namespace_key)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    fn save(&self, map: &EntryMap) {
        match serde_json::to_value(map) {
            Ok(value) => self.base.write_value(self.namespace_key, &value),
            Err(err) => {
                warn!(namespace = self.namespace_key, error = %err, "failed to serialize namespace")
            }
        }
    }
}

impl<'a, S: EntryStore> EntryStore for NamespaceView<'a, S> {
    fn read_value(&self, key: &str) -> Option<Value> {
        let entry = self.load().remove(key)?;
        serde_json::to_value(entry).ok()
    }

    fn write_value(&self, key: &str, value: &Value) {
        let entry: StoredEntry = match serde_json::from_value(value.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(namespace = self.namespace_key, key, error = %err, "rejecting malformed namespace entry");
                return;
            }
        };
        let mut map = self.load();
        map.insert(key.to_string(), entry);
        self.save(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.load();
        if map.remove(key).is_some() {
            self.save(&map);
        }
    }
}

/// Daily cache over an arbitrary set of string keys sharing one store region
pub struct CacheNamespace<S> {
    store: S,
    clock: DayClock,
    namespace_key: String,
}

impl<S: EntryStore> CacheNamespace<S> {
    pub fn new(store: S, clock: DayClock, namespace_key: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            namespace_key: namespace_key.into(),
        }
    }

    fn view(&self) -> NamespaceView<'_, S> {
        NamespaceView {
            base: &self.store,
            namespace_key: &self.namespace_key,
        }
    }

    fn policy(&self) -> DailyCachePolicy<NamespaceView<'_, S>> {
        DailyCachePolicy::new(self.view(), self.clock)
    }

    /// Same semantics as [`DailyCachePolicy::get_or_refresh`], scoped by key
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

    /// Deterministic-time variant for tests
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
        self.policy().get_or_refresh_at(now, key, fetch, options).await
    }

    /// Status of one namespaced key
    pub fn status(&self, key: &str) -> RefreshStatus {
        self.policy().status(key)
    }

    /// Keys currently holding a same-day-valid entry, in sorted order.
    ///
    /// Display-only ("3/7 scenarios cached"); correctness always comes from
    /// the per-call freshness check.
    pub fn list_cached_keys(&self) -> Vec<String> {
        self.list_cached_keys_at(Utc::now())
    }

    /// Deterministic-time variant for tests
    pub fn list_cached_keys_at(&self, now: DateTime<Utc>) -> Vec<String> {
        self.view()
            .load()
            .into_iter()
            .filter(|(_, entry)| self.clock.same_calendar_day(entry.fetched_at, now))
            .map(|(key, _)| key)
            .collect()
    }

    /// Deletes every entry in this namespace; other namespaces and plain
    /// store keys are untouched.
    pub fn clear_all(&self) {
        self.store.remove(&self.namespace_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::policy::Freshness;
    use crate::cache::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid rfc3339 instant")
            .with_timezone(&Utc)
    }

    fn namespace(store: &MemoryStore) -> CacheNamespace<&MemoryStore> {
        CacheNamespace::new(store, DayClock::eastern(), "scenario_analysis")
    }

    #[tokio::test]
    async fn test_each_key_is_independent() {
        let store = MemoryStore::new();
        let ns = namespace(&store);
        let morning = utc("2025-03-02T09:00:00-05:00");
        let noon = utc("2025-03-02T12:00:00-05:00");

        ns.get_or_refresh_at(
            morning,
            "energy-shock",
            || async { Ok("energy".to_string()) },
            RefreshOptions::default(),
        )
        .await;

        // Fetching a second key must not disturb the first.
        let calls = AtomicUsize::new(0);
        ns.get_or_refresh_at(
            noon,
            "trade-war",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("trade".to_string()) }
            },
            RefreshOptions::default(),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let cached: CacheResult<String> = ns
            .get_or_refresh_at(
                noon,
                "energy-shock",
                || async { Ok("unexpected".to_string()) },
                RefreshOptions::default(),
            )
            .await;
        assert_eq!(cached.freshness, Freshness::Fresh);
        assert_eq!(cached.data.as_deref(), Some("energy"));
    }

    #[tokio::test]
    async fn test_namespace_persists_as_single_keyed_object() {
        let store = MemoryStore::new();
        let ns = namespace(&store);
        let now = utc("2025-03-02T09:00:00-05:00");

        ns.get_or_refresh_at(
            now,
            "energy-shock",
            || async { Ok(json!({"probability": 0.3})) },
            RefreshOptions::default(),
        )
        .await;

        let blob = store
            .read_value("scenario_analysis")
            .expect("namespace blob exists");
        let entry = &blob["energy-shock"];
        assert_eq!(entry["timestamp"], json!(now.timestamp_millis()));
        assert_eq!(entry["data"]["probability"], json!(0.3));
    }

    #[tokio::test]
    async fn test_list_cached_keys_excludes_stale_entries() {
        let store = MemoryStore::new();
        let ns = namespace(&store);
        let yesterday = utc("2025-03-01T12:00:00-05:00");
        let today = utc("2025-03-02T12:00:00-05:00");

        ns.get_or_refresh_at(
            yesterday,
            "old-scenario",
            || async { Ok("old".to_string()) },
            RefreshOptions::default(),
        )
        .await;
        ns.get_or_refresh_at(
            today,
            "new-scenario",
            || async { Ok("new".to_string()) },
            RefreshOptions::default(),
        )
        .await;

        assert_eq!(
            ns.list_cached_keys_at(today),
            vec!["new-scenario".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stale_key_falls_back_on_fetch_failure() {
        let store = MemoryStore::new();
        let ns = namespace(&store);
        let yesterday = utc("2025-03-01T12:00:00-05:00");
        let today = utc("2025-03-02T12:00:00-05:00");

        ns.get_or_refresh_at(
            yesterday,
            "energy-shock",
            || async { Ok("old-analysis".to_string()) },
            RefreshOptions::default(),
        )
        .await;

        let result: CacheResult<String> = ns
            .get_or_refresh_at(
                today,
                "energy-shock",
                || async { Err(FetchError::RateLimited) },
                RefreshOptions::default(),
            )
            .await;

        assert_eq!(result.freshness, Freshness::StaleFallback);
        assert_eq!(result.data.as_deref(), Some("old-analysis"));
    }

    #[tokio::test]
    async fn test_clear_all_leaves_other_namespaces_alone() {
        let store = MemoryStore::new();
        let scenarios = CacheNamespace::new(&store, DayClock::eastern(), "scenario_analysis");
        let other = CacheNamespace::new(&store, DayClock::eastern(), "experiments");
        let now = utc("2025-03-02T09:00:00-05:00");

        scenarios
            .get_or_refresh_at(
                now,
                "energy-shock",
                || async { Ok("a".to_string()) },
                RefreshOptions::default(),
            )
            .await;
        other
            .get_or_refresh_at(
                now,
                "test-key",
                || async { Ok("b".to_string()) },
                RefreshOptions::default(),
            )
            .await;
        // A plain (non-namespaced) entry in the same store.
        store.write("daily_search_bundle", &StoredEntry::new(now, json!("x")));

        scenarios.clear_all();

        assert!(store.read_value("scenario_analysis").is_none());
        assert!(store.read_value("experiments").is_some());
        assert!(store.read("daily_search_bundle").is_some());
        assert!(scenarios.list_cached_keys_at(now).is_empty());
        assert_eq!(other.list_cached_keys_at(now), vec!["test-key".to_string()]);
    }
}
