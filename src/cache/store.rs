//! Cache entry persistence
//!
//! Stores move bytes and nothing else: no expiry logic lives here. Reads fail
//! soft (any I/O or parse error looks like a miss) and writes are best-effort
//! (a failed persist is logged and must not fail the request that produced
//! the data).

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Persisted wire format for a single cache entry:
/// `{ "timestamp": <epoch-ms>, "data": <opaque json> }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// When the wrapped data was obtained
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
    /// The cached payload, opaque to the store
    pub data: Value,
}

impl StoredEntry {
    pub fn new(fetched_at: DateTime<Utc>, data: Value) -> Self {
        Self { fetched_at, data }
    }
}

/// Key/value persistence for cache entries
///
/// Implementations differ only in the backing medium; the daily cache policy
/// is written once against this trait.
pub trait EntryStore: Send + Sync {
    /// Reads the raw JSON blob for a key; `None` on miss or any read error
    fn read_value(&self, key: &str) -> Option<Value>;

    /// Writes the raw JSON blob for a key; failures are logged, not returned
    fn write_value(&self, key: &str, value: &Value);

    /// Removes a key; missing keys are not an error
    fn remove(&self, key: &str);

    /// Reads a key as a `{timestamp, data}` entry; malformed blobs are a miss
    fn read(&self, key: &str) -> Option<StoredEntry> {
        serde_json::from_value(self.read_value(key)?).ok()
    }

    /// Writes a `{timestamp, data}` entry under a key
    fn write(&self, key: &str, entry: &StoredEntry) {
        match serde_json::to_value(entry) {
            Ok(value) => self.write_value(key, &value),
            Err(err) => warn!(key, error = %err, "failed to serialize cache entry"),
        }
    }
}

impl<S: EntryStore + ?Sized> EntryStore for &S {
    fn read_value(&self, key: &str) -> Option<Value> {
        (**self).read_value(key)
    }

    fn write_value(&self, key: &str, value: &Value) {
        (**self).write_value(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// File-backed store: one JSON file per key in an XDG-compliant cache
/// directory (`~/.cache/outpost/` on Linux).
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl FileStore {
    /// Creates a store in the platform cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no
    /// home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "outpost")?;
        Some(Self {
            cache_dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a store rooted at a specific directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Returns the path to the cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }
}

impl EntryStore for FileStore {
    fn read_value(&self, key: &str) -> Option<Value> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_value(&self, key: &str, value: &Value) {
        if let Err(err) = self.ensure_dir() {
            warn!(key, error = %err, "failed to create cache directory");
            return;
        }
        let json = match serde_json::to_string_pretty(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key, error = %err, "failed to serialize cache value");
                return;
            }
        };
        if let Err(err) = fs::write(self.cache_path(key), json) {
            warn!(key, error = %err, "failed to persist cache entry");
        }
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.cache_path(key)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(key, error = %err, "failed to remove cache entry"),
        }
    }
}

/// In-memory store used by tests and embedders that do not want persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned lock cannot leave a plain map in a torn state.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EntryStore for MemoryStore {
    fn read_value(&self, key: &str) -> Option<Value> {
        self.entries().get(key).cloned()
    }

    fn write_value(&self, key: &str, value: &Value) {
        self.entries().insert(key.to_string(), value.clone());
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}
