//! Timezone-anchored daily cache
//!
//! A small fixed set of named entries, each valid for the rest of the
//! calendar day (in a target timezone) on which it was fetched. The policy
//! serves cached data, refreshes it at most once per day, and degrades to
//! stale data when a refresh fails. Storage is pluggable: a file store for
//! the long-running server, an in-memory store for tests and embedders.

mod namespace;
mod policy;
mod status;
mod store;

pub use namespace::CacheNamespace;
pub use policy::{CacheResult, DailyCachePolicy, FetchError, Freshness, RefreshOptions};
pub use status::{Countdown, RefreshStatus};
pub use store::{EntryStore, FileStore, MemoryStore, StoredEntry};
