//! Cache Store - process-wide store of query results.
//!
//! Entries are keyed by query name plus the canonical JSON of the query
//! arguments. Every entry carries a version that is bumped on each write
//! (fetch, patch, rollback), the tags it provides, its fetch state and the
//! number of live subscribers.
//!
//! ## Example
//!
//! ```ignore
//! use training_desk::{CacheStore, InMemoryCacheStore, QueryKey, Tag};
//!
//! let store = InMemoryCacheStore::new();
//! let key = QueryKey::new("list_training_templates", &json!({ "day_number": 1 }))?;
//! store.subscribe(&key)?;
//! store.set(&key, json!([{ "id": 42 }]), vec![Tag::list("TrainingTemplate")])?;
//! let entry = store.get(&key)?.unwrap();
//! assert_eq!(entry.version, 1);
//! ```

mod in_memory;
mod store;
mod tag;

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use in_memory::InMemoryCacheStore;
pub use store::CacheStore;
pub use tag::Tag;

/// Identity of a cache entry: query name plus normalized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    query: String,
    args: String,
}

impl QueryKey {
    /// Build a key from typed arguments.
    pub fn new<A: Serialize + ?Sized>(query: &str, args: &A) -> Result<Self, CacheError> {
        let value = serde_json::to_value(args).map_err(|e| CacheError::Serde(e.to_string()))?;
        Ok(Self::from_value(query, &value))
    }

    /// Build a key from already-serialized arguments.
    pub fn from_value(query: &str, args: &Value) -> Self {
        Self {
            query: query.to_string(),
            args: args.to_string(),
        }
    }

    /// The query family this key belongs to.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The serialized arguments.
    pub fn args(&self) -> &str {
        &self.args
    }

    /// Parse the arguments back into JSON.
    pub fn args_value(&self) -> Result<Value, CacheError> {
        serde_json::from_str(&self.args).map_err(|e| CacheError::Serde(e.to_string()))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.query, self.args)
    }
}

/// Fetch state of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// First fetch in flight, no payload yet.
    Loading,
    /// Payload is current.
    Ready,
    /// Invalidated while subscribed; a refetch is due or in flight.
    Refetching,
    /// Invalidated with no subscribers; refetched on next use.
    Stale,
    /// The last fetch failed.
    Failed(String),
}

/// Snapshot of a cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub args: Value,
    pub payload: Option<Value>,
    pub tags: Vec<Tag>,
    pub state: EntryState,
    pub version: u64,
    pub subscribers: usize,
}

impl CacheEntry {
    /// Deserialize the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, CacheError> {
        match &self.payload {
            Some(payload) => serde_json::from_value(payload.clone())
                .map(Some)
                .map_err(|e| CacheError::Serde(e.to_string())),
            None => Ok(None),
        }
    }

    /// True when the payload can be served without a fetch.
    pub fn is_fresh(&self) -> bool {
        self.state == EntryState::Ready && self.payload.is_some()
    }
}

/// Result of a successful in-place patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    /// Payload before the edit.
    pub prior: Value,
    /// Version before the edit.
    pub prior_version: u64,
    /// Version after the edit.
    pub version: u64,
}

/// Result of restoring a prior payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// The entry was evicted in the meantime.
    Missing,
    /// The entry was written again after the patch; nothing was restored.
    /// `settled` is set when a fetched payload replaced it.
    Superseded {
        expected: u64,
        actual: u64,
        settled: bool,
    },
}

/// An entry touched by tag invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidated {
    pub key: QueryKey,
    /// Subscribed entries move to `Refetching`, the rest to `Stale`.
    pub subscribed: bool,
}

/// Error type for cache store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store lock was poisoned by a panicking writer.
    LockPoisoned(&'static str),
    /// Serialization/deserialization error.
    Serde(String),
    /// No entry under this key.
    NotFound(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::LockPoisoned(operation) => {
                write!(f, "cache lock poisoned during {}", operation)
            }
            CacheError::Serde(msg) => write!(f, "cache serialization error: {}", msg),
            CacheError::NotFound(key) => write!(f, "cache entry not found: {}", key),
        }
    }
}

impl std::error::Error for CacheError {}
