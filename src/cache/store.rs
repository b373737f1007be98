//! CacheStore - the only way the rest of the crate touches cached payloads.

use std::time::{Duration, Instant};

use serde_json::Value;

use super::{CacheEntry, CacheError, Invalidated, PatchOutcome, QueryKey, RestoreOutcome, Tag};

/// Abstract cache storage.
///
/// Every write bumps the entry version. Reference counting drives eviction:
/// entries with zero subscribers are dropped once they have been unused for
/// longer than the retention window.
pub trait CacheStore: Send + Sync {
    /// Snapshot of an entry, if present.
    fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Authoritative overwrite with a freshly fetched payload. Creates the entry
    /// if needed and marks it `Ready`. Returns the new version.
    fn set(&self, key: &QueryKey, payload: Value, tags: Vec<Tag>) -> Result<u64, CacheError>;

    /// Mark a fetch as started (`Loading` without payload, `Refetching` with one).
    fn begin_fetch(&self, key: &QueryKey) -> Result<(), CacheError>;

    /// Record a failed fetch. The previous payload, if any, is kept.
    fn fail(&self, key: &QueryKey, message: &str) -> Result<(), CacheError>;

    /// Edit the payload in place.
    ///
    /// The closure receives the entry arguments and the payload and returns
    /// whether it changed anything. Returns `None` when the entry is missing,
    /// has no payload, or the edit was a no-op.
    fn patch(
        &self,
        key: &QueryKey,
        edit: &mut dyn FnMut(&Value, &mut Value) -> bool,
    ) -> Result<Option<PatchOutcome>, CacheError>;

    /// Put back a prior payload. With `expected_version` set, the restore only
    /// happens if the entry is still at that version.
    fn restore(
        &self,
        key: &QueryKey,
        prior: Value,
        expected_version: Option<u64>,
    ) -> Result<RestoreOutcome, CacheError>;

    /// Every live key of a query family.
    fn keys_for_query(&self, query: &str) -> Result<Vec<QueryKey>, CacheError>;

    /// Keys waiting for a refetch that has not been started yet.
    fn pending_refetch(&self) -> Result<Vec<QueryKey>, CacheError>;

    /// Mark every entry providing one of the tags as stale.
    fn invalidate(&self, tags: &[Tag]) -> Result<Vec<Invalidated>, CacheError>;

    /// Add a subscriber. Creates a `Loading` entry if needed. Returns the new count.
    fn subscribe(&self, key: &QueryKey) -> Result<usize, CacheError>;

    /// Drop a subscriber. Returns the remaining count (0 for unknown keys).
    fn unsubscribe(&self, key: &QueryKey, now: Instant) -> Result<usize, CacheError>;

    /// Remove entries that have had no subscribers for longer than `retention`.
    fn evict_unused(&self, now: Instant, retention: Duration) -> Result<Vec<QueryKey>, CacheError>;
}
