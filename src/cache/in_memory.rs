//! InMemoryCacheStore - HashMap-backed cache store.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{
    CacheEntry, CacheError, CacheStore, EntryState, Invalidated, PatchOutcome, QueryKey,
    RestoreOutcome, Tag,
};

/// Internal stored representation of a cache entry.
struct StoredEntry {
    args: Value,
    payload: Option<Value>,
    tags: Vec<Tag>,
    state: EntryState,
    version: u64,
    // version of the last fetched payload
    settled_version: u64,
    in_flight: bool,
    subscribers: usize,
    unused_since: Option<Instant>,
}

impl StoredEntry {
    fn new(args: Value) -> Self {
        Self {
            args,
            payload: None,
            tags: Vec::new(),
            state: EntryState::Loading,
            version: 0,
            settled_version: 0,
            in_flight: false,
            subscribers: 0,
            unused_since: Some(Instant::now()),
        }
    }

    fn snapshot(&self, key: &QueryKey) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            args: self.args.clone(),
            payload: self.payload.clone(),
            tags: self.tags.clone(),
            state: self.state.clone(),
            version: self.version,
            subscribers: self.subscribers,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, StoredEntry>,
    // query family -> live keys
    by_query: HashMap<String, BTreeSet<QueryKey>>,
    by_tag: HashMap<Tag, HashSet<QueryKey>>,
}

impl Inner {
    fn entry_or_create(&mut self, key: &QueryKey) -> Result<&mut StoredEntry, CacheError> {
        if !self.entries.contains_key(key) {
            let args = key.args_value()?;
            self.by_query
                .entry(key.query().to_string())
                .or_default()
                .insert(key.clone());
            self.entries.insert(key.clone(), StoredEntry::new(args));
        }
        self.entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    fn retag(&mut self, key: &QueryKey, tags: &[Tag]) {
        if let Some(entry) = self.entries.get(key) {
            for old in &entry.tags {
                if let Some(keys) = self.by_tag.get_mut(old) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.by_tag.remove(old);
                    }
                }
            }
        }
        for tag in tags {
            self.by_tag.entry(tag.clone()).or_default().insert(key.clone());
        }
    }

    fn remove(&mut self, key: &QueryKey) {
        self.retag(key, &[]);
        if let Some(keys) = self.by_query.get_mut(key.query()) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_query.remove(key.query());
            }
        }
        self.entries.remove(key);
    }
}

/// In-memory cache store.
///
/// Keeps a secondary index from query family to live keys and from tag to
/// keys, so family scans and invalidation never inspect serialized keys.
/// Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCacheStore {
    /// Create a new empty cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| CacheError::LockPoisoned("get"))?;
        Ok(inner.entries.get(key).map(|entry| entry.snapshot(key)))
    }

    fn set(&self, key: &QueryKey, payload: Value, tags: Vec<Tag>) -> Result<u64, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("set"))?;

        inner.entry_or_create(key)?;
        inner.retag(key, &tags);
        let entry = inner.entry_or_create(key)?;
        entry.payload = Some(payload);
        entry.tags = tags;
        entry.state = EntryState::Ready;
        entry.in_flight = false;
        entry.version += 1;
        entry.settled_version = entry.version;
        Ok(entry.version)
    }

    fn begin_fetch(&self, key: &QueryKey) -> Result<(), CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("begin_fetch"))?;

        let entry = inner.entry_or_create(key)?;
        entry.in_flight = true;
        entry.state = if entry.payload.is_some() {
            EntryState::Refetching
        } else {
            EntryState::Loading
        };
        Ok(())
    }

    fn fail(&self, key: &QueryKey, message: &str) -> Result<(), CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("fail"))?;

        let entry = inner.entry_or_create(key)?;
        entry.state = EntryState::Failed(message.to_string());
        entry.in_flight = false;
        Ok(())
    }

    fn patch(
        &self,
        key: &QueryKey,
        edit: &mut dyn FnMut(&Value, &mut Value) -> bool,
    ) -> Result<Option<PatchOutcome>, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("patch"))?;

        let Some(entry) = inner.entries.get_mut(key) else {
            return Ok(None);
        };
        let Some(payload) = entry.payload.as_mut() else {
            return Ok(None);
        };

        let prior = payload.clone();
        if !edit(&entry.args, payload) {
            // Undo partial edits from a closure that bailed out halfway.
            *payload = prior;
            return Ok(None);
        }

        let prior_version = entry.version;
        entry.version += 1;
        Ok(Some(PatchOutcome {
            prior,
            prior_version,
            version: entry.version,
        }))
    }

    fn restore(
        &self,
        key: &QueryKey,
        prior: Value,
        expected_version: Option<u64>,
    ) -> Result<RestoreOutcome, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("restore"))?;

        let Some(entry) = inner.entries.get_mut(key) else {
            return Ok(RestoreOutcome::Missing);
        };

        if let Some(expected) = expected_version {
            if entry.version != expected {
                return Ok(RestoreOutcome::Superseded {
                    expected,
                    actual: entry.version,
                    settled: entry.settled_version > expected,
                });
            }
        }

        entry.payload = Some(prior);
        entry.version += 1;
        Ok(RestoreOutcome::Restored)
    }

    fn keys_for_query(&self, query: &str) -> Result<Vec<QueryKey>, CacheError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| CacheError::LockPoisoned("keys_for_query"))?;

        Ok(inner
            .by_query
            .get(query)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn pending_refetch(&self) -> Result<Vec<QueryKey>, CacheError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| CacheError::LockPoisoned("pending_refetch"))?;

        let mut keys: Vec<QueryKey> = inner
            .entries
            .iter()
            // Fetches already on their way are not due again.
            .filter(|(_, entry)| entry.state == EntryState::Refetching && !entry.in_flight)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn invalidate(&self, tags: &[Tag]) -> Result<Vec<Invalidated>, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("invalidate"))?;

        let mut keys: BTreeSet<QueryKey> = BTreeSet::new();
        for tag in tags {
            if let Some(tagged) = inner.by_tag.get(tag) {
                keys.extend(tagged.iter().cloned());
            }
        }

        let mut touched = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(entry) = inner.entries.get_mut(&key) else {
                continue;
            };
            // A first fetch is already on its way.
            if entry.state == EntryState::Loading {
                continue;
            }
            let subscribed = entry.subscribers > 0;
            entry.state = if subscribed {
                EntryState::Refetching
            } else {
                EntryState::Stale
            };
            touched.push(Invalidated { key, subscribed });
        }
        Ok(touched)
    }

    fn subscribe(&self, key: &QueryKey) -> Result<usize, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("subscribe"))?;

        let entry = inner.entry_or_create(key)?;
        entry.subscribers += 1;
        entry.unused_since = None;
        Ok(entry.subscribers)
    }

    fn unsubscribe(&self, key: &QueryKey, now: Instant) -> Result<usize, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("unsubscribe"))?;

        let Some(entry) = inner.entries.get_mut(key) else {
            return Ok(0);
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            entry.unused_since = Some(now);
        }
        Ok(entry.subscribers)
    }

    fn evict_unused(&self, now: Instant, retention: Duration) -> Result<Vec<QueryKey>, CacheError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CacheError::LockPoisoned("evict_unused"))?;

        let mut expired: Vec<QueryKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.subscribers == 0
                    && entry
                        .unused_since
                        .map(|since| now.saturating_duration_since(since) > retention)
                        .unwrap_or(false)
            })
            .map(|(key, _)| key.clone())
            .collect();
        expired.sort();

        for key in &expired {
            inner.remove(key);
        }
        Ok(expired)
    }
}
