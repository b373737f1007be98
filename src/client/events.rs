//! Cache change notifications for views observing the store.

use std::sync::Mutex;

use event_emitter_rs::EventEmitter;

use crate::cache::QueryKey;

/// A fresh payload (fetch, patch or rollback) landed in an entry.
pub const CACHE_UPDATED: &str = "cache.updated";
/// An entry was invalidated and is waiting for a refetch.
pub const CACHE_INVALIDATED: &str = "cache.invalidated";
/// A fetch for an entry failed.
pub const CACHE_FAILED: &str = "cache.failed";
/// An unused entry was evicted.
pub const CACHE_EVICTED: &str = "cache.evicted";

/// Emitter wrapper shared by the client. Listeners receive the key rendered
/// as `query(args)`.
///
/// Listeners run on emitter threads, not inline with the write.
pub struct CacheEvents {
    emitter: Mutex<EventEmitter>,
}

impl Default for CacheEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEvents {
    pub fn new() -> Self {
        Self {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// Register a listener for one of the `CACHE_*` events.
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        if let Ok(mut emitter) = self.emitter.lock() {
            emitter.on(event, listener);
        }
    }

    pub(crate) fn emit(&self, event: &str, key: &QueryKey) {
        // A poisoned emitter only loses notifications, never cache writes.
        if let Ok(mut emitter) = self.emitter.lock() {
            emitter.emit(event, key.to_string());
        }
    }

    pub(crate) fn emit_all<'k>(&self, event: &str, keys: impl IntoIterator<Item = &'k QueryKey>) {
        for key in keys {
            self.emit(event, key);
        }
    }
}
