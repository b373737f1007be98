//! API client - queries through the cache, mutations through the executor.
//!
//! `ApiClient` ties a `Transport`, a `CacheStore` and a `QueryRegistry`
//! together. Reads go through `query`, which serves fresh entries from the
//! store and fetches everything else. Writes go through `mutation`, see
//! `crate::mutation`.

mod error;
mod events;

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore, InMemoryCacheStore, Invalidated, QueryKey, Tag};
use crate::config::ClientConfig;
use crate::mutation::Mutation;
use crate::query::{Query, QueryDescriptor, QueryRegistry};
use crate::transport::{ApiRequest, Transport};

pub use error::ClientError;
pub use events::{CacheEvents, CACHE_EVICTED, CACHE_FAILED, CACHE_INVALIDATED, CACHE_UPDATED};

/// Client for the training backend with a shared query cache.
pub struct ApiClient<T, S = InMemoryCacheStore> {
    transport: T,
    store: S,
    registry: QueryRegistry,
    config: ClientConfig,
    events: CacheEvents,
}

impl<T: Transport> ApiClient<T> {
    /// Client with an in-memory store and every backend query registered.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_store(transport, InMemoryCacheStore::new(), config)
    }
}

impl<T: Transport, S: CacheStore> ApiClient<T, S> {
    pub fn with_store(transport: T, store: S, config: ClientConfig) -> Self {
        Self {
            transport,
            store,
            registry: crate::api::registry(),
            config,
            events: CacheEvents::new(),
        }
    }

    /// Replace the query registry.
    pub fn with_registry(mut self, registry: QueryRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &CacheEvents {
        &self.events
    }

    /// Register a listener for cache change events.
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.events.on(event, listener);
    }

    pub fn key<Q: Query>(&self, args: &Q::Args) -> Result<QueryKey, ClientError> {
        Ok(QueryKey::new(Q::NAME, args)?)
    }

    /// Start observing a query variant. Subscribed entries are refetched
    /// eagerly when invalidated and are never evicted.
    pub fn subscribe<Q: Query>(&self, args: &Q::Args) -> Result<QueryKey, ClientError> {
        let key = self.key::<Q>(args)?;
        let count = self.store.subscribe(&key)?;
        debug!(key = %key, subscribers = count, "subscribed");
        Ok(key)
    }

    /// Stop observing. The entry stays cached for the retention window.
    pub fn unsubscribe(&self, key: &QueryKey) -> Result<usize, ClientError> {
        Ok(self.store.unsubscribe(key, Instant::now())?)
    }

    /// Read a query, from the cache when the entry is fresh.
    pub async fn query<Q: Query>(&self, args: &Q::Args) -> Result<Q::Output, ClientError> {
        let key = self.key::<Q>(args)?;
        if let Some(entry) = self.store.get(&key)? {
            if entry.is_fresh() {
                if let Some(output) = entry.decode::<Q::Output>()? {
                    return Ok(output);
                }
            }
        }
        let payload = self.fetch_with(self.descriptor::<Q>(), &key).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Fetch a query variant from the backend regardless of cache state.
    pub async fn refetch<Q: Query>(&self, args: &Q::Args) -> Result<Q::Output, ClientError> {
        let key = self.key::<Q>(args)?;
        let payload = self.fetch_with(self.descriptor::<Q>(), &key).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Cached payload of a query variant, whatever its state.
    pub fn cached<Q: Query>(&self, args: &Q::Args) -> Result<Option<Q::Output>, ClientError> {
        let key = self.key::<Q>(args)?;
        match self.store.get(&key)? {
            Some(entry) => Ok(entry.decode()?),
            None => Ok(None),
        }
    }

    pub fn entry(&self, key: &QueryKey) -> Result<Option<CacheEntry>, ClientError> {
        Ok(self.store.get(key)?)
    }

    /// Fetch any cached key using its registered descriptor and stored arguments.
    pub async fn fetch(&self, key: &QueryKey) -> Result<Value, ClientError> {
        let descriptor = *self
            .registry
            .get(key.query())
            .ok_or_else(|| ClientError::UnknownQuery(key.query().to_string()))?;
        self.fetch_with(descriptor, key).await
    }

    fn descriptor<Q: Query>(&self) -> QueryDescriptor {
        self.registry
            .get(Q::NAME)
            .copied()
            .unwrap_or_else(QueryDescriptor::of::<Q>)
    }

    async fn fetch_with(
        &self,
        descriptor: QueryDescriptor,
        key: &QueryKey,
    ) -> Result<Value, ClientError> {
        let args = key.args_value()?;
        let request = descriptor.request(&args)?;
        self.store.begin_fetch(key)?;

        debug!(key = %key, %request, "fetching");
        match self.transport.send(request).await {
            Ok(payload) => {
                let tags = descriptor.provides(&args, &payload);
                let version = self.store.set(key, payload.clone(), tags)?;
                debug!(key = %key, version, "fetched");
                self.events.emit(CACHE_UPDATED, key);
                Ok(payload)
            }
            Err(err) => {
                warn!(key = %key, error = %err, "fetch failed");
                self.store.fail(key, &err.user_message())?;
                self.events.emit(CACHE_FAILED, key);
                Err(err.into())
            }
        }
    }

    /// Start a write. See `Mutation` for the optimistic and invalidation options.
    pub fn mutation(&self, name: impl Into<String>, request: ApiRequest) -> Mutation<'_, T, S> {
        Mutation::new(self, name.into(), request)
    }

    /// Invalidate every entry providing one of `tags`.
    ///
    /// Subscribed entries are refetched right away when
    /// `refetch_on_invalidate` is set; refetch failures are logged and leave
    /// the entry `Failed`.
    pub async fn invalidate(&self, tags: &[Tag]) -> Result<Vec<Invalidated>, ClientError> {
        let invalidated = self.store.invalidate(tags)?;
        debug!(tags = ?tags, entries = invalidated.len(), "invalidated");
        self.events
            .emit_all(CACHE_INVALIDATED, invalidated.iter().map(|i| &i.key));

        if self.config.refetch_on_invalidate {
            for (key, result) in self.refetch_pending().await? {
                if let Err(err) = result {
                    warn!(key = %key, error = %err, "refetch after invalidation failed");
                }
            }
        }
        Ok(invalidated)
    }

    /// Refetch every entry waiting in `Refetching`, one after another.
    pub async fn refetch_pending(
        &self,
    ) -> Result<Vec<(QueryKey, Result<Value, ClientError>)>, ClientError> {
        let pending = self.store.pending_refetch()?;
        let mut results = Vec::with_capacity(pending.len());
        for key in pending {
            let result = self.fetch(&key).await;
            results.push((key, result));
        }
        Ok(results)
    }

    /// Drop entries unused for longer than the retention window.
    pub fn evict_unused(&self) -> Result<Vec<QueryKey>, ClientError> {
        self.evict_unused_at(Instant::now())
    }

    pub fn evict_unused_at(&self, now: Instant) -> Result<Vec<QueryKey>, ClientError> {
        let evicted = self.store.evict_unused(now, self.config.retention())?;
        if !evicted.is_empty() {
            debug!(entries = evicted.len(), "evicted unused entries");
        }
        self.events.emit_all(CACHE_EVICTED, evicted.iter());
        Ok(evicted)
    }
}
