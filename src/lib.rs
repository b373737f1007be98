//! Client-side data layer for the training studio backend.
//!
//! A shared query cache fed by a REST `Transport`, optimistic mutations that
//! patch every cached variant of a query family and roll back exactly on
//! failure, and tag invalidation for writes that do not patch.

extern crate self as training_desk;

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod forms;
pub mod mutation;
pub mod query;
mod record;
pub mod transport;

pub use cache::{
    CacheEntry, CacheError, CacheStore, EntryState, InMemoryCacheStore, Invalidated, QueryKey,
    Tag,
};
pub use client::{ApiClient, CacheEvents, ClientError};
pub use config::{ClientConfig, ConfigError, InvalidationPolicy, RollbackPolicy};
pub use mutation::{Mutation, PatchRecord, RecordEdit, RollbackReport};
pub use query::{Query, QueryDescriptor, QueryRegistry};
pub use record::{value_id, Record, RecordId};
pub use transport::{ApiError, ApiRequest, Method, Transport};
#[cfg(feature = "http")]
pub use transport::HttpTransport;

// Re-export the derive macro for `Record`
pub use training_desk_macros::Record;
