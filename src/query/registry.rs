use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::Query;
use crate::cache::{CacheError, Tag};
use crate::transport::ApiRequest;

/// Type-erased view of a `Query`, working on JSON arguments.
#[derive(Clone, Copy)]
pub struct QueryDescriptor {
    name: &'static str,
    sort_by: &'static [&'static str],
    request: fn(&Value) -> Result<ApiRequest, CacheError>,
    provides: fn(&Value, &Value) -> Vec<Tag>,
    matches: fn(&Value, &Value) -> bool,
}

impl QueryDescriptor {
    pub fn of<Q: Query>() -> Self {
        Self {
            name: Q::NAME,
            sort_by: Q::SORT_BY,
            request: request_of::<Q>,
            provides: provides_of::<Q>,
            matches: matches_of::<Q>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sort_by(&self) -> &'static [&'static str] {
        self.sort_by
    }

    pub fn request(&self, args: &Value) -> Result<ApiRequest, CacheError> {
        (self.request)(args)
    }

    pub fn provides(&self, args: &Value, payload: &Value) -> Vec<Tag> {
        (self.provides)(args, payload)
    }

    pub fn matches(&self, args: &Value, record: &Value) -> bool {
        (self.matches)(args, record)
    }
}

impl fmt::Debug for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("name", &self.name)
            .field("sort_by", &self.sort_by)
            .finish()
    }
}

fn decode_args<Q: Query>(args: &Value) -> Result<Q::Args, CacheError> {
    serde_json::from_value(args.clone()).map_err(|e| CacheError::Serde(e.to_string()))
}

fn request_of<Q: Query>(args: &Value) -> Result<ApiRequest, CacheError> {
    Ok(Q::request(&decode_args::<Q>(args)?))
}

fn provides_of<Q: Query>(args: &Value, payload: &Value) -> Vec<Tag> {
    match decode_args::<Q>(args) {
        Ok(args) => Q::provides(&args, payload),
        Err(_) => Vec::new(),
    }
}

fn matches_of<Q: Query>(args: &Value, record: &Value) -> bool {
    // Arguments we cannot read select nothing we could reason about.
    match decode_args::<Q>(args) {
        Ok(args) => Q::matches(&args, record),
        Err(_) => false,
    }
}

/// Registry of known query families, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    descriptors: HashMap<&'static str, QueryDescriptor>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query family.
    ///
    /// Returns `self` for chaining.
    pub fn register<Q: Query>(mut self) -> Self {
        self.descriptors.insert(Q::NAME, QueryDescriptor::of::<Q>());
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryDescriptor> {
        self.descriptors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Registered family names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.descriptors.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
