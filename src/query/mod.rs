//! Query Registry - declarative descriptors of read operations.
//!
//! A `Query` names a family of cache entries, builds the backend request for
//! one argument variant, declares the tags a result provides, and optionally
//! says which records belong to a filtered variant. The registry erases the
//! types so the client can refetch any cached key from its stored arguments.
//!
//! ## Example
//!
//! ```ignore
//! struct ListStudents;
//!
//! impl Query for ListStudents {
//!     const NAME: &'static str = "list_students";
//!     type Args = PageArgs;
//!     type Output = Vec<Student>;
//!
//!     fn request(args: &PageArgs) -> ApiRequest {
//!         ApiRequest::get("/students/").param_opt("limit", args.limit)
//!     }
//!
//!     fn provides(_args: &PageArgs, payload: &Value) -> Vec<Tag> {
//!         list_tags("Student", payload)
//!     }
//! }
//!
//! let registry = QueryRegistry::new().register::<ListStudents>();
//! ```

mod registry;

use std::cmp::Ordering;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::cache::Tag;
use crate::record::value_id;
use crate::transport::ApiRequest;

pub use registry::{QueryDescriptor, QueryRegistry};

/// A read operation against the backend.
pub trait Query: 'static {
    /// Family name shared by every argument variant.
    const NAME: &'static str;

    /// Fields used to keep list payloads ordered after an optimistic insert.
    const SORT_BY: &'static [&'static str] = &[];

    type Args: Serialize + DeserializeOwned + Send + Sync;
    type Output: DeserializeOwned;

    fn request(args: &Self::Args) -> ApiRequest;

    /// Tags provided by a fetched payload.
    fn provides(args: &Self::Args, payload: &Value) -> Vec<Tag>;

    /// Whether a record belongs to the variant selected by `args`.
    fn matches(args: &Self::Args, record: &Value) -> bool {
        let _ = (args, record);
        true
    }
}

/// List tag plus one identity tag per element carrying an `id`.
pub fn list_tags(kind: &str, payload: &Value) -> Vec<Tag> {
    let mut tags = vec![Tag::list(kind)];
    if let Some(items) = payload.as_array() {
        tags.extend(items.iter().filter_map(value_id).map(|id| Tag::id(kind, id)));
    }
    tags
}

/// Identity tag of a single-record payload.
pub fn record_tags(kind: &str, payload: &Value) -> Vec<Tag> {
    value_id(payload)
        .map(|id| vec![Tag::id(kind, id)])
        .unwrap_or_default()
}

/// Order two records by the given fields. Strings compare lexically (ISO
/// dates and times sort correctly), numbers numerically, missing last.
pub fn compare_records(fields: &[&str], a: &Value, b: &Value) -> Ordering {
    for field in fields {
        let ordering = match (a.get(*field), b.get(*field)) {
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
