//! Record - identity of the backend DTOs held in the cache.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Backend identifiers are integers.
pub type RecordId = i64;

/// Trait for backend records that can be located inside cached payloads.
///
/// Usually derived with `#[derive(Record)]`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The record kind used for cache tags (e.g., "TrainingTemplate", "Student").
    const KIND: &'static str;

    /// Returns the unique identifier for this record.
    fn id(&self) -> RecordId;
}

/// Read the `id` field of a JSON record, if it has one.
pub fn value_id(record: &Value) -> Option<RecordId> {
    record.get("id").and_then(Value::as_i64)
}
