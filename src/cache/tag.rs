use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordId};

/// Invalidation label attached to cache entries.
///
/// `List` covers a whole collection ("every list of templates"), `Id` a
/// single record. Queries declare the tags they provide; mutations name the
/// tags they invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    List(String),
    Id(String, RecordId),
}

impl Tag {
    pub fn list(kind: impl Into<String>) -> Self {
        Tag::List(kind.into())
    }

    pub fn id(kind: impl Into<String>, id: RecordId) -> Self {
        Tag::Id(kind.into(), id)
    }

    /// List tag for a record type.
    pub fn list_of<R: Record>() -> Self {
        Tag::List(R::KIND.to_string())
    }

    /// Identity tag for a record.
    pub fn of<R: Record>(record: &R) -> Self {
        Tag::Id(R::KIND.to_string(), record.id())
    }

    pub fn kind(&self) -> &str {
        match self {
            Tag::List(kind) | Tag::Id(kind, _) => kind,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::List(kind) => write!(f, "{}:LIST", kind),
            Tag::Id(kind, id) => write!(f, "{}:{}", kind, id),
        }
    }
}
