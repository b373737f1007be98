//! Record-level edits applied to cached payloads.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::CacheError;
use crate::query::{compare_records, QueryDescriptor};
use crate::record::{value_id, RecordId};

/// An edit to one logical record, applied to every cached variant of a query family.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEdit {
    /// Merge `fields` into the record. In filtered list variants the record is
    /// dropped when it stops matching, and inserted when it starts matching.
    Update {
        query: &'static str,
        id: RecordId,
        fields: Map<String, Value>,
    },
    /// Insert or replace `child` (by id) in the parent's embedded collection.
    UpsertChild {
        query: &'static str,
        parent_id: RecordId,
        field: &'static str,
        child: Value,
    },
    /// Remove the child with `child_id` from the parent's embedded collection.
    RemoveChild {
        query: &'static str,
        parent_id: RecordId,
        field: &'static str,
        child_id: RecordId,
    },
}

impl RecordEdit {
    /// Build an `Update` from any serializable set of fields.
    pub fn update<F: Serialize + ?Sized>(
        query: &'static str,
        id: RecordId,
        fields: &F,
    ) -> Result<Self, CacheError> {
        match serde_json::to_value(fields).map_err(|e| CacheError::Serde(e.to_string()))? {
            Value::Object(fields) => Ok(RecordEdit::Update { query, id, fields }),
            other => Err(CacheError::Serde(format!(
                "record update fields must be an object, got {}",
                other
            ))),
        }
    }

    pub fn query(&self) -> &'static str {
        match self {
            RecordEdit::Update { query, .. }
            | RecordEdit::UpsertChild { query, .. }
            | RecordEdit::RemoveChild { query, .. } => query,
        }
    }

    /// Find the target record as it currently appears in any payload.
    ///
    /// Only `Update` needs it: a filtered variant that never held the record
    /// can only receive it through a copy taken from another variant.
    pub(crate) fn source_record<'v>(&self, payloads: impl Iterator<Item = &'v Value>) -> Option<Value> {
        let RecordEdit::Update { id, .. } = self else {
            return None;
        };
        copies(payloads, *id).into_iter().next().cloned()
    }

    /// The edit that takes this one back, read from the payloads it is about
    /// to change. `None` when the target record is not cached.
    pub(crate) fn undo<'v>(&self, payloads: impl Iterator<Item = &'v Value>) -> Option<Undo> {
        match self {
            RecordEdit::Update { query, id, fields } => {
                let source = copies(payloads, *id).into_iter().next()?;
                let prior = fields
                    .keys()
                    .map(|name| (name.clone(), source.get(name).cloned().unwrap_or(Value::Null)))
                    .collect();
                let mut moved = source.clone();
                merge(&mut moved, fields);
                Some(Undo {
                    edit: RecordEdit::Update {
                        query: *query,
                        id: *id,
                        fields: prior,
                    },
                    forward: Some(fields.clone()),
                    moved: Some(moved),
                })
            }
            RecordEdit::UpsertChild {
                query,
                parent_id,
                field,
                child,
            } => {
                let child_id = value_id(child)?;
                let edit = match find_child(payloads, *parent_id, field, child_id) {
                    Some(prior) => RecordEdit::UpsertChild {
                        query: *query,
                        parent_id: *parent_id,
                        field: *field,
                        child: prior.clone(),
                    },
                    None => RecordEdit::RemoveChild {
                        query: *query,
                        parent_id: *parent_id,
                        field: *field,
                        child_id,
                    },
                };
                Some(Undo::plain(edit))
            }
            // The child comes back at the end of the collection.
            RecordEdit::RemoveChild {
                query,
                parent_id,
                field,
                child_id,
            } => {
                let prior = find_child(payloads, *parent_id, field, *child_id)?;
                Some(Undo::plain(RecordEdit::UpsertChild {
                    query: *query,
                    parent_id: *parent_id,
                    field: *field,
                    child: prior.clone(),
                }))
            }
        }
    }

    /// Apply the edit to one payload. Returns whether anything changed.
    pub(crate) fn apply(
        &self,
        descriptor: Option<&QueryDescriptor>,
        args: &Value,
        payload: &mut Value,
        source: Option<&Value>,
    ) -> bool {
        match self {
            RecordEdit::Update { id, fields, .. } => {
                apply_update(descriptor, args, payload, *id, fields, source)
            }
            RecordEdit::UpsertChild {
                parent_id,
                field,
                child,
                ..
            } => with_parent(payload, *parent_id, |parent| upsert_child(parent, field, child)),
            RecordEdit::RemoveChild {
                parent_id,
                field,
                child_id,
                ..
            } => with_parent(payload, *parent_id, |parent| remove_child(parent, field, *child_id)),
        }
    }
}

/// Record-level inverse of one applied edit.
///
/// Used when a payload was patched again after the edit, so putting back the
/// whole prior payload would drop the newer change.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Undo {
    edit: RecordEdit,
    /// Fields the forward `Update` wrote.
    forward: Option<Map<String, Value>>,
    /// The record as the forward `Update` left it.
    moved: Option<Value>,
}

impl Undo {
    fn plain(edit: RecordEdit) -> Self {
        Self {
            edit,
            forward: None,
            moved: None,
        }
    }

    pub(crate) fn edit(&self) -> &RecordEdit {
        &self.edit
    }

    /// False once some cached copy of the record carries other values for the
    /// fields this edit wrote: a later write owns the record now.
    pub(crate) fn still_ours(&self, payloads: &[Value]) -> bool {
        let (RecordEdit::Update { id, .. }, Some(forward)) = (&self.edit, &self.forward) else {
            return true;
        };
        copies(payloads.iter(), *id)
            .into_iter()
            .all(|copy| forward.iter().all(|(name, value)| copy.get(name) == Some(value)))
    }

    /// Copy used to re-insert the record into variants it was moved out of.
    pub(crate) fn source(&self, payloads: &[Value]) -> Option<Value> {
        let RecordEdit::Update { id, .. } = &self.edit else {
            return None;
        };
        copies(payloads.iter(), *id)
            .into_iter()
            .next()
            .cloned()
            .or_else(|| self.moved.clone())
    }
}

fn copies<'v>(payloads: impl Iterator<Item = &'v Value>, id: RecordId) -> Vec<&'v Value> {
    let mut found = Vec::new();
    for payload in payloads {
        match payload {
            Value::Array(items) => {
                found.extend(items.iter().filter(|item| value_id(item) == Some(id)));
            }
            Value::Object(_) if value_id(payload) == Some(id) => found.push(payload),
            _ => {}
        }
    }
    found
}

fn find_child<'v>(
    payloads: impl Iterator<Item = &'v Value>,
    parent_id: RecordId,
    field: &str,
    child_id: RecordId,
) -> Option<&'v Value> {
    copies(payloads, parent_id)
        .into_iter()
        .filter_map(|parent| parent.get(field).and_then(Value::as_array))
        .flatten()
        .find(|child| value_id(child) == Some(child_id))
}

fn merge(record: &mut Value, fields: &Map<String, Value>) {
    if let Value::Object(object) = record {
        for (name, value) in fields {
            object.insert(name.clone(), value.clone());
        }
    }
}

fn matches(descriptor: Option<&QueryDescriptor>, args: &Value, record: &Value) -> bool {
    descriptor.map_or(true, |d| d.matches(args, record))
}

fn sort(descriptor: Option<&QueryDescriptor>, items: &mut [Value]) {
    if let Some(descriptor) = descriptor {
        if !descriptor.sort_by().is_empty() {
            items.sort_by(|a, b| compare_records(descriptor.sort_by(), a, b));
        }
    }
}

fn apply_update(
    descriptor: Option<&QueryDescriptor>,
    args: &Value,
    payload: &mut Value,
    id: RecordId,
    fields: &Map<String, Value>,
    source: Option<&Value>,
) -> bool {
    match payload {
        Value::Array(items) => {
            match items.iter().position(|item| value_id(item) == Some(id)) {
                Some(pos) => {
                    let mut updated = items[pos].clone();
                    merge(&mut updated, fields);
                    if !matches(descriptor, args, &updated) {
                        items.remove(pos);
                        return true;
                    }
                    if updated == items[pos] {
                        return false;
                    }
                    items[pos] = updated;
                    sort(descriptor, items);
                    true
                }
                None => {
                    // Insert only when the edit moves the record into this
                    // variant; other variants without it stay untouched.
                    let Some(source) = source else {
                        return false;
                    };
                    let mut updated = source.clone();
                    merge(&mut updated, fields);
                    if matches(descriptor, args, source) || !matches(descriptor, args, &updated) {
                        return false;
                    }
                    items.push(updated);
                    sort(descriptor, items);
                    true
                }
            }
        }
        Value::Object(_) if value_id(payload) == Some(id) => {
            let mut updated = payload.clone();
            merge(&mut updated, fields);
            if updated == *payload {
                return false;
            }
            *payload = updated;
            true
        }
        _ => false,
    }
}

fn with_parent(
    payload: &mut Value,
    parent_id: RecordId,
    mut edit: impl FnMut(&mut Value) -> bool,
) -> bool {
    match payload {
        Value::Array(items) => items
            .iter_mut()
            .find(|item| value_id(item) == Some(parent_id))
            .map(|parent| edit(parent))
            .unwrap_or(false),
        Value::Object(_) if value_id(payload) == Some(parent_id) => edit(payload),
        _ => false,
    }
}

fn upsert_child(parent: &mut Value, field: &str, child: &Value) -> bool {
    let Value::Object(object) = parent else {
        return false;
    };
    let collection = object
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(children) = collection else {
        return false;
    };

    let child_id = value_id(child);
    match children
        .iter()
        .position(|existing| child_id.is_some() && value_id(existing) == child_id)
    {
        Some(pos) if children[pos] == *child => false,
        Some(pos) => {
            children[pos] = child.clone();
            true
        }
        None => {
            children.push(child.clone());
            true
        }
    }
}

fn remove_child(parent: &mut Value, field: &str, child_id: RecordId) -> bool {
    let Some(Value::Array(children)) = parent.get_mut(field) else {
        return false;
    };
    let before = children.len();
    children.retain(|child| value_id(child) != Some(child_id));
    children.len() != before
}
