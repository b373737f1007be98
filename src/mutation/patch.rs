//! PatchRecord - reversible log of the edits one mutation applied.

use serde_json::Value;
use tracing::{debug, warn};

use super::edit::Undo;
use super::RecordEdit;
use crate::cache::{CacheError, CacheStore, QueryKey, RestoreOutcome};
use crate::config::RollbackPolicy;
use crate::query::QueryRegistry;

/// One touched entry: its payload before the first edit and its version
/// after the last one.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    pub key: QueryKey,
    pub prior: Value,
    pub version: u64,
    // indexes into `PatchRecord::undos`, in application order
    undo: Vec<usize>,
}

/// What a rollback did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub restored: Vec<QueryKey>,
    /// Entries patched again after this patch; only this mutation's records
    /// were taken back.
    pub reverted: Vec<QueryKey>,
    /// Entries written again after the patch, left as they are.
    pub superseded: Vec<QueryKey>,
    /// Entries evicted in the meantime.
    pub missing: Vec<QueryKey>,
}

/// Ordered log of the entries touched by one mutation.
///
/// Each key appears once, holding the payload from before this mutation's
/// first edit, so a rollback restores exactly the pre-mutation value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchRecord {
    ops: Vec<PatchOp>,
    undos: Vec<Undo>,
}

/// What rollback does with one undo when whole payloads can't be put back.
enum Revert {
    Apply { source: Option<Value> },
    /// A later write changed the same fields of the record.
    Skip,
}

impl PatchRecord {
    /// Apply `edits` to every live entry of their query families.
    ///
    /// Entries that do not contain the target record are skipped. If the store
    /// fails halfway, the entries already patched are put back before the
    /// error is returned.
    pub fn apply<S: CacheStore + ?Sized>(
        store: &S,
        registry: &QueryRegistry,
        edits: &[RecordEdit],
    ) -> Result<Self, CacheError> {
        let mut record = PatchRecord::default();
        for edit in edits {
            if let Err(err) = record.apply_one(store, registry, edit) {
                record.rollback(store, registry, RollbackPolicy::VersionChecked)?;
                return Err(err);
            }
        }
        Ok(record)
    }

    fn apply_one<S: CacheStore + ?Sized>(
        &mut self,
        store: &S,
        registry: &QueryRegistry,
        edit: &RecordEdit,
    ) -> Result<(), CacheError> {
        let descriptor = registry.get(edit.query());
        let keys = store.keys_for_query(edit.query())?;

        let payloads = family_payloads(store, &keys)?;
        let source = edit.source_record(payloads.iter());
        let undo = edit.undo(payloads.iter()).map(|undo| {
            self.undos.push(undo);
            self.undos.len() - 1
        });

        for key in keys {
            let outcome = store.patch(&key, &mut |args: &Value, payload: &mut Value| {
                edit.apply(descriptor, args, payload, source.as_ref())
            })?;
            let Some(outcome) = outcome else {
                continue;
            };
            debug!(key = %key, version = outcome.version, "patched cache entry");
            let position = match self.ops.iter().position(|op| op.key == key) {
                Some(position) => {
                    self.ops[position].version = outcome.version;
                    position
                }
                None => {
                    self.ops.push(PatchOp {
                        key,
                        prior: outcome.prior,
                        version: outcome.version,
                        undo: Vec::new(),
                    });
                    self.ops.len() - 1
                }
            };
            self.ops[position].undo.extend(undo);
        }
        Ok(())
    }

    /// Restore every touched entry, last touched first.
    ///
    /// With `VersionChecked`, an entry patched again by another mutation
    /// keeps that mutation's edits: only this mutation's records are taken
    /// back inside it. An entry refetched after the patch is left alone, and
    /// so is a record whose fields a later edit overwrote.
    pub fn rollback<S: CacheStore + ?Sized>(
        self,
        store: &S,
        registry: &QueryRegistry,
        policy: RollbackPolicy,
    ) -> Result<RollbackReport, CacheError> {
        let PatchRecord { ops, undos } = self;
        let reverts = plan_reverts(store, &undos)?;
        let mut report = RollbackReport::default();

        for op in ops.into_iter().rev() {
            let PatchOp {
                key,
                prior,
                version,
                undo,
            } = op;
            let expected = match policy {
                RollbackPolicy::VersionChecked => Some(version),
                RollbackPolicy::Always => None,
            };
            let contested = undo
                .iter()
                .any(|&index| matches!(reverts.get(index), Some(Revert::Skip)));

            let outcome = if contested && expected.is_some() {
                // Putting the whole payload back would resurrect the old copy.
                RestoreOutcome::Superseded {
                    expected: version,
                    actual: version,
                    settled: false,
                }
            } else {
                store.restore(&key, prior, expected)?
            };

            match outcome {
                RestoreOutcome::Restored => report.restored.push(key),
                RestoreOutcome::Missing => report.missing.push(key),
                RestoreOutcome::Superseded {
                    expected,
                    actual,
                    settled: false,
                } => {
                    if store.get(&key)?.is_none() {
                        report.missing.push(key);
                    } else if revert_records(store, registry, &key, &undo, &undos, &reverts)? {
                        debug!(key = %key, expected, actual, "reverted records inside a newer patch");
                        report.reverted.push(key);
                    } else {
                        report.superseded.push(key);
                    }
                }
                RestoreOutcome::Superseded {
                    expected,
                    actual,
                    settled: true,
                } => {
                    warn!(
                        key = %key,
                        expected,
                        actual,
                        "skipping rollback of cache entry refetched after the patch"
                    );
                    report.superseded.push(key);
                }
            }
        }
        Ok(report)
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.ops.iter().map(|op| &op.key)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn family_payloads<S: CacheStore + ?Sized>(
    store: &S,
    keys: &[QueryKey],
) -> Result<Vec<Value>, CacheError> {
    let mut payloads = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(payload) = store.get(key)?.and_then(|entry| entry.payload) {
            payloads.push(payload);
        }
    }
    Ok(payloads)
}

/// Decide every undo against the cache as it is before anything is put back.
fn plan_reverts<S: CacheStore + ?Sized>(
    store: &S,
    undos: &[Undo],
) -> Result<Vec<Revert>, CacheError> {
    let mut reverts = Vec::with_capacity(undos.len());
    for undo in undos {
        let keys = store.keys_for_query(undo.edit().query())?;
        let payloads = family_payloads(store, &keys)?;
        reverts.push(if undo.still_ours(&payloads) {
            Revert::Apply {
                source: undo.source(&payloads),
            }
        } else {
            Revert::Skip
        });
    }
    Ok(reverts)
}

/// Apply the entry's undos to it, newest first. Returns whether anything changed.
fn revert_records<S: CacheStore + ?Sized>(
    store: &S,
    registry: &QueryRegistry,
    key: &QueryKey,
    undo: &[usize],
    undos: &[Undo],
    reverts: &[Revert],
) -> Result<bool, CacheError> {
    let descriptor = registry.get(key.query());
    let mut changed = false;
    for &index in undo.iter().rev() {
        let (Some(undo), Some(Revert::Apply { source })) = (undos.get(index), reverts.get(index))
        else {
            continue;
        };
        let outcome = store.patch(key, &mut |args: &Value, payload: &mut Value| {
            undo.edit().apply(descriptor, args, payload, source.as_ref())
        })?;
        changed |= outcome.is_some();
    }
    Ok(changed)
}
