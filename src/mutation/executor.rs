use serde_json::Value;
use tracing::{debug, warn};

use super::{PatchRecord, RecordEdit};
use crate::cache::{CacheStore, Tag};
use crate::client::{ApiClient, ClientError, CACHE_UPDATED};
use crate::transport::{ApiRequest, Transport};

type Reconcile<'a> = Box<dyn FnOnce(&Value) -> Vec<RecordEdit> + Send + 'a>;
type TagsFrom<'a> = Box<dyn FnOnce(&Value) -> Vec<Tag> + Send + 'a>;

/// A pending write against the backend.
///
/// Built with `ApiClient::mutation`, configured with the builder methods and
/// consumed by `send`.
pub struct Mutation<'a, T, S> {
    client: &'a ApiClient<T, S>,
    name: String,
    request: ApiRequest,
    optimistic: Vec<RecordEdit>,
    invalidates: Vec<Tag>,
    reconcile: Option<Reconcile<'a>>,
    tags_from: Option<TagsFrom<'a>>,
}

impl<'a, T: Transport, S: CacheStore> Mutation<'a, T, S> {
    pub(crate) fn new(client: &'a ApiClient<T, S>, name: String, request: ApiRequest) -> Self {
        Self {
            client,
            name,
            request,
            optimistic: Vec::new(),
            invalidates: Vec::new(),
            reconcile: None,
            tags_from: None,
        }
    }

    /// Apply `edit` to the cache before the request is sent; undone if it fails.
    pub fn optimistic(mut self, edit: RecordEdit) -> Self {
        self.optimistic.push(edit);
        self
    }

    /// Tags invalidated after the request succeeds.
    pub fn invalidates(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.invalidates.extend(tags);
        self
    }

    /// Edits derived from the server response, applied after success.
    pub fn reconcile<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Value) -> Vec<RecordEdit> + Send + 'a,
    {
        self.reconcile = Some(Box::new(f));
        self
    }

    /// Tags read from the server response (e.g. a parent id the request did
    /// not carry), invalidated together with `invalidates`.
    pub fn invalidates_from<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Value) -> Vec<Tag> + Send + 'a,
    {
        self.tags_from = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Send the request and settle the cache.
    ///
    /// Optimistic edits land synchronously before the request future is
    /// first polled. On failure they are rolled back under the configured
    /// `RollbackPolicy` and the backend error is returned.
    pub async fn send(self) -> Result<Value, ClientError> {
        let Mutation {
            client,
            name,
            request,
            optimistic,
            invalidates,
            reconcile,
            tags_from,
        } = self;

        let patch = PatchRecord::apply(client.store(), client.registry(), &optimistic)?;
        client.events().emit_all(CACHE_UPDATED, patch.keys());
        debug!(mutation = %name, %request, patched = patch.len(), "sending mutation");

        let response = match client.transport().send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(mutation = %name, error = %err, "mutation failed");
                // The backend error is what the caller reports, even if the
                // cache can't be put back.
                match patch.rollback(client.store(), client.registry(), client.config().rollback) {
                    Ok(report) => {
                        if !report.superseded.is_empty() {
                            debug!(
                                mutation = %name,
                                superseded = report.superseded.len(),
                                "kept entries written during the request"
                            );
                        }
                        client.events().emit_all(
                            CACHE_UPDATED,
                            report.restored.iter().chain(report.reverted.iter()),
                        );
                    }
                    Err(cache_err) => {
                        warn!(mutation = %name, error = %cache_err, "rollback failed");
                    }
                }
                return Err(err.into());
            }
        };

        if let Some(reconcile) = reconcile {
            let edits = reconcile(&response);
            let applied = PatchRecord::apply(client.store(), client.registry(), &edits)?;
            client.events().emit_all(CACHE_UPDATED, applied.keys());
        }

        let mut tags = invalidates;
        let derived = tags_from.map(|f| f(&response)).unwrap_or_default();
        for tag in derived
            .into_iter()
            .chain(client.config().invalidation.tags_for(&name))
        {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        if !tags.is_empty() {
            client.invalidate(&tags).await?;
        }

        debug!(mutation = %name, "mutation settled");
        Ok(response)
    }
}
