//! Mutation Executor - writes with optimistic patching and tag invalidation.
//!
//! A mutation sends exactly one request. Before the request it can apply
//! speculative `RecordEdit`s to every cached variant of the affected query
//! families; the touched entries are logged in a `PatchRecord`. On success
//! the patch is kept, response-derived edits are applied and the listed tags
//! are invalidated. On failure the patch is undone in reverse order and the
//! error is returned.
//!
//! ## Example
//!
//! ```ignore
//! let moved = client
//!     .mutation("move_training_template", ApiRequest::put("/training_templates/42").json(&body)?)
//!     .optimistic(RecordEdit::update("list_training_templates", 42, &body)?)
//!     .send()
//!     .await?;
//! ```

mod edit;
mod executor;
mod patch;

pub use edit::RecordEdit;
pub use executor::Mutation;
pub use patch::{PatchOp, PatchRecord, RollbackReport};
