//! Form submission: validate, send one mutation, report a notification.
//!
//! ```ignore
//! let students = client.students();
//! let outcome = forms::submit(&input, "Student saved", || students.create(&input)).await;
//! if outcome.closes_form() { /* close the dialog */ }
//! ```

mod rules;

use std::fmt;
use std::future::Future;

use tracing::debug;

use crate::client::ClientError;

/// One invalid form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Client-side checks run before a form is sent.
pub trait Validate {
    /// Every problem found; empty when the form can be sent.
    fn validate(&self) -> Vec<FieldError>;

    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient message shown after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    /// Backend detail if there is one, the generic fallback otherwise.
    pub fn error(err: &ClientError) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: err.user_message(),
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome<R> {
    /// The mutation succeeded; the form closes.
    Saved {
        record: R,
        notification: Notification,
    },
    /// Validation failed; nothing was sent.
    Invalid(Vec<FieldError>),
    /// The backend refused; the form stays open.
    Rejected {
        error: ClientError,
        notification: Notification,
    },
}

impl<R> SubmitOutcome<R> {
    pub fn closes_form(&self) -> bool {
        matches!(self, SubmitOutcome::Saved { .. })
    }

    pub fn notification(&self) -> Option<&Notification> {
        match self {
            SubmitOutcome::Saved { notification, .. }
            | SubmitOutcome::Rejected { notification, .. } => Some(notification),
            SubmitOutcome::Invalid(_) => None,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            SubmitOutcome::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

/// Validate `form`, then run `mutate` exactly once if it passed.
pub async fn submit<F, M, Fut, R>(form: &F, success: &str, mutate: M) -> SubmitOutcome<R>
where
    F: Validate + ?Sized,
    M: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, ClientError>>,
{
    let errors = form.validate();
    if !errors.is_empty() {
        debug!(errors = errors.len(), "form rejected by validation");
        return SubmitOutcome::Invalid(errors);
    }

    match mutate().await {
        Ok(record) => SubmitOutcome::Saved {
            record,
            notification: Notification::success(success),
        },
        Err(error) => {
            debug!(error = %error, "form submission failed");
            let notification = Notification::error(&error);
            SubmitOutcome::Rejected {
                error,
                notification,
            }
        }
    }
}
