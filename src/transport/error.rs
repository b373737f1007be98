use std::fmt;

use serde_json::Value;

/// Message shown when the backend gives no usable detail.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Error type for backend calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    Status { status: u16, detail: Option<String> },
    /// The request never produced a response (connection refused, timeout, ...).
    Transport(String),
    /// Request or response body could not be (de)serialized.
    Serde(String),
}

impl ApiError {
    /// Build a status error from the response body, picking up `detail`.
    ///
    /// `detail` is either a string or a list of validation items carrying a
    /// `msg` field; anything else is ignored.
    pub fn from_response(status: u16, body: Option<&Value>) -> Self {
        let detail = body.and_then(|body| body.get("detail")).and_then(|detail| match detail {
            Value::String(message) => Some(message.clone()),
            Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => None,
        });
        ApiError::Status { status, detail }
    }

    /// The backend-supplied detail message, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// HTTP status, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The text to show the user: backend detail or the generic fallback.
    pub fn user_message(&self) -> String {
        self.detail().unwrap_or(GENERIC_FAILURE).to_string()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Status {
                status,
                detail: Some(detail),
            } => write!(f, "backend returned {}: {}", status, detail),
            ApiError::Status { status, detail: None } => write!(f, "backend returned {}", status),
            ApiError::Transport(msg) => write!(f, "transport error: {}", msg),
            ApiError::Serde(msg) => write!(f, "body serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serde(err.to_string())
    }
}
