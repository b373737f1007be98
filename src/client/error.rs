use std::fmt;

use crate::cache::CacheError;
use crate::transport::{ApiError, GENERIC_FAILURE};

/// Error type for client operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The backend call failed.
    Api(ApiError),
    /// The cache store failed.
    Cache(CacheError),
    /// No descriptor registered for this query family.
    UnknownQuery(String),
    /// A payload did not have the expected shape.
    Decode(String),
}

impl ClientError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ClientError::Api(ApiError::Status { status, .. }) => *status,
            ClientError::Api(ApiError::Transport(_)) => 503,
            ClientError::Api(ApiError::Serde(_)) => 400,
            ClientError::UnknownQuery(_) => 404,
            ClientError::Cache(_) | ClientError::Decode(_) => 500,
        }
    }

    /// Backend detail message, if the backend sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Api(err) => err.detail(),
            _ => None,
        }
    }

    /// Text for a user notification: backend detail or the generic fallback.
    pub fn user_message(&self) -> String {
        self.detail().unwrap_or(GENERIC_FAILURE).to_string()
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Api(e) => write!(f, "api error: {}", e),
            ClientError::Cache(e) => write!(f, "cache error: {}", e),
            ClientError::UnknownQuery(name) => write!(f, "unknown query: {}", name),
            ClientError::Decode(msg) => write!(f, "decode failed: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Api(e) => Some(e),
            ClientError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        ClientError::Api(err)
    }
}

impl From<CacheError> for ClientError {
    fn from(err: CacheError) -> Self {
        ClientError::Cache(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
