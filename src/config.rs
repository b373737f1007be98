//! Client configuration.
//!
//! Defaults suit a local backend; `ClientConfig::from_env()` overrides them
//! from `TRAINING_DESK_*` environment variables. The struct also deserializes
//! with serde so embedding applications can load it from their own files.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::Tag;

pub const ENV_API_URL: &str = "TRAINING_DESK_API_URL";
pub const ENV_RETENTION_SECS: &str = "TRAINING_DESK_RETENTION_SECS";
pub const ENV_REFETCH_ON_INVALIDATE: &str = "TRAINING_DESK_REFETCH_ON_INVALIDATE";
pub const ENV_ROLLBACK: &str = "TRAINING_DESK_ROLLBACK";

/// What a failed optimistic mutation does with entries written after its patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Only restore entries still at the version our patch produced.
    #[default]
    VersionChecked,
    /// Always restore, even over newer writes.
    Always,
}

/// Extra list tags to invalidate after specific mutations succeed.
///
/// Maps a mutation name (e.g. `"move_training_template"`) to record kinds
/// whose list tags go stale afterwards. Empty by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationPolicy {
    after: BTreeMap<String, Vec<String>>,
}

impl InvalidationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate the list tag of `kind` after `mutation` succeeds.
    pub fn invalidate_after(mut self, mutation: &str, kind: &str) -> Self {
        let kinds = self.after.entry(mutation.to_string()).or_default();
        if !kinds.iter().any(|k| k == kind) {
            kinds.push(kind.to_string());
        }
        self
    }

    pub fn tags_for(&self, mutation: &str) -> Vec<Tag> {
        self.after
            .get(mutation)
            .map(|kinds| kinds.iter().map(|kind| Tag::list(kind.as_str())).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,
    /// How long unused entries are retained before eviction.
    pub retention_secs: u64,
    /// Refetch subscribed entries right after a tag invalidation.
    pub refetch_on_invalidate: bool,
    pub rollback: RollbackPolicy,
    pub invalidation: InvalidationPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            retention_secs: 60,
            refetch_on_invalidate: true,
            rollback: RollbackPolicy::default(),
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid(ENV_API_URL, &url, "expected an http(s) URL"));
            }
            config.base_url = url;
        }

        if let Some(secs) = lookup(ENV_RETENTION_SECS) {
            config.retention_secs = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_RETENTION_SECS, &secs, "expected seconds"))?;
        }

        if let Some(flag) = lookup(ENV_REFETCH_ON_INVALIDATE) {
            config.refetch_on_invalidate = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::invalid(
                        ENV_REFETCH_ON_INVALIDATE,
                        &flag,
                        "expected a boolean",
                    ))
                }
            };
        }

        if let Some(policy) = lookup(ENV_ROLLBACK) {
            config.rollback = match policy.trim() {
                "version_checked" => RollbackPolicy::VersionChecked,
                "always" => RollbackPolicy::Always,
                _ => {
                    return Err(ConfigError::invalid(
                        ENV_ROLLBACK,
                        &policy,
                        "expected `version_checked` or `always`",
                    ))
                }
            };
        }

        Ok(config)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rollback(mut self, rollback: RollbackPolicy) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn with_refetch_on_invalidate(mut self, refetch: bool) -> Self {
        self.refetch_on_invalidate = refetch;
        self
    }

    pub fn with_invalidation(mut self, invalidation: InvalidationPolicy) -> Self {
        self.invalidation = invalidation;
        self
    }
}

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: &'static str) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "invalid {}={:?}: {}", var, value, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
