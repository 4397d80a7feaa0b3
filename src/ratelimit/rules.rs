//! Limit rule configuration and matching.
//!
//! Rules are loaded from YAML: a default limit plus per-route overrides
//! matched by path prefix, where the longest matching prefix wins.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::window::Limit;
use crate::error::{FloodgateError, Result};

/// Scope name used for requests that match no route rule.
pub const DEFAULT_SCOPE: &str = "default";

fn default_max_requests() -> u64 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

/// A limit expressed in configuration terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSpec {
    /// Requests admitted per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for LimitSpec {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

impl LimitSpec {
    /// Convert into the limit applied on the admission path.
    pub fn limit(&self) -> Limit {
        Limit::new(self.max_requests, Duration::from_millis(self.window_ms))
    }
}

/// A limit override for routes under a path prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix this rule covers
    pub prefix: String,
    /// The limit applied under this prefix
    pub rate_limit: LimitSpec,
}

/// The full rule set: a default limit plus route overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitRules {
    /// Limit applied when no route rule matches
    #[serde(default)]
    pub default: LimitSpec,
    /// Per-prefix overrides
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

impl LimitRules {
    /// Create a rule set with only the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse limit rules: {}", e)))
    }

    /// Resolve the scope and limit governing `path`.
    ///
    /// The longest matching prefix wins; with no match the default applies.
    pub fn resolve(&self, path: &str) -> (&str, Limit) {
        let mut best: Option<&RouteRule> = None;

        for rule in &self.routes {
            if !path.starts_with(rule.prefix.as_str()) {
                continue;
            }
            match best {
                Some(current) if current.prefix.len() >= rule.prefix.len() => {}
                _ => best = Some(rule),
            }
        }

        match best {
            Some(rule) => (rule.prefix.as_str(), rule.rate_limit.limit()),
            None => (DEFAULT_SCOPE, self.default.limit()),
        }
    }
}
