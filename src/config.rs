//! # Configuration Module
//!
//! Dispatcher settings, loaded from YAML or JSON and overridable from the environment.
//!
//! ## Environment Variables
//!
//! ### `RESTDISPATCH_BASE_PATH`
//!
//! Path prefix the application is mounted under, e.g. `/api`. Requests outside it are answered
//! with 404. Default: empty (mounted at `/`).
//!
//! ### `RESTDISPATCH_MAX_LOCATOR_DEPTH`
//!
//! Maximum number of sub-resource locators followed for one request. Accepts decimal or
//! `0x`-prefixed hexadecimal. Default: `32`.
//!
//! ## Usage
//!
//! ```rust
//! use restdispatch::config::DispatcherConfig;
//!
//! let config = DispatcherConfig::from_env();
//! assert!(config.max_locator_depth > 0);
//! ```
//!
//! ## Example File
//!
//! ```yaml
//! base_path: /api
//! max_locator_depth: 8
//! load_default_providers: true
//! strip_head_body: true
//! ```

use std::env;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_BASE_PATH: &str = "RESTDISPATCH_BASE_PATH";
pub const ENV_MAX_LOCATOR_DEPTH: &str = "RESTDISPATCH_MAX_LOCATOR_DEPTH";

pub const DEFAULT_MAX_LOCATOR_DEPTH: usize = 32;

/// Settings for a [`Dispatcher`](crate::dispatcher::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Application base path; request paths are matched relative to it.
    pub base_path: String,
    /// Bound on sub-resource locator chains.
    pub max_locator_depth: usize,
    /// Register the built-in providers at construction.
    pub load_default_providers: bool,
    /// Drop the body of responses to HEAD requests.
    pub strip_head_body: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            max_locator_depth: DEFAULT_MAX_LOCATOR_DEPTH,
            load_default_providers: true,
            strip_head_body: true,
        }
    }
}

impl DispatcherConfig {
    /// Reads a YAML (`.yaml`/`.yml`) or JSON file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// The file cannot be read or does not describe a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON config in {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML config in {}", path.display()))?
        };
        Ok(config.with_env_overrides())
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `RESTDISPATCH_*` variables; malformed values are ignored with a warning.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base_path) = env::var(ENV_BASE_PATH) {
            self.base_path = base_path;
        }
        if let Ok(val) = env::var(ENV_MAX_LOCATOR_DEPTH) {
            match parse_count(&val) {
                Some(depth) if depth > 0 => self.max_locator_depth = depth,
                _ => warn!(
                    variable = ENV_MAX_LOCATOR_DEPTH,
                    value = %val,
                    "Ignoring invalid locator depth"
                ),
            }
        }
        self
    }

    /// The base path without trailing `/`; empty when mounted at the root.
    #[must_use]
    pub fn normalized_base_path(&self) -> &str {
        self.base_path.trim().trim_end_matches('/')
    }
}

fn parse_count(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
