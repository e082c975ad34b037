//! Store configuration
//!
//! [`StoreConfig`] can be built in code or loaded from YAML. String values may
//! reference the environment as `${VAR}` or `${VAR:default}`:
//!
//! ```yaml
//! key_prefix: agent
//! scan_page_size: ${CHECKPOINT_SCAN_PAGE:250}
//! decode_errors: skip
//! database_url: ${CHECKPOINT_DB:sqlite://checkpoints.db}
//! ```
//!
//! A value that consists of a single placeholder is re-read as a YAML scalar
//! after expansion, so numeric fields can come from the environment.

use crate::error::{CheckpointError, Result};
use crate::keys::{KeyCodec, DEFAULT_KEY_PREFIX};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::env;
use std::fs;
use std::path::Path;

/// What `list` does with an entry it cannot decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// Yield the decode error and end the sequence
    #[default]
    Fail,
    /// Log a warning naming the key and continue with the next entry
    Skip,
}

/// Configuration for a [`CheckpointStore`](crate::store::CheckpointStore) and its adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// First component of every document key
    pub key_prefix: String,

    /// Keys per page requested from adapters that page their scans
    pub scan_page_size: usize,

    /// Documents fetched concurrently while assembling results
    pub fetch_concurrency: usize,

    /// Handling of undecodable entries during `list`
    pub decode_errors: DecodeErrorPolicy,

    /// Connection string for the SQLite adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            scan_page_size: 100,
            fetch_concurrency: 16,
            decode_errors: DecodeErrorPolicy::default(),
            database_url: None,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size;
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    pub fn with_decode_errors(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_errors = policy;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        KeyCodec::with_prefix(self.key_prefix.as_str())
            .map_err(|e| CheckpointError::Config(e.to_string()))?;
        if self.scan_page_size == 0 {
            return Err(CheckpointError::Config(
                "scan_page_size must be greater than zero".to_string(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(CheckpointError::Config(
                "fetch_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Key codec for the configured prefix
    pub fn key_codec(&self) -> Result<KeyCodec> {
        KeyCodec::with_prefix(self.key_prefix.as_str())
    }

    /// Parse YAML text, expanding environment references
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut value: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| CheckpointError::Config(format!("Failed to parse YAML: {e}")))?;
        if value.is_null() {
            return Ok(Self::default());
        }

        expand_variables(&mut value)?;

        let config: StoreConfig = serde_yaml::from_value(value).map_err(|e| {
            CheckpointError::Config(format!("Failed to deserialize configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file, expanding environment references
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CheckpointError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        tracing::debug!(path = %path.display(), "loading store configuration");
        Self::from_yaml_str(&content)
    }
}

/// Expand environment variables in every string of a YAML tree
fn expand_variables(value: &mut YamlValue) -> Result<()> {
    match value {
        YamlValue::String(s) => {
            if let Some(expanded) = expand_env_in_string(s) {
                let whole = is_single_placeholder(s);
                *value = if whole {
                    serde_yaml::from_str(&expanded).unwrap_or(YamlValue::String(expanded))
                } else {
                    YamlValue::String(expanded)
                };
            }
        }
        YamlValue::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_variables(v)?;
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                expand_variables(item)?;
            }
        }
        _ => {}
    }

    Ok(())
}

const PLACEHOLDER_PATTERN: &str = r"\$\{([^:}]+)(?::([^}]*))?\}";

fn is_single_placeholder(s: &str) -> bool {
    regex::Regex::new(PLACEHOLDER_PATTERN)
        .ok()
        .and_then(|re| re.find(s))
        .map(|m| m.start() == 0 && m.end() == s.len())
        .unwrap_or(false)
}

/// Expand environment variables in a string
///
/// Supports syntax: ${ENV_VAR:default_value}
fn expand_env_in_string(s: &str) -> Option<String> {
    if !s.contains("${") {
        return None;
    }

    let re = regex::Regex::new(PLACEHOLDER_PATTERN).ok()?;
    let expanded = re.replace_all(s, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        let default_value = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        env::var(var_name).unwrap_or_else(|_| default_value.to_string())
    });

    Some(expanded.into_owned())
}
