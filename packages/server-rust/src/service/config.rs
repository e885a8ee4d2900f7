use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Server-level configuration.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Identifier for this server node, used in log output.
    pub node_id: String,
    /// Options passed to services registered in the root realm.
    pub root_options: serde_json::Value,
    pub cache: CacheConfig,
}

impl ServerConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a field has the wrong type.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("invalid server configuration")
    }

    /// Reads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("in {}", path.display()))
    }
}

/// Configuration for the default memoization store and any named policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held by the default store.
    pub capacity: usize,
    /// Expiry applied when neither the method nor its policy sets one.
    pub default_expires_in_ms: u64,
    /// Named stores a method can opt into with `CacheOptions::cache`.
    pub policies: BTreeMap<String, CachePolicyConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_expires_in_ms: 60_000,
            policies: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicyConfig {
    pub capacity: usize,
    /// Falls back to `CacheConfig::default_expires_in_ms` when absent.
    pub expires_in_ms: Option<u64>,
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            expires_in_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_apply_to_empty_object() {
        let config = ServerConfig::from_json_str("{}").unwrap();
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.cache.default_expires_in_ms, 60_000);
        assert!(config.cache.policies.is_empty());
        assert!(config.root_options.is_null());
    }

    #[test]
    fn partial_policy_fills_defaults() {
        let config = ServerConfig::from_json_str(
            r#"{ "node_id": "n1", "cache": { "policies": { "short": { "expires_in_ms": 500 } } } }"#,
        )
        .unwrap();
        assert_eq!(config.node_id, "n1");
        let short = &config.cache.policies["short"];
        assert_eq!(short.capacity, 1_000);
        assert_eq!(short.expires_in_ms, Some(500));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "root_options": {{ "debug": true }} }}"#).unwrap();
        let config = ServerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.root_options["debug"], serde_json::json!(true));
    }

    #[test]
    fn malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ServerConfig::from_json_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains(&file.path().display().to_string()));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ServerConfig::from_json_file("/nonexistent/plexus.json").is_err());
    }
}
