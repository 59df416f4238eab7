//! Hub configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Topic name reserved for clear events unless configured otherwise.
pub const DEFAULT_CLEAR_TOPIC: &str = "__clear__";

/// Settings shared by every synchronizer a [`Hub`](crate::Hub) creates.
///
/// # Examples
///
/// ```
/// use stowage::Config;
///
/// let config = Config::from_json(r#"{ "namespace": "app" }"#).unwrap();
/// assert_eq!(config.storage_key("theme"), "app:theme");
/// assert!(config.persist_defaults);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix prepended to every key as `"{namespace}:{key}"`.
    pub namespace: Option<String>,
    /// Write the default value into the store when a key is missing on load.
    pub persist_defaults: bool,
    /// Topic on which clear events are published.
    pub clear_topic: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            persist_defaults: true,
            clear_topic: DEFAULT_CLEAR_TOPIC.to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Config)
    }

    /// Set the key namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Enable or disable writing defaults on load.
    #[must_use]
    pub fn with_persist_defaults(mut self, persist: bool) -> Self {
        self.persist_defaults = persist;
        self
    }

    /// The key actually used in the store and on the bus.
    pub fn storage_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}:{key}"),
            _ => key.to_string(),
        }
    }
}
