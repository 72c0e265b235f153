//! TOML schema for `config.toml`.
//!
//! ```toml
//! namespace = "app-camera-move"
//! store = "/home/me/.local/share/settings-bridge/settings.json"
//! output-format = "human"   # or "json"
//! monitor-interval-ms = 1000
//! request-timeout-ms = 5000
//! debug = false
//!
//! [defaults]
//! "rotation/speed" = 1.0
//! "rotation/enabled" = true
//! ```
//!
//! Every key is optional; unset keys fall through to environment variables
//! and built-in defaults (see [`crate::config::resolver`]).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BridgeConfig {
    /// Namespace applied to bare keys
    pub namespace: Option<String>,

    /// Settings file used by the CLI
    pub store: Option<PathBuf>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Drift monitor period
    pub monitor_interval_ms: Option<u64>,

    /// How long a correlated request may stay unanswered
    pub request_timeout_ms: Option<u64>,

    /// Re-raise callback panics instead of only reporting them
    pub debug: Option<bool>,

    /// Registered settings and their defaults, keyed relative to `namespace`
    /// unless already qualified
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, toml::Value>,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&text)?;
        config
            .validate()
            .map_err(|e| crate::Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.monitor_interval_ms == Some(0) {
            return Err("monitor-interval-ms must be greater than 0".to_string());
        }
        if self.request_timeout_ms == Some(0) {
            return Err("request-timeout-ms must be greater than 0".to_string());
        }
        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() || namespace.contains('/') {
                return Err(format!(
                    "namespace must be non-empty and contain no '/', got '{}'",
                    namespace
                ));
            }
        }
        Ok(())
    }

    /// The `[defaults]` table as JSON values.
    pub fn default_values(&self) -> Result<Vec<(String, serde_json::Value)>> {
        self.defaults
            .iter()
            .map(|(key, value)| Ok((key.clone(), serde_json::to_value(value)?)))
            .collect()
    }
}
