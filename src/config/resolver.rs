//! Precedence resolution for bridge configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`SBR_NAMESPACE`, `SBR_STORE`)
//! 3. `config.toml` (`<config_dir>/settings-bridge/config.toml`, or
//!    `$SBR_CONFIG_DIR/config.toml`)
//! 4. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::config::schema::{BridgeConfig, OutputFormat};
use crate::{Error, Result};

/// Environment variable overriding the namespace.
pub const NAMESPACE_ENV: &str = "SBR_NAMESPACE";
/// Environment variable overriding the settings file.
pub const STORE_ENV: &str = "SBR_STORE";
/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "SBR_CONFIG_DIR";

pub const DEFAULT_NAMESPACE: &str = "settings";
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.toml
    ConfigFile,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub namespace: Resolved<String>,
    pub store: Resolved<PathBuf>,
    pub output_format: Resolved<OutputFormat>,
    pub monitor_interval_ms: Resolved<u64>,
    pub request_timeout_ms: Resolved<u64>,
    pub debug: Resolved<bool>,
    /// Registered settings from the `[defaults]` table
    pub defaults: BTreeMap<String, Value>,
    /// The config file consulted, if a config directory could be determined
    pub config_path: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn namespace(&self) -> &str {
        &self.namespace.value
    }

    pub fn store_path(&self) -> &PathBuf {
        &self.store.value
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.value)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.value)
    }

    pub fn debug(&self) -> bool {
        self.debug.value
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub namespace: Option<String>,
    pub store: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_store(mut self, store: impl Into<PathBuf>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Directory holding `config.toml`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = env_value(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join("settings-bridge"))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Built-in settings file location.
pub fn default_store_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("settings-bridge").join("settings.json"))
}

/// Resolve configuration with full precedence chain against an already
/// loaded config file.
pub fn resolve_config(file: &BridgeConfig, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let namespace = if let Some(ref namespace) = overrides.namespace {
        Resolved::new(namespace.clone(), ValueSource::CliFlag)
    } else if let Some(namespace) = env_value(NAMESPACE_ENV) {
        Resolved::new(namespace, ValueSource::EnvVar(NAMESPACE_ENV.to_string()))
    } else if let Some(ref namespace) = file.namespace {
        Resolved::new(namespace.clone(), ValueSource::ConfigFile)
    } else {
        Resolved::new(DEFAULT_NAMESPACE.to_string(), ValueSource::Default)
    };
    if namespace.value.is_empty() || namespace.value.contains('/') {
        return Err(Error::InvalidInput(format!(
            "namespace must be non-empty and contain no '/', got '{}' (from {})",
            namespace.value, namespace.source
        )));
    }

    let store = if let Some(ref store) = overrides.store {
        Resolved::new(store.clone(), ValueSource::CliFlag)
    } else if let Some(store) = env_value(STORE_ENV) {
        Resolved::new(PathBuf::from(store), ValueSource::EnvVar(STORE_ENV.to_string()))
    } else if let Some(ref store) = file.store {
        Resolved::new(store.clone(), ValueSource::ConfigFile)
    } else {
        Resolved::new(default_store_path()?, ValueSource::Default)
    };

    let output_format = match (overrides.output_format, file.output_format) {
        (Some(format), _) => Resolved::new(format, ValueSource::CliFlag),
        (None, Some(format)) => Resolved::new(format, ValueSource::ConfigFile),
        (None, None) => Resolved::new(OutputFormat::Json, ValueSource::Default),
    };

    let from_file = |value: Option<u64>, default: u64| match value {
        Some(v) => Resolved::new(v, ValueSource::ConfigFile),
        None => Resolved::new(default, ValueSource::Default),
    };

    Ok(ResolvedConfig {
        namespace,
        store,
        output_format,
        monitor_interval_ms: from_file(file.monitor_interval_ms, DEFAULT_MONITOR_INTERVAL_MS),
        request_timeout_ms: from_file(file.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS),
        debug: match file.debug {
            Some(debug) => Resolved::new(debug, ValueSource::ConfigFile),
            None => Resolved::new(false, ValueSource::Default),
        },
        defaults: file.default_values()?.into_iter().collect(),
        config_path: None,
    })
}

/// Load `config.toml` from the config directory and resolve against it.
pub fn load_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let path = config_path();
    let file = match &path {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    let mut resolved = resolve_config(&file, overrides)?;
    resolved.config_path = path;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use serial_test::serial;

    fn clear_env() {
        // SAFETY: env-touching tests in this module run under #[serial]
        unsafe {
            std::env::remove_var(NAMESPACE_ENV);
            std::env::remove_var(STORE_ENV);
            std::env::remove_var(CONFIG_DIR_ENV);
        }
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(
            format!("{}", ValueSource::EnvVar("SBR_STORE".to_string())),
            "env:SBR_STORE"
        );
        assert_eq!(format!("{}", ValueSource::ConfigFile), "config");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    #[serial]
    fn test_resolve_config_defaults() {
        clear_env();
        let config = resolve_config(&BridgeConfig::default(), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(config.namespace.source, ValueSource::Default);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.monitor_interval(), Duration::from_millis(1000));
        assert_eq!(config.request_timeout(), Duration::from_millis(5000));
        assert!(!config.debug());
        assert!(config.store_path().ends_with("settings-bridge/settings.json"));
    }

    #[test]
    #[serial]
    fn test_resolve_config_from_file() {
        clear_env();
        let file = BridgeConfig {
            namespace: Some("app".to_string()),
            store: Some(PathBuf::from("/tmp/s.json")),
            monitor_interval_ms: Some(250),
            debug: Some(true),
            ..Default::default()
        };
        let config = resolve_config(&file, &ConfigOverrides::default()).unwrap();

        assert_eq!(config.namespace(), "app");
        assert_eq!(config.namespace.source, ValueSource::ConfigFile);
        assert_eq!(config.store_path(), &PathBuf::from("/tmp/s.json"));
        assert_eq!(config.monitor_interval_ms.value, 250);
        assert_eq!(config.request_timeout_ms.source, ValueSource::Default);
        assert!(config.debug());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_and_cli_overrides_env() {
        clear_env();
        // SAFETY: serialized test
        unsafe {
            std::env::set_var(NAMESPACE_ENV, "from-env");
            std::env::set_var(STORE_ENV, "/tmp/env.json");
        }
        let file = BridgeConfig {
            namespace: Some("from-file".to_string()),
            store: Some(PathBuf::from("/tmp/file.json")),
            ..Default::default()
        };

        let config = resolve_config(&file, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.namespace(), "from-env");
        assert_eq!(
            config.namespace.source,
            ValueSource::EnvVar(NAMESPACE_ENV.to_string())
        );
        assert_eq!(config.store_path(), &PathBuf::from("/tmp/env.json"));

        let overrides = ConfigOverrides::new()
            .with_namespace("from-cli")
            .with_output_format(OutputFormat::Human);
        let config = resolve_config(&file, &overrides).unwrap();
        assert_eq!(config.namespace(), "from-cli");
        assert_eq!(config.namespace.source, ValueSource::CliFlag);
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.store.source, ValueSource::EnvVar(STORE_ENV.to_string()));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_qualified_namespace_is_rejected() {
        clear_env();
        let overrides = ConfigOverrides::new().with_namespace("a/b");
        assert!(matches!(
            resolve_config(&BridgeConfig::default(), &overrides),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    #[serial]
    fn test_load_config_reads_config_dir() {
        clear_env();
        let env = TestEnv::new();
        std::fs::write(
            env.data_path().join("config.toml"),
            "namespace = \"camera\"\nrequest-timeout-ms = 100\n",
        )
        .unwrap();
        // SAFETY: serialized test
        unsafe { std::env::set_var(CONFIG_DIR_ENV, env.data_path()) };

        let config = load_config(&ConfigOverrides::default()).unwrap();

        assert_eq!(config.namespace(), "camera");
        assert_eq!(config.request_timeout(), Duration::from_millis(100));
        assert_eq!(
            config.config_path,
            Some(env.data_path().join("config.toml"))
        );

        clear_env();
    }

    #[test]
    fn test_resolved_config_serializes_sources() {
        let file = BridgeConfig {
            namespace: Some("app".to_string()),
            store: Some(PathBuf::from("/tmp/s.json")),
            ..Default::default()
        };
        let overrides = ConfigOverrides::new()
            .with_namespace("cli-ns")
            .with_store("/tmp/cli.json");
        let config = resolve_config(&file, &overrides).unwrap();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["namespace"]["value"], "cli-ns");
        assert_eq!(json["namespace"]["source"], "cli");
        assert_eq!(json["monitor_interval_ms"]["source"], "default");
    }
}
