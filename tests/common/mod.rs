//! Common test utilities for settings-bridge integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's real settings file or config directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated settings file and config directory.
///
/// The `sbr()` method returns a `Command` that sets `SBR_STORE` and
/// `SBR_CONFIG_DIR` per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a test environment whose config.toml holds `contents`.
    pub fn with_config(contents: &str) -> Self {
        let env = Self::new();
        std::fs::write(env.config_path(), contents).unwrap();
        env
    }

    /// Get a Command for the sbr binary with isolated storage.
    pub fn sbr(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_sbr"));
        cmd.env("SBR_STORE", self.store_path());
        cmd.env("SBR_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("SBR_NAMESPACE");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.path().join("settings.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.toml")
    }

    /// Parse the stored settings file.
    pub fn stored(&self) -> serde_json::Value {
        let text = std::fs::read_to_string(self.store_path()).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}
