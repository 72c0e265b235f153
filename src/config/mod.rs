//! Configuration for the bridge and the `sbr` CLI.
//!
//! ## config.toml
//!
//! Located at:
//! - `$SBR_CONFIG_DIR/config.toml` when the variable is set
//! - `~/.config/settings-bridge/config.toml` otherwise
//!
//! Contains the default namespace, the settings file, the output format and
//! the bridge timings. See [`schema::BridgeConfig`].
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.toml > defaults
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_DIR_ENV, ConfigOverrides, NAMESPACE_ENV, Resolved, ResolvedConfig, STORE_ENV,
    ValueSource, load_config, resolve_config,
};
pub use schema::{BridgeConfig, OutputFormat};
