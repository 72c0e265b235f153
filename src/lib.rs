//! settings-bridge - namespaced settings synchronization between a host
//! script and a sandboxed web view.
//!
//! This library provides the core used by the `sbr` CLI tool: key
//! namespacing, a change-signaling settings store, registries that reconcile
//! configuration with live application state, and the message bridge that
//! keeps host and peer in agreement.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod keys;
pub mod registry;
pub mod signal;
pub mod snapshot;
pub mod store;
pub mod timer;
pub mod value;


/// Library-level error type for settings-bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid binding for '{setting}': {reason}")]
    InvalidBinding { setting: String, reason: String },

    #[error("No transport attached")]
    NoTransport,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Request {0} timed out")]
    Timeout(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for settings-bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
