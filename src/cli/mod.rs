//! CLI argument definitions for settings-bridge.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// settings-bridge - namespaced settings shared between a host script and
/// its web view.
///
/// Bare keys are qualified with the namespace (`speed` -> `app/speed`);
/// keys containing `/` are used as given.
#[derive(Parser, Debug)]
#[command(name = "sbr")]
#[command(author, version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SBR_GIT_COMMIT"), ")"), about = "Inspect and synchronize namespaced settings", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Namespace applied to bare keys.
    /// Can also be set via SBR_NAMESPACE or `namespace` in config.toml.
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    /// Settings file to operate on.
    /// Can also be set via SBR_STORE or `store` in config.toml.
    #[arg(short = 's', long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the fully qualified form of a key
    Resolve {
        /// Key, bare or qualified (e.g. speed, camera/speed)
        key: String,
    },

    /// Read a setting (stored value, then registered default, then --default)
    Get {
        /// Key, bare or qualified
        key: String,

        /// Fallback value as JSON when nothing is stored or registered
        #[arg(short, long)]
        default: Option<String>,

        /// Coerce the value to a number (unparsable values become the default or 0)
        #[arg(long)]
        float: bool,
    },

    /// Write a setting
    Set {
        /// Key, bare or qualified
        key: String,

        /// Value as JSON; anything that is not valid JSON is stored as a string
        value: String,
    },

    /// List registered settings with their current values
    List,

    /// Restore every registered setting to its default
    Reset,

    /// Export registered settings as a nested JSON snapshot
    Export {
        /// Name recorded in the snapshot
        #[arg(long)]
        name: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply a snapshot produced by `sbr export` (unregistered keys are skipped)
    Import {
        /// Snapshot file
        file: PathBuf,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run a host and a web-view peer in-process and show the exchanged messages
    Loopback {
        /// Key read by the peer and then changed on the host
        #[arg(default_value = "value")]
        key: String,

        /// Value written on the host, as JSON
        #[arg(default_value = "7")]
        value: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,

    /// Print the path of config.toml
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sbr", "get", "speed", "-H", "-n", "cam"]).unwrap();
        assert!(cli.human_readable);
        assert_eq!(cli.namespace.as_deref(), Some("cam"));
        match cli.command {
            Commands::Get { key, default, float } => {
                assert_eq!(key, "speed");
                assert!(default.is_none());
                assert!(!float);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_loopback_defaults() {
        let cli = Cli::try_parse_from(["sbr", "loopback"]).unwrap();
        match cli.command {
            Commands::Loopback { key, value } => {
                assert_eq!(key, "value");
                assert_eq!(value, "7");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_set_requires_value() {
        assert!(Cli::try_parse_from(["sbr", "set", "speed"]).is_err());
    }
}
