//! sbr - inspect and synchronize namespaced settings.

use std::fs;
use std::process;

use clap::Parser;
use settings_bridge::cli::{Cli, Commands, ConfigCommands};
use settings_bridge::commands::{self, Output};
use settings_bridge::config::{self, ConfigOverrides, OutputFormat, ResolvedConfig};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut overrides = ConfigOverrides::new();
    if let Some(namespace) = cli.namespace.clone() {
        overrides = overrides.with_namespace(namespace);
    }
    if let Some(store) = cli.store.clone() {
        overrides = overrides.with_store(store);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let result = config::load_config(&overrides).and_then(|config| {
        let human = config.output_format() == OutputFormat::Human;
        run_command(cli.command, &config, human)
    });

    if let Err(e) = result {
        if cli.human_readable {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` overrides the
/// default `warn` filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    human: bool,
) -> Result<(), settings_bridge::Error> {
    match command {
        Commands::Resolve { key } => output(&commands::resolve(config, &key)?, human),
        Commands::Get {
            key,
            default,
            float,
        } => {
            let default = default.as_deref().map(commands::parse_value);
            output(&commands::get(config, &key, default, float)?, human);
        }
        Commands::Set { key, value } => {
            let value = commands::parse_value(&value);
            output(&commands::set(config, &key, value)?, human);
        }
        Commands::List => output(&commands::list(config)?, human),
        Commands::Reset => output(&commands::reset(config)?, human),
        Commands::Export { name, output: file } => {
            let snapshot = commands::export(config, name.as_deref())?;
            match file {
                Some(path) => {
                    fs::write(&path, snapshot.to_json())?;
                    if human {
                        println!("Exported to {}", path.display());
                    } else {
                        println!("{}", serde_json::json!({ "exported": path }));
                    }
                }
                None => output(&snapshot, human),
            }
        }
        Commands::Import { file } => output(&commands::import(config, &file)?, human),
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(config, human),
            ConfigCommands::Path => {
                let path = config
                    .config_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                if human {
                    println!("{}", path);
                } else {
                    println!("{}", serde_json::json!({ "path": path }));
                }
            }
        },
        Commands::Loopback { key, value } => {
            let value = commands::parse_value(&value);
            output(&commands::loopback(config, &key, value)?, human);
        }
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
