// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - conversation orchestrator for automated messaging flows.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod flow_cmd;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_config::{ConfigError, ParleyConfig};

/// Parley - conversation orchestrator for automated messaging flows.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Explicit config file instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook gateway and orchestrator.
    Serve,
    /// Manage flow definitions.
    Flow {
        #[command(subcommand)]
        action: FlowCommands,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum FlowCommands {
    /// Check a flow definition file without storing it.
    Validate { file: PathBuf },
    /// Validate a flow definition and store it for a device.
    Import {
        #[arg(long)]
        device: String,
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load and validate configuration, then print the effective values.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<ParleyConfig, Vec<ConfigError>> {
    match path {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Flow validation needs no configuration.
    if let Some(Commands::Flow {
        action: FlowCommands::Validate { file },
    }) = &cli.command
    {
        match flow_cmd::validate_file(file) {
            Ok(summary) => println!("{summary}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Flow {
            action: FlowCommands::Import { device, file },
        }) => match flow_cmd::import_file(&config, &device, &file).await {
            Ok(summary) => println!("{summary}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        Some(Commands::Flow { .. }) => {}
        Some(Commands::Config {
            action: ConfigCommands::Check,
        }) => {
            println!(
                "parley: config ok (agent.name={}, database={}, gateway={}:{})",
                config.agent.name,
                config.storage.database_path,
                config.gateway.host,
                config.gateway.port
            );
        }
        None => {
            println!("parley: use --help for available commands");
        }
    }
}
