//! cdcflow - change-data-capture ingestion
//!
//! # Usage
//!
//! ```bash
//! # Run the engine (default)
//! cdcflow
//! cdcflow --config cdcflow.toml
//!
//! # Validate configuration and print the effective settings
//! cdcflow check --config cdcflow.toml
//! ```

mod cmd;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cdcflow_config::Config;

/// cdcflow - stream change events from a message bus into a warehouse
#[derive(Parser, Debug)]
#[command(name = "cdcflow")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion engine until SIGINT/SIGTERM
    Serve,

    /// Validate configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Some(Command::Check) => {
            // Check prints to stdout and doesn't need logging
            cmd::check::run(&config, cli.config.as_deref())
        }
        Some(Command::Serve) | None => {
            logging::init(&config.log, cli.log_level.as_deref())?;
            cmd::serve::run(config).await
        }
    }
}

/// Load configuration: file (if given) + environment overrides, validated
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = path
        && !path.exists()
    {
        anyhow::bail!("config file not found: {}", path.display());
    }
    Config::load(path).context("failed to load configuration")
}
