//! Spillway - write stage of an event pipeline
//!
//! Reads newline-delimited JSON write requests and routes them to rotating
//! per-category spool files and to the configured bulk-put streams.
//!
//! # Usage
//!
//! ```bash
//! # Read requests from stdin (default)
//! spillway --config configs/spillway.toml
//!
//! # Read requests from a file
//! spillway run --input requests.jsonl
//!
//! # Validate a config and its stream files
//! spillway check --config configs/spillway.toml
//! ```

mod cmd;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spillway_config::{Config, LogFormat};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Spillway - route write requests to rotating files and streams
#[derive(Parser, Debug)]
#[command(name = "spillway")]
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
    /// Run the writers over a request stream
    Run(cmd::run::RunArgs),

    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Run(args)) => {
            let (level, format) = resolve_logging(cli.log_level.as_deref(), cli.config.as_deref());
            init_logging(&level, format)?;
            cmd::run::run(args, cli.config.as_deref()).await
        }
        // Check only prints to stdout
        Some(Command::Check) => cmd::check::run(cli.config.as_deref()),
        // No subcommand = read stdin
        None => {
            let (level, format) = resolve_logging(cli.log_level.as_deref(), cli.config.as_deref());
            init_logging(&level, format)?;
            cmd::run::run(cmd::run::RunArgs::default(), cli.config.as_deref()).await
        }
    }
}

/// Resolve log level (CLI flag > config file > "info") and format
fn resolve_logging(cli_level: Option<&str>, config_path: Option<&Path>) -> (String, LogFormat) {
    let log = config_path
        .filter(|path| path.exists())
        .and_then(|path| Config::from_file(path).ok())
        .map(|config| config.log)
        .unwrap_or_default();

    let level = match cli_level {
        Some(level) => level.to_string(),
        None => log.level.as_str().to_string(),
    };
    (level, log.format)
}

/// Initialize the tracing subscriber; logs go to stderr so stdout stays
/// free for command output
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry();
    match format {
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }

    Ok(())
}
