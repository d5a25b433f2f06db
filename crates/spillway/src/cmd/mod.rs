//! CLI commands

pub mod check;
pub mod run;

use anyhow::{Context, Result};
use spillway_config::Config;
use std::path::Path;
use tracing::info;

/// Load the config at `path`, or defaults when no path is given
///
/// An explicit path that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))
        }
        None => {
            info!("no config file given, using defaults");
            Ok(Config::default())
        }
    }
}
