//! Configuration validation
//!
//! Validates config consistency:
//! - Rotation thresholds and queue sizes are non-zero
//! - Spool and archive directories are set
//! - Each stream is configured once

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::writers::RotateConditions;
use std::collections::HashSet;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_files(config)?;
    validate_controller(config)?;
    validate_streams(config)?;
    Ok(())
}

fn validate_rotate(component: &'static str, name: &str, rotate: &RotateConditions) -> Result<()> {
    if rotate.max_size == 0 {
        return Err(ConfigError::invalid_value(
            component,
            name,
            "max_size",
            "must be greater than 0",
        ));
    }
    if rotate.max_age.is_zero() {
        return Err(ConfigError::invalid_value(
            component,
            name,
            "max_age",
            "must be greater than 0",
        ));
    }
    Ok(())
}

/// Validate file writer settings
fn validate_files(config: &Config) -> Result<()> {
    let files = &config.files;
    if files.spool_dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("files", "files", "spool_dir"));
    }
    if files.archive_dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("files", "files", "archive_dir"));
    }
    if files.compressor_pool_size == 0 {
        return Err(ConfigError::invalid_value(
            "files",
            "files",
            "compressor_pool_size",
            "must be greater than 0",
        ));
    }
    validate_rotate("files", "rotate", &files.rotate)?;

    if config.non_tracked.category.is_empty() {
        return Err(ConfigError::missing_field("non_tracked", "non_tracked", "category"));
    }
    validate_rotate("non_tracked", "rotate", &config.non_tracked.rotate)?;

    if config.rotation.interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "rotation",
            "rotation",
            "interval",
            "must be greater than 0",
        ));
    }
    Ok(())
}

/// Validate controller queue sizes
fn validate_controller(config: &Config) -> Result<()> {
    if config.controller.creation_queue_size == 0 {
        return Err(ConfigError::invalid_value(
            "controller",
            "controller",
            "creation_queue_size",
            "must be greater than 0",
        ));
    }
    if config.controller.manager_queue_size == 0 {
        return Err(ConfigError::invalid_value(
            "controller",
            "controller",
            "manager_queue_size",
            "must be greater than 0",
        ));
    }
    Ok(())
}

/// Validate loaded stream writer configs
fn validate_streams(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for stream in &config.stream_writers {
        stream.validate()?;
        if !seen.insert(stream.stream_name.as_str()) {
            return Err(ConfigError::DuplicateStream(stream.stream_name.clone()));
        }
    }
    Ok(())
}
