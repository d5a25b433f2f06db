//! Check command - validate configuration without starting writers

use std::path::Path;

use anyhow::{Context, Result};
use spillway_config::Config;

use crate::cmd::load_config;
use crate::cmd::run::event_filters;

/// Load and validate the config, resolve every stream's event filters, and
/// print a summary
pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    resolve_filters(&config)?;
    print!("{}", summary(&config));
    Ok(())
}

fn resolve_filters(config: &Config) -> Result<()> {
    let filters = event_filters();
    for stream in &config.stream_writers {
        for event in stream.events.values() {
            filters.resolve(&stream.stream_name, &event.filter).with_context(|| {
                format!("stream '{}' has an unusable filter", stream.stream_name)
            })?;
        }
    }
    Ok(())
}

fn summary(config: &Config) -> String {
    let files = &config.files;
    let mut out = String::new();
    out.push_str("configuration OK\n");
    out.push_str(&format!(
        "  files:       {} -> {} ({}, max {} bytes / {:?})\n",
        files.spool_dir.display(),
        files.archive_dir.display(),
        files.file_type.as_str(),
        files.rotate.max_size,
        files.rotate.max_age,
    ));
    out.push_str(&format!(
        "  non-tracked: category '{}' (max {} bytes / {:?})\n",
        config.non_tracked.category, config.non_tracked.rotate.max_size, config.non_tracked.rotate.max_age,
    ));
    out.push_str(&format!("  rotation:    every {:?}\n", config.rotation.interval));

    let mut streams: Vec<_> = config.stream_writers.iter().collect();
    streams.sort_by(|a, b| a.stream_name.cmp(&b.stream_name));
    for stream in streams {
        let mut categories: Vec<&str> = stream.events.keys().map(String::as_str).collect();
        categories.sort_unstable();
        out.push_str(&format!(
            "  stream:      {} [{}]\n",
            stream.stream_name,
            categories.join(", ")
        ));
    }
    out
}
