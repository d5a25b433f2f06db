//! Spillway Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! Stream writers are described by separate JSON files listed under
//! `streams`; relative paths are resolved against the directory of the TOML
//! file.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use spillway_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[files]\nspool_dir = \"/tmp/spool\"").unwrap();
//! ```
//!
//! # Example Config
//!
//! ```toml
//! streams = ["streams/downstream.json"]
//!
//! [log]
//! level = "info"
//!
//! [files]
//! spool_dir = "/var/spool/spillway"
//! archive_dir = "/var/lib/spillway/archive"
//!
//! [files.rotate]
//! max_size = 524288000
//! max_age = "10m"
//! ```

mod error;
mod logging;
mod metrics;
mod stream;
mod validation;
mod writers;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use metrics::MetricsConfig;
pub use stream::{BatcherConfig, EventConfig, GlobberConfig, StreamWriterConfig, UNBOUNDED_ENTRIES};
pub use writers::{
    ControllerConfig, FileType, FilesConfig, NonTrackedConfig, RotateConditions, RotationConfig,
};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Metrics reporting configuration
    pub metrics: MetricsConfig,

    /// Per-category rotating file writers
    pub files: FilesConfig,

    /// Shared writer for non-tracked events
    pub non_tracked: NonTrackedConfig,

    /// Category router queue sizes
    pub controller: ControllerConfig,

    /// Periodic rotation
    pub rotation: RotationConfig,

    /// Paths to JSON stream writer configs
    pub streams: Vec<PathBuf>,

    /// Stream writer configs loaded from `streams`
    #[serde(skip)]
    pub stream_writers: Vec<StreamWriterConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file or any referenced stream config cannot be
    /// read, or contains invalid TOML/JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&contents, path.parent())
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str, base: Option<&Path>) -> Result<Self> {
        let mut config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.load_streams(base)?;
        config.validate()?;
        Ok(config)
    }

    fn load_streams(&mut self, base: Option<&Path>) -> Result<()> {
        self.stream_writers = self
            .streams
            .iter()
            .map(|p| match base {
                Some(dir) if p.is_relative() => dir.join(p),
                _ => p.clone(),
            })
            .map(StreamWriterConfig::from_file)
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    const STREAM_JSON: &str = r#"{
        "StreamName": "downstream",
        "BufferSize": 16,
        "MaxAttemptsPerRecord": 3,
        "RetryDelay": "10ms",
        "Events": { "login": { "Fields": ["user"] } },
        "Globber": { "MaxSize": 1000, "MaxAge": "1s", "BufferLength": 16 },
        "Batcher": { "MaxSize": 5000, "MaxAge": "1s", "BufferLength": 16 }
    }"#;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.files.file_type, FileType::Gzip);
        assert_eq!(config.non_tracked.category, "nontracked");
        assert!(config.streams.is_empty());
        assert!(config.stream_writers.is_empty());
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[log]
level = "debug"
format = "json"

[metrics]
interval = "5s"

[files]
spool_dir = "/tmp/spool"
archive_dir = "/tmp/archive"
file_type = "text"
compressor_pool_size = 8

[files.rotate]
max_size = 1048576
max_age = "1m"

[non_tracked]
category = "untracked"

[non_tracked.rotate]
max_size = 2048
max_age = "30s"

[controller]
creation_queue_size = 10
manager_queue_size = 20

[rotation]
interval = "2s"
"#;
        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.metrics.interval, Duration::from_secs(5));
        assert_eq!(config.files.spool_dir, PathBuf::from("/tmp/spool"));
        assert_eq!(config.files.file_type, FileType::Text);
        assert_eq!(config.files.compressor_pool_size, 8);
        assert_eq!(config.files.rotate.max_size, 1048576);
        assert_eq!(config.files.rotate.max_age, Duration::from_secs(60));
        assert_eq!(config.non_tracked.category, "untracked");
        assert_eq!(config.non_tracked.rotate.max_size, 2048);
        assert_eq!(config.controller.creation_queue_size, 10);
        assert_eq!(config.controller.manager_queue_size, 20);
        assert_eq!(config.rotation.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_str("invalid { toml");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file_resolves_streams_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("streams")).unwrap();
        fs::write(dir.path().join("streams/downstream.json"), STREAM_JSON).unwrap();
        let config_path = dir.path().join("spillway.toml");
        fs::write(&config_path, "streams = [\"streams/downstream.json\"]\n").unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.stream_writers.len(), 1);
        assert_eq!(config.stream_writers[0].stream_name, "downstream");
    }

    #[test]
    fn test_duplicate_streams_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), STREAM_JSON).unwrap();
        fs::write(dir.path().join("b.json"), STREAM_JSON).unwrap();
        let config_path = dir.path().join("spillway.toml");
        fs::write(&config_path, "streams = [\"a.json\", \"b.json\"]\n").unwrap();

        let err = Config::from_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStream(name) if name == "downstream"));
    }

    #[test]
    fn test_missing_stream_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("spillway.toml");
        fs::write(&config_path, "streams = [\"missing.json\"]\n").unwrap();

        let err = Config::from_file(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_file("/nonexistent/spillway.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/spillway.toml"));
    }
}
