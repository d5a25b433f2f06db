//! Stream writer configuration
//!
//! Stream writers are configured by standalone JSON documents (one per
//! destination stream) so they can be shipped alongside the stream
//! definitions themselves. Keys are PascalCase:
//!
//! ```json
//! {
//!   "StreamName": "events-downstream",
//!   "BufferSize": 1024,
//!   "MaxAttemptsPerRecord": 10,
//!   "RetryDelay": "1s",
//!   "Events": {
//!     "video-play": { "Filter": "", "Fields": ["time", "channel"] }
//!   },
//!   "Globber": { "MaxSize": 990000, "MaxAge": "1s", "BufferLength": 1024 },
//!   "Batcher": { "MaxSize": 4900000, "MaxEntries": 500, "MaxAge": "1s", "BufferLength": 1024 }
//! }
//! ```

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// `MaxEntries` value meaning "no count limit"
pub const UNBOUNDED_ENTRIES: i64 = -1;

/// Size/count/age bounds for a Batcher
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct BatcherConfig {
    /// Maximum bytes per batch
    pub max_size: usize,

    /// Maximum entries per batch, `-1` for unbounded
    #[serde(default = "default_max_entries")]
    pub max_entries: i64,

    /// Maximum time a non-empty batch may wait before being flushed
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Capacity of the submission queue
    pub buffer_length: usize,
}

fn default_max_entries() -> i64 {
    UNBOUNDED_ENTRIES
}

impl BatcherConfig {
    /// Check bounds, naming the owning component in errors
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid_value(
                "batcher",
                name,
                "MaxSize",
                "must be greater than 0",
            ));
        }
        if self.max_age.is_zero() {
            return Err(ConfigError::invalid_value(
                "batcher",
                name,
                "MaxAge",
                "must be greater than 0",
            ));
        }
        if self.buffer_length == 0 {
            return Err(ConfigError::invalid_value(
                "batcher",
                name,
                "BufferLength",
                "must be greater than 0",
            ));
        }
        if self.max_entries != UNBOUNDED_ENTRIES && self.max_entries <= 0 {
            return Err(ConfigError::invalid_value(
                "batcher",
                name,
                "MaxEntries",
                "must be -1 (unbounded) or greater than 0",
            ));
        }
        Ok(())
    }

    /// Entry limit, `None` when unbounded
    pub fn entry_limit(&self) -> Option<usize> {
        if self.max_entries == UNBOUNDED_ENTRIES {
            None
        } else {
            usize::try_from(self.max_entries).ok()
        }
    }
}

/// Size/age bounds for a Globber
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct GlobberConfig {
    /// Maximum uncompressed bytes per glob
    pub max_size: usize,

    /// Maximum time a non-empty glob may wait before being flushed
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Capacity of the submission queue
    pub buffer_length: usize,
}

impl GlobberConfig {
    /// Check bounds, naming the owning component in errors
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid_value(
                "globber",
                name,
                "MaxSize",
                "must be greater than 0",
            ));
        }
        if self.max_age.is_zero() {
            return Err(ConfigError::invalid_value(
                "globber",
                name,
                "MaxAge",
                "must be greater than 0",
            ));
        }
        if self.buffer_length == 0 {
            return Err(ConfigError::invalid_value(
                "globber",
                name,
                "BufferLength",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Per-category allow-list
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventConfig {
    /// Name of a registered filter; empty accepts every event
    pub filter: String,

    /// Columns copied into the outgoing record, in order
    pub fields: Vec<String>,
}

/// One streaming destination
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StreamWriterConfig {
    /// Destination stream name
    pub stream_name: String,

    /// Capacity of the incoming request queue
    pub buffer_size: usize,

    /// Attempts per batch (and per failed record within it)
    pub max_attempts_per_record: u32,

    /// Fixed sleep before each retry
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Categories forwarded to this stream; anything else is dropped
    #[serde(default)]
    pub events: HashMap<String, EventConfig>,

    /// Glob bounds
    pub globber: GlobberConfig,

    /// Batch bounds
    pub batcher: BatcherConfig,
}

impl StreamWriterConfig {
    /// Load a stream writer config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: StreamWriterConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::JsonError {
                path: path.display().to_string(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the stream writer and its nested globber/batcher
    pub fn validate(&self) -> Result<()> {
        if self.stream_name.is_empty() {
            return Err(ConfigError::missing_field("stream", "<unnamed>", "StreamName"));
        }
        let name = self.stream_name.as_str();
        if self.buffer_size == 0 {
            return Err(ConfigError::invalid_value(
                "stream",
                name,
                "BufferSize",
                "must be greater than 0",
            ));
        }
        if self.max_attempts_per_record == 0 {
            return Err(ConfigError::invalid_value(
                "stream",
                name,
                "MaxAttemptsPerRecord",
                "must be greater than 0",
            ));
        }
        for (category, event) in &self.events {
            if event.fields.is_empty() {
                return Err(ConfigError::invalid_value(
                    "stream",
                    name,
                    "Events",
                    format!("category '{}' has no fields", category),
                ));
            }
        }
        self.globber.validate(name)?;
        self.batcher.validate(name)?;
        Ok(())
    }
}

impl FromStr for StreamWriterConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: StreamWriterConfig =
            serde_json::from_str(s).map_err(|e| ConfigError::JsonError {
                path: "<inline>".into(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM_JSON: &str = r#"{
        "StreamName": "events-downstream",
        "BufferSize": 1024,
        "MaxAttemptsPerRecord": 10,
        "RetryDelay": "1s",
        "Events": {
            "video-play": { "Filter": "", "Fields": ["time", "channel"] },
            "buffer-empty": { "Filter": "is-a-bot", "Fields": ["time"] }
        },
        "Globber": { "MaxSize": 990000, "MaxAge": "1s", "BufferLength": 1024 },
        "Batcher": { "MaxSize": 4900000, "MaxEntries": 500, "MaxAge": "1s", "BufferLength": 1024 }
    }"#;

    #[test]
    fn test_parse_stream_config() {
        let config = StreamWriterConfig::from_str(STREAM_JSON).unwrap();
        assert_eq!(config.stream_name, "events-downstream");
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.max_attempts_per_record, 10);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.events.len(), 2);
        assert_eq!(config.events["video-play"].fields, vec!["time", "channel"]);
        assert_eq!(config.events["buffer-empty"].filter, "is-a-bot");
        assert_eq!(config.globber.max_size, 990000);
        assert_eq!(config.batcher.entry_limit(), Some(500));
    }

    #[test]
    fn test_batcher_max_entries_defaults_to_unbounded() {
        let config: BatcherConfig =
            serde_json::from_str(r#"{"MaxSize": 10, "MaxAge": "100ms", "BufferLength": 4}"#)
                .unwrap();
        assert_eq!(config.max_entries, UNBOUNDED_ENTRIES);
        assert_eq!(config.entry_limit(), None);
        assert!(config.validate("test").is_ok());
    }

    #[test]
    fn test_batcher_rejects_zero_bounds() {
        let base = BatcherConfig {
            max_size: 10,
            max_entries: -1,
            max_age: Duration::from_millis(100),
            buffer_length: 4,
        };

        let mut c = base.clone();
        c.max_size = 0;
        assert!(c.validate("test").unwrap_err().to_string().contains("MaxSize"));

        let mut c = base.clone();
        c.max_age = Duration::ZERO;
        assert!(c.validate("test").unwrap_err().to_string().contains("MaxAge"));

        let mut c = base.clone();
        c.buffer_length = 0;
        assert!(c.validate("test").unwrap_err().to_string().contains("BufferLength"));

        let mut c = base;
        c.max_entries = 0;
        assert!(c.validate("test").unwrap_err().to_string().contains("MaxEntries"));
    }

    #[test]
    fn test_globber_rejects_zero_bounds() {
        let c = GlobberConfig {
            max_size: 0,
            max_age: Duration::from_secs(1),
            buffer_length: 1,
        };
        assert!(c.validate("test").is_err());
    }

    #[test]
    fn test_stream_requires_name() {
        let json = STREAM_JSON.replace("events-downstream", "");
        let err = StreamWriterConfig::from_str(&json).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn test_stream_rejects_zero_attempts() {
        let json = STREAM_JSON.replace("\"MaxAttemptsPerRecord\": 10", "\"MaxAttemptsPerRecord\": 0");
        assert!(StreamWriterConfig::from_str(&json).is_err());
    }

    #[test]
    fn test_stream_rejects_event_without_fields() {
        let json = STREAM_JSON.replace("\"Fields\": [\"time\"]", "\"Fields\": []");
        let err = StreamWriterConfig::from_str(&json).unwrap_err();
        assert!(err.to_string().contains("buffer-empty"));
    }

    #[test]
    fn test_stream_invalid_json() {
        let err = StreamWriterConfig::from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::JsonError { .. }));
    }

    #[test]
    fn test_stream_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");
        std::fs::write(&path, STREAM_JSON).unwrap();

        let config = StreamWriterConfig::from_file(&path).unwrap();
        assert_eq!(config.stream_name, "events-downstream");
    }
}
