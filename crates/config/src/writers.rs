//! File writer, controller and rotation configuration
//!
//! # Example
//!
//! ```toml
//! [files]
//! spool_dir = "/var/spool/spillway"
//! archive_dir = "/var/lib/spillway/archive"
//! file_type = "gzip"
//!
//! [files.rotate]
//! max_size = 524288000
//! max_age = "10m"
//!
//! [non_tracked.rotate]
//! max_size = 104857600
//! max_age = "10m"
//!
//! [controller]
//! creation_queue_size = 100
//! manager_queue_size = 1024
//!
//! [rotation]
//! interval = "10s"
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Kind of file a rotating writer produces
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Single-member gzip
    #[default]
    Gzip,
    /// Uncompressed newline-delimited text
    Text,
}

impl FileType {
    /// File extension, including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
            Self::Text => ".txt",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Text => "text",
        }
    }
}

/// Thresholds checked when a rotation is requested
///
/// A file is finalized when either bound is exceeded.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RotateConditions {
    /// Bytes on disk
    pub max_size: u64,

    /// Time since the file was created
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for RotateConditions {
    fn default() -> Self {
        Self {
            max_size: 500 * 1024 * 1024,
            max_age: Duration::from_secs(600),
        }
    }
}

/// Local file writers for tracked events
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory where in-progress files are created
    pub spool_dir: PathBuf,

    /// Directory finished files are moved into
    pub archive_dir: PathBuf,

    /// Compressed or plain output
    pub file_type: FileType,

    /// Maximum idle compressors kept for reuse
    pub compressor_pool_size: usize,

    /// Rotation thresholds for per-category files
    pub rotate: RotateConditions,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("spool"),
            archive_dir: PathBuf::from("archive"),
            file_type: FileType::Gzip,
            compressor_pool_size: 64,
            rotate: RotateConditions::default(),
        }
    }
}

/// The shared writer for events that are written but not tracked
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NonTrackedConfig {
    /// Category (and archive subdirectory) used for these files
    pub category: String,

    /// Rotation thresholds, independent of `[files.rotate]`
    pub rotate: RotateConditions,
}

impl Default for NonTrackedConfig {
    fn default() -> Self {
        Self {
            category: "nontracked".into(),
            rotate: RotateConditions {
                max_size: 100 * 1024 * 1024,
                max_age: Duration::from_secs(600),
            },
        }
    }
}

/// Queue sizes for the category router
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pending first-writes for categories that have no manager yet
    pub creation_queue_size: usize,

    /// Per-manager command queue
    pub manager_queue_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            creation_queue_size: 100,
            manager_queue_size: 1024,
        }
    }
}

/// How often the binary asks every writer to rotate
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}
