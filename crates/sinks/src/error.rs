//! Writer errors
//!
//! Shared by every writer in the crate. Bulk-put failures have their own
//! enum because they are retried rather than surfaced.

use spillway_config::ConfigError;
use thiserror::Error;

/// Errors returned through the writer contract
#[derive(Debug, Error)]
pub enum WriterError {
    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Handing a finished file to long-term storage failed
    #[error("upload of '{path}' failed: {message}")]
    Upload { path: String, message: String },

    /// Encoding a record or envelope failed
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The writer (or its worker) has shut down
    #[error("writer is closed")]
    Closed,

    /// Invalid construction parameters
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A factory could not build a writer for a category
    #[error("failed to create writer for category '{category}': {message}")]
    Create { category: String, message: String },

    /// A worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Task(String),
}

impl WriterError {
    /// Create an Upload error
    pub fn upload(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upload {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a Create error
    pub fn create(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Create {
            category: category.into(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for WriterError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Errors from a bulk-put call as a whole
///
/// Per-record failures are not errors; they come back as
/// [`PutRecordResult::Failed`](crate::stream::PutRecordResult).
#[derive(Debug, Error)]
pub enum BulkPutError {
    /// The call never produced a usable response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response does not line up with the request
    #[error("response has {got} results for {expected} records")]
    LengthMismatch { expected: usize, got: usize },
}

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;
