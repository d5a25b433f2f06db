//! Spillway - Sinks
//!
//! The write side of the pipeline: batching, globbing, rotating compressed
//! files and bulk-put streams behind one writer contract.
//!
//! # Architecture
//!
//! Every destination implements [`Writer`]. The controller routes each
//! request to a per-category [`WriterManager`], which owns that category's
//! writer and creates it on demand.
//!
//! ```text
//!                       +--> WriterController --> WriterManager(category) --> RotatingFileWriter --> Uploader
//! WriteRequest --> Multee                    \--> WriterManager(non-tracked) --> RotatingFileWriter
//!                       +--> StreamWriter --> Globber --> Batcher --> BulkPutClient
//! ```
//!
//! # Components
//!
//! | Component | Purpose | Rotates |
//! |-----------|---------|---------|
//! | `batcher` | Size/count/age bounded payload groups | No |
//! | `globber` | Compressed, version-tagged JSON arrays | No |
//! | `stream` | Projected events to a bulk-put stream with retry | No |
//! | `gzip` | Per-category spool files, uploaded on rotation | Yes |
//! | `manager` | One category's writer lifecycle | Delegates |
//! | `controller` | Category routing and failure reporting | Delegates |
//! | `multee` | Fan-out to several writers | Delegates |
//!
//! # Example
//!
//! ```ignore
//! use spillway_sinks::{Multee, Writer, WriterController};
//!
//! let controller = WriterController::new(&config, files, non_tracked, "nontracked", reporter);
//! let mut writer = Multee::new(vec![Box::new(controller), Box::new(stream_writer)]);
//!
//! writer.write(Arc::new(request)).await?;
//! writer.rotate().await?;
//! Box::new(writer).close().await?;
//! ```

// =============================================================================
// Contract and shared types
// =============================================================================

mod error;
mod report;
mod request;
mod upload;
mod writer;

// =============================================================================
// Writers and their building blocks
// =============================================================================

/// Batcher - size/count/age bounded groups of opaque payloads
pub mod batcher;

/// Globber - compressed, version-tagged JSON arrays
pub mod globber;

/// Stream writer - globs and batches into a bulk-put stream
pub mod stream;

/// Rotating gzip/text spool files
pub mod gzip;

/// Per-category writer lifecycle
pub mod manager;

/// Category routing
pub mod controller;

/// Fan-out writer
pub mod multee;

/// Shared utilities (compressor pool, rate-limited logging)
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

// =============================================================================
// Public re-exports
// =============================================================================

pub use error::{BulkPutError, WriterError};
pub use report::{Reporter, TracingReporter, TracingReporterMetricsHandle};
pub use request::{FailMode, ReportResult, WriteRequest};
pub use upload::{DirectoryUploader, UploadRequest, Uploader};
pub use writer::{Writer, WriterFactory};

pub use batcher::{Batcher, BatcherMetricsHandle};
pub use controller::{ControllerMetricsHandle, WriterController};
pub use globber::{GLOB_VERSION, Globber, GlobberMetricsHandle, decode_glob};
pub use gzip::{
    FileWriterMetricsHandle, FileWriterSettings, RotatingFileWriter, RotatingFileWriterFactory,
};
pub use manager::WriterManager;
pub use multee::Multee;
pub use stream::{
    BulkPutClient, EventFilters, NullBulkPutClient, PutRecordEntry, PutRecordResult, StreamWriter,
};
pub use util::CompressorPool;
