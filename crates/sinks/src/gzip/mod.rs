//! Rotating file writer - one spool file per category, shipped on rotation
//!
//! Lines are appended to a temporary file in the spool directory, gzip
//! compressed through an encoder borrowed from the shared
//! [`CompressorPool`] (or as plain text). When a rotation is requested and
//! the file is larger than `max_size` or older than `max_age`, the file is
//! finalized and handed to the [`Uploader`].
//!
//! ```text
//! write(line) --> [FileBody: gzip | text] --> spool/<category>-XXXX.gz
//!                                                  |
//!                        rotate() / close() -------+--> Uploader
//! ```
//!
//! File age comes from an in-process timestamp taken when the file is
//! opened, never from filesystem metadata.

mod body;

use async_trait::async_trait;
use spillway_config::{FileType, RotateConditions};
use spillway_metrics::{Counter, WriterMetricsProvider, WriterMetricsSnapshot};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;

use self::body::FileBody;
use crate::util::CompressorPool;
use crate::{UploadRequest, Uploader, WriteRequest, Writer, WriterError, WriterFactory};

/// Counters shared by every writer a factory builds
#[derive(Debug, Default)]
pub struct FileWriterMetrics {
    pub files_opened: Counter,
    pub lines: Counter,
    /// Uncompressed bytes, newlines included
    pub bytes: Counter,
    pub rotations: Counter,
    pub uploads: Counter,
    pub upload_errors: Counter,
}

impl FileWriterMetrics {
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot::new()
            .with("files_opened", self.files_opened.get())
            .with("lines", self.lines.get())
            .with("bytes", self.bytes.get())
            .with("rotations", self.rotations.get())
            .with("uploads", self.uploads.get())
            .with("upload_errors", self.upload_errors.get())
    }
}

/// Everything a rotating writer needs besides its category
#[derive(Clone)]
pub struct FileWriterSettings {
    pub spool_dir: PathBuf,
    pub file_type: FileType,
    pub conditions: RotateConditions,
    pub uploader: Arc<dyn Uploader>,
    pub pool: Arc<CompressorPool>,
}

struct OpenFile {
    path: PathBuf,
    body: FileBody,
    created_at: Instant,
}

/// Writes one category's lines to a rotating spool file
pub struct RotatingFileWriter {
    category: String,
    settings: FileWriterSettings,
    current: Option<OpenFile>,
    metrics: Arc<FileWriterMetrics>,
}

impl RotatingFileWriter {
    /// Create the writer and its first spool file
    pub fn new(
        category: impl Into<String>,
        settings: FileWriterSettings,
        metrics: Arc<FileWriterMetrics>,
    ) -> Result<Self, WriterError> {
        let mut writer = Self {
            category: category.into(),
            settings,
            current: None,
            metrics,
        };
        writer.current = Some(writer.open()?);
        Ok(writer)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Path of the open spool file, if any
    pub fn current_path(&self) -> Option<&PathBuf> {
        self.current.as_ref().map(|f| &f.path)
    }

    fn open(&self) -> Result<OpenFile, WriterError> {
        let spool_dir = &self.settings.spool_dir;
        fs::create_dir_all(spool_dir)?;

        let (file, path) = tempfile::Builder::new()
            .prefix(&format!("{}-", file_prefix(&self.category)))
            .suffix(self.settings.file_type.extension())
            .tempfile_in(spool_dir)?
            .keep()
            .map_err(|e| e.error)?;

        let body = FileBody::open(file, self.settings.file_type, &self.settings.pool)?;
        self.metrics.files_opened.inc();
        tracing::debug!(category = %self.category, path = %path.display(), "opened spool file");

        Ok(OpenFile {
            path,
            body,
            created_at: Instant::now(),
        })
    }

    /// Close the open file (if any) and hand it to the uploader
    async fn finalize(&mut self) -> Result<(), WriterError> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        let age = open.created_at.elapsed();
        open.body.finish()?;

        let req = UploadRequest {
            filename: open.path,
            file_type: self.settings.file_type,
            category: self.category.clone(),
        };
        match self.settings.uploader.upload(req).await {
            Ok(()) => {
                self.metrics.uploads.inc();
                tracing::debug!(
                    category = %self.category,
                    age_secs = age.as_secs(),
                    "spool file finalized"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.upload_errors.inc();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Writer for RotatingFileWriter {
    async fn write(&mut self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        // reopen after a rotation
        let open = match self.current.take() {
            Some(open) => open,
            None => self.open()?,
        };
        let open = self.current.insert(open);
        open.body.write_line(req.line.as_bytes())?;

        self.metrics.lines.inc();
        self.metrics.bytes.add(req.line.len() as u64 + 1);
        Ok(())
    }

    async fn rotate(&mut self) -> Result<bool, WriterError> {
        let Some(open) = self.current.as_mut() else {
            return Ok(false);
        };

        let size = open.body.size()?;
        let age = open.created_at.elapsed();
        let conditions = &self.settings.conditions;
        if size <= conditions.max_size && age <= conditions.max_age {
            return Ok(false);
        }

        tracing::debug!(
            category = %self.category,
            size,
            age_secs = age.as_secs(),
            "rotating spool file"
        );
        self.finalize().await?;
        self.metrics.rotations.inc();
        Ok(true)
    }

    async fn close(mut self: Box<Self>) -> Result<(), WriterError> {
        self.finalize().await
    }
}

/// Category names become part of a file name
fn file_prefix(category: &str) -> String {
    category
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds a [`RotatingFileWriter`] per category with shared settings
pub struct RotatingFileWriterFactory {
    name: String,
    settings: FileWriterSettings,
    metrics: Arc<FileWriterMetrics>,
}

impl RotatingFileWriterFactory {
    /// `name` identifies the factory's writers in metrics
    pub fn new(name: impl Into<String>, settings: FileWriterSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            metrics: Arc::new(FileWriterMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &FileWriterMetrics {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> FileWriterMetricsHandle {
        FileWriterMetricsHandle {
            name: self.name.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[async_trait]
impl WriterFactory for RotatingFileWriterFactory {
    async fn create(&self, category: &str) -> Result<Box<dyn Writer>, WriterError> {
        let writer =
            RotatingFileWriter::new(category, self.settings.clone(), Arc::clone(&self.metrics))
                .map_err(|e| WriterError::create(category, e.to_string()))?;
        Ok(Box::new(writer))
    }
}

/// Metrics handle for writers built by a [`RotatingFileWriterFactory`]
pub struct FileWriterMetricsHandle {
    name: String,
    metrics: Arc<FileWriterMetrics>,
}

impl WriterMetricsProvider for FileWriterMetricsHandle {
    fn writer_id(&self) -> &str {
        &self.name
    }

    fn writer_type(&self) -> &str {
        "file"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}
