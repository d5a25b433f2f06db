//! Shipping finished files to long-term storage
//!
//! The rotating file writer hands every finalized file to an [`Uploader`].
//! [`DirectoryUploader`] moves files into a local archive tree:
//!
//! ```text
//! <archive>/<category>/<yyyymmddThhmmss>-<uuid>.gz
//! ```

use crate::WriterError;
use async_trait::async_trait;
use chrono::Utc;
use spillway_config::FileType;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A finished local file ready to ship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: PathBuf,
    pub file_type: FileType,
    pub category: String,
}

/// Ships finished files; the local file is owned by the uploader once
/// `upload` returns `Ok`
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, req: UploadRequest) -> Result<(), WriterError>;
}

/// Moves finished files into a per-category archive directory
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    archive_dir: PathBuf,
}

impl DirectoryUploader {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    fn destination(&self, req: &UploadRequest) -> PathBuf {
        let name = format!(
            "{}-{}{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4(),
            req.file_type.extension()
        );
        self.archive_dir.join(&req.category).join(name)
    }
}

#[async_trait]
impl Uploader for DirectoryUploader {
    async fn upload(&self, req: UploadRequest) -> Result<(), WriterError> {
        let dest = self.destination(&req);
        let source = req.filename.display().to_string();

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| WriterError::upload(&source, e.to_string()))?;
        }

        move_file(&req.filename, &dest)
            .await
            .map_err(|e| WriterError::upload(&source, e.to_string()))?;

        tracing::info!(
            category = %req.category,
            file_type = req.file_type.as_str(),
            from = %source,
            to = %dest.display(),
            "file archived"
        );
        Ok(())
    }
}

/// Rename, falling back to copy + remove across filesystems
async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod upload_test;
