//! The writer contract shared by every destination

use crate::{WriteRequest, WriterError};
use async_trait::async_trait;
use std::sync::Arc;

/// A destination for write requests
///
/// Implementations: [`RotatingFileWriter`](crate::gzip::RotatingFileWriter),
/// [`StreamWriter`](crate::stream::StreamWriter), [`Multee`](crate::Multee)
/// and [`WriterController`](crate::WriterController).
#[async_trait]
pub trait Writer: Send {
    /// Deliver one request
    async fn write(&mut self, req: Arc<WriteRequest>) -> Result<(), WriterError>;

    /// Finalize output if rotation thresholds are met
    ///
    /// `Ok(true)` means the writer has released everything it held and may
    /// be dropped; `Ok(false)` means it is still live.
    async fn rotate(&mut self) -> Result<bool, WriterError>;

    /// Flush and release everything; the writer is consumed
    async fn close(self: Box<Self>) -> Result<(), WriterError>;
}

/// Builds the writer a [`WriterManager`](crate::WriterManager) owns
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn create(&self, category: &str) -> Result<Box<dyn Writer>, WriterError>;
}
