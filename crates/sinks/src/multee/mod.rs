//! Multee - one writer in front of many
//!
//! Writes and rotations go to every target in order; a failing target is
//! logged and skipped, never surfaced. Close runs on every target
//! concurrently.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::{WriteRequest, Writer, WriterError};

/// Fan-out writer
pub struct Multee {
    targets: Vec<Box<dyn Writer>>,
}

impl Multee {
    pub fn new(targets: Vec<Box<dyn Writer>>) -> Self {
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl Writer for Multee {
    async fn write(&mut self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        for (target, writer) in self.targets.iter_mut().enumerate() {
            if let Err(e) = writer.write(Arc::clone(&req)).await {
                tracing::error!(target, category = %req.category, error = %e, "multee write failed");
            }
        }
        Ok(())
    }

    /// Fully rotated only if every target rotated; errors count as not
    /// rotated
    async fn rotate(&mut self) -> Result<bool, WriterError> {
        let mut fully_rotated = true;
        for (target, writer) in self.targets.iter_mut().enumerate() {
            match writer.rotate().await {
                Ok(rotated) => fully_rotated &= rotated,
                Err(e) => {
                    tracing::error!(target, error = %e, "multee rotate failed");
                    fully_rotated = false;
                }
            }
        }
        Ok(fully_rotated)
    }

    async fn close(self: Box<Self>) -> Result<(), WriterError> {
        let mut closes = JoinSet::new();
        for (target, writer) in self.targets.into_iter().enumerate() {
            closes.spawn(async move { (target, writer.close().await) });
        }

        while let Some(joined) = closes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((target, Err(e))) => {
                    tracing::error!(target, error = %e, "multee close failed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "multee close task failed");
                }
            }
        }
        Ok(())
    }
}
