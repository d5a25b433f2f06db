//! Writer manager - the lifecycle of one category's writer
//!
//! A [`WriterManager`] is a cloneable handle onto a worker task that owns
//! at most one writer. All state changes happen inside that worker, one
//! command at a time:
//!
//! | State  | write                     | rotate                            | close        |
//! |--------|---------------------------|-----------------------------------|--------------|
//! | Empty  | create via factory, write | `false`                           | done         |
//! | Active | write                     | delegate; `true` drops the writer | close writer |
//!
//! Every write is reported exactly once: with the request's own failure
//! mode when delivered, or as `FailedWrite` when creation or delivery fails.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::util::RateLimitedLogger;
use crate::{FailMode, ReportResult, Reporter, WriteRequest, Writer, WriterError, WriterFactory};

enum Command {
    Write(Arc<WriteRequest>),
    Rotate(oneshot::Sender<Result<bool, WriterError>>),
    Close(oneshot::Sender<Result<(), WriterError>>),
}

enum WriterState {
    Empty,
    Active(Box<dyn Writer>),
}

/// Handle onto one category's writer worker
#[derive(Clone)]
pub struct WriterManager {
    category: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl WriterManager {
    /// Start a worker for `category` with an empty state
    ///
    /// `queue_size` bounds commands waiting for the worker.
    pub fn new(
        category: impl Into<String>,
        factory: Arc<dyn WriterFactory>,
        reporter: Arc<dyn Reporter>,
        queue_size: usize,
    ) -> Self {
        let category: Arc<str> = Arc::from(category.into());
        let (tx, rx) = mpsc::channel(queue_size);

        let worker = ManagerWorker {
            category: Arc::clone(&category),
            rx,
            factory,
            reporter,
            state: WriterState::Empty,
            create_errors: RateLimitedLogger::with_default_interval("failed to create writer"),
            write_errors: RateLimitedLogger::with_default_interval("failed to write request"),
        };
        tokio::spawn(worker.run());

        Self { category, tx }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Queue a write; waits while the queue is full
    ///
    /// The outcome goes to the reporter, not the caller.
    pub async fn write(&self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        self.tx
            .send(Command::Write(req))
            .await
            .map_err(|_| WriterError::Closed)
    }

    /// Ask the worker to rotate, after every write queued before it
    pub async fn rotate(&self) -> Result<bool, WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Rotate(reply))
            .await
            .map_err(|_| WriterError::Closed)?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    /// Close the writer (if any) and stop the worker
    ///
    /// Writes queued before the close are delivered first.
    pub async fn close(&self) -> Result<(), WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Close(reply))
            .await
            .map_err(|_| WriterError::Closed)?;
        rx.await.map_err(|_| WriterError::Closed)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ManagerWorker {
    category: Arc<str>,
    rx: mpsc::Receiver<Command>,
    factory: Arc<dyn WriterFactory>,
    reporter: Arc<dyn Reporter>,
    state: WriterState,
    create_errors: RateLimitedLogger,
    write_errors: RateLimitedLogger,
}

impl ManagerWorker {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Write(req) => self.write(req).await,
                Command::Rotate(reply) => {
                    let _ = reply.send(self.rotate().await);
                }
                Command::Close(reply) => {
                    let result = self.close().await;
                    // closed before replying, so the caller sees a closed handle
                    self.reject_pending();
                    let _ = reply.send(result);
                    return;
                }
            }
        }

        // every handle dropped without a close
        if let Err(e) = self.close().await {
            tracing::error!(category = %self.category, error = %e, "failed to close abandoned writer");
        }
    }

    async fn write(&mut self, req: Arc<WriteRequest>) {
        if let WriterState::Empty = self.state {
            match self.factory.create(&self.category).await {
                Ok(writer) => {
                    tracing::debug!(category = %self.category, "writer created");
                    self.state = WriterState::Active(writer);
                }
                Err(e) => {
                    self.create_errors.error_with_data(&self.category, &e, req.line.as_bytes());
                    self.reporter
                        .report(ReportResult::with_failure(&req, FailMode::FailedWrite));
                    return;
                }
            }
        }

        let WriterState::Active(writer) = &mut self.state else {
            return;
        };
        match writer.write(Arc::clone(&req)).await {
            Ok(()) => self.reporter.report(ReportResult::from_request(&req)),
            Err(e) => {
                self.write_errors.error_with_data(&self.category, &e, req.line.as_bytes());
                self.reporter
                    .report(ReportResult::with_failure(&req, FailMode::FailedWrite));
            }
        }
    }

    async fn rotate(&mut self) -> Result<bool, WriterError> {
        let WriterState::Active(writer) = &mut self.state else {
            return Ok(false);
        };
        let rotated = writer.rotate().await?;
        if rotated {
            self.state = WriterState::Empty;
            tracing::debug!(category = %self.category, "writer rotated out");
        }
        Ok(rotated)
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        match std::mem::replace(&mut self.state, WriterState::Empty) {
            WriterState::Active(writer) => writer.close().await,
            WriterState::Empty => Ok(()),
        }
    }

    /// Answer commands that raced with the close
    fn reject_pending(&mut self) {
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Write(req) => {
                    self.reporter
                        .report(ReportResult::with_failure(&req, FailMode::FailedWrite));
                }
                Command::Rotate(reply) => {
                    let _ = reply.send(Err(WriterError::Closed));
                }
                Command::Close(reply) => {
                    let _ = reply.send(Ok(()));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
