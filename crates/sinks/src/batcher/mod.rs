//! Batcher - groups opaque payloads into size/count/age bounded batches
//!
//! One worker task owns the in-progress batch. Payloads arrive over a
//! bounded channel (so `submit` applies backpressure) and completed batches
//! leave over the output channel in submission order.
//!
//! ```text
//! submit(payload) --> [queue: BufferLength] --> [worker: Vec<Bytes>] --> output
//!                                                   ^
//!                                          age timer (MaxAge after first entry)
//! ```
//!
//! # Flush rules
//!
//! - Before appending, if the batch would exceed `MaxSize` bytes or
//!   `MaxEntries` entries, the current batch is flushed first
//! - A payload larger than `MaxSize` on its own is emitted as a
//!   single-entry batch immediately
//! - `MaxAge` after a batch becomes non-empty it is flushed
//! - On close, a non-empty batch is flushed once more

use bytes::Bytes;
use spillway_config::BatcherConfig;
use spillway_metrics::{Counter, WriterMetricsProvider, WriterMetricsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::WriterError;

/// Why a batch left the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    Size,
    Count,
    Age,
    Close,
}

/// Counters for one batcher
#[derive(Debug, Default)]
pub struct BatcherMetrics {
    pub batches: Counter,
    pub entries: Counter,
    pub bytes: Counter,
    pub size_flushes: Counter,
    pub count_flushes: Counter,
    pub age_flushes: Counter,
    pub close_flushes: Counter,
    /// Batches lost because the output channel was closed
    pub dropped: Counter,
}

impl BatcherMetrics {
    fn record_flush(&self, reason: FlushReason, entries: usize, bytes: usize) {
        self.batches.inc();
        self.entries.add(entries as u64);
        self.bytes.add(bytes as u64);
        match reason {
            FlushReason::Size => self.size_flushes.inc(),
            FlushReason::Count => self.count_flushes.inc(),
            FlushReason::Age => self.age_flushes.inc(),
            FlushReason::Close => self.close_flushes.inc(),
        }
    }

    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot::new()
            .with("batches", self.batches.get())
            .with("entries", self.entries.get())
            .with("bytes", self.bytes.get())
            .with("size_flushes", self.size_flushes.get())
            .with("count_flushes", self.count_flushes.get())
            .with("age_flushes", self.age_flushes.get())
            .with("close_flushes", self.close_flushes.get())
            .with("dropped", self.dropped.get())
    }
}

/// Size/count/age bounded batcher
pub struct Batcher {
    name: String,
    sender: mpsc::Sender<Bytes>,
    worker: JoinHandle<()>,
    metrics: Arc<BatcherMetrics>,
}

impl Batcher {
    /// Validate `config` and start the worker
    ///
    /// Completed batches are sent to `output`; if it closes, later batches
    /// are counted as dropped.
    pub fn new(
        name: impl Into<String>,
        config: &BatcherConfig,
        output: mpsc::Sender<Vec<Bytes>>,
    ) -> Result<Self, WriterError> {
        let name = name.into();
        config.validate(&name)?;

        let (sender, receiver) = mpsc::channel(config.buffer_length);
        let metrics = Arc::new(BatcherMetrics::default());

        let worker = BatcherWorker {
            name: name.clone(),
            receiver,
            output,
            max_size: config.max_size,
            max_entries: config.entry_limit(),
            max_age: config.max_age,
            batch: Vec::new(),
            batch_bytes: 0,
            deadline: None,
            metrics: Arc::clone(&metrics),
        };
        let worker = tokio::spawn(worker.run());

        Ok(Self {
            name,
            sender,
            worker,
            metrics,
        })
    }

    /// Queue a payload, waiting while the queue is full
    pub async fn submit(&self, payload: Bytes) -> Result<(), WriterError> {
        self.sender
            .send(payload)
            .await
            .map_err(|_| WriterError::Closed)
    }

    /// Another handle onto the submission queue
    ///
    /// The worker keeps running until every sender is dropped, so `close`
    /// only completes once clones are gone too.
    pub fn sender(&self) -> mpsc::Sender<Bytes> {
        self.sender.clone()
    }

    /// Stop accepting, flush the partial batch and wait for the worker
    pub async fn close(self) -> Result<(), WriterError> {
        drop(self.sender);
        self.worker.await?;
        tracing::debug!(batcher = %self.name, "batcher closed");
        Ok(())
    }

    pub fn metrics(&self) -> &BatcherMetrics {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> BatcherMetricsHandle {
        BatcherMetricsHandle {
            name: self.name.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

struct BatcherWorker {
    name: String,
    receiver: mpsc::Receiver<Bytes>,
    output: mpsc::Sender<Vec<Bytes>>,
    max_size: usize,
    max_entries: Option<usize>,
    max_age: Duration,
    batch: Vec<Bytes>,
    batch_bytes: usize,
    /// Set when the batch becomes non-empty
    deadline: Option<Instant>,
    metrics: Arc<BatcherMetrics>,
}

impl BatcherWorker {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                payload = self.receiver.recv() => {
                    match payload {
                        Some(payload) => self.add(payload).await,
                        None => break,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush(FlushReason::Age).await;
                }
            }
        }

        if !self.batch.is_empty() {
            self.flush(FlushReason::Close).await;
        }
        tracing::debug!(batcher = %self.name, "batcher worker finished");
    }

    async fn add(&mut self, payload: Bytes) {
        if !self.batch.is_empty() {
            if self.batch_bytes + payload.len() > self.max_size {
                self.flush(FlushReason::Size).await;
            } else if self
                .max_entries
                .is_some_and(|max| self.batch.len() + 1 > max)
            {
                self.flush(FlushReason::Count).await;
            }
        }

        if self.batch.is_empty() {
            self.deadline = Some(Instant::now() + self.max_age);
        }
        self.batch_bytes += payload.len();
        self.batch.push(payload);

        // a lone oversize payload cannot share a batch with anything
        if self.batch.len() == 1 && self.batch_bytes > self.max_size {
            self.flush(FlushReason::Size).await;
        }
    }

    async fn flush(&mut self, reason: FlushReason) {
        if self.batch.is_empty() {
            self.deadline = None;
            return;
        }

        let batch = std::mem::take(&mut self.batch);
        let entries = batch.len();
        let bytes = std::mem::take(&mut self.batch_bytes);
        self.deadline = None;

        if self.output.send(batch).await.is_err() {
            self.metrics.dropped.inc();
            tracing::warn!(
                batcher = %self.name,
                entries,
                "batch output closed, dropping batch"
            );
            return;
        }
        self.metrics.record_flush(reason, entries, bytes);
    }
}

/// Metrics handle for [`Batcher`]
pub struct BatcherMetricsHandle {
    name: String,
    metrics: Arc<BatcherMetrics>,
}

impl WriterMetricsProvider for BatcherMetricsHandle {
    fn writer_id(&self) -> &str {
        &self.name
    }

    fn writer_type(&self) -> &str {
        "batcher"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}
