//! Stream writer - projected events to a bulk-ingestion stream
//!
//! ```text
//! write(req) --> [incoming: BufferSize] --> project --> Globber --> Batcher
//!                                                                     |
//!                 [send] <-- [send] <-- [send] <-- dispatcher <-------+
//!                   |          |          |
//!                   +---- BulkPutClient --+
//! ```
//!
//! Each request's `record` is projected onto the field allow-list for its
//! category (missing fields become `""`). Categories with no allow-list are
//! dropped, and so are requests whose failure mode keeps them out of the
//! category files. Every completed batch of globs is sent by its own task; sends
//! retry failed records with a fixed delay until `MaxAttemptsPerRecord`
//! attempts have been made, then count the leftovers as dropped.
//!
//! The stream writer holds no file, so `rotate` is a no-op that always
//! reports "not rotated".

mod client;
mod filter;
mod record;

pub use client::{
    BulkPutClient, ERR_INTERNAL_FAILURE, ERR_THROUGHPUT_EXCEEDED, NullBulkPutClient,
    PutRecordEntry, PutRecordResult, RecordFailure,
};
pub use filter::{EventFilter, EventFilters};
pub use record::{STREAM_RECORD_VERSION, StreamRecord};

use async_trait::async_trait;
use bytes::Bytes;
use spillway_config::StreamWriterConfig;
use spillway_metrics::{Counter, WriterMetricsProvider, WriterMetricsSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::batcher::Batcher;
use crate::globber::Globber;
use crate::util::RateLimitedLogger;
use crate::{BulkPutError, WriteRequest, Writer, WriterError};

/// Counters for one stream writer
#[derive(Debug, Default)]
pub struct StreamMetrics {
    pub events_received: Counter,
    /// Requests carrying a failure that keeps them out of every stream
    pub events_not_writable: Counter,
    pub events_globbed: Counter,
    pub events_unconfigured: Counter,
    pub events_filtered: Counter,
    pub batches_sent: Counter,
    /// Whole-call failures (transport errors, malformed responses)
    pub put_errors: Counter,
    pub records_succeeded: Counter,
    pub throughput_exceeded: Counter,
    pub internal_failure: Counter,
    pub unknown_failure: Counter,
    /// Records abandoned after the attempt budget ran out
    pub dropped: Counter,
    pub encode_errors: Counter,
}

impl StreamMetrics {
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot::new()
            .with("events_received", self.events_received.get())
            .with("events_not_writable", self.events_not_writable.get())
            .with("events_globbed", self.events_globbed.get())
            .with("events_unconfigured", self.events_unconfigured.get())
            .with("events_filtered", self.events_filtered.get())
            .with("batches_sent", self.batches_sent.get())
            .with("put_errors", self.put_errors.get())
            .with("records_succeeded", self.records_succeeded.get())
            .with("throughput_exceeded", self.throughput_exceeded.get())
            .with("internal_failure", self.internal_failure.get())
            .with("unknown_failure", self.unknown_failure.get())
            .with("dropped", self.dropped.get())
            .with("encode_errors", self.encode_errors.get())
    }

    fn record_failure(&self, failure: RecordFailure) {
        match failure {
            RecordFailure::ThroughputExceeded => self.throughput_exceeded.inc(),
            RecordFailure::InternalFailure => self.internal_failure.inc(),
            RecordFailure::Unknown => self.unknown_failure.inc(),
        }
    }
}

/// Writer that globs, batches and bulk-puts events into one stream
pub struct StreamWriter {
    stream: String,
    incoming: mpsc::Sender<Arc<WriteRequest>>,
    incoming_worker: JoinHandle<Result<(), WriterError>>,
    dispatcher: JoinHandle<()>,
    metrics: Arc<StreamMetrics>,
    handles: Vec<Arc<dyn WriterMetricsProvider>>,
}

impl StreamWriter {
    /// Validate `config`, resolve event filters and start the workers
    pub fn new(
        config: StreamWriterConfig,
        client: Arc<dyn BulkPutClient>,
        filters: &EventFilters,
    ) -> Result<Self, WriterError> {
        config.validate()?;
        let stream = config.stream_name.clone();

        let mut events = HashMap::with_capacity(config.events.len());
        for (category, event) in config.events {
            let filter = filters.resolve(&stream, &event.filter)?;
            events.insert(
                category,
                Projection {
                    fields: event.fields,
                    filter,
                },
            );
        }

        let metrics = Arc::new(StreamMetrics::default());

        let (batch_tx, batch_rx) = mpsc::channel(config.batcher.buffer_length);
        let batcher = Batcher::new(&stream, &config.batcher, batch_tx)?;
        let globber = Globber::new(&stream, &config.globber, batcher.sender())?;

        let handles: Vec<Arc<dyn WriterMetricsProvider>> = vec![
            Arc::new(StreamMetricsHandle {
                stream: stream.clone(),
                metrics: Arc::clone(&metrics),
            }),
            Arc::new(globber.metrics_handle()),
            Arc::new(batcher.metrics_handle()),
        ];

        let sender = Arc::new(BatchSender {
            stream: stream.clone(),
            client,
            max_attempts: config.max_attempts_per_record,
            retry_delay: config.retry_delay,
            metrics: Arc::clone(&metrics),
            dropped_logger: RateLimitedLogger::with_default_interval("dropping stream records"),
        });
        let dispatcher = tokio::spawn(dispatch(stream.clone(), batch_rx, sender));

        let (incoming, receiver) = mpsc::channel(config.buffer_size);
        let worker = IncomingWorker {
            stream: stream.clone(),
            receiver,
            events,
            globber,
            batcher,
            metrics: Arc::clone(&metrics),
            submit_logger: RateLimitedLogger::with_default_interval("failed to glob event"),
        };
        let incoming_worker = tokio::spawn(worker.run());

        tracing::info!(stream = %stream, "stream writer started");

        Ok(Self {
            stream,
            incoming,
            incoming_worker,
            dispatcher,
            metrics,
            handles,
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    /// Metrics providers for this writer and its globber and batcher
    pub fn metrics_handles(&self) -> Vec<Arc<dyn WriterMetricsProvider>> {
        self.handles.clone()
    }
}

#[async_trait]
impl Writer for StreamWriter {
    async fn write(&mut self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        self.incoming
            .send(req)
            .await
            .map_err(|_| WriterError::Closed)
    }

    async fn rotate(&mut self) -> Result<bool, WriterError> {
        Ok(false)
    }

    async fn close(self: Box<Self>) -> Result<(), WriterError> {
        let Self {
            stream,
            incoming,
            incoming_worker,
            dispatcher,
            ..
        } = *self;

        drop(incoming);
        // globber and batcher flush here, which closes the batch channel
        let flushed = incoming_worker.await?;
        dispatcher.await?;

        tracing::info!(stream = %stream, "stream writer closed");
        flushed
    }
}

/// Allow-list and optional filter for one category
struct Projection {
    fields: Vec<String>,
    filter: Option<EventFilter>,
}

impl Projection {
    fn project(&self, req: &WriteRequest) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| {
                let value = req.record.get(field).cloned().unwrap_or_default();
                (field.clone(), value)
            })
            .collect()
    }
}

struct IncomingWorker {
    stream: String,
    receiver: mpsc::Receiver<Arc<WriteRequest>>,
    events: HashMap<String, Projection>,
    globber: Globber,
    batcher: Batcher,
    metrics: Arc<StreamMetrics>,
    submit_logger: RateLimitedLogger,
}

impl IncomingWorker {
    async fn run(mut self) -> Result<(), WriterError> {
        while let Some(req) = self.receiver.recv().await {
            self.handle(&req).await;
        }

        // globber first: its final glob goes into the batcher
        self.globber.close().await?;
        self.batcher.close().await?;
        tracing::debug!(stream = %self.stream, "stream incoming worker finished");
        Ok(())
    }

    async fn handle(&mut self, req: &WriteRequest) {
        self.metrics.events_received.inc();

        if !req.failure.is_writable() {
            self.metrics.events_not_writable.inc();
            return;
        }
        let Some(projection) = self.events.get(&req.category) else {
            self.metrics.events_unconfigured.inc();
            return;
        };
        if let Some(filter) = &projection.filter {
            if !filter(req) {
                self.metrics.events_filtered.inc();
                return;
            }
        }

        let event = projection.project(req);
        match self.globber.submit(&event).await {
            Ok(()) => self.metrics.events_globbed.inc(),
            Err(e) => {
                self.submit_logger
                    .error_with_data(&req.category, &e, req.line.as_bytes());
            }
        }
    }
}

/// Runs one send task per batch until the batch channel closes, then waits
/// for every in-flight send
async fn dispatch(
    stream: String,
    mut batches: mpsc::Receiver<Vec<Bytes>>,
    sender: Arc<BatchSender>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            batch = batches.recv() => {
                match batch {
                    Some(batch) => {
                        let sender = Arc::clone(&sender);
                        in_flight.spawn(async move { sender.send(batch).await });
                    }
                    None => break,
                }
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    tracing::error!(stream = %stream, error = %e, "stream send task failed");
                }
            }
        }
    }

    let pending = in_flight.len();
    if pending > 0 {
        tracing::debug!(stream = %stream, pending, "draining in-flight sends");
    }
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            tracing::error!(stream = %stream, error = %e, "stream send task failed");
        }
    }
}

/// Bulk-put with per-record retry
struct BatchSender {
    stream: String,
    client: Arc<dyn BulkPutClient>,
    max_attempts: u32,
    retry_delay: Duration,
    metrics: Arc<StreamMetrics>,
    dropped_logger: RateLimitedLogger,
}

impl BatchSender {
    async fn send(&self, batch: Vec<Bytes>) {
        let mut records = Vec::with_capacity(batch.len());
        for glob in batch {
            match StreamRecord::new(glob).into_entry() {
                Ok(entry) => records.push(entry),
                Err(e) => {
                    self.metrics.encode_errors.inc();
                    tracing::error!(stream = %self.stream, error = %e, "failed to encode stream record");
                }
            }
        }
        if records.is_empty() {
            return;
        }
        self.metrics.batches_sent.inc();

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let results = match self.put(&records).await {
                Ok(results) => results,
                Err(e) => {
                    self.metrics.put_errors.inc();
                    tracing::warn!(
                        stream = %self.stream,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        records = records.len(),
                        error = %e,
                        "bulk put failed"
                    );
                    continue;
                }
            };

            let mut failed = Vec::new();
            for (record, result) in records.into_iter().zip(results) {
                match result {
                    PutRecordResult::Ok => self.metrics.records_succeeded.inc(),
                    PutRecordResult::Failed { error_code, .. } => {
                        self.metrics
                            .record_failure(RecordFailure::classify(&error_code));
                        failed.push(record);
                    }
                }
            }
            records = failed;

            if records.is_empty() {
                return;
            }
        }

        self.metrics.dropped.add(records.len() as u64);
        let detail = format!(
            "{} records to '{}' failed after {} attempts",
            records.len(),
            self.stream,
            self.max_attempts
        );
        self.dropped_logger.warn(&detail);
    }

    /// One bulk-put call; a response that does not match the request
    /// one-to-one counts as a failed call
    async fn put(&self, records: &[PutRecordEntry]) -> Result<Vec<PutRecordResult>, BulkPutError> {
        let results = self.client.put_records(&self.stream, records).await?;
        if results.len() != records.len() {
            return Err(BulkPutError::LengthMismatch {
                expected: records.len(),
                got: results.len(),
            });
        }
        Ok(results)
    }
}

/// Metrics handle for [`StreamWriter`]
pub struct StreamMetricsHandle {
    stream: String,
    metrics: Arc<StreamMetrics>,
}

impl WriterMetricsProvider for StreamMetricsHandle {
    fn writer_id(&self) -> &str {
        &self.stream
    }

    fn writer_type(&self) -> &str {
        "stream"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
