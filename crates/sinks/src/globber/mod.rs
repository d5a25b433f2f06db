//! Globber - packs JSON objects into compressed, version-tagged arrays
//!
//! Same worker-owns-state shape as the [`Batcher`](crate::batcher::Batcher),
//! but the unit is a serialized JSON object and the output is a single
//! compressed blob per window:
//!
//! ```text
//! byte 0      : GLOB_VERSION
//! bytes 1..   : raw deflate of `[obj,obj,...]`
//! ```
//!
//! Objects are serialized by the caller in `submit`, so a serialization
//! failure is returned synchronously and never reaches the worker. The worker
//! reuses one deflate encoder for every glob.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use serde::Serialize;
use spillway_config::GlobberConfig;
use spillway_metrics::{Counter, WriterMetricsProvider, WriterMetricsSnapshot};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::WriterError;

/// Format version written as the first byte of every glob
pub const GLOB_VERSION: u8 = 1;

/// Starting capacity of the JSON buffer; it grows toward `MaxSize` as needed
const INITIAL_BUFFER_CAPACITY: usize = 16 * 1024;

/// Counters for one globber
#[derive(Debug, Default)]
pub struct GlobberMetrics {
    pub globs: Counter,
    pub entries: Counter,
    pub uncompressed_bytes: Counter,
    pub compressed_bytes: Counter,
    pub marshal_errors: Counter,
    pub compress_errors: Counter,
    /// Globs lost because the output channel was closed
    pub dropped: Counter,
}

impl GlobberMetrics {
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot::new()
            .with("globs", self.globs.get())
            .with("entries", self.entries.get())
            .with("uncompressed_bytes", self.uncompressed_bytes.get())
            .with("compressed_bytes", self.compressed_bytes.get())
            .with("marshal_errors", self.marshal_errors.get())
            .with("compress_errors", self.compress_errors.get())
            .with("dropped", self.dropped.get())
    }
}

/// Size/age bounded JSON array compressor
pub struct Globber {
    name: String,
    sender: mpsc::Sender<Vec<u8>>,
    worker: JoinHandle<()>,
    metrics: Arc<GlobberMetrics>,
}

impl Globber {
    /// Validate `config` and start the worker; globs are sent to `output`
    pub fn new(
        name: impl Into<String>,
        config: &GlobberConfig,
        output: mpsc::Sender<Bytes>,
    ) -> Result<Self, WriterError> {
        let name = name.into();
        config.validate(&name)?;

        let (sender, receiver) = mpsc::channel(config.buffer_length);
        let metrics = Arc::new(GlobberMetrics::default());

        let worker = GlobberWorker {
            name: name.clone(),
            receiver,
            output,
            max_size: config.max_size,
            max_age: config.max_age,
            buffer: Vec::with_capacity(config.max_size.min(INITIAL_BUFFER_CAPACITY)),
            entries: 0,
            encoder: DeflateEncoder::new(vec![GLOB_VERSION], Compression::default()),
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

    /// Serialize `obj` and queue it, waiting while the queue is full
    pub async fn submit<T: Serialize + ?Sized>(&self, obj: &T) -> Result<(), WriterError> {
        let entry = serde_json::to_vec(obj).inspect_err(|_| {
            self.metrics.marshal_errors.inc();
        })?;
        self.sender
            .send(entry)
            .await
            .map_err(|_| WriterError::Closed)
    }

    /// Stop accepting, flush the partial glob and wait for the worker
    pub async fn close(self) -> Result<(), WriterError> {
        drop(self.sender);
        self.worker.await?;
        tracing::debug!(globber = %self.name, "globber closed");
        Ok(())
    }

    pub fn metrics(&self) -> &GlobberMetrics {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> GlobberMetricsHandle {
        GlobberMetricsHandle {
            name: self.name.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

struct GlobberWorker {
    name: String,
    receiver: mpsc::Receiver<Vec<u8>>,
    output: mpsc::Sender<Bytes>,
    max_size: usize,
    max_age: Duration,
    /// `[` plus comma-separated entries; the closing `]` is added on flush
    buffer: Vec<u8>,
    entries: usize,
    /// Output vec is pre-seeded with the version byte
    encoder: DeflateEncoder<Vec<u8>>,
    deadline: Option<Instant>,
    metrics: Arc<GlobberMetrics>,
}

impl GlobberWorker {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                entry = self.receiver.recv() => {
                    match entry {
                        Some(entry) => self.add(entry).await,
                        None => break,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush().await;
                }
            }
        }

        self.flush().await;
        tracing::debug!(globber = %self.name, "globber worker finished");
    }

    async fn add(&mut self, entry: Vec<u8>) {
        if self.entries > 0 && self.buffer.len() + entry.len() > self.max_size {
            self.flush().await;
        }

        if self.entries == 0 {
            self.buffer.push(b'[');
            self.deadline = Some(Instant::now() + self.max_age);
        } else {
            self.buffer.push(b',');
        }
        self.buffer.extend_from_slice(&entry);
        self.entries += 1;
    }

    async fn flush(&mut self) {
        self.deadline = None;
        if self.entries == 0 {
            return;
        }

        self.buffer.push(b']');
        let entries = std::mem::take(&mut self.entries);
        let uncompressed = self.buffer.len();
        let result = self.compress();
        self.buffer.clear();

        let glob = match result {
            Ok(glob) => glob,
            Err(e) => {
                self.metrics.compress_errors.inc();
                tracing::error!(globber = %self.name, error = %e, entries, "failed to compress glob");
                return;
            }
        };
        let compressed = glob.len();

        if self.output.send(Bytes::from(glob)).await.is_err() {
            self.metrics.dropped.inc();
            tracing::warn!(globber = %self.name, entries, "glob output closed, dropping glob");
            return;
        }

        self.metrics.globs.inc();
        self.metrics.entries.add(entries as u64);
        self.metrics.uncompressed_bytes.add(uncompressed as u64);
        self.metrics.compressed_bytes.add(compressed as u64);
    }

    /// Compress the buffer, returning `[version][deflate]` and leaving the
    /// encoder ready for the next glob
    fn compress(&mut self) -> io::Result<Vec<u8>> {
        if let Err(e) = self.encoder.write_all(&self.buffer) {
            // drop whatever was half-written so the next glob starts clean
            let _ = self.encoder.reset(vec![GLOB_VERSION]);
            return Err(e);
        }
        self.encoder.reset(vec![GLOB_VERSION])
    }
}

/// Metrics handle for [`Globber`]
pub struct GlobberMetricsHandle {
    name: String,
    metrics: Arc<GlobberMetrics>,
}

impl WriterMetricsProvider for GlobberMetricsHandle {
    fn writer_id(&self) -> &str {
        &self.name
    }

    fn writer_type(&self) -> &str {
        "globber"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Split a glob into its version byte and decompressed JSON array
///
/// Used by consumers of the stream and by tests.
pub fn decode_glob(glob: &[u8]) -> io::Result<(u8, Vec<u8>)> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    let (&version, body) = glob
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "empty glob"))?;
    let mut json = Vec::new();
    DeflateDecoder::new(body).read_to_end(&mut json)?;
    Ok((version, json))
}
