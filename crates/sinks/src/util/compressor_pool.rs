//! Lock-free pool of reusable deflate compressors
//!
//! A deflate encoder carries a few hundred KB of window and hash state.
//! Rotating file writers come and go with every rotation, so instead of
//! allocating that state per file they borrow an encoder from this pool and
//! hand it back when the file is finalized.
//!
//! Encoders are allocated on demand rather than up front; the pool only
//! bounds how many idle encoders are kept.
//!
//! # Example
//!
//! ```ignore
//! let pool = CompressorPool::new(64, Compression::default());
//!
//! let mut encoder = pool.acquire();
//! *encoder.get_mut() = FileSink::new(file);
//! encoder.write_all(b"line\n")?;
//! let sink = encoder.reset(FileSink::discard())?; // finishes the stream
//!
//! pool.release(encoder);
//! ```

use crossbeam::queue::ArrayQueue;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use spillway_metrics::{WriterMetricsProvider, WriterMetricsSnapshot};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Write buffer in front of each spool file
pub const FILE_BUFFER_SIZE: usize = 256 * 1024;

/// An encoder as stored in the pool
pub type PooledCompressor = DeflateEncoder<FileSink>;

/// Output side of a pooled encoder
///
/// Either a buffered spool file or a sink that discards everything, which
/// is what idle encoders point at. Counts the bytes it accepts so callers
/// can size a file without asking the filesystem.
#[derive(Debug)]
pub struct FileSink {
    file: Option<BufWriter<File>>,
    written: u64,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self {
            file: Some(BufWriter::with_capacity(FILE_BUFFER_SIZE, file)),
            written: 0,
        }
    }

    pub fn discard() -> Self {
        Self {
            file: None,
            written: 0,
        }
    }

    /// Bytes accepted so far (on disk after a flush)
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush buffered bytes and give back the file, if any
    pub fn into_file(self) -> io::Result<Option<File>> {
        match self.file {
            Some(buf) => buf.into_inner().map(Some).map_err(|e| e.into_error()),
            None => Ok(None),
        }
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => {
                let n = file.write(buf)?;
                self.written += n as u64;
                Ok(n)
            }
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Metrics for compressor pool monitoring
#[derive(Debug, Default)]
pub struct CompressorPoolMetrics {
    /// Encoder reused from the pool
    pub hits: AtomicU64,

    /// Encoder allocated because the pool was empty
    pub misses: AtomicU64,

    /// Encoder returned to the pool
    pub returns: AtomicU64,

    /// Encoder dropped (pool full or reset failed)
    pub drops: AtomicU64,
}

impl CompressorPoolMetrics {
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            1.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Bounded pool of idle deflate encoders
pub struct CompressorPool {
    queue: ArrayQueue<PooledCompressor>,
    level: Compression,
    metrics: Arc<CompressorPoolMetrics>,
}

impl CompressorPool {
    /// Create a pool keeping at most `pool_size` idle encoders
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is zero (rejected by config validation).
    pub fn new(pool_size: usize, level: Compression) -> Self {
        Self {
            queue: ArrayQueue::new(pool_size),
            level,
            metrics: Arc::new(CompressorPoolMetrics::new()),
        }
    }

    /// Take an idle encoder or allocate one
    ///
    /// The encoder starts a fresh stream and points at a discarding sink.
    #[inline]
    pub fn acquire(&self) -> PooledCompressor {
        match self.queue.pop() {
            Some(encoder) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                encoder
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                DeflateEncoder::new(FileSink::discard(), self.level)
            }
        }
    }

    /// Reset an encoder and keep it for reuse if there is room
    ///
    /// Anything still buffered in the encoder is discarded along with the
    /// sink it points at.
    pub fn release(&self, mut encoder: PooledCompressor) {
        if encoder.reset(FileSink::discard()).is_err() {
            self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.queue.push(encoder) {
            Ok(()) => {
                self.metrics.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Idle encoders currently pooled
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[inline]
    pub fn metrics(&self) -> &CompressorPoolMetrics {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> CompressorPoolMetricsHandle {
        CompressorPoolMetricsHandle {
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Metrics handle for [`CompressorPool`]
pub struct CompressorPoolMetricsHandle {
    metrics: Arc<CompressorPoolMetrics>,
}

impl WriterMetricsProvider for CompressorPoolMetricsHandle {
    fn writer_id(&self) -> &str {
        "compressors"
    }

    fn writer_type(&self) -> &str {
        "compressor_pool"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        let m = &self.metrics;
        WriterMetricsSnapshot::new()
            .with("hits", m.hits.load(Ordering::Relaxed))
            .with("misses", m.misses.load(Ordering::Relaxed))
            .with("returns", m.returns.load(Ordering::Relaxed))
            .with("drops", m.drops.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
#[path = "compressor_pool_test.rs"]
mod compressor_pool_test;
