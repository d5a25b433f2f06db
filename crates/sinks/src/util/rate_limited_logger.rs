//! Rate-limited logging for hot-path failures
//!
//! A full disk or a throttled stream can fail thousands of writes per
//! second. Each call site owns one `RateLimitedLogger`; it emits at most one
//! line per interval and reports how many occurrences it swallowed since the
//! previous line.
//!
//! # Example
//!
//! ```ignore
//! use spillway_sinks::util::RateLimitedLogger;
//! use std::time::Duration;
//!
//! let logger = RateLimitedLogger::new("write failed", Duration::from_secs(10));
//!
//! for _ in 0..1000 {
//!     logger.error(&io_error); // logs once
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between emitted lines
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Longest request line included in a log message
pub const MAX_DATA_LOG_LENGTH: usize = 256;

/// Logs one message at most once per interval
pub struct RateLimitedLogger {
    message: &'static str,
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    /// Occurrences since the last emitted line
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(message: &'static str, min_interval: Duration) -> Self {
        Self {
            message,
            min_interval,
            last_log_time: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Logger with the default interval
    pub fn with_default_interval(message: &'static str) -> Self {
        Self::new(message, DEFAULT_LOG_INTERVAL)
    }

    /// Count an occurrence; returns how many were suppressed before it when
    /// this one should be logged
    fn record(&self) -> Option<u64> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut last = self.last_log_time.lock();
        let now = Instant::now();
        let due = last.is_none_or(|t| now.duration_since(t) >= self.min_interval);
        if !due {
            return None;
        }
        *last = Some(now);
        drop(last);

        Some(self.pending.swap(0, Ordering::Relaxed).saturating_sub(1))
    }

    /// Record an error; returns true if it was logged
    pub fn error(&self, error: &dyn std::fmt::Display) -> bool {
        let Some(suppressed) = self.record() else {
            return false;
        };
        tracing::error!(
            error = %error,
            suppressed,
            total = self.total.load(Ordering::Relaxed),
            "{}",
            self.message
        );
        true
    }

    /// Record an error for a specific category, including (a prefix of)
    /// the offending line
    pub fn error_with_data(
        &self,
        category: &str,
        error: &dyn std::fmt::Display,
        data: &[u8],
    ) -> bool {
        let Some(suppressed) = self.record() else {
            return false;
        };
        tracing::error!(
            category = %category,
            error = %error,
            data = %truncate(data),
            suppressed,
            total = self.total.load(Ordering::Relaxed),
            "{}",
            self.message
        );
        true
    }

    /// Record a non-fatal condition (e.g. dropped records); returns true if
    /// it was logged
    pub fn warn(&self, detail: &dyn std::fmt::Display) -> bool {
        let Some(suppressed) = self.record() else {
            return false;
        };
        tracing::warn!(
            detail = %detail,
            suppressed,
            total = self.total.load(Ordering::Relaxed),
            "{}",
            self.message
        );
        true
    }

    /// Occurrences not yet covered by an emitted line
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

fn truncate(data: &[u8]) -> String {
    if data.len() > MAX_DATA_LOG_LENGTH {
        format!(
            "{}... ({} bytes)",
            String::from_utf8_lossy(&data[..MAX_DATA_LOG_LENGTH]),
            data.len()
        )
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}
