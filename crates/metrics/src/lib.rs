//! Spillway - Metrics
//!
//! Writer metrics collection and periodic reporting.
//!
//! # Overview
//!
//! This crate provides:
//! - An atomic `Counter` used by every writer for lock-free counting
//! - The `WriterMetricsProvider` trait writers expose their counters through
//! - `MetricsReporter`, which logs every provider at a configured interval
//!
//! # Metrics Handle Pattern
//!
//! Writers keep their counters in an `Arc<Metrics>` and hand out a
//! lightweight handle implementing `WriterMetricsProvider`. The handle
//! remains valid after the writer is moved into a manager or closed.
//!
//! ```text
//! Writer (owns Arc<Metrics>)
//!     │
//!     ├──► metrics_handle() → Handle (clones Arc, implements Provider trait)
//!     │
//!     └──► moved into Multee / controller, Arc keeps metrics alive
//! ```
//!
//! # Example
//!
//! ```ignore
//! use spillway_metrics::{MetricsReporter, WriterMetricsProvider};
//! use std::sync::Arc;
//!
//! let handle: Arc<dyn WriterMetricsProvider> = Arc::new(stream.metrics_handle());
//! let reporter = MetricsReporter::new(config.metrics.clone(), vec![handle]);
//! tokio::spawn(reporter.run(cancel.clone()));
//! ```

mod reporter;
mod traits;

pub use reporter::MetricsReporter;
pub use traits::{WriterMetricsProvider, WriterMetricsSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter wrapper for convenient metric operations
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Create a new counter initialized to 0
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increment the counter by `val` (relaxed ordering for performance)
    #[inline]
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Increment the counter by 1
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Get the current value (relaxed ordering)
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(41);
        assert_eq!(counter.get(), 42);
    }
}
