//! Terminal outcome reporting
//!
//! Every request that enters the controller is reported exactly once:
//! when its manager delivers it, when delivery fails, or immediately for
//! requests that are never written.

use crate::{FailMode, ReportResult};
use spillway_metrics::{Counter, WriterMetricsProvider, WriterMetricsSnapshot};
use std::sync::Arc;

/// Receives one [`ReportResult`] per request
pub trait Reporter: Send + Sync {
    fn report(&self, result: ReportResult);
}

/// Reporter that logs outcomes and counts them per failure mode
///
/// Successes are logged at trace, everything else at warn.
#[derive(Default)]
pub struct TracingReporter {
    counts: Arc<[Counter; FailMode::COUNT]>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of results reported with `failure`
    pub fn count(&self, failure: FailMode) -> u64 {
        self.counts[failure.index()].get()
    }

    pub fn metrics_handle(&self) -> TracingReporterMetricsHandle {
        TracingReporterMetricsHandle {
            counts: Arc::clone(&self.counts),
        }
    }
}

impl Reporter for TracingReporter {
    fn report(&self, result: ReportResult) {
        self.counts[result.failure.index()].inc();

        if result.failure.is_writable() {
            tracing::trace!(
                uuid = %result.uuid,
                category = %result.category,
                failure = %result.failure,
                "request written"
            );
        } else if result.failure == FailMode::NonTrackingEvent {
            tracing::debug!(
                uuid = %result.uuid,
                category = %result.category,
                "non-tracked request written"
            );
        } else {
            let elapsed_ms = (result.finished_at - result.started_at).num_milliseconds();
            tracing::warn!(
                uuid = %result.uuid,
                category = %result.category,
                failure = %result.failure,
                elapsed_ms,
                "request not written"
            );
        }
    }
}

/// Metrics handle for [`TracingReporter`]
pub struct TracingReporterMetricsHandle {
    counts: Arc<[Counter; FailMode::COUNT]>,
}

impl WriterMetricsProvider for TracingReporterMetricsHandle {
    fn writer_id(&self) -> &str {
        "reporter"
    }

    fn writer_type(&self) -> &str {
        "reporter"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        FailMode::ALL
            .iter()
            .fold(WriterMetricsSnapshot::new(), |snapshot, mode| {
                snapshot.with(mode.as_str(), self.counts[mode.index()].get())
            })
    }
}
