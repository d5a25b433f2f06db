//! Periodic metrics reporter
//!
//! Collects snapshots from every registered writer and logs them via
//! tracing at the configured interval. It runs as an async task until its
//! cancellation token fires.

use crate::{WriterMetricsProvider, WriterMetricsSnapshot};
use spillway_config::MetricsConfig;
use std::sync::Arc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Logs every provider's counters at a fixed interval
pub struct MetricsReporter {
    config: MetricsConfig,
    providers: Vec<Arc<dyn WriterMetricsProvider>>,
    previous: Vec<Option<WriterMetricsSnapshot>>,
}

impl MetricsReporter {
    pub fn new(config: MetricsConfig, providers: Vec<Arc<dyn WriterMetricsProvider>>) -> Self {
        let previous = vec![None; providers.len()];
        Self {
            config,
            providers,
            previous,
        }
    }

    /// Register another provider
    pub fn add(&mut self, provider: Arc<dyn WriterMetricsProvider>) {
        self.providers.push(provider);
        self.previous.push(None);
    }

    /// Run the reporter until cancellation
    ///
    /// A final report is logged on cancellation so shutdown totals are
    /// never lost.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("metrics reporting disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // first tick completes immediately
        ticker.tick().await;

        info!(
            interval_secs = self.config.interval.as_secs(),
            writers = self.providers.len(),
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.report();
                    info!("metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Log one line per provider
    fn report(&mut self) {
        for (provider, previous) in self.providers.iter().zip(self.previous.iter_mut()) {
            let snapshot = provider.snapshot();
            info!(
                writer_id = provider.writer_id(),
                writer_type = provider.writer_type(),
                "{}",
                snapshot.format(previous.as_ref())
            );
            *previous = Some(snapshot);
        }
    }
}
