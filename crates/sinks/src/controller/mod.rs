//! Writer controller - routes requests to per-category managers
//!
//! ```text
//!                          +--> [manager: video] --> writer
//! write(req) --> route ----+--> [manager: login] --> writer
//!                  |       +--> (cold category) --> [creation queue] --> creator task
//!                  |
//!                  +-- NonTrackingEvent --> [non-tracked manager]
//!                  +-- other failures ----> Reporter
//! ```
//!
//! Managers are created on first sight of a category by a dedicated creator
//! task, so a cold category costs the caller one queue send. While requests
//! for a category are waiting in the creation queue, later requests for it
//! queue behind them, which keeps per-category order.
//!
//! The registry is the only lock in the write path and is never held
//! across an await.

use async_trait::async_trait;
use parking_lot::RwLock;
use spillway_config::ControllerConfig;
use spillway_metrics::{Counter, WriterMetricsProvider, WriterMetricsSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    FailMode, ReportResult, Reporter, WriteRequest, Writer, WriterError, WriterFactory,
    WriterManager,
};

/// Counters for the controller
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    /// Requests handed to a category manager
    pub routed: Counter,
    pub non_tracked: Counter,
    /// Requests reported without being written
    pub reported_failures: Counter,
    pub managers_created: Counter,
}

impl ControllerMetrics {
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot::new()
            .with("routed", self.routed.get())
            .with("non_tracked", self.non_tracked.get())
            .with("reported_failures", self.reported_failures.get())
            .with("managers_created", self.managers_created.get())
    }
}

#[derive(Default)]
struct Registration {
    manager: Option<WriterManager>,
    /// Requests for this category still in the creation queue
    queued: usize,
}

type Registry = Arc<RwLock<HashMap<String, Registration>>>;

/// Top-level writer: category routing, non-tracked writes and reporting
pub struct WriterController {
    registry: Registry,
    creation_tx: mpsc::Sender<Arc<WriteRequest>>,
    creator: JoinHandle<()>,
    non_tracked: WriterManager,
    reporter: Arc<dyn Reporter>,
    metrics: Arc<ControllerMetrics>,
}

impl WriterController {
    /// Start the creator task and the non-tracked manager
    ///
    /// `factory` builds per-category writers; `non_tracked_factory` builds
    /// the single writer for `non_tracked_category`.
    pub fn new(
        config: &ControllerConfig,
        factory: Arc<dyn WriterFactory>,
        non_tracked_factory: Arc<dyn WriterFactory>,
        non_tracked_category: impl Into<String>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let manager_queue_size = config.manager_queue_size.max(1);
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let metrics = Arc::new(ControllerMetrics::default());

        let non_tracked = WriterManager::new(
            non_tracked_category,
            non_tracked_factory,
            Arc::clone(&reporter),
            manager_queue_size,
        );

        let (creation_tx, creation_rx) = mpsc::channel(config.creation_queue_size.max(1));
        let creator = Creator {
            rx: creation_rx,
            registry: Arc::clone(&registry),
            factory,
            reporter: Arc::clone(&reporter),
            manager_queue_size,
            metrics: Arc::clone(&metrics),
        };
        let creator = tokio::spawn(creator.run());

        Self {
            registry,
            creation_tx,
            creator,
            non_tracked,
            reporter,
            metrics,
        }
    }

    /// Categories seen so far, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.registry.read().keys().cloned().collect();
        categories.sort();
        categories
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> ControllerMetricsHandle {
        ControllerMetricsHandle {
            metrics: Arc::clone(&self.metrics),
        }
    }

    async fn route(&self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        let warm = self
            .registry
            .read()
            .get(&req.category)
            .filter(|r| r.queued == 0)
            .and_then(|r| r.manager.clone());
        if let Some(manager) = warm {
            manager.write(req).await?;
            self.metrics.routed.inc();
            return Ok(());
        }

        // cold category, or requests still queued for it: decide again under
        // the write lock
        let direct = {
            let mut registry = self.registry.write();
            let registration = registry.entry(req.category.clone()).or_default();
            match &registration.manager {
                Some(manager) if registration.queued == 0 => Some(manager.clone()),
                _ => {
                    registration.queued += 1;
                    None
                }
            }
        };

        if let Some(manager) = direct {
            manager.write(req).await?;
            self.metrics.routed.inc();
            return Ok(());
        }

        let category = req.category.clone();
        if self.creation_tx.send(req).await.is_err() {
            dequeue(&self.registry, &category);
            return Err(WriterError::Closed);
        }
        self.metrics.routed.inc();
        Ok(())
    }

    fn managers(&self) -> Vec<WriterManager> {
        self.registry
            .read()
            .values()
            .filter_map(|r| r.manager.clone())
            .collect()
    }
}

#[async_trait]
impl Writer for WriterController {
    async fn write(&mut self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        match req.failure {
            FailMode::None | FailMode::SkippedColumn => self.route(req).await,
            FailMode::NonTrackingEvent => {
                self.non_tracked.write(req).await?;
                self.metrics.non_tracked.inc();
                Ok(())
            }
            _ => {
                self.metrics.reported_failures.inc();
                self.reporter.report(ReportResult::from_request(&req));
                Ok(())
            }
        }
    }

    /// Rotate every manager, then the non-tracked one; stops at the first
    /// error
    async fn rotate(&mut self) -> Result<bool, WriterError> {
        let mut fully_rotated = true;
        for manager in self.managers() {
            fully_rotated &= manager.rotate().await?;
        }
        fully_rotated &= self.non_tracked.rotate().await?;
        Ok(fully_rotated)
    }

    /// Drain the creation queue, then close every manager and the
    /// non-tracked one; returns the first error and logs the rest
    async fn close(self: Box<Self>) -> Result<(), WriterError> {
        let Self {
            registry,
            creation_tx,
            creator,
            non_tracked,
            ..
        } = *self;

        drop(creation_tx);
        if let Err(e) = creator.await {
            tracing::error!(error = %e, "writer creator task failed");
        }

        let mut managers: Vec<(String, WriterManager)> = registry
            .write()
            .drain()
            .filter_map(|(category, r)| r.manager.map(|m| (category, m)))
            .collect();
        managers.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::info!(managers = managers.len(), "closing writer managers");

        let mut first_error = None;
        let closes = managers
            .iter()
            .map(|(_, m)| m)
            .chain(std::iter::once(&non_tracked));
        for manager in closes {
            if let Err(e) = manager.close().await {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    tracing::error!(category = %manager.category(), error = %e, "failed to close writer");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn dequeue(registry: &Registry, category: &str) {
    if let Some(registration) = registry.write().get_mut(category) {
        registration.queued = registration.queued.saturating_sub(1);
    }
}

/// Owns manager creation; one request at a time, in arrival order
struct Creator {
    rx: mpsc::Receiver<Arc<WriteRequest>>,
    registry: Registry,
    factory: Arc<dyn WriterFactory>,
    reporter: Arc<dyn Reporter>,
    manager_queue_size: usize,
    metrics: Arc<ControllerMetrics>,
}

impl Creator {
    async fn run(mut self) {
        while let Some(req) = self.rx.recv().await {
            let manager = self.manager_for(&req.category);
            if let Err(e) = manager.write(Arc::clone(&req)).await {
                tracing::warn!(category = %req.category, error = %e, "manager rejected queued request");
                self.reporter
                    .report(ReportResult::with_failure(&req, FailMode::FailedWrite));
            }
            dequeue(&self.registry, &req.category);
        }
        tracing::debug!("writer creator finished");
    }

    fn manager_for(&self, category: &str) -> WriterManager {
        let mut registry = self.registry.write();
        let registration = registry.entry(category.to_string()).or_default();
        registration
            .manager
            .get_or_insert_with(|| {
                self.metrics.managers_created.inc();
                tracing::info!(category = %category, "creating writer manager");
                WriterManager::new(
                    category,
                    Arc::clone(&self.factory),
                    Arc::clone(&self.reporter),
                    self.manager_queue_size,
                )
            })
            .clone()
    }
}

/// Metrics handle for [`WriterController`]
pub struct ControllerMetricsHandle {
    metrics: Arc<ControllerMetrics>,
}

impl WriterMetricsProvider for ControllerMetricsHandle {
    fn writer_id(&self) -> &str {
        "controller"
    }

    fn writer_type(&self) -> &str {
        "controller"
    }

    fn snapshot(&self) -> WriterMetricsSnapshot {
        self.metrics.snapshot()
    }
}
