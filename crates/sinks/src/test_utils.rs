//! Recording doubles for writer, factory and reporter tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    FailMode, ReportResult, Reporter, WriteRequest, Writer, WriterError, WriterFactory,
};

/// What a mock writer answers to `rotate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotateOutcome {
    #[default]
    NotRotated,
    Rotated,
    Fail,
}

/// Everything the mock writers of one test did, in order
#[derive(Debug, Default)]
pub struct WriterLog {
    pub created: Vec<String>,
    /// (writer id, line)
    pub writes: Vec<(String, String)>,
    pub rotations: Vec<String>,
    pub closes: Vec<String>,
}

pub type SharedLog = Arc<Mutex<WriterLog>>;

#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub rotate: RotateOutcome,
    pub fail_writes: bool,
    pub fail_close: bool,
    /// Delay inside `close`, to observe concurrency
    pub close_delay: Duration,
}

pub struct MockWriter {
    id: String,
    log: SharedLog,
    behavior: MockBehavior,
}

impl MockWriter {
    pub fn new(id: impl Into<String>, log: SharedLog, behavior: MockBehavior) -> Self {
        Self {
            id: id.into(),
            log,
            behavior,
        }
    }
}

#[async_trait]
impl Writer for MockWriter {
    async fn write(&mut self, req: Arc<WriteRequest>) -> Result<(), WriterError> {
        if self.behavior.fail_writes {
            return Err(WriterError::Io(std::io::Error::other("disk full")));
        }
        self.log
            .lock()
            .writes
            .push((self.id.clone(), req.line.clone()));
        Ok(())
    }

    async fn rotate(&mut self) -> Result<bool, WriterError> {
        self.log.lock().rotations.push(self.id.clone());
        match self.behavior.rotate {
            RotateOutcome::NotRotated => Ok(false),
            RotateOutcome::Rotated => Ok(true),
            RotateOutcome::Fail => Err(WriterError::upload(&self.id, "rotate failed")),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), WriterError> {
        if !self.behavior.close_delay.is_zero() {
            tokio::time::sleep(self.behavior.close_delay).await;
        }
        self.log.lock().closes.push(self.id.clone());
        if self.behavior.fail_close {
            return Err(WriterError::upload(&self.id, "close failed"));
        }
        Ok(())
    }
}

/// Builds a [`MockWriter`] per category, all logging to one [`SharedLog`]
#[derive(Default)]
pub struct MockFactory {
    pub log: SharedLog,
    pub behavior: MockBehavior,
    pub fail_create: bool,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_create: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl WriterFactory for MockFactory {
    async fn create(&self, category: &str) -> Result<Box<dyn Writer>, WriterError> {
        if self.fail_create {
            return Err(WriterError::create(category, "spool directory missing"));
        }
        self.log.lock().created.push(category.to_string());
        Ok(Box::new(MockWriter::new(
            category,
            Arc::clone(&self.log),
            self.behavior.clone(),
        )))
    }
}

/// Collects every reported result
#[derive(Default)]
pub struct RecordingReporter {
    results: Mutex<Vec<ReportResult>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<ReportResult> {
        self.results.lock().clone()
    }

    /// (category, failure) per result, in report order
    pub fn outcomes(&self) -> Vec<(String, FailMode)> {
        self.results
            .lock()
            .iter()
            .map(|r| (r.category.clone(), r.failure))
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, result: ReportResult) {
        self.results.lock().push(result);
    }
}

pub fn request(category: &str, line: &str) -> Arc<WriteRequest> {
    Arc::new(WriteRequest::new(category, line))
}
