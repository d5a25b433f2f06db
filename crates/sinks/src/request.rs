//! Write requests and their outcomes

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// Why (or whether) a request failed upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    #[default]
    None,
    /// Some columns were dropped but the event is still written
    SkippedColumn,
    /// Written to the shared non-tracked file, never to a category file
    NonTrackingEvent,
    UnableToParseData,
    BadColumnConversion,
    EmptyRequest,
    /// Set by the writers when a local write fails
    FailedWrite,
}

impl FailMode {
    pub const COUNT: usize = 7;

    pub const ALL: [FailMode; Self::COUNT] = [
        FailMode::None,
        FailMode::SkippedColumn,
        FailMode::NonTrackingEvent,
        FailMode::UnableToParseData,
        FailMode::BadColumnConversion,
        FailMode::EmptyRequest,
        FailMode::FailedWrite,
    ];

    /// True for requests that go to a per-category writer
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::None | Self::SkippedColumn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SkippedColumn => "skipped_column",
            Self::NonTrackingEvent => "non_tracking_event",
            Self::UnableToParseData => "unable_to_parse_data",
            Self::BadColumnConversion => "bad_column_conversion",
            Self::EmptyRequest => "empty_request",
            Self::FailedWrite => "failed_write",
        }
    }

    /// Position in [`FailMode::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for FailMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transformed event on its way to the writers
///
/// Immutable once built; shared as `Arc<WriteRequest>` when fanned out.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub category: String,
    /// Serialized line appended to the category file
    pub line: String,
    pub uuid: String,
    /// Raw upstream payload, kept for diagnostics
    pub source: Bytes,
    pub failure: FailMode,
    pub started_at: DateTime<Utc>,
    /// Column name to value, projected by stream writers
    pub record: HashMap<String, String>,
}

impl WriteRequest {
    /// Build a request with a fresh uuid, stamped now
    pub fn new(category: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            line: line.into(),
            uuid: uuid::Uuid::new_v4().to_string(),
            source: Bytes::new(),
            failure: FailMode::None,
            started_at: Utc::now(),
            record: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_failure(mut self, failure: FailMode) -> Self {
        self.failure = failure;
        self
    }

    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Bytes) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    #[must_use]
    pub fn with_record(mut self, record: HashMap<String, String>) -> Self {
        self.record = record;
        self
    }

    /// Add a single column to the record
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.insert(name.into(), value.into());
        self
    }
}

/// Terminal outcome of a request, handed to the [`Reporter`](crate::Reporter)
#[derive(Debug, Clone, PartialEq)]
pub struct ReportResult {
    pub uuid: String,
    pub category: String,
    pub failure: FailMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReportResult {
    /// Outcome carrying the request's own failure mode
    pub fn from_request(req: &WriteRequest) -> Self {
        Self::with_failure(req, req.failure)
    }

    /// Outcome with an overridden failure mode
    pub fn with_failure(req: &WriteRequest, failure: FailMode) -> Self {
        Self {
            uuid: req.uuid.clone(),
            category: req.category.clone(),
            failure,
            started_at: req.started_at,
            finished_at: Utc::now(),
        }
    }
}
