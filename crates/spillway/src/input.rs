//! Newline-delimited JSON write requests
//!
//! One object per line:
//!
//! ```json
//! {"category": "video_play", "line": "...", "record": {"time": "1700000000"}}
//! {"category": "login", "line": "...", "failure": "non_tracking_event"}
//! ```
//!
//! Only `category` and `line` are required. Blank lines are skipped.

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use spillway_sinks::{FailMode, WriteRequest};
use std::collections::HashMap;

/// Wire form of a [`WriteRequest`]
#[derive(Debug, Deserialize)]
pub struct RequestLine {
    pub category: String,
    pub line: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub failure: FailMode,
    #[serde(default)]
    pub record: HashMap<String, String>,
    /// Raw upstream payload
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl RequestLine {
    pub fn into_request(self) -> WriteRequest {
        let mut req = WriteRequest::new(self.category, self.line)
            .with_failure(self.failure)
            .with_record(self.record);
        if let Some(uuid) = self.uuid {
            req = req.with_uuid(uuid);
        }
        if let Some(source) = self.source {
            req = req.with_source(Bytes::from(source));
        }
        if let Some(started_at) = self.started_at {
            req = req.with_started_at(started_at);
        }
        req
    }
}

/// Parse one input line; `None` for blank lines
pub fn parse_line(line: &str) -> Result<Option<WriteRequest>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: RequestLine = serde_json::from_str(line).context("invalid request line")?;
    Ok(Some(parsed.into_request()))
}
