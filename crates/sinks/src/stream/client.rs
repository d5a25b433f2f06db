//! Bulk-put client seam
//!
//! The stream writer only needs one call: put a list of records into a
//! named stream and learn, per record, whether it was accepted. Anything that
//! can do that (a Kinesis client, a test double) implements
//! [`BulkPutClient`].

use crate::BulkPutError;
use async_trait::async_trait;
use bytes::Bytes;

/// Error code returned when a shard is over its write limit
pub const ERR_THROUGHPUT_EXCEEDED: &str = "ProvisionedThroughputExceededException";

/// Error code returned for service-side failures
pub const ERR_INTERNAL_FAILURE: &str = "InternalFailure";

/// One record in a bulk put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordEntry {
    pub partition_key: String,
    pub data: Bytes,
}

/// Outcome of one record within a successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutRecordResult {
    Ok,
    Failed {
        error_code: String,
        error_message: String,
    },
}

impl PutRecordResult {
    pub fn failed(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::Failed {
            error_code: error_code.into(),
            error_message: error_message.into(),
        }
    }
}

/// Classification of a per-record failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFailure {
    ThroughputExceeded,
    InternalFailure,
    Unknown,
}

impl RecordFailure {
    pub fn classify(error_code: &str) -> Self {
        match error_code {
            ERR_THROUGHPUT_EXCEEDED => Self::ThroughputExceeded,
            ERR_INTERNAL_FAILURE => Self::InternalFailure,
            _ => Self::Unknown,
        }
    }
}

/// A streaming bulk-ingestion service
#[async_trait]
pub trait BulkPutClient: Send + Sync {
    /// Put `records` into `stream`
    ///
    /// On `Ok`, the result has one entry per record, in request order.
    async fn put_records(
        &self,
        stream: &str,
        records: &[PutRecordEntry],
    ) -> Result<Vec<PutRecordResult>, BulkPutError>;
}

/// Accepts every record without sending it anywhere
///
/// For development and benchmarking without a streaming service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBulkPutClient;

#[async_trait]
impl BulkPutClient for NullBulkPutClient {
    async fn put_records(
        &self,
        stream: &str,
        records: &[PutRecordEntry],
    ) -> Result<Vec<PutRecordResult>, BulkPutError> {
        tracing::trace!(stream, records = records.len(), "null bulk put");
        Ok(vec![PutRecordResult::Ok; records.len()])
    }
}
