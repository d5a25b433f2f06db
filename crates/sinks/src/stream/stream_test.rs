use super::*;
use crate::FailMode;
use crate::globber::decode_glob;
use parking_lot::Mutex;
use serde_json::{Value, json};
use spillway_config::{BatcherConfig, EventConfig, GlobberConfig, UNBOUNDED_ENTRIES};
use std::collections::VecDeque;

// =============================================================================
// Test helpers
// =============================================================================

type PutResponse = Result<Vec<PutRecordResult>, BulkPutError>;

/// Replays scripted responses and records every call; once the script runs
/// out, accepts everything
#[derive(Default)]
struct ScriptedClient {
    script: Mutex<VecDeque<PutResponse>>,
    calls: Mutex<Vec<Vec<PutRecordEntry>>>,
    latency: Duration,
}

impl ScriptedClient {
    fn new(script: Vec<PutResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Default::default()
        })
    }

    fn calls(&self) -> Vec<Vec<PutRecordEntry>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BulkPutClient for ScriptedClient {
    async fn put_records(
        &self,
        _stream: &str,
        records: &[PutRecordEntry],
    ) -> Result<Vec<PutRecordResult>, BulkPutError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.calls.lock().push(records.to_vec());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![PutRecordResult::Ok; records.len()]))
    }
}

/// Every event becomes its own glob (globber MaxSize 1); all globs land in a
/// single batch that is flushed on close
fn config(category: &str, filter: &str, fields: &[&str]) -> StreamWriterConfig {
    StreamWriterConfig {
        stream_name: "downstream".into(),
        buffer_size: 16,
        max_attempts_per_record: 5,
        retry_delay: Duration::from_millis(100),
        events: HashMap::from([(
            category.to_string(),
            EventConfig {
                filter: filter.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        )]),
        globber: GlobberConfig {
            max_size: 1,
            max_age: Duration::from_secs(60),
            buffer_length: 16,
        },
        batcher: BatcherConfig {
            max_size: 1 << 20,
            max_entries: UNBOUNDED_ENTRIES,
            max_age: Duration::from_secs(60),
            buffer_length: 16,
        },
    }
}

fn event(category: &str, n: usize) -> Arc<WriteRequest> {
    Arc::new(
        WriteRequest::new(category, format!("line {}", n)).with_field("n", n.to_string()),
    )
}

fn decode_entry(entry: &PutRecordEntry) -> Vec<Value> {
    let record: StreamRecord = serde_json::from_slice(&entry.data).unwrap();
    assert_eq!(record.uuid, entry.partition_key);
    assert_eq!(record.version, STREAM_RECORD_VERSION);
    let (_, json) = decode_glob(&record.data).unwrap();
    serde_json::from_slice(&json).unwrap()
}

fn keys(entries: &[PutRecordEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.partition_key.as_str()).collect()
}

async fn write_all(writer: &mut StreamWriter, category: &str, count: usize) {
    for n in 0..count {
        writer.write(event(category, n)).await.unwrap();
    }
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_rejects_invalid_config() {
    let mut cfg = config("a", "", &["n"]);
    cfg.max_attempts_per_record = 0;
    let result = StreamWriter::new(cfg, Arc::new(NullBulkPutClient), &EventFilters::new());
    assert!(matches!(result, Err(WriterError::Config(_))));
}

#[tokio::test]
async fn test_unknown_filter_fails_construction() {
    let cfg = config("a", "no-such-filter", &["n"]);
    let result = StreamWriter::new(cfg, Arc::new(NullBulkPutClient), &EventFilters::new());
    assert!(matches!(result, Err(WriterError::Config(_))));
}

// =============================================================================
// Projection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_projects_allowed_fields_and_fills_missing() {
    let client = ScriptedClient::new(vec![]);
    let cfg = config("video-play", "", &["channel", "time", "user"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();

    let req = WriteRequest::new("video-play", "raw")
        .with_field("channel", "c1")
        .with_field("time", "1700000000")
        .with_field("secret", "not forwarded");
    writer.write(Arc::new(req)).await.unwrap();
    Box::new(writer).close().await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(
        decode_entry(&calls[0][0]),
        vec![json!({"channel": "c1", "time": "1700000000", "user": ""})]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unconfigured_category_dropped() {
    let client = ScriptedClient::new(vec![]);
    let cfg = config("a", "", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "b", 3).await;
    Box::new(writer).close().await.unwrap();

    assert!(client.calls().is_empty());
    let stream = handles[0].snapshot();
    assert_eq!(stream.get("events_received"), Some(3));
    assert_eq!(stream.get("events_unconfigured"), Some(3));
    assert_eq!(stream.get("events_globbed"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_failed_requests_never_streamed() {
    let client = ScriptedClient::new(vec![]);
    let cfg = config("a", "", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    for failure in [
        FailMode::UnableToParseData,
        FailMode::NonTrackingEvent,
        FailMode::EmptyRequest,
        FailMode::BadColumnConversion,
    ] {
        let req = WriteRequest::new("a", "bad")
            .with_field("n", "x")
            .with_failure(failure);
        writer.write(Arc::new(req)).await.unwrap();
    }
    Box::new(writer).close().await.unwrap();

    assert!(client.calls().is_empty());
    let stream = handles[0].snapshot();
    assert_eq!(stream.get("events_received"), Some(4));
    assert_eq!(stream.get("events_not_writable"), Some(4));
    assert_eq!(stream.get("events_globbed"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_skipped_column_still_streamed() {
    let client = ScriptedClient::new(vec![]);
    let cfg = config("a", "", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();

    let req = WriteRequest::new("a", "partial")
        .with_field("n", "7")
        .with_failure(FailMode::SkippedColumn);
    writer.write(Arc::new(req)).await.unwrap();
    Box::new(writer).close().await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(decode_entry(&calls[0][0]), vec![json!({"n": "7"})]);
}

#[tokio::test(start_paused = true)]
async fn test_filter_drops_rejected_events() {
    let client = ScriptedClient::new(vec![]);
    let filters = EventFilters::new().with("even", |req: &WriteRequest| {
        req.record
            .get("n")
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| n % 2 == 0)
    });
    let cfg = config("a", "even", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &filters).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "a", 4).await;
    Box::new(writer).close().await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    let events: Vec<Value> = calls[0].iter().flat_map(decode_entry).collect();
    assert_eq!(events, vec![json!({"n": "0"}), json!({"n": "2"})]);
    assert_eq!(handles[0].snapshot().get("events_filtered"), Some(2));
}

// =============================================================================
// Bulk put retry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_partial_failure_retries_only_failed_records() {
    let client = ScriptedClient::new(vec![
        Ok(vec![
            PutRecordResult::Ok,
            PutRecordResult::failed(ERR_THROUGHPUT_EXCEEDED, "slow down"),
            PutRecordResult::failed(ERR_INTERNAL_FAILURE, "oops"),
        ]),
        Ok(vec![
            PutRecordResult::Ok,
            PutRecordResult::failed("SomethingElse", "?"),
        ]),
        Ok(vec![PutRecordResult::Ok]),
    ]);
    let cfg = config("a", "", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "a", 3).await;
    Box::new(writer).close().await.unwrap();

    let calls = client.calls();
    assert_eq!(
        calls.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );
    // failed records are resent unchanged, in their original order
    assert_eq!(keys(&calls[1]), keys(&calls[0][1..]));
    assert_eq!(keys(&calls[2]), keys(&calls[1][1..]));
    assert_eq!(calls[2][0], calls[0][2]);

    let stream = handles[0].snapshot();
    assert_eq!(stream.get("batches_sent"), Some(1));
    assert_eq!(stream.get("records_succeeded"), Some(3));
    assert_eq!(stream.get("throughput_exceeded"), Some(1));
    assert_eq!(stream.get("internal_failure"), Some(1));
    assert_eq!(stream.get("unknown_failure"), Some(1));
    assert_eq!(stream.get("put_errors"), Some(0));
    assert_eq!(stream.get("dropped"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_retries_whole_batch_after_delay() {
    let client = ScriptedClient::new(vec![Err(BulkPutError::Transport(
        "connection reset".into(),
    ))]);
    let cfg = config("a", "", &["n"]);
    let retry_delay = cfg.retry_delay;
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "a", 2).await;
    let start = tokio::time::Instant::now();
    Box::new(writer).close().await.unwrap();
    assert!(start.elapsed() >= retry_delay);

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);

    let stream = handles[0].snapshot();
    assert_eq!(stream.get("put_errors"), Some(1));
    assert_eq!(stream.get("records_succeeded"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_length_mismatch_treated_as_failed_call() {
    let client = ScriptedClient::new(vec![Ok(vec![PutRecordResult::Ok])]);
    let cfg = config("a", "", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "a", 2).await;
    Box::new(writer).close().await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].len(), 2);

    let stream = handles[0].snapshot();
    assert_eq!(stream.get("put_errors"), Some(1));
    assert_eq!(stream.get("records_succeeded"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_drops_leftovers() {
    let throttled = || Ok(vec![PutRecordResult::failed(ERR_THROUGHPUT_EXCEEDED, "")]);
    let client = ScriptedClient::new(vec![throttled(), throttled()]);
    let mut cfg = config("a", "", &["n"]);
    cfg.max_attempts_per_record = 2;
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "a", 1).await;
    Box::new(writer).close().await.unwrap();

    assert_eq!(client.calls().len(), 2);
    let stream = handles[0].snapshot();
    assert_eq!(stream.get("throughput_exceeded"), Some(2));
    assert_eq!(stream.get("records_succeeded"), Some(0));
    assert_eq!(stream.get("dropped"), Some(1));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_waits_for_in_flight_sends() {
    let client = ScriptedClient::slow(Duration::from_secs(5));
    let cfg = config("a", "", &["n"]);
    let mut writer = StreamWriter::new(cfg, client.clone(), &EventFilters::new()).unwrap();
    let handles = writer.metrics_handles();

    write_all(&mut writer, "a", 4).await;
    Box::new(writer).close().await.unwrap();

    assert_eq!(client.calls().len(), 1);
    assert_eq!(handles[0].snapshot().get("records_succeeded"), Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_rotate_is_noop() {
    let cfg = config("a", "", &["n"]);
    let mut writer =
        StreamWriter::new(cfg, Arc::new(NullBulkPutClient), &EventFilters::new()).unwrap();

    writer.write(event("a", 0)).await.unwrap();
    assert!(!writer.rotate().await.unwrap());
    assert!(!writer.rotate().await.unwrap());
    Box::new(writer).close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_metrics_handles_cover_pipeline() {
    let cfg = config("a", "", &["n"]);
    let writer =
        StreamWriter::new(cfg, Arc::new(NullBulkPutClient), &EventFilters::new()).unwrap();

    let types: Vec<String> = writer
        .metrics_handles()
        .iter()
        .map(|h| h.writer_type().to_string())
        .collect();
    assert_eq!(types, vec!["stream", "globber", "batcher"]);
    assert_eq!(writer.stream_name(), "downstream");
    Box::new(writer).close().await.unwrap();
}
