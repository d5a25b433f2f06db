use super::*;
use crate::test_utils::{
    MockBehavior, MockFactory, RecordingReporter, RotateOutcome, request,
};

fn manager(factory: &Arc<MockFactory>, reporter: &Arc<RecordingReporter>) -> WriterManager {
    WriterManager::new("video", factory.clone(), reporter.clone(), 16)
}

#[tokio::test]
async fn test_first_write_creates_writer() {
    let factory = MockFactory::new(MockBehavior::default());
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    manager.write(request("video", "a")).await.unwrap();
    manager.write(request("video", "b")).await.unwrap();
    manager.close().await.unwrap();

    let log = factory.log.lock();
    assert_eq!(log.created, vec!["video"]);
    assert_eq!(
        log.writes,
        vec![("video".to_string(), "a".to_string()), ("video".to_string(), "b".to_string())]
    );
    assert_eq!(log.closes, vec!["video"]);
    drop(log);

    assert_eq!(
        reporter.outcomes(),
        vec![("video".to_string(), FailMode::None), ("video".to_string(), FailMode::None)]
    );
}

#[tokio::test]
async fn test_rotate_while_empty_is_false() {
    let factory = MockFactory::new(MockBehavior {
        rotate: RotateOutcome::Rotated,
        ..Default::default()
    });
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    assert!(!manager.rotate().await.unwrap());
    assert!(factory.log.lock().rotations.is_empty());
    manager.close().await.unwrap();
    assert!(factory.log.lock().closes.is_empty());
}

#[tokio::test]
async fn test_full_rotation_returns_to_empty() {
    let factory = MockFactory::new(MockBehavior {
        rotate: RotateOutcome::Rotated,
        ..Default::default()
    });
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    manager.write(request("video", "a")).await.unwrap();
    assert!(manager.rotate().await.unwrap());
    // the rotated writer is gone, so there is nothing to rotate
    assert!(!manager.rotate().await.unwrap());

    manager.write(request("video", "b")).await.unwrap();
    manager.close().await.unwrap();

    let log = factory.log.lock();
    assert_eq!(log.created.len(), 2);
    assert_eq!(log.rotations.len(), 1);
    // only the second writer is closed; the first released itself on rotate
    assert_eq!(log.closes.len(), 1);
}

#[tokio::test]
async fn test_partial_rotation_keeps_writer() {
    let factory = MockFactory::new(MockBehavior::default());
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    manager.write(request("video", "a")).await.unwrap();
    assert!(!manager.rotate().await.unwrap());
    manager.write(request("video", "b")).await.unwrap();
    manager.close().await.unwrap();

    assert_eq!(factory.log.lock().created.len(), 1);
}

#[tokio::test]
async fn test_rotate_error_propagates_and_keeps_writer() {
    let factory = MockFactory::new(MockBehavior {
        rotate: RotateOutcome::Fail,
        ..Default::default()
    });
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    manager.write(request("video", "a")).await.unwrap();
    assert!(manager.rotate().await.is_err());
    manager.close().await.unwrap();

    let log = factory.log.lock();
    assert_eq!(log.created.len(), 1);
    assert_eq!(log.closes.len(), 1);
}

#[tokio::test]
async fn test_create_failure_reports_and_drops() {
    let factory = MockFactory::failing();
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    manager.write(request("video", "a")).await.unwrap();
    manager.write(request("video", "b")).await.unwrap();
    manager.close().await.unwrap();

    assert_eq!(
        reporter.outcomes(),
        vec![
            ("video".to_string(), FailMode::FailedWrite),
            ("video".to_string(), FailMode::FailedWrite)
        ]
    );
}

#[tokio::test]
async fn test_write_failure_reported_as_failed_write() {
    let factory = MockFactory::new(MockBehavior {
        fail_writes: true,
        ..Default::default()
    });
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    let req = request("video", "a");
    manager.write(Arc::clone(&req)).await.unwrap();
    manager.close().await.unwrap();

    let results = reporter.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].uuid, req.uuid);
    assert_eq!(results[0].failure, FailMode::FailedWrite);
}

#[tokio::test]
async fn test_close_returns_writer_error() {
    let factory = MockFactory::new(MockBehavior {
        fail_close: true,
        ..Default::default()
    });
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    manager.write(request("video", "a")).await.unwrap();
    assert!(matches!(manager.close().await, Err(WriterError::Upload { .. })));
}

#[tokio::test]
async fn test_commands_after_close_fail() {
    let factory = MockFactory::new(MockBehavior::default());
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);
    let other = manager.clone();

    manager.close().await.unwrap();

    assert!(matches!(other.write(request("video", "late")).await, Err(WriterError::Closed)));
    assert!(matches!(other.rotate().await, Err(WriterError::Closed)));
    assert!(other.is_closed());
    assert!(factory.log.lock().created.is_empty());
}

#[tokio::test]
async fn test_preserves_write_order() {
    let factory = MockFactory::new(MockBehavior::default());
    let reporter = RecordingReporter::new();
    let manager = manager(&factory, &reporter);

    for i in 0..100 {
        manager.write(request("video", &i.to_string())).await.unwrap();
    }
    manager.close().await.unwrap();

    let lines: Vec<String> = factory.log.lock().writes.iter().map(|(_, l)| l.clone()).collect();
    let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
    assert_eq!(lines, expected);
}
