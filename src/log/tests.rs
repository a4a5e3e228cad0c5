use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_stream::StreamExt;

use super::*;
use crate::storage::mock::MockLogBackend;

const POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum TestEvent {
    Added { item: String },
    Removed { item: String },
}

fn added(item: &str) -> TestEvent {
    TestEvent::Added {
        item: item.to_string(),
    }
}

fn removed(item: &str) -> TestEvent {
    TestEvent::Removed {
        item: item.to_string(),
    }
}

async fn mock_log() -> (EventLog<TestEvent>, Arc<MockLogBackend>) {
    let backend = Arc::new(MockLogBackend::new());
    let log = EventLog::with_backend(backend.clone(), POLL).await.unwrap();
    (log, backend)
}

#[tokio::test]
async fn test_append_assigns_sequential_indices() {
    let (log, _backend) = mock_log().await;
    assert!(log.is_empty().await);

    assert_eq!(log.append(added("apple")).await.unwrap(), 0);
    assert_eq!(log.append(added("bread")).await.unwrap(), 1);
    assert_eq!(log.append(removed("apple")).await.unwrap(), 2);
    assert_eq!(log.len().await, 3);
    assert!(!log.is_empty().await);
}

#[tokio::test]
async fn test_append_failure_leaves_log_unchanged() {
    let (log, backend) = mock_log().await;
    backend.set_fail_on_append(true).await;

    let result = log.append(added("apple")).await;
    assert!(matches!(result, Err(LogError::Append(_))));
    assert_eq!(log.len().await, 0);
    assert!(backend.lines().await.is_empty());

    // The failed index is reassigned to the next attempt.
    backend.set_fail_on_append(false).await;
    assert_eq!(log.append(added("apple")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reload_yields_same_events_in_order() {
    let (log, backend) = mock_log().await;
    log.append(added("apple")).await.unwrap();
    log.append(added("bread")).await.unwrap();
    log.append(removed("apple")).await.unwrap();

    let reopened: EventLog<TestEvent> = EventLog::with_backend(
        Arc::new(MockLogBackend::seeded(backend.lines().await)),
        POLL,
    )
    .await
    .unwrap();

    assert_eq!(reopened.len().await, 3);
    let mut tail = reopened.events();
    for (index, event) in [
        (0, added("apple")),
        (1, added("bread")),
        (2, removed("apple")),
    ] {
        let got = tail.next().await;
        assert_eq!(got.index, index);
        assert_eq!(got.event, event);
    }
}

#[tokio::test]
async fn test_reload_uses_position_for_mismatched_index() {
    let backend = Arc::new(MockLogBackend::seeded(vec![
        r#"{"index":7,"event":{"type":"Added","item":"apple"}}"#.to_string(),
    ]));
    let log: EventLog<TestEvent> = EventLog::with_backend(backend, POLL).await.unwrap();

    assert_eq!(log.len().await, 1);
    let mut tail = log.events();
    assert_eq!(tail.next().await.index, 0);
}

#[tokio::test]
async fn test_malformed_record_is_fatal() {
    let backend = Arc::new(MockLogBackend::seeded(vec!["not json".to_string()]));
    let result = EventLog::<TestEvent>::with_backend(backend, POLL).await;

    assert!(matches!(result, Err(LogError::Malformed { line: 1, .. })));
}

#[tokio::test]
async fn test_unreadable_backend_is_fatal() {
    let backend = Arc::new(MockLogBackend::new());
    backend.set_fail_on_read(true).await;
    let result = EventLog::<TestEvent>::with_backend(backend, POLL).await;

    assert!(matches!(result, Err(LogError::Init(_))));
}

#[tokio::test(start_paused = true)]
async fn test_tail_replays_history_then_tails_live() {
    let (log, _backend) = mock_log().await;
    log.append(added("apple")).await.unwrap();
    log.append(added("bread")).await.unwrap();

    let mut tail = log.events();
    assert_eq!(tail.next().await.index, 0);
    assert_eq!(tail.next().await.index, 1);
    assert_eq!(tail.position(), 2);

    // Next append lands while the tail is already waiting.
    let writer = log.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.append(removed("apple")).await.unwrap();
    });

    let live = timeout(Duration::from_secs(5), tail.next()).await.unwrap();
    assert_eq!(live.index, 2);
    assert_eq!(live.event, removed("apple"));
}

#[tokio::test(start_paused = true)]
async fn test_tail_waits_on_empty_log() {
    let (log, _backend) = mock_log().await;
    let mut tail = log.events();

    let writer = log.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        writer.append(added("apple")).await.unwrap();
    });

    let first = timeout(Duration::from_secs(5), tail.next()).await.unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(first.event, added("apple"));
}

#[tokio::test]
async fn test_two_tails_observe_identical_order() {
    let (log, _backend) = mock_log().await;
    log.append(added("apple")).await.unwrap();
    log.append(removed("apple")).await.unwrap();
    log.append(added("bread")).await.unwrap();

    let mut first = log.events();
    let mut second = log.events();
    for _ in 0..3 {
        let a = first.next().await;
        let b = second.next().await;
        assert_eq!(a.index, b.index);
        assert_eq!(a.event, b.event);
    }
}

#[tokio::test]
async fn test_events_from_starts_at_bookmark() {
    let (log, _backend) = mock_log().await;
    log.append(added("apple")).await.unwrap();
    log.append(added("bread")).await.unwrap();
    log.append(added("cheese")).await.unwrap();

    let mut tail = log.events_from(1);
    assert_eq!(tail.position(), 1);
    assert_eq!(tail.next().await.index, 1);
    assert_eq!(tail.next().await.index, 2);
    assert_eq!(tail.position(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_into_stream_yields_in_order() {
    let (log, _backend) = mock_log().await;
    log.append(added("apple")).await.unwrap();
    log.append(added("bread")).await.unwrap();

    let mut stream = log.events().into_stream();
    assert_eq!(stream.next().await.unwrap().index, 0);
    assert_eq!(stream.next().await.unwrap().index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_into_stream_stops_when_receiver_dropped() {
    let (log, backend) = mock_log().await;
    drop(log.events().into_stream());
    drop(log);

    // Once the pumping task exits, its tail releases the last handle on the
    // backend shared through the log.
    timeout(Duration::from_secs(5), async {
        while Arc::strong_count(&backend) > 1 {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .unwrap();
}

#[test]
fn test_log_record_line_shape() {
    let record = IndexedEvent {
        index: 3,
        event: added("apple"),
    };

    let line = serde_json::to_string(&record).unwrap();
    assert_eq!(
        line,
        r#"{"index":3,"event":{"type":"Added","item":"apple"}}"#
    );

    let parsed: IndexedEvent<TestEvent> = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed.index, 3);
    assert_eq!(parsed.event, record.event);
}
