use std::time::Duration;

use super::*;
use crate::test_support::MockConnector;
use crate::transport::TransportError;

fn manager() -> (Arc<MockConnector>, ConnectionManager) {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>);
    (connector, manager)
}

#[tokio::test]
async fn first_connect_is_not_a_reconnect() {
    let (_connector, mut conn) = manager();
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    let connected = conn.open("ws://test", "coffee").await.expect("open");

    assert!(!connected.is_reconnect);
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert!(conn.session().is_some());
}

#[tokio::test]
async fn later_connects_are_reconnects() {
    let (connector, mut conn) = manager();

    let first = conn.open("ws://test", "coffee").await.expect("open");
    assert!(conn.close("test"));
    let second = conn.open("ws://test", "coffee").await.expect("reopen");
    let third = conn.open("ws://test", "coffee").await.expect("reopen over live");

    assert!(!first.is_reconnect);
    assert!(second.is_reconnect);
    assert!(third.is_reconnect);
    assert_eq!(conn.connects(), 3);
    assert_eq!(connector.session_count(), 3);
}

#[tokio::test]
async fn reopening_closes_the_previous_session() {
    let (connector, mut conn) = manager();
    conn.open("ws://test", "coffee").await.expect("open");
    let first = connector.session();

    conn.open("ws://test", "coffee").await.expect("reopen");

    tokio::time::timeout(Duration::from_millis(100), first.closed()).await.expect("old session closed");
}

#[tokio::test]
async fn failed_connect_reports_error_and_stays_disconnected() {
    let (connector, mut conn) = manager();
    connector.script().fail_connects = 1;

    let err = conn.open("ws://test", "coffee").await.expect_err("should fail");

    assert!(matches!(err, ChatError::Connect(TransportError::Connect { .. })));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(conn.session().is_none());

    // a failed attempt does not count as a connect
    let connected = conn.open("ws://test", "coffee").await.expect("open");
    assert!(!connected.is_reconnect);
}

#[tokio::test]
async fn close_when_disconnected_is_a_no_op() {
    let (_connector, mut conn) = manager();
    assert!(!conn.close("nothing open"));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn events_flow_until_the_connection_drops() {
    let (connector, mut conn) = manager();
    conn.open("ws://test", "coffee").await.expect("open");
    let session = connector.session();
    let sub = session.subscribe(&"ch1".into()).await.expect("subscribe");

    session.publish("ch1", "Bob", "hi");
    session.drop_connection("network down");

    match conn.next_event().await {
        TransportEvent::Publish { subscription, payload, .. } => {
            assert_eq!(subscription, sub);
            assert_eq!(payload["message"], "hi");
        }
        other => panic!("expected publish, got {other:?}"),
    }
    assert!(matches!(conn.next_event().await, TransportEvent::Closed { reason } if reason == "network down"));
}

#[tokio::test]
async fn next_event_pends_while_disconnected() {
    let (_connector, mut conn) = manager();
    let waited = tokio::time::timeout(Duration::from_millis(20), conn.next_event()).await;
    assert!(waited.is_err());
}

#[tokio::test]
async fn retry_delay_follows_policy_and_failures() {
    let (connector, mut conn) = manager();
    assert_eq!(conn.retry_delay(), None);

    conn.set_policy(Box::new(ExponentialBackoff {
        initial: Duration::from_millis(100),
        max: Duration::from_millis(350),
        max_failures: None,
    }));
    assert_eq!(conn.retry_delay(), Some(Duration::from_millis(100)));

    connector.script().fail_connects = 3;
    let _ = conn.open("ws://test", "coffee").await;
    assert_eq!(conn.retry_delay(), Some(Duration::from_millis(200)));
    let _ = conn.open("ws://test", "coffee").await;
    assert_eq!(conn.retry_delay(), Some(Duration::from_millis(350)));
    let _ = conn.open("ws://test", "coffee").await;
    assert_eq!(conn.retry_delay(), Some(Duration::from_millis(350)));

    conn.open("ws://test", "coffee").await.expect("open");
    assert_eq!(conn.retry_delay(), Some(Duration::from_millis(100)));
}

#[test]
fn fixed_delay_gives_up_after_max_failures() {
    let mut policy = FixedDelay { delay: Duration::from_secs(1), max_failures: Some(2) };
    assert_eq!(policy.next_delay(0), Some(Duration::from_secs(1)));
    assert_eq!(policy.next_delay(1), Some(Duration::from_secs(1)));
    assert_eq!(policy.next_delay(2), None);
}

#[test]
fn backoff_saturates_on_large_failure_counts() {
    let mut policy = ExponentialBackoff {
        initial: Duration::from_secs(1),
        max: Duration::from_secs(10),
        max_failures: None,
    };
    assert_eq!(policy.next_delay(3), Some(Duration::from_secs(8)));
    assert_eq!(policy.next_delay(64), Some(Duration::from_secs(10)));
}
