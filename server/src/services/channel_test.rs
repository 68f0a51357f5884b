use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::state::test_helpers::{subscriber_count, test_app_state};

#[tokio::test]
async fn subscribe_issues_distinct_ids() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);

    let a = subscribe(&state, "ch1", client, tx.clone()).await.expect("subscribe");
    let b = subscribe(&state, "ch1", client, tx).await.expect("subscribe");

    assert_ne!(a, b);
    assert_eq!(subscriber_count(&state, "ch1").await, 2);
}

#[tokio::test]
async fn subscribe_requires_channel() {
    let state = test_app_state();
    let (tx, _rx) = mpsc::channel(8);
    let err = subscribe(&state, "", Uuid::new_v4(), tx).await.expect_err("should fail");
    assert_eq!(err.error_code(), "E_CHANNEL_REQUIRED");
}

#[tokio::test]
async fn publish_reaches_every_subscription_of_the_channel() {
    let state = test_app_state();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let (tx_c, mut rx_c) = mpsc::channel(8);
    let sub_a = subscribe(&state, "ch1", Uuid::new_v4(), tx_a).await.expect("a");
    subscribe(&state, "ch1", Uuid::new_v4(), tx_b).await.expect("b");
    subscribe(&state, "ch2", Uuid::new_v4(), tx_c).await.expect("c");

    let payload = json!({"type": "message", "message": "hi", "author": "Bob", "channel": "ch1"});
    let delivered = publish(&state, "ch1", &payload).await;

    assert_eq!(delivered, 2);
    let event = rx_a.try_recv().expect("a receives");
    assert_eq!(event.syscall, SYSCALL_EVENT);
    assert_eq!(event.status, Status::Item);
    assert_eq!(event.channel.as_deref(), Some("ch1"));
    assert_eq!(event.data[FRAME_SUBSCRIPTION], sub_a.as_str());
    assert_eq!(event.data[FRAME_PAYLOAD], payload);
    assert!(rx_b.try_recv().is_ok());
    assert!(rx_c.try_recv().is_err());
}

#[tokio::test]
async fn publish_to_empty_channel_delivers_nothing() {
    let state = test_app_state();
    assert_eq!(publish(&state, "nobody", &json!({})).await, 0);
}

#[tokio::test]
async fn unsubscribe_removes_only_that_subscription() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(8);
    let first = subscribe(&state, "ch1", client, tx.clone()).await.expect("first");
    subscribe(&state, "ch1", client, tx).await.expect("second");

    unsubscribe(&state, client, &first).await.expect("unsubscribe");

    assert_eq!(subscriber_count(&state, "ch1").await, 1);
    assert_eq!(publish(&state, "ch1", &json!({})).await, 1);
    let event = rx.try_recv().expect("event");
    assert_ne!(event.data[FRAME_SUBSCRIPTION], first.as_str());
}

#[tokio::test]
async fn unsubscribe_rejects_foreign_or_unknown_ids() {
    let state = test_app_state();
    let owner = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    let sub = subscribe(&state, "ch1", owner, tx).await.expect("subscribe");

    let foreign = unsubscribe(&state, Uuid::new_v4(), &sub).await.expect_err("not the owner");
    let unknown = unsubscribe(&state, owner, "nope").await.expect_err("unknown");

    assert_eq!(foreign.error_code(), "E_SUBSCRIPTION_NOT_FOUND");
    assert!(matches!(unknown, ChannelError::SubscriptionNotFound(ref id) if id == "nope"));
    assert_eq!(subscriber_count(&state, "ch1").await, 1);
}

#[tokio::test]
async fn last_unsubscribe_drops_the_channel_entry() {
    let state = test_app_state();
    let client = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    let sub = subscribe(&state, "ch1", client, tx).await.expect("subscribe");

    unsubscribe(&state, client, &sub).await.expect("unsubscribe");

    assert!(state.channels.read().await.is_empty());
}

#[tokio::test]
async fn part_all_removes_every_subscription_of_a_client() {
    let state = test_app_state();
    let leaving = Uuid::new_v4();
    let staying = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    subscribe(&state, "ch1", leaving, tx.clone()).await.expect("1");
    subscribe(&state, "ch2", leaving, tx.clone()).await.expect("2");
    subscribe(&state, "ch2", staying, tx).await.expect("3");

    assert_eq!(part_all(&state, leaving).await, 2);

    assert_eq!(subscriber_count(&state, "ch1").await, 0);
    assert_eq!(subscriber_count(&state, "ch2").await, 1);
    assert!(!state.channels.read().await.contains_key("ch1"));
}

#[tokio::test]
async fn full_subscriber_queue_is_skipped() {
    let state = test_app_state();
    let (tx_slow, _rx_slow) = mpsc::channel(1);
    let (tx_fast, mut rx_fast) = mpsc::channel(8);
    subscribe(&state, "ch1", Uuid::new_v4(), tx_slow).await.expect("slow");
    subscribe(&state, "ch1", Uuid::new_v4(), tx_fast).await.expect("fast");

    assert_eq!(publish(&state, "ch1", &json!({"n": 1})).await, 2);
    assert_eq!(publish(&state, "ch1", &json!({"n": 2})).await, 1);
    assert!(rx_fast.try_recv().is_ok());
    assert!(rx_fast.try_recv().is_ok());
}
