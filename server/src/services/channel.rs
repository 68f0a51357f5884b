//! Channel subscriptions and publication fan-out.
//!
//! DESIGN
//! ======
//! A connection may hold any number of subscriptions, each identified by a
//! server-issued id. Publishing walks the channel's subscribers and pushes
//! one `channel:event` item per subscription. A channel entry is removed
//! once its last subscriber leaves.

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;

use frames::{ErrorCode, FRAME_PAYLOAD, FRAME_SUBSCRIPTION, Frame, SYSCALL_EVENT, Status};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::{AppState, Subscriber};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel required")]
    ChannelRequired,
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
}

impl ErrorCode for ChannelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ChannelRequired => "E_CHANNEL_REQUIRED",
            Self::SubscriptionNotFound(_) => "E_SUBSCRIPTION_NOT_FOUND",
        }
    }
}

/// Subscribe a connection to `channel` and return the new subscription id.
///
/// # Errors
///
/// Returns [`ChannelError::ChannelRequired`] for an empty channel name.
pub async fn subscribe(
    state: &AppState,
    channel: &str,
    client_id: Uuid,
    tx: mpsc::Sender<Frame>,
) -> Result<String, ChannelError> {
    if channel.is_empty() {
        return Err(ChannelError::ChannelRequired);
    }
    let subscription = Uuid::new_v4().to_string();
    let mut channels = state.channels.write().await;
    channels
        .entry(channel.to_owned())
        .or_default()
        .subscribers
        .insert(subscription.clone(), Subscriber { client_id, tx });
    info!(%client_id, %channel, %subscription, "channel: subscribed");
    Ok(subscription)
}

/// Cancel a subscription owned by `client_id`.
///
/// # Errors
///
/// Returns [`ChannelError::SubscriptionNotFound`] when the id is unknown or
/// belongs to another connection.
pub async fn unsubscribe(state: &AppState, client_id: Uuid, subscription: &str) -> Result<(), ChannelError> {
    let mut channels = state.channels.write().await;
    let owner = channels.iter().find_map(|(name, ch)| {
        ch.subscribers
            .get(subscription)
            .filter(|sub| sub.client_id == client_id)
            .map(|_| name.clone())
    });
    let Some(channel) = owner else {
        return Err(ChannelError::SubscriptionNotFound(subscription.to_owned()));
    };

    if let Some(ch) = channels.get_mut(&channel) {
        ch.subscribers.remove(subscription);
        if ch.subscribers.is_empty() {
            channels.remove(&channel);
        }
    }
    info!(%client_id, %channel, %subscription, "channel: unsubscribed");
    Ok(())
}

/// Drop every subscription of a departing connection. Returns how many were removed.
pub async fn part_all(state: &AppState, client_id: Uuid) -> usize {
    let mut channels = state.channels.write().await;
    let mut removed = 0;
    channels.retain(|_, ch| {
        let before = ch.subscribers.len();
        ch.subscribers.retain(|_, sub| sub.client_id != client_id);
        removed += before - ch.subscribers.len();
        !ch.subscribers.is_empty()
    });
    removed
}

/// Push `payload` to every subscriber of `channel`. Returns the number of deliveries.
pub async fn publish(state: &AppState, channel: &str, payload: &Value) -> usize {
    let channels = state.channels.read().await;
    let Some(ch) = channels.get(channel) else {
        return 0;
    };

    let mut delivered = 0;
    for (subscription, sub) in &ch.subscribers {
        let frame = event_frame(channel, subscription, payload);
        // Best-effort: a connection whose queue is full misses this event.
        if sub.tx.try_send(frame).is_ok() {
            delivered += 1;
        } else {
            debug!(client_id = %sub.client_id, %subscription, "channel: dropped event for slow subscriber");
        }
    }
    delivered
}

fn event_frame(channel: &str, subscription: &str, payload: &Value) -> Frame {
    let mut frame = Frame::request(SYSCALL_EVENT, Value::Null)
        .with_channel(channel)
        .with_data(FRAME_SUBSCRIPTION, subscription)
        .with_data(FRAME_PAYLOAD, payload.clone());
    frame.status = Status::Item;
    frame
}
