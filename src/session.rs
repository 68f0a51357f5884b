//! Single-channel subscription state.
//!
//! At most one subscription exists at a time, always for the most recently
//! joined channel. Switching channels unsubscribes the old one before the new
//! subscribe is issued.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use tracing::{info, warn};

use crate::error::ChatError;
use crate::message::ChannelId;
use crate::transport::{Session, SubscriptionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub channel: ChannelId,
    pub id: SubscriptionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new subscription was created.
    Joined,
    /// The channel was already subscribed; nothing changed.
    AlreadyJoined,
}

#[derive(Debug, Default)]
pub struct ChannelSession {
    active: Option<ActiveSubscription>,
}

impl ChannelSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `channel`, replacing any subscription to another channel.
    ///
    /// The subscribe call is abandoned if the connection closes first; a
    /// late result is then never stored.
    ///
    /// # Errors
    ///
    /// [`ChatError::Subscribe`] when the backend refuses, or
    /// [`ChatError::Abandoned`] when the connection closed mid-call. Either
    /// way no subscription is left behind.
    pub async fn join(&mut self, session: &dyn Session, channel: &ChannelId) -> Result<JoinOutcome, ChatError> {
        if self.active.as_ref().is_some_and(|active| active.channel == *channel) {
            return Ok(JoinOutcome::AlreadyJoined);
        }
        self.leave(session).await;

        let id = tokio::select! {
            biased;
            () = session.closed() => return Err(ChatError::Abandoned("subscribe")),
            result = session.subscribe(channel) => {
                result.map_err(|source| ChatError::Subscribe { channel: channel.clone(), source })?
            }
        };

        info!(%channel, subscription = %id, "session: subscribed");
        self.active = Some(ActiveSubscription { channel: channel.clone(), id });
        Ok(JoinOutcome::Joined)
    }

    /// Drop the current subscription, if any. Idempotent.
    ///
    /// An unsubscribe failure is logged; the local handle is discarded either
    /// way, so late events for it are ignored.
    pub async fn leave(&mut self, session: &dyn Session) {
        let Some(active) = self.active.take() else {
            return;
        };
        match session.unsubscribe(&active.id).await {
            Ok(()) => info!(channel = %active.channel, "session: unsubscribed"),
            Err(e) => warn!(channel = %active.channel, error = %e, "session: unsubscribe failed"),
        }
    }

    /// Forget the subscription without talking to the backend.
    ///
    /// Used when the connection is gone and the handle is already stale.
    pub fn invalidate(&mut self) -> Option<ActiveSubscription> {
        self.active.take()
    }

    /// Whether an event tagged with `subscription` belongs to the live subscription.
    #[must_use]
    pub fn accepts(&self, subscription: &SubscriptionId) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == *subscription)
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveSubscription> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn channel(&self) -> Option<&ChannelId> {
        self.active.as_ref().map(|active| &active.channel)
    }
}
