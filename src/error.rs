//! Errors surfaced by the chat core.
//!
//! Nothing here is fatal: every variant is recoverable at the component
//! boundary and the caller decides whether to retry or show it to the user.

use crate::message::ChannelId;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// A connect attempt failed.
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),

    /// Subscribing a channel failed; no subscription exists.
    #[error("subscribe to {channel} failed: {source}")]
    Subscribe {
        channel: ChannelId,
        #[source]
        source: TransportError,
    },

    /// Fetching channel history failed.
    #[error("history for {channel} failed: {source}")]
    History {
        channel: ChannelId,
        #[source]
        source: TransportError,
    },

    /// Publishing a message failed.
    #[error("send failed: {0}")]
    Send(#[source] TransportError),

    /// The connection closed while the operation was in flight; its result was discarded.
    #[error("connection closed before {0} completed")]
    Abandoned(&'static str),

    /// No channel is joined, so there is nowhere to send.
    #[error("no channel joined")]
    NoChannel,

    #[error("message is empty")]
    EmptyMessage,

    #[error("nickname is empty")]
    EmptyNickname,

    /// An outgoing payload could not be encoded as JSON.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The send task ended without reporting an outcome.
    #[error("send task aborted")]
    SendAborted,
}
