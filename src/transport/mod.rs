//! Transport seam between the chat core and a publish/subscribe backend.
//!
//! DESIGN
//! ======
//! A [`Connector`] opens one [`Session`] per physical connection and hands
//! back the event stream for that connection only. Replacing the stream on
//! every connect means events from an earlier connection can never reach the
//! core. Subscription events carry the backend-issued [`SubscriptionId`] so
//! the channel session can drop anything that is not its live subscription.

pub mod ws;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::message::ChannelId;

/// Backend-issued handle for one channel subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something the backend pushed on an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A publication delivered through `subscription`.
    Publish { subscription: SubscriptionId, payload: Value, ts: i64 },
    /// The connection ended. No further events follow on this stream.
    Closed { reason: String },
}

/// Per-connection stream of [`TransportEvent`]s.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Errors produced by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect to {endpoint} failed: {message}")]
    Connect { endpoint: String, message: String },

    /// The backend refused to open a session on the realm.
    #[error("realm {realm} rejected: {message}")]
    Rejected { realm: String, message: String },

    /// The connection closed before the operation finished.
    #[error("connection closed")]
    Closed,

    /// No reply arrived before the deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The backend answered with an error frame.
    #[error("{procedure} failed: {message}")]
    Remote { procedure: String, message: String },

    /// The backend reply did not have the expected shape.
    #[error("malformed reply to {0}")]
    MalformedReply(String),
}

/// One live connection to a messaging realm.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Subscribe `channel`; publications arrive on the connection's event stream.
    async fn subscribe(&self, channel: &ChannelId) -> Result<SubscriptionId, TransportError>;

    /// Cancel a subscription.
    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), TransportError>;

    /// Invoke a remote procedure and return its result.
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, TransportError>;

    /// Resolves once the connection has closed.
    async fn closed(&self);

    /// Begin a caller-initiated close. Completion is reported on the event stream.
    fn close(&self);
}

/// A freshly opened connection: the session handle plus its event stream.
pub struct Connection {
    pub session: Arc<dyn Session>,
    pub events: EventStream,
}

/// Opens connections to a backend.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint` and open a session on `realm`.
    async fn connect(&self, endpoint: &str, realm: &str) -> Result<Connection, TransportError>;
}
