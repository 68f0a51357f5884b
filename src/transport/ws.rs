//! Websocket [`Connector`] speaking the `frames` protocol.
//!
//! LIFECYCLE
//! =========
//! 1. `connect_async` → split into a write task and a read task.
//! 2. `session:hello` carries the realm; an error reply rejects the connect.
//! 3. Requests park a oneshot responder keyed by frame id; the read task
//!    resolves it when a terminal reply with that `parent_id` arrives.
//! 4. `channel:event` items become [`TransportEvent::Publish`].
//! 5. On disconnect the read task flips the closed watch, drops every parked
//!    responder (callers see [`TransportError::Closed`]) and emits
//!    [`TransportEvent::Closed`].

#[cfg(test)]
#[path = "ws_test.rs"]
mod ws_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use frames::{
    FRAME_PAYLOAD, FRAME_RESULT, FRAME_SUBSCRIPTION, Frame, SYSCALL_EVENT, SYSCALL_HELLO,
    SYSCALL_SUBSCRIBE, SYSCALL_UNSUBSCRIBE, Status,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{Connection, Connector, Session, SubscriptionId, TransportError, TransportEvent};
use crate::message::ChannelId;

/// How long a request waits for its reply by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Frame>>>>;

#[derive(Debug, Clone)]
pub struct WsConnector {
    call_timeout: Duration,
}

impl WsConnector {
    #[must_use]
    pub fn new() -> Self {
        Self { call_timeout: DEFAULT_CALL_TIMEOUT }
    }

    /// Deadline for each call, and for the websocket handshake on connect.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str, realm: &str) -> Result<Connection, TransportError> {
        let Ok(handshake) = tokio::time::timeout(self.call_timeout, connect_async(endpoint)).await else {
            return Err(TransportError::Timeout(format!("connect to {endpoint}")));
        };
        let (stream, _) = handshake.map_err(|e| TransportError::Connect {
            endpoint: endpoint.to_owned(),
            message: e.to_string(),
        })?;
        let (write, read) = stream.split();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let pending: Pending = Arc::default();

        tokio::spawn(write_loop(write, outbound_rx, closed_rx.clone()));
        tokio::spawn(read_loop(read, Arc::clone(&pending), events_tx, closed_tx));

        let session = Arc::new(WsSession {
            outbound: outbound_tx,
            pending,
            closed: closed_rx,
            call_timeout: self.call_timeout,
        });

        let hello = Frame::request(SYSCALL_HELLO, Value::Null).with_data("realm", realm);
        match session.request(hello).await {
            Ok(_) => {}
            Err(TransportError::Remote { message, .. }) => {
                session.close();
                return Err(TransportError::Rejected { realm: realm.to_owned(), message });
            }
            Err(e) => {
                session.close();
                return Err(e);
            }
        }

        info!(%endpoint, %realm, "ws: session open");
        Ok(Connection { session, events: events_rx })
    }
}

/// Session handle for one websocket connection.
pub struct WsSession {
    outbound: mpsc::UnboundedSender<WsMessage>,
    pending: Pending,
    closed: watch::Receiver<bool>,
    call_timeout: Duration,
}

impl WsSession {
    /// Send a request frame and wait for its terminal reply.
    async fn request(&self, frame: Frame) -> Result<Frame, TransportError> {
        let (tx, rx) = oneshot::channel();
        let id = frame.id.clone();
        let syscall = frame.syscall.clone();
        lock(&self.pending).insert(id.clone(), tx);

        let bytes = frames::encode_frame(&frame);
        if self.outbound.send(WsMessage::Binary(bytes.into())).is_err() {
            lock(&self.pending).remove(&id);
            return Err(TransportError::Closed);
        }

        let reply = match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                return Err(TransportError::Timeout(syscall));
            }
        };

        if reply.status == Status::Error {
            return Err(TransportError::Remote { procedure: syscall, message: reply.error_message() });
        }
        Ok(reply)
    }
}

#[async_trait::async_trait]
impl Session for WsSession {
    async fn subscribe(&self, channel: &ChannelId) -> Result<SubscriptionId, TransportError> {
        let frame = Frame::request(SYSCALL_SUBSCRIBE, Value::Null).with_channel(channel.as_str());
        let reply = self.request(frame).await?;
        reply
            .data
            .get(FRAME_SUBSCRIPTION)
            .and_then(Value::as_str)
            .map(|id| SubscriptionId(id.to_owned()))
            .ok_or_else(|| TransportError::MalformedReply(SYSCALL_SUBSCRIBE.to_owned()))
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), TransportError> {
        let frame = Frame::request(SYSCALL_UNSUBSCRIBE, Value::Null)
            .with_data(FRAME_SUBSCRIPTION, subscription.0.clone());
        self.request(frame).await.map(|_| ())
    }

    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        let reply = self.request(Frame::call(procedure, args)).await?;
        Ok(reply.data.get(FRAME_RESULT).cloned().unwrap_or(Value::Null))
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        loop {
            if *closed.borrow_and_update() {
                return;
            }
            if closed.changed().await.is_err() {
                return;
            }
        }
    }

    fn close(&self) {
        let _ = self.outbound.send(WsMessage::Close(None));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_loop(
    mut write: SplitSink<WsStream, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                let is_close = matches!(msg, WsMessage::Close(_));
                if write.send(msg).await.is_err() || is_close {
                    break;
                }
            }
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
            }
        }
    }
    let _ = write.close().await;
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    pending: Pending,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: watch::Sender<bool>,
) {
    let reason = loop {
        match read.next().await {
            Some(Ok(WsMessage::Binary(bytes))) => match frames::decode_frame(&bytes) {
                Ok(frame) => route_frame(frame, &pending, &events),
                Err(e) => warn!(error = %e, "ws: undecodable frame"),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                break frame.map_or_else(|| "closed by peer".to_owned(), |f| f.reason.as_str().to_owned());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_owned(),
        }
    };

    closed.send_replace(true);
    lock(&pending).clear();
    info!(%reason, "ws: session closed");
    let _ = events.send(TransportEvent::Closed { reason });
}

/// Deliver one inbound frame: replies wake their requester, events go to the stream.
fn route_frame(frame: Frame, pending: &Pending, events: &mpsc::UnboundedSender<TransportEvent>) {
    if frame.status.is_terminal()
        && let Some(parent_id) = frame.parent_id.as_deref()
    {
        let waiter = lock(pending).remove(parent_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => debug!(%parent_id, syscall = %frame.syscall, "ws: reply for unknown request"),
        }
        return;
    }

    if frame.syscall == SYSCALL_EVENT {
        match parse_event(&frame) {
            Some(event) => {
                let _ = events.send(event);
            }
            None => warn!(id = %frame.id, "ws: malformed channel event"),
        }
        return;
    }

    debug!(syscall = %frame.syscall, status = ?frame.status, "ws: ignoring frame");
}

fn parse_event(frame: &Frame) -> Option<TransportEvent> {
    let subscription = frame.data.get(FRAME_SUBSCRIPTION)?.as_str()?;
    let payload = frame.data.get(FRAME_PAYLOAD)?.clone();
    Some(TransportEvent::Publish {
        subscription: SubscriptionId(subscription.to_owned()),
        payload,
        ts: frame.ts,
    })
}
