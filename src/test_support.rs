//! Scripted transport and recording sink shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Notify, mpsc, watch};

use crate::color::Color;
use crate::message::ChannelId;
use crate::sink::MessageSink;
use crate::transport::{Connection, Connector, Session, SubscriptionId, TransportError, TransportEvent};

/// Backend behavior shared by every session a [`MockConnector`] opens.
#[derive(Default)]
pub struct Script {
    /// `history.get` result per channel; unknown channels return `null`.
    pub history: HashMap<String, Value>,
    pub fail_history: bool,
    pub fail_subscribe: HashSet<String>,
    pub fail_unsubscribe: bool,
    pub fail_send: bool,
    /// Number of upcoming connect attempts that fail.
    pub fail_connects: usize,
}

pub struct MockSession {
    script: Arc<Mutex<Script>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: watch::Sender<bool>,
    next_sub: AtomicUsize,
    /// Live subscriptions: id → channel.
    pub subscriptions: Mutex<HashMap<SubscriptionId, String>>,
    /// Ordered log of operations, e.g. `"subscribe ch1"`.
    pub log: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<(String, Vec<Value>)>>,
    /// When set, `subscribe` waits for a notification before answering.
    pub subscribe_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockSession {
    fn new(script: Arc<Mutex<Script>>, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            script,
            events,
            closed: watch::Sender::new(false),
            next_sub: AtomicUsize::new(1),
            subscriptions: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            subscribe_gate: Mutex::new(None),
        }
    }

    /// Publish to every live subscription of `channel`, as the backend would.
    pub fn publish(&self, channel: &str, author: &str, body: &str) {
        let subs: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, ch)| ch.as_str() == channel)
            .map(|(id, _)| id.clone())
            .collect();
        for sub in subs {
            self.publish_raw(&sub, channel, author, body);
        }
    }

    /// Deliver a publication tagged with `subscription`, live or not.
    pub fn publish_raw(&self, subscription: &SubscriptionId, channel: &str, author: &str, body: &str) {
        let payload = serde_json::json!({
            "type": "message",
            "message": body,
            "author": author,
            "channel": channel,
        });
        let _ = self.events.send(TransportEvent::Publish { subscription: subscription.clone(), payload, ts: 1_000 });
    }

    /// Simulate the backend dropping the connection.
    pub fn drop_connection(&self, reason: &str) {
        if self.closed.send_replace(true) {
            return;
        }
        self.subscriptions.lock().unwrap().clear();
        let _ = self.events.send(TransportEvent::Closed { reason: reason.to_owned() });
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls_to(&self, procedure: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == procedure)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn live_channels(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().values().cloned().collect()
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait::async_trait]
impl Session for MockSession {
    async fn subscribe(&self, channel: &ChannelId) -> Result<SubscriptionId, TransportError> {
        self.log.lock().unwrap().push(format!("subscribe {channel}"));
        let gate = self.subscribe_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.script.lock().unwrap().fail_subscribe.contains(channel.as_str()) {
            return Err(TransportError::Remote {
                procedure: "channel:subscribe".to_owned(),
                message: "denied".to_owned(),
            });
        }
        let id = SubscriptionId(format!("sub-{}", self.next_sub.fetch_add(1, Ordering::SeqCst)));
        self.subscriptions.lock().unwrap().insert(id.clone(), channel.as_str().to_owned());
        Ok(id)
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) -> Result<(), TransportError> {
        self.log.lock().unwrap().push(format!("unsubscribe {subscription}"));
        if self.script.lock().unwrap().fail_unsubscribe {
            return Err(TransportError::Remote {
                procedure: "channel:unsubscribe".to_owned(),
                message: "denied".to_owned(),
            });
        }
        self.subscriptions.lock().unwrap().remove(subscription);
        Ok(())
    }

    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        self.log.lock().unwrap().push(format!("call {procedure}"));
        self.calls.lock().unwrap().push((procedure.to_owned(), args.clone()));
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let script = self.script.lock().unwrap();
        match procedure {
            "history.get" if script.fail_history => Err(TransportError::Timeout(procedure.to_owned())),
            "history.get" => {
                let channel = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(script.history.get(channel).cloned().unwrap_or(Value::Null))
            }
            "message.send" if script.fail_send => Err(TransportError::Remote {
                procedure: procedure.to_owned(),
                message: "message is empty".to_owned(),
            }),
            _ => Ok(Value::Null),
        }
    }

    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn close(&self) {
        self.drop_connection("closed by client");
    }
}

/// Connector handing out a fresh [`MockSession`] per connect.
#[derive(Default)]
pub struct MockConnector {
    pub script: Arc<Mutex<Script>>,
    pub sessions: Mutex<Vec<Arc<MockSession>>>,
    pub attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_history(&self, channel: &str, rows: Value) {
        self.script.lock().unwrap().history.insert(channel.to_owned(), rows);
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Most recently opened session.
    pub fn session(&self) -> Arc<MockSession> {
        Arc::clone(self.sessions.lock().unwrap().last().expect("no session opened yet"))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str, _realm: &str) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut script = self.script.lock().unwrap();
            if script.fail_connects > 0 {
                script.fail_connects -= 1;
                return Err(TransportError::Connect {
                    endpoint: endpoint.to_owned(),
                    message: "connection refused".to_owned(),
                });
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(MockSession::new(Arc::clone(&self.script), tx));
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(Connection { session, events: rx })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub author: String,
    pub body: String,
    pub color: String,
    pub timestamp: i64,
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub rendered: Vec<Rendered>,
    pub unread: usize,
    pub clears: usize,
    pub channels: Vec<String>,
    pub hidden: bool,
}

/// Sink recording everything into a shared [`SinkLog`].
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<Rendered> {
        self.log.lock().unwrap().rendered.clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.rendered().into_iter().map(|r| r.body).collect()
    }
}

impl MessageSink for RecordingSink {
    fn render(&mut self, author: &str, body: &str, color: &Color, timestamp: i64) {
        self.log.lock().unwrap().rendered.push(Rendered {
            author: author.to_owned(),
            body: body.to_owned(),
            color: color.as_str().to_owned(),
            timestamp,
        });
    }

    fn mark_unread(&mut self) {
        self.log.lock().unwrap().unread += 1;
    }

    fn is_visible(&self) -> bool {
        !self.log.lock().unwrap().hidden
    }

    fn clear(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.clears += 1;
        log.rendered.clear();
    }

    fn channel_changed(&mut self, channel: &ChannelId) {
        self.log.lock().unwrap().channels.push(channel.as_str().to_owned());
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
