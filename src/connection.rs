//! Transport connection lifecycle.
//!
//! DESIGN
//! ======
//! `ConnectionManager` is the only owner of [`ConnectionState`]. Every
//! successful [`ConnectionManager::open`] reports exactly one [`Connected`];
//! a second one needs an intervening close. Closing drops the session handle
//! and the connection's event stream together, so nothing that belonged to
//! the old connection can be used afterwards.
//!
//! Reconnection is not built in: the caller supplies a [`ReconnectPolicy`]
//! and asks it for a delay after each drop or failed attempt.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ChatError;
use crate::transport::{Connector, EventStream, Session, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notification of one successful physical connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    /// True for every connect after the first.
    pub is_reconnect: bool,
}

/// Decides whether and when to retry after a drop or failed connect.
pub trait ReconnectPolicy: Send {
    /// Delay before the next attempt, or `None` to stop.
    ///
    /// `failures` counts consecutive failed attempts since the last
    /// successful connect; it is 0 right after a connection drops.
    fn next_delay(&mut self, failures: u32) -> Option<Duration>;
}

/// Never reconnect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&mut self, _failures: u32) -> Option<Duration> {
        None
    }
}

/// Constant delay, optionally giving up after `max_failures` failed attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_failures: Option<u32>,
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&mut self, failures: u32) -> Option<Duration> {
        if self.max_failures.is_some_and(|max| failures >= max) {
            return None;
        }
        Some(self.delay)
    }
}

/// Doubling delay from `initial`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_failures: Option<u32>,
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&mut self, failures: u32) -> Option<Duration> {
        if self.max_failures.is_some_and(|max| failures >= max) {
            return None;
        }
        let factor = 2u32.saturating_pow(failures);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: Box<dyn ReconnectPolicy>,
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
    events: Option<EventStream>,
    connects: u64,
    failures: u32,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            policy: Box::new(NoReconnect),
            state: ConnectionState::Disconnected,
            session: None,
            events: None,
            connects: 0,
            failures: 0,
        }
    }

    pub fn set_policy(&mut self, policy: Box<dyn ReconnectPolicy>) {
        self.policy = policy;
    }

    /// Connect to `endpoint` on `realm`. An existing connection is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Connect`] when the connector fails; the state is
    /// then `Disconnected` and the failure counts towards the reconnect policy.
    pub async fn open(&mut self, endpoint: &str, realm: &str) -> Result<Connected, ChatError> {
        if self.state != ConnectionState::Disconnected {
            self.close("reopening");
        }
        self.state = ConnectionState::Connecting;
        info!(%endpoint, %realm, "connection: connecting");

        match self.connector.connect(endpoint, realm).await {
            Ok(conn) => {
                let is_reconnect = self.connects > 0;
                self.connects += 1;
                self.failures = 0;
                self.session = Some(conn.session);
                self.events = Some(conn.events);
                self.state = ConnectionState::Connected;
                info!(is_reconnect, connects = self.connects, "connection: connected");
                Ok(Connected { is_reconnect })
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                self.state = ConnectionState::Disconnected;
                warn!(error = %e, failures = self.failures, "connection: connect failed");
                Err(ChatError::Connect(e))
            }
        }
    }

    /// Tear down the current connection. Returns false if already disconnected.
    pub fn close(&mut self, reason: &str) -> bool {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.events = None;
        let was_open = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;
        if was_open {
            info!(%reason, "connection: closed");
        }
        was_open
    }

    /// Next event of the live connection. Pends forever while disconnected.
    ///
    /// A stream that ends without a close notice is reported as closed.
    pub async fn next_event(&mut self) -> TransportEvent {
        let Some(events) = self.events.as_mut() else {
            return std::future::pending().await;
        };
        events.recv().await.unwrap_or_else(|| TransportEvent::Closed {
            reason: "event stream ended".to_owned(),
        })
    }

    /// Delay before the next reconnect attempt, per the caller's policy.
    pub fn retry_delay(&mut self) -> Option<Duration> {
        self.policy.next_delay(self.failures)
    }

    #[must_use]
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.session.clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Number of successful connects so far.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.connects
    }
}
