//! Chat client: the composition root of the core.
//!
//! DESIGN
//! ======
//! One task owns every piece of client state. [`ChatClient::run`] selects
//! over the live connection's event stream, UI commands and the reconnect
//! timer, so state is only ever touched from that task. Sends are the one
//! exception: they run as spawned tasks holding nothing but the session
//! handle.
//!
//! LIFECYCLE
//! =========
//! 1. connect → join the desired channel → clear the sink → replay history.
//! 2. Live publications for the current subscription are rendered as they
//!    arrive; anything tagged with another subscription is dropped.
//! 3. Connection lost → forget the subscription → ask the reconnect policy.
//! 4. Every successful reconnect repeats step 1.

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::color::ColorAssigner;
use crate::config::ClientConfig;
use crate::connection::{Connected, ConnectionManager, ConnectionState, ReconnectPolicy};
use crate::error::ChatError;
use crate::history;
use crate::message::{ChannelId, Message, SendPayload, parse_message};
use crate::session::{ChannelSession, JoinOutcome};
use crate::sink::MessageSink;
use crate::transport::{Connector, TransportEvent};

/// Remote procedure publishing one chat line.
pub const SEND_PROCEDURE: &str = "message.send";

/// Requests from the UI layer, consumed by [`ChatClient::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Nick(String),
    Join(ChannelId),
    Leave,
    Quit,
}

/// Handle to an in-flight `message.send` call.
///
/// Dropping it leaves the call running; failures are then only logged.
#[derive(Debug)]
pub struct PendingSend {
    handle: JoinHandle<Result<(), ChatError>>,
}

impl PendingSend {
    /// Wait for the backend to accept or refuse the message.
    ///
    /// # Errors
    ///
    /// [`ChatError::Send`] when the call failed, [`ChatError::SendAborted`]
    /// when the send task died without an answer.
    pub async fn outcome(self) -> Result<(), ChatError> {
        self.handle.await.unwrap_or(Err(ChatError::SendAborted))
    }
}

pub struct ChatClient {
    config: ClientConfig,
    nickname: String,
    /// Channel to be in; joined on every connect.
    channel: Option<ChannelId>,
    colors: ColorAssigner,
    connection: ConnectionManager,
    channels: ChannelSession,
    sink: Box<dyn MessageSink>,
    reconnect_at: Option<Instant>,
}

impl ChatClient {
    /// Build a disconnected client with a nickname drawn from the presets.
    #[must_use]
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>, sink: Box<dyn MessageSink>) -> Self {
        let nickname = config.random_nickname();
        let colors = ColorAssigner::new(&config.palette);
        let channel = Some(config.channel.clone());
        Self {
            config,
            nickname,
            channel,
            colors,
            connection: ConnectionManager::new(connector),
            channels: ChannelSession::new(),
            sink,
            reconnect_at: None,
        }
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: Box<dyn ReconnectPolicy>) -> Self {
        self.connection.set_policy(policy);
        self
    }

    /// Start with `nickname` instead of a random preset.
    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Channel the client is in, or will join on the next connect.
    #[must_use]
    pub fn channel(&self) -> Option<&ChannelId> {
        self.channel.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn colors(&self) -> &ColorAssigner {
        &self.colors
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    /// Open the connection, then join the channel and replay its history.
    ///
    /// # Errors
    ///
    /// [`ChatError::Connect`] when no connection could be made. A join
    /// failure after connecting is returned too; the connection stays up.
    pub async fn connect(&mut self) -> Result<Connected, ChatError> {
        self.reconnect_at = None;
        self.channels.invalidate();
        let connected = self.connection.open(&self.config.endpoint, &self.config.realm).await?;
        self.on_connected(connected).await?;
        Ok(connected)
    }

    /// Subscriptions do not survive a reconnect, so every connect joins afresh.
    async fn on_connected(&mut self, connected: Connected) -> Result<(), ChatError> {
        if connected.is_reconnect {
            info!(channel = ?self.channel, "client: reconnected, rejoining");
        }
        self.enter_channel().await
    }

    /// Close the connection without scheduling a reconnect.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.channels.invalidate();
        self.connection.close("client disconnect");
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_at = self.connection.retry_delay().map(|delay| {
            info!(delay_ms = delay.as_millis(), "client: reconnect scheduled");
            Instant::now() + delay
        });
        if self.reconnect_at.is_none() {
            info!("client: not reconnecting");
        }
    }

    async fn reconnect(&mut self) {
        match self.connect().await {
            Ok(_) => {}
            Err(ChatError::Connect(e)) => {
                warn!(error = %e, "client: reconnect failed");
                self.schedule_reconnect();
            }
            Err(e) => warn!(error = %e, "client: rejoin after reconnect failed"),
        }
    }

    // =========================================================================
    // CHANNELS
    // =========================================================================

    /// Switch to `channel`. While disconnected it is joined on the next connect.
    ///
    /// # Errors
    ///
    /// [`ChatError::Subscribe`] or [`ChatError::Abandoned`] when the new
    /// subscription could not be made; the client is then in no channel
    /// until the next connect or join.
    pub async fn join(&mut self, channel: ChannelId) -> Result<(), ChatError> {
        self.channel = Some(channel);
        if !self.connection.is_connected() {
            return Ok(());
        }
        self.enter_channel().await
    }

    /// Leave the current channel. Idempotent.
    pub async fn leave(&mut self) {
        self.channel = None;
        match self.connection.session() {
            Some(session) => self.channels.leave(session.as_ref()).await,
            None => {
                self.channels.invalidate();
            }
        }
    }

    async fn enter_channel(&mut self) -> Result<(), ChatError> {
        let Some(channel) = self.channel.clone() else {
            return Ok(());
        };
        let Some(session) = self.connection.session() else {
            return Ok(());
        };
        if self.channels.join(session.as_ref(), &channel).await? == JoinOutcome::AlreadyJoined {
            return Ok(());
        }
        self.sink.channel_changed(&channel);
        self.sink.clear();

        let backlog = tokio::select! {
            biased;
            () = session.closed() => Err(ChatError::Abandoned("history")),
            result = history::load(session.as_ref(), &channel) => result,
        };
        match backlog {
            Ok(messages) => {
                info!(%channel, count = messages.len(), "client: replaying history");
                history::replay(&messages, &mut self.colors, self.sink.as_mut());
            }
            Err(e) => warn!(%channel, error = %e, "client: history unavailable"),
        }
        Ok(())
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Publish `text` to the current channel as the current nickname.
    ///
    /// Returns immediately; the call runs on its own task.
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyMessage`] for blank text, [`ChatError::NotConnected`]
    /// without a connection, [`ChatError::NoChannel`] when no subscription is
    /// live (including after a failed join).
    pub fn send_message(&self, text: &str) -> Result<PendingSend, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let session = self.connection.session().ok_or(ChatError::NotConnected)?;
        // sends follow the live subscription, not the pending join target
        let channel = self.channels.channel().ok_or(ChatError::NoChannel)?;

        let payload = serde_json::to_value(SendPayload::new(text, &self.nickname, channel))?;
        debug!(%channel, author = %self.nickname, "client: sending");
        let handle = tokio::spawn(async move {
            session.call(SEND_PROCEDURE, vec![payload]).await.map(drop).map_err(|e| {
                warn!(error = %e, "client: send failed");
                ChatError::Send(e)
            })
        });
        Ok(PendingSend { handle })
    }

    /// Rename the local user, carrying the old nickname's color over.
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyNickname`] for a blank name.
    pub fn change_nickname(&mut self, nickname: &str) -> Result<(), ChatError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ChatError::EmptyNickname);
        }
        let old = std::mem::replace(&mut self.nickname, nickname.to_owned());
        self.colors.rebind(&old, nickname);
        info!(%old, new = %nickname, "client: nickname changed");
        Ok(())
    }

    fn deliver(&mut self, msg: &Message) {
        let color = self.colors.color_for(&msg.author);
        self.sink.render(&msg.author, &msg.body, &color, msg.received_at);
        if !self.sink.is_visible() {
            self.sink.mark_unread();
        }
    }

    // =========================================================================
    // EVENT LOOP
    // =========================================================================

    /// Apply one event from the live connection.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Publish { subscription, payload, ts } => {
                if !self.channels.accepts(&subscription) {
                    debug!(%subscription, "client: dropping event for stale subscription");
                    return;
                }
                let Some(msg) = parse_message(&payload, ts) else {
                    debug!(%subscription, "client: dropping malformed publication");
                    return;
                };
                self.deliver(&msg);
            }
            TransportEvent::Closed { reason } => {
                warn!(%reason, "client: connection lost");
                self.channels.invalidate();
                self.connection.close(&reason);
                self.schedule_reconnect();
            }
        }
    }

    async fn apply(&mut self, command: Command) {
        match command {
            Command::Send(text) => {
                // fire-and-forget; the send task logs its own failure
                if let Err(e) = self.send_message(&text) {
                    warn!(error = %e, "client: message not sent");
                }
            }
            Command::Nick(nickname) => {
                if let Err(e) = self.change_nickname(&nickname) {
                    warn!(error = %e, "client: nickname unchanged");
                }
            }
            Command::Join(channel) => {
                if let Err(e) = self.join(channel).await {
                    warn!(error = %e, "client: join failed");
                }
            }
            Command::Leave => self.leave().await,
            Command::Quit => {}
        }
    }

    /// Drive the client until [`Command::Quit`], the command channel closes,
    /// or the connection is lost for good.
    ///
    /// Connects first unless already connected.
    ///
    /// # Errors
    ///
    /// [`ChatError::Connect`] when the first connect fails and the policy
    /// does not retry; [`ChatError::NotConnected`] when a later drop is not
    /// retried.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<(), ChatError> {
        if !self.connection.is_connected() {
            match self.connect().await {
                Ok(_) => {}
                Err(ChatError::Connect(e)) => {
                    self.schedule_reconnect();
                    if self.reconnect_at.is_none() {
                        return Err(ChatError::Connect(e));
                    }
                    warn!(error = %e, "client: connect failed, will retry");
                }
                Err(e) => warn!(error = %e, "client: join failed"),
            }
        }

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                event = self.connection.next_event() => self.handle_event(event),
                command = commands.recv() => match command {
                    None | Some(Command::Quit) => break,
                    Some(command) => self.apply(command).await,
                },
                () = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.reconnect().await;
                }
            }

            if !self.connection.is_connected() && self.reconnect_at.is_none() {
                return Err(ChatError::NotConnected);
            }
        }

        info!("client: quitting");
        self.disconnect();
        Ok(())
    }
}
