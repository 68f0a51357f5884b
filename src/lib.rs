//! Channel chat client core.
//!
//! A [`ChatClient`] joins one channel on a publish/subscribe backend,
//! replays the channel's history, renders live messages through a
//! [`MessageSink`] and sends messages as the local nickname. The backend is
//! reached through the [`transport`] seam; [`transport::ws::WsConnector`]
//! speaks the `frames` protocol over a websocket.

pub mod client;
pub mod color;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod message;
pub mod session;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{ChatClient, Command, PendingSend};
pub use color::{Color, ColorAssigner};
pub use config::ClientConfig;
pub use connection::{
    Connected, ConnectionManager, ConnectionState, ExponentialBackoff, FixedDelay, NoReconnect,
    ReconnectPolicy,
};
pub use error::ChatError;
pub use message::{ChannelId, Message};
pub use sink::MessageSink;
