//! Chat message model and payload parsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A rendered chat line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub author: String,
    pub body: String,
    /// Milliseconds since the Unix epoch.
    pub received_at: i64,
}

/// Payload of a `message.send` call and of every channel publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub author: String,
    pub channel: String,
}

impl SendPayload {
    #[must_use]
    pub fn new(message: &str, author: &str, channel: &ChannelId) -> Self {
        Self {
            kind: "message".to_owned(),
            message: message.to_owned(),
            author: author.to_owned(),
            channel: channel.as_str().to_owned(),
        }
    }
}

/// Parse a history row or publication payload into a [`Message`].
///
/// Rows need `author` and `message`; an optional numeric `ts` overrides
/// `fallback_ts`. Anything else yields `None`.
#[must_use]
pub fn parse_message(payload: &Value, fallback_ts: i64) -> Option<Message> {
    let author = payload.get("author")?.as_str()?;
    let body = payload.get("message")?.as_str()?;
    // Numbers cross the wire as floats.
    #[allow(clippy::cast_possible_truncation)]
    let received_at = payload
        .get("ts")
        .and_then(Value::as_f64)
        .map_or(fallback_ts, |ts| ts as i64);
    Some(Message { author: author.to_owned(), body: body.to_owned(), received_at })
}
