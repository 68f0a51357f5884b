//! Channel backlog: fetch once per join, replay through the sink in order.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use serde_json::Value;
use tracing::{debug, info};

use crate::color::ColorAssigner;
use crate::error::ChatError;
use crate::message::{ChannelId, Message, parse_message};
use crate::sink::MessageSink;
use crate::transport::{Session, TransportError};

/// Remote procedure returning a channel's backlog, oldest first.
pub const HISTORY_PROCEDURE: &str = "history.get";

/// Fetch the backlog of `channel` with a single `history.get` call.
///
/// An absent or empty result is an empty backlog. Rows without an author or
/// body are skipped.
///
/// # Errors
///
/// Returns [`ChatError::History`] when the call fails or the result is not a list.
pub async fn load(session: &dyn Session, channel: &ChannelId) -> Result<Vec<Message>, ChatError> {
    info!(%channel, "history: retrieving");
    let result = session
        .call(HISTORY_PROCEDURE, vec![Value::String(channel.as_str().to_owned())])
        .await
        .map_err(|source| ChatError::History { channel: channel.clone(), source })?;

    let rows = match result {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        _ => {
            return Err(ChatError::History {
                channel: channel.clone(),
                source: TransportError::MalformedReply(HISTORY_PROCEDURE.to_owned()),
            });
        }
    };

    let now = frames::now_ms();
    let total = rows.len();
    let messages: Vec<Message> = rows.iter().filter_map(|row| parse_message(row, now)).collect();
    if messages.len() < total {
        debug!(%channel, skipped = total - messages.len(), "history: skipped malformed rows");
    }
    Ok(messages)
}

/// Push `messages` to the sink in exactly the given order.
pub fn replay(messages: &[Message], colors: &mut ColorAssigner, sink: &mut dyn MessageSink) {
    for msg in messages {
        let color = colors.color_for(&msg.author);
        sink.render(&msg.author, &msg.body, &color, msg.received_at);
    }
}
