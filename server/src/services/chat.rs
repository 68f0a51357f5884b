//! Chat procedures: `message.send` and `history.get`.

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use frames::ErrorCode;
use serde_json::Value;
use tracing::info;

use crate::history::HistoryError;
use crate::state::AppState;

pub const PROC_SEND: &str = "message.send";
pub const PROC_HISTORY: &str = "history.get";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownProcedure(_) => "E_UNKNOWN_PROCEDURE",
            Self::InvalidArguments(_) => "E_INVALID_ARGUMENTS",
            Self::History(e) => e.error_code(),
            Self::Encode(_) => "E_ENCODE",
        }
    }
}

/// A stored message, ready to be published to its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub channel: String,
    pub payload: Value,
}

/// Validate and store a `message.send` payload.
///
/// The payload is `{type, message, author, channel}`; it is published
/// unchanged, so subscribers see exactly what the sender sent.
///
/// # Errors
///
/// [`ChatError::InvalidArguments`] when the first argument is not an object,
/// [`ChatError::History`] when channel, author or message is empty.
pub fn send_message(state: &AppState, args: &[Value]) -> Result<Publication, ChatError> {
    let Some(payload) = args.first().filter(|v| v.is_object()) else {
        return Err(ChatError::InvalidArguments("message.send expects a payload object"));
    };
    let field = |key: &str| payload.get(key).and_then(Value::as_str).unwrap_or_default();
    let channel = field("channel");
    let author = field("author");

    state.history.save(channel, author, field("message"))?;
    info!(%channel, %author, "chat: message stored");
    Ok(Publication { channel: channel.to_owned(), payload: payload.clone() })
}

/// `history.get(channel, lines?, offset?)`: oldest-first rows of `channel`.
///
/// # Errors
///
/// [`ChatError::InvalidArguments`] when the channel argument is missing.
pub fn get_history(state: &AppState, args: &[Value]) -> Result<Value, ChatError> {
    let Some(channel) = args.first().and_then(Value::as_str) else {
        return Err(ChatError::InvalidArguments("history.get expects a channel"));
    };
    let lines = count_arg(args.get(1), state.history_lines);
    let offset = count_arg(args.get(2), 0);

    let rows = state.history.get(channel, lines, offset);
    info!(%channel, lines, offset, rows = rows.len(), "chat: history served");
    Ok(serde_json::to_value(rows)?)
}

/// Non-negative count argument. Numbers arrive as floats over the wire.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_arg(value: Option<&Value>, default: usize) -> usize {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map_or(default, |n| n as usize)
}
