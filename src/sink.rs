//! Message sink: the narrow interface the core renders through.

use crate::color::Color;
use crate::message::ChannelId;

/// Receives messages in the order the core delivers them.
///
/// Implemented by the UI layer. Only `render` is required.
pub trait MessageSink: Send {
    /// Render one message. Called exactly once per delivered message.
    fn render(&mut self, author: &str, body: &str, color: &Color, timestamp: i64);

    /// A live message arrived while the sink was hidden.
    fn mark_unread(&mut self) {}

    /// Whether the sink is currently visible to the user.
    fn is_visible(&self) -> bool {
        true
    }

    /// Drop rendered messages. Called before a channel's history is replayed.
    fn clear(&mut self) {}

    /// The active channel changed.
    fn channel_changed(&mut self, _channel: &ChannelId) {}
}
