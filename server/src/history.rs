//! Channel history store.
//!
//! DESIGN
//! ======
//! `History` is the seam the chat procedures write through; `MemoryHistory`
//! is the only implementation. Entries are kept per channel, oldest first,
//! and live until the process exits or `clear` is called. Nothing bounds the
//! size of a channel's history.

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use frames::ErrorCode;
use serde::Serialize;

/// One stored chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub author: String,
    pub message: String,
    /// Milliseconds since the Unix epoch at save time.
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("channel id is empty")]
    EmptyChannel,
    #[error("author is empty")]
    EmptyAuthor,
    #[error("message is empty")]
    EmptyMessage,
}

impl ErrorCode for HistoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyChannel => "E_EMPTY_CHANNEL",
            Self::EmptyAuthor => "E_EMPTY_AUTHOR",
            Self::EmptyMessage => "E_EMPTY_MESSAGE",
        }
    }
}

pub trait History: Send + Sync {
    /// Append one line to `channel`.
    ///
    /// # Errors
    ///
    /// Rejects an empty channel, author or message; nothing is stored then.
    fn save(&self, channel: &str, author: &str, message: &str) -> Result<HistoryEntry, HistoryError>;

    /// Up to `lines` entries of `channel` starting at `offset`, oldest first.
    /// Unknown channels have no entries.
    fn get(&self, channel: &str, lines: usize, offset: usize) -> Vec<HistoryEntry>;

    /// Forget every channel.
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryHistory {
    channels: Mutex<HashMap<String, Vec<HistoryEntry>>>,
}

impl MemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<HistoryEntry>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl History for MemoryHistory {
    fn save(&self, channel: &str, author: &str, message: &str) -> Result<HistoryEntry, HistoryError> {
        if channel.is_empty() {
            return Err(HistoryError::EmptyChannel);
        }
        if author.is_empty() {
            return Err(HistoryError::EmptyAuthor);
        }
        if message.is_empty() {
            return Err(HistoryError::EmptyMessage);
        }

        let entry = HistoryEntry { author: author.to_owned(), message: message.to_owned(), ts: frames::now_ms() };
        self.lock().entry(channel.to_owned()).or_default().push(entry.clone());
        Ok(entry)
    }

    fn get(&self, channel: &str, lines: usize, offset: usize) -> Vec<HistoryEntry> {
        self.lock()
            .get(channel)
            .map(|entries| entries.iter().skip(offset).take(lines).cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}
