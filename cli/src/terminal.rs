//! Terminal rendering of chat lines: `HH:MM author: body`.

#[cfg(test)]
#[path = "terminal_test.rs"]
mod tests;

use std::io::Write;

use chato::{ChannelId, Color, MessageSink};
use time::OffsetDateTime;

const RESET: &str = "\x1b[0m";

/// ANSI escape for a palette color name; unknown names render uncolored.
fn ansi(color: &Color) -> Option<&'static str> {
    match color.as_str() {
        "black" => Some("\x1b[1m"),
        "orange" => Some("\x1b[38;5;208m"),
        "green" => Some("\x1b[32m"),
        "blue" => Some("\x1b[34m"),
        "red" => Some("\x1b[31m"),
        _ => None,
    }
}

/// `HH:MM` in UTC for a millisecond Unix timestamp.
fn clock(timestamp_ms: i64) -> String {
    let nanos = i128::from(timestamp_ms) * 1_000_000;
    match OffsetDateTime::from_unix_timestamp_nanos(nanos) {
        Ok(at) => format!("{:02}:{:02}", at.hour(), at.minute()),
        Err(_) => "--:--".to_owned(),
    }
}

pub struct TerminalSink<W> {
    out: W,
    colored: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, colored: bool) -> Self {
        Self { out, colored }
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "terminal: write failed");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> MessageSink for TerminalSink<W> {
    fn render(&mut self, author: &str, body: &str, color: &Color, timestamp: i64) {
        let at = clock(timestamp);
        let text = match ansi(color).filter(|_| self.colored) {
            Some(code) => format!("{at} {code}{author}{RESET}: {body}"),
            None => format!("{at} {author}: {body}"),
        };
        self.line(&text);
    }

    // A terminal cannot unprint; mark where the replayed backlog starts instead.
    fn clear(&mut self) {
        self.line("-- history --");
    }

    fn channel_changed(&mut self, channel: &ChannelId) {
        self.line(&format!("-- now in #{channel} --"));
    }
}
