//! Stdin line parsing.
//!
//! Plain text is sent as a message. Lines starting with `/` are commands;
//! `//` escapes a message that itself starts with a slash.

#[cfg(test)]
#[path = "input_test.rs"]
mod tests;

use chato::{ChannelId, Command};

pub const USAGE: &str = "\
commands:
  /nick NAME     change nickname
  /join CHANNEL  switch channel
  /leave         leave the current channel
  /quit          exit
  /help          show this help
  //text         send a message starting with '/'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Help,
    /// A slash command that is unknown or missing its argument.
    Invalid(String),
}

/// Parse one stdin line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if let Some(escaped) = line.strip_prefix("//") {
        return Some(Input::Command(Command::Send(format!("/{escaped}"))));
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::Command(Command::Send(line.to_owned())));
    };

    let (name, arg) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let arg = arg.trim();
    let input = match (name, arg.is_empty()) {
        ("nick", false) => Input::Command(Command::Nick(arg.to_owned())),
        ("join", false) => Input::Command(Command::Join(ChannelId::new(arg))),
        ("leave", _) => Input::Command(Command::Leave),
        ("quit" | "exit", _) => Input::Command(Command::Quit),
        ("help", _) => Input::Help,
        ("nick" | "join", true) => Input::Invalid(format!("/{name} needs an argument")),
        _ => Input::Invalid(format!("unknown command /{name}")),
    };
    Some(input)
}
