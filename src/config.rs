//! Client configuration supplied at construction.
//!
//! The core never reads the environment; binaries build a [`ClientConfig`]
//! from flags or env and hand it over.

use rand::seq::IndexedRandom;

use crate::message::ChannelId;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9166/ws";
pub const DEFAULT_REALM: &str = "coffee";
pub const DEFAULT_CHANNEL: &str = "ch1";
pub const DEFAULT_NICKNAME: &str = "Nick";

pub const PRESET_NICKNAMES: [&str; 21] = [
    "Nick",
    "Knatterton",
    "Micky",
    "Maus",
    "Donald",
    "Bruce",
    "Wayne",
    "Clark",
    "Kent",
    "Sarah",
    "Connor",
    "Mary",
    "Shelley",
    "Rosemary",
    "Wilma",
    "Louis",
    "Selina",
    "Barbara",
    "Gordon",
    "Herbert",
    "The Count",
];

pub const DEFAULT_PALETTE: [&str; 5] = ["black", "orange", "green", "blue", "red"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Websocket URL of the backend.
    pub endpoint: String,
    /// Messaging realm the connection belongs to.
    pub realm: String,
    /// Channel joined on the first connect.
    pub channel: ChannelId,
    /// Nicknames the initial nickname is drawn from.
    pub preset_nicknames: Vec<String>,
    /// Ordered nickname colors. Must not be empty.
    pub palette: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            realm: DEFAULT_REALM.to_owned(),
            channel: ChannelId::from(DEFAULT_CHANNEL),
            preset_nicknames: PRESET_NICKNAMES.iter().map(|s| (*s).to_owned()).collect(),
            palette: DEFAULT_PALETTE.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl ClientConfig {
    /// Uniform random pick from the preset list, or [`DEFAULT_NICKNAME`] when it is empty.
    #[must_use]
    pub fn random_nickname(&self) -> String {
        self.preset_nicknames
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_NICKNAME.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_reference_deployment() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.endpoint, "ws://127.0.0.1:9166/ws");
        assert_eq!(cfg.realm, "coffee");
        assert_eq!(cfg.channel.as_str(), "ch1");
        assert_eq!(cfg.preset_nicknames.len(), 21);
        assert_eq!(cfg.palette, vec!["black", "orange", "green", "blue", "red"]);
    }

    #[test]
    fn random_nickname_comes_from_presets() {
        let cfg = ClientConfig::default();
        for _ in 0..20 {
            let nick = cfg.random_nickname();
            assert!(cfg.preset_nicknames.contains(&nick), "{nick} is not a preset");
        }
    }

    #[test]
    fn random_nickname_falls_back_when_presets_empty() {
        let cfg = ClientConfig { preset_nicknames: Vec::new(), ..ClientConfig::default() };
        assert_eq!(cfg.random_nickname(), DEFAULT_NICKNAME);
    }
}
