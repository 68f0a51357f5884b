//! Relay configuration from `CHATO_*` environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::str::FromStr;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9166;
const DEFAULT_REALM: &str = "coffee";
const DEFAULT_HISTORY_LINES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The only realm clients may open a session on.
    pub realm: String,
    /// Rows returned by `history.get` when the caller gives no count.
    pub history_lines: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("CHATO_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: env_parse(&lookup, "CHATO_PORT", DEFAULT_PORT),
            realm: lookup("CHATO_REALM")
                .filter(|realm| !realm.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REALM.to_owned()),
            history_lines: env_parse(&lookup, "CHATO_HISTORY_LINES", DEFAULT_HISTORY_LINES),
        }
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    lookup(key).and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}
