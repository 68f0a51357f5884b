//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the realm clients must name, the history store, and the live
//! subscriptions per channel. Each subscription carries the sender of the
//! websocket connection that owns it.

use std::collections::HashMap;
use std::sync::Arc;

use frames::Frame;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::history::History;

/// A connection subscribed to a channel.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub client_id: Uuid,
    pub tx: mpsc::Sender<Frame>,
}

/// Live subscribers of one channel, keyed by subscription id.
#[derive(Debug, Default)]
pub struct ChannelState {
    pub subscribers: HashMap<String, Subscriber>,
}

/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub realm: Arc<str>,
    pub history_lines: usize,
    pub history: Arc<dyn History>,
    pub channels: Arc<RwLock<HashMap<String, ChannelState>>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: &ServerConfig, history: Arc<dyn History>) -> Self {
        Self {
            realm: Arc::from(config.realm.as_str()),
            history_lines: config.history_lines,
            history,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
