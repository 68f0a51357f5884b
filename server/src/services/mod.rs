//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! Service modules own subscription bookkeeping and the chat procedures so
//! the route handler can stay focused on protocol translation.

pub mod channel;
pub mod chat;
