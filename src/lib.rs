//! Multi-user chat hub over plain UDP datagrams
//!
//! A single [`Hub`](server::Hub) task owns the participant registry and a
//! bounded history. The [`Listener`](server::Listener) reads frames from the
//! socket and forwards them to the hub; every participant gets its own
//! [`ClientSession`](server::ClientSession) with an outbound queue, so slow
//! recipients only stall themselves.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;

pub use client::{ChatClient, ChatClientConfig, ClientEvent, ReplayGate};
pub use error::{ChatError, Result};
pub use server::{Hub, HubHandle, HubStats, Listener};
pub use store::{ChatStore, MemoryStore, SqliteStore, open_store};

use std::net::SocketAddr;

use uuid::Uuid;

use crate::protocol::frame::{DEFAULT_MAX_FRAME_SIZE, MAX_DATAGRAM_SIZE};
use crate::protocol::messages::{ClientId, MessageId};

/// Generate a durable participant identity
pub fn generate_client_id() -> ClientId {
    Uuid::new_v4().simple().to_string()
}

/// Generate a unique, time-ordered message ID
pub fn generate_message_id() -> MessageId {
    Uuid::now_v7().to_string()
}

/// Chat hub configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Server listen address
    pub bind_addr: SocketAddr,
    /// Maximum number of messages kept in history
    pub history_limit: usize,
    /// Largest datagram accepted or produced, in bytes
    pub max_frame_size: usize,
    /// Per-session outbound queue length before the oldest datagram is dropped
    pub outbound_queue_capacity: usize,
    /// Pending events the hub inbox holds before producers wait
    pub hub_inbox_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            history_limit: 20,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_queue_capacity: 256,
            hub_inbox_capacity: 1024,
        }
    }
}

impl ChatConfig {
    /// Check the limits against each other
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(ChatError::config("history_limit must be at least 1"));
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_DATAGRAM_SIZE {
            return Err(ChatError::config(format!(
                "max_frame_size must be between 1 and {} bytes",
                MAX_DATAGRAM_SIZE
            )));
        }
        // A full replay is one initial payload plus one frame per entry
        if self.outbound_queue_capacity <= self.history_limit {
            return Err(ChatError::config(format!(
                "outbound_queue_capacity ({}) must exceed history_limit ({})",
                self.outbound_queue_capacity, self.history_limit
            )));
        }
        if self.hub_inbox_capacity == 0 {
            return Err(ChatError::config("hub_inbox_capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ChatConfig::default();
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.bind_addr.port(), 5000);
        config.validate().unwrap();
    }

    #[test]
    fn test_queue_must_fit_replay() {
        let config = ChatConfig {
            history_limit: 50,
            outbound_queue_capacity: 50,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_frame_size_bounds() {
        let config = ChatConfig {
            max_frame_size: MAX_DATAGRAM_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_client_id(), generate_client_id());
        assert_ne!(generate_message_id(), generate_message_id());
    }
}
