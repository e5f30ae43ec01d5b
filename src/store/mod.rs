//! Persistence gateway for sessions and chat history
//!
//! The hub only talks to [`ChatStore`]. Two backends exist: an in-process
//! [`MemoryStore`] and a file-backed [`SqliteStore`].
//!
//! Client records use set-by-value semantics: `remove_client` deletes the exact
//! record given, so callers replace a record by removing the stale value first
//! and then upserting the new one.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::protocol::messages::{ClientRecord, Message};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable client set plus a length-bounded message list
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// All persisted client records
    async fn list_clients(&self) -> Result<Vec<ClientRecord>>;

    /// Add a client record (no-op if the identical record exists)
    async fn upsert_client(&self, record: &ClientRecord) -> Result<()>;

    /// Remove the identical client record, if present
    async fn remove_client(&self, record: &ClientRecord) -> Result<()>;

    /// Stored history, oldest first
    async fn list_history(&self) -> Result<Vec<Message>>;

    /// Append a message, evicting the oldest entries beyond `limit`
    async fn append_history(&self, message: &Message, limit: usize) -> Result<()>;

    /// Remove at most one entry equal to `matcher` once display-only fields
    /// are cleared. Returns the number of entries removed.
    async fn remove_history_entry(&self, matcher: &Message) -> Result<usize>;

    /// Drop the whole history
    async fn clear_history(&self) -> Result<()>;
}

/// Open a store from an endpoint string: `memory` (or `:memory:`) for the
/// in-process backend, anything else is a SQLite database path.
pub fn open_store(endpoint: &str) -> Result<Arc<dyn ChatStore>> {
    match endpoint.trim() {
        "" | "memory" | ":memory:" => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        path => {
            info!("Using SQLite store at {}", path);
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}

/// True when `stored` is the entry a delete request for `matcher` refers to
pub(crate) fn history_entry_matches(stored: &Message, matcher: &Message) -> bool {
    stored.stored_form() == matcher.stored_form()
}
