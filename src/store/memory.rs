//! In-process store backend

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ChatStore, history_entry_matches};
use crate::error::Result;
use crate::protocol::messages::{ClientRecord, Message};

/// Store kept entirely in memory; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: RwLock<HashSet<ClientRecord>>,
    history: RwLock<VecDeque<Message>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn list_clients(&self) -> Result<Vec<ClientRecord>> {
        let clients = self.clients.read().await;
        Ok(clients.iter().cloned().collect())
    }

    async fn upsert_client(&self, record: &ClientRecord) -> Result<()> {
        self.clients.write().await.insert(record.clone());
        Ok(())
    }

    async fn remove_client(&self, record: &ClientRecord) -> Result<()> {
        self.clients.write().await.remove(record);
        Ok(())
    }

    async fn list_history(&self) -> Result<Vec<Message>> {
        let history = self.history.read().await;
        Ok(history.iter().cloned().collect())
    }

    async fn append_history(&self, message: &Message, limit: usize) -> Result<()> {
        let mut history = self.history.write().await;
        history.push_back(message.clone());
        while history.len() > limit {
            history.pop_front();
        }
        Ok(())
    }

    async fn remove_history_entry(&self, matcher: &Message) -> Result<usize> {
        let mut history = self.history.write().await;
        match history
            .iter()
            .position(|stored| history_entry_matches(stored, matcher))
        {
            Some(index) => {
                history.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn clear_history(&self) -> Result<()> {
        self.history.write().await.clear();
        Ok(())
    }
}
