//! SQLite store backend
//!
//! Client records are kept as their JSON text in a set-like table; history is
//! an append-only table trimmed to the configured limit on every insert.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tracing::warn;

use super::{ChatStore, history_entry_matches};
use crate::error::{ChatError, Result};
use crate::protocol::messages::{ClientRecord, Message};

const SCHEMA: &str = r#"
-- Client records, stored by value
CREATE TABLE IF NOT EXISTS clients (
    record TEXT PRIMARY KEY
);

-- Chat history, oldest first by seq
CREATE TABLE IF NOT EXISTS history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    body TEXT NOT NULL
);
"#;

/// Store backed by a SQLite database file
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::storage(format!("failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ChatError::storage(format!("failed to open database: {}", e)))?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| ChatError::storage(format!("failed to create schema: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking database call off the async runtime
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }
}

/// Read every history row as (seq, message), skipping rows that no longer parse
fn load_history(conn: &Connection) -> Result<Vec<(i64, Message)>> {
    let mut stmt = conn.prepare("SELECT seq, body FROM history ORDER BY seq ASC")?;
    let rows = stmt.query_map([], |row| {
        let seq: i64 = row.get(0)?;
        let body: String = row.get(1)?;
        Ok((seq, body))
    })?;

    let mut history = Vec::new();
    for row in rows {
        let (seq, body) = row?;
        match serde_json::from_str::<Message>(&body) {
            Ok(message) => history.push((seq, message)),
            Err(e) => warn!("Skipping unreadable history row {}: {}", seq, e),
        }
    }
    Ok(history)
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn list_clients(&self) -> Result<Vec<ClientRecord>> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT record FROM clients")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut clients = Vec::new();
            for row in rows {
                let record = row?;
                match serde_json::from_str::<ClientRecord>(&record) {
                    Ok(client) => clients.push(client),
                    Err(e) => warn!("Skipping unreadable client record: {}", e),
                }
            }
            Ok(clients)
        })
        .await
    }

    async fn upsert_client(&self, record: &ClientRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO clients (record) VALUES (?1)",
                params![json],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_client(&self, record: &ClientRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.call(move |conn| {
            conn.execute("DELETE FROM clients WHERE record = ?1", params![json])?;
            Ok(())
        })
        .await
    }

    async fn list_history(&self) -> Result<Vec<Message>> {
        self.call(|conn| {
            Ok(load_history(conn)?
                .into_iter()
                .map(|(_, message)| message)
                .collect())
        })
        .await
    }

    async fn append_history(&self, message: &Message, limit: usize) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let limit = i64::try_from(limit)
            .map_err(|_| ChatError::config(format!("history limit {} out of range", limit)))?;
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO history (body) VALUES (?1)", params![body])?;
            tx.execute(
                "DELETE FROM history WHERE seq NOT IN \
                 (SELECT seq FROM history ORDER BY seq DESC LIMIT ?1)",
                params![limit],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove_history_entry(&self, matcher: &Message) -> Result<usize> {
        let matcher = matcher.clone();
        self.call(move |conn| {
            let target = load_history(conn)?
                .into_iter()
                .find(|(_, stored)| history_entry_matches(stored, &matcher));

            match target {
                Some((seq, _)) => Ok(conn.execute("DELETE FROM history WHERE seq = ?1", params![seq])?),
                None => Ok(0),
            }
        })
        .await
    }

    async fn clear_history(&self) -> Result<()> {
        self.call(|conn| {
            conn.execute("DELETE FROM history", [])?;
            Ok(())
        })
        .await
    }
}
