//! Participant registry for the chat hub
//!
//! Tracks every known identity, whether it is online, and how many are
//! online. Owned by the hub task, so nothing here locks.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::generate_client_id;
use crate::protocol::messages::{ClientId, ClientRecord, DEFAULT_USERNAME, LoginInput};
use crate::server::session::ClientSession;

/// Result of registering a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Identity the participant is now known by
    pub id: ClientId,
    /// Record persisted before this join, if the identity was known
    pub previous: Option<ClientRecord>,
    /// Record to persist now
    pub record: ClientRecord,
    /// True when the identity moved from offline to online
    pub came_online: bool,
}

/// Result of a disconnect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// No session with that identity
    Unknown,
    /// Session exists but was not online
    AlreadyOffline,
    /// Session went offline
    Disconnected {
        previous: ClientRecord,
        record: ClientRecord,
        /// Nobody is online any more
        room_empty: bool,
    },
}

/// All registered sessions plus the online count
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<ClientId, ClientSession>,
    connected: usize,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            connected: 0,
            queue_capacity,
        }
    }

    /// Register a persisted record as an offline session
    pub fn restore(&mut self, record: ClientRecord) {
        let session = ClientSession::from_record(record, self.queue_capacity);
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Register a join, creating or resuming a session.
    ///
    /// A resume id that is not registered gets a fresh identity. The display
    /// name is updated whenever a non-blank one is supplied.
    pub fn join(&mut self, login: &LoginInput, address: SocketAddr) -> JoinOutcome {
        let known = login
            .resume_id()
            .filter(|id| self.sessions.contains_key(*id))
            .map(str::to_string);

        let (id, previous) = match known {
            Some(id) => {
                let previous = self.sessions.get(&id).map(ClientSession::record);
                (id, previous)
            }
            None => {
                let id = generate_client_id();
                let name = login
                    .requested_name()
                    .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
                let session = ClientSession::new(id.clone(), name, self.queue_capacity);
                self.sessions.insert(id.clone(), session);
                (id, None)
            }
        };

        let mut came_online = false;
        if let Some(session) = self.sessions.get_mut(&id) {
            if let Some(name) = login.requested_name() {
                session.set_display_name(name);
            }
            session.set_address(address);
            if !session.is_online() {
                session.set_online(true);
                came_online = true;
            }
        }
        if came_online {
            self.connected += 1;
        }

        let record = self
            .sessions
            .get(&id)
            .map(ClientSession::record)
            .unwrap_or_else(|| ClientRecord {
                name: DEFAULT_USERNAME.to_string(),
                online: true,
                id: id.clone(),
            });

        JoinOutcome {
            id,
            previous,
            record,
            came_online,
        }
    }

    /// Mark a session offline
    pub fn disconnect(&mut self, id: &str) -> DisconnectOutcome {
        let Some(session) = self.sessions.get_mut(id) else {
            return DisconnectOutcome::Unknown;
        };
        if !session.is_online() {
            return DisconnectOutcome::AlreadyOffline;
        }

        let previous = session.record();
        session.set_online(false);
        let record = session.record();
        self.connected = self.connected.saturating_sub(1);

        DisconnectOutcome::Disconnected {
            previous,
            record,
            room_empty: self.connected == 0,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ClientSession> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ClientSession> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Display name for an author id; unknown or blank ids resolve to the
    /// default name
    pub fn display_name(&self, id: &str) -> &str {
        self.sessions
            .get(id)
            .map(ClientSession::display_name)
            .unwrap_or(DEFAULT_USERNAME)
    }

    /// Sessions currently online
    pub fn online(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.values().filter(|s| s.is_online())
    }

    /// Number of registered identities
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions online
    pub fn connected(&self) -> usize {
        self.connected
    }
}
