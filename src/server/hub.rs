//! Chat hub: the single owner of the registry and the history
//!
//! All state changes happen on the hub task, fed by one bounded inbox of
//! [`HubEvent`]s. Outbound frames are pushed onto each recipient's session
//! queue, so handling an event never waits on the network.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::generate_message_id;
use crate::protocol::codec::{DeleteNotice, Encodable, InboundFrame, encode};
use crate::protocol::messages::*;
use crate::server::registry::{DisconnectOutcome, SessionRegistry};
use crate::store::ChatStore;
use crate::ChatConfig;

/// Work items for the hub
#[derive(Debug)]
pub enum HubEvent {
    /// Participant joins or resumes
    Join { addr: SocketAddr, login: LoginInput },

    /// Participant posts a message
    AddMessage { addr: SocketAddr, message: Message },

    /// Participant deletes one of their messages
    DeleteMessage { addr: SocketAddr, message: Message },

    /// Participant leaves
    Disconnect { addr: SocketAddr, client_id: ClientId },

    /// Snapshot of the hub counters
    Stats { reply: oneshot::Sender<HubStats> },

    /// Copy of the in-memory history, oldest first
    History { reply: oneshot::Sender<Vec<Message>> },
}

impl HubEvent {
    /// Wrap a decoded client frame
    pub fn from_frame(frame: InboundFrame, addr: SocketAddr) -> Self {
        match frame {
            InboundFrame::Join(login) => Self::Join { addr, login },
            InboundFrame::AddMessage(message) => Self::AddMessage { addr, message },
            InboundFrame::DeleteMessage(message) => Self::DeleteMessage { addr, message },
            InboundFrame::Disconnect(client_id) => Self::Disconnect { addr, client_id },
        }
    }
}

/// Hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Known identities, online or not
    pub registered: usize,
    /// Identities currently online
    pub connected: usize,
    /// Messages in the in-memory history
    pub history_len: usize,
}

/// Cloneable sender side of the hub inbox
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Queue an event, waiting if the inbox is full
    pub async fn send(&self, event: HubEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ChatError::internal("hub is not running"))
    }

    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Stats { reply }).await?;
        rx.await
            .map_err(|_| ChatError::internal("hub dropped stats request"))
    }

    pub async fn history(&self) -> Result<Vec<Message>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::History { reply }).await?;
        rx.await
            .map_err(|_| ChatError::internal("hub dropped history request"))
    }
}

/// The hub actor
pub struct Hub {
    config: ChatConfig,
    store: Arc<dyn ChatStore>,
    socket: Arc<UdpSocket>,
    registry: SessionRegistry,
    history: VecDeque<Message>,
    inbox: mpsc::Receiver<HubEvent>,
}

impl Hub {
    /// Create a hub, restoring sessions and history from the store
    pub async fn new(
        config: ChatConfig,
        store: Arc<dyn ChatStore>,
        socket: Arc<UdpSocket>,
    ) -> Result<(Self, HubHandle)> {
        config.validate()?;

        let (tx, inbox) = mpsc::channel(config.hub_inbox_capacity);
        let mut hub = Self {
            registry: SessionRegistry::new(config.outbound_queue_capacity),
            history: VecDeque::with_capacity(config.history_limit),
            config,
            store,
            socket,
            inbox,
        };
        hub.restore().await;

        Ok((hub, HubHandle { tx }))
    }

    /// Load persisted state. Failures leave the hub empty but running.
    async fn restore(&mut self) {
        match self.store.list_clients().await {
            Ok(records) => {
                for record in records {
                    if record.online {
                        // Nobody is online right after a restart
                        let offline = ClientRecord {
                            online: false,
                            ..record.clone()
                        };
                        self.persist_client(Some(&record), &offline).await;
                        self.registry.restore(offline);
                    } else {
                        self.registry.restore(record);
                    }
                }
            }
            Err(e) => warn!("Failed to restore clients: {}", e),
        }

        match self.store.list_history().await {
            Ok(messages) => {
                let skip = messages.len().saturating_sub(self.config.history_limit);
                self.history.extend(messages.into_iter().skip(skip));
                if skip > 0 {
                    info!("Dropping {} stored messages beyond the history limit", skip);
                    if let Err(e) = self.rewrite_stored_history().await {
                        warn!("Failed to trim stored history: {}", e);
                    }
                }
            }
            Err(e) => warn!("Failed to restore history: {}", e),
        }

        info!(
            "Restored {} clients and {} history messages",
            self.registry.len(),
            self.history.len()
        );
    }

    /// Replace the stored history with the in-memory one
    async fn rewrite_stored_history(&self) -> Result<()> {
        self.store.clear_history().await?;
        for message in &self.history {
            self.store
                .append_history(message, self.config.history_limit)
                .await?;
        }
        Ok(())
    }

    /// Run the hub on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process events until every handle is dropped
    pub async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            if let Err(e) = self.handle_event(event).await {
                warn!("Event handling error [{}]: {}", e.code(), e);
            }
        }
        debug!("Hub inbox closed");
    }

    async fn handle_event(&mut self, event: HubEvent) -> Result<()> {
        match event {
            HubEvent::Join { addr, login } => self.handle_join(addr, login).await,
            HubEvent::AddMessage { addr, message } => self.handle_add_message(addr, message).await,
            HubEvent::DeleteMessage { addr, message } => {
                self.handle_delete_message(addr, message).await
            }
            HubEvent::Disconnect { addr, client_id } => {
                self.handle_disconnect(addr, client_id).await
            }
            HubEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
                Ok(())
            }
            HubEvent::History { reply } => {
                let _ = reply.send(self.history.iter().cloned().collect());
                Ok(())
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            registered: self.registry.len(),
            connected: self.registry.connected(),
            history_len: self.history.len(),
        }
    }

    async fn handle_join(&mut self, addr: SocketAddr, login: LoginInput) -> Result<()> {
        let outcome = self.registry.join(&login, addr);
        if let Some(session) = self.registry.get_mut(&outcome.id) {
            session.ensure_delivery(&self.socket);
        }

        if outcome.came_online {
            info!(
                "Client {} ({}) joined from {} [connected: {}]",
                outcome.record.name,
                outcome.id,
                addr,
                self.registry.connected()
            );
        } else {
            info!(
                "Client {} ({}) rejoined from {} while online",
                outcome.record.name, outcome.id, addr
            );
        }

        self.replay(&outcome.id)?;
        self.persist_client(outcome.previous.as_ref(), &outcome.record)
            .await;
        Ok(())
    }

    /// Queue the initial payload and the full history for one participant
    fn replay(&self, id: &str) -> Result<()> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| ChatError::user_not_found(id))?;

        let initial = InitialPayload {
            assigned_id: id.to_string(),
            history_length: self.history.len(),
        };
        session.enqueue(encode_frame(&initial)?);

        for (order, stored) in self.history.iter().enumerate() {
            let entry = HistoryEntry {
                order,
                message: self.present(stored).for_recipient(id),
            };
            session.enqueue(encode_frame(&entry)?);
        }

        debug!("Queued replay of {} messages for {}", self.history.len(), id);
        Ok(())
    }

    /// Stored message with its author's current display name attached
    fn present(&self, stored: &Message) -> Message {
        let mut message = stored.clone();
        message.author_name = self.registry.display_name(&stored.author_id).to_string();
        message
    }

    async fn handle_add_message(&mut self, addr: SocketAddr, message: Message) -> Result<()> {
        if !message.is_anonymous() && !self.registry.contains(&message.author_id) {
            return Err(ChatError::user_not_found(format!(
                "message from {} names unknown author {}",
                addr, message.author_id
            )));
        }

        let accepted = Message {
            id: generate_message_id(),
            content: message.content,
            author_name: String::new(),
            author_id: message.author_id.trim().to_string(),
            created_at: Utc::now(),
            edited: false,
        };

        let frame_size = self.largest_frame_for(&accepted)?;
        if frame_size > self.config.max_frame_size {
            return Err(ChatError::resource_limit(format!(
                "message from {} would need a {} byte frame (max {})",
                addr, frame_size, self.config.max_frame_size
            )));
        }

        self.store
            .append_history(&accepted, self.config.history_limit)
            .await?;
        let named = self.present(&accepted);
        self.history.push_back(accepted);
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }

        debug!("Accepted message {} from {}", named.id, named.author_name);

        for session in self.registry.online() {
            session.enqueue(encode_frame(&named.for_recipient(session.id()))?);
        }
        Ok(())
    }

    /// Upper bound on any frame that will ever carry `stored`: its replay
    /// entry at the last position, on the author's copy, with the longest
    /// display name. `/add_history>` and `/add_message>` tokens are the same
    /// length, so this also bounds the live frame.
    fn largest_frame_for(&self, stored: &Message) -> Result<usize> {
        let entry = HistoryEntry {
            order: self.config.history_limit.saturating_sub(1),
            message: stored.stored_form(),
        };
        // The empty name encodes as `""`
        Ok(encode_frame(&entry)?.len() - 2 + MAX_DISPLAY_NAME_JSON_LEN)
    }

    async fn handle_delete_message(&mut self, addr: SocketAddr, message: Message) -> Result<()> {
        if message.is_anonymous() || message.id.trim().is_empty() {
            return Err(ChatError::invalid_message(format!(
                "delete from {} needs both a message id and an author id",
                addr
            )));
        }
        if !self.registry.contains(&message.author_id) {
            return Err(ChatError::user_not_found(format!(
                "delete from {} names unknown author {}",
                addr, message.author_id
            )));
        }

        let removed = self.store.remove_history_entry(&message.stored_form()).await?;
        if removed == 0 {
            info!("Message {} already deleted", message.id);
            return Ok(());
        }

        if let Some(index) = self.history.iter().position(|m| m.id == message.id) {
            self.history.remove(index);
        }

        info!("Deleted message {}", message.id);
        self.broadcast(encode_frame(&DeleteNotice(message.id))?);
        Ok(())
    }

    async fn handle_disconnect(&mut self, addr: SocketAddr, client_id: ClientId) -> Result<()> {
        match self.registry.disconnect(&client_id) {
            DisconnectOutcome::Unknown => {
                warn!("Disconnect from {} for unknown client {}", addr, client_id);
            }
            DisconnectOutcome::AlreadyOffline => {
                debug!("Client {} is already offline", client_id);
            }
            DisconnectOutcome::Disconnected {
                previous,
                record,
                room_empty,
            } => {
                info!(
                    "Client {} ({}) disconnected [connected: {}]",
                    record.name,
                    client_id,
                    self.registry.connected()
                );
                self.persist_client(Some(&previous), &record).await;

                if room_empty {
                    info!("Nobody left online, clearing history");
                    self.history.clear();
                    self.store.clear_history().await?;
                }
            }
        }
        Ok(())
    }

    /// Replace the persisted record of a session. The stale value goes
    /// first so an identical record is never removed after being written.
    async fn persist_client(&self, previous: Option<&ClientRecord>, record: &ClientRecord) {
        if let Some(previous) = previous.filter(|p| *p != record) {
            if let Err(e) = self.store.remove_client(previous).await {
                warn!("Failed to remove stale record for {}: {}", previous.id, e);
            }
        }
        if let Err(e) = self.store.upsert_client(record).await {
            warn!("Failed to persist record for {}: {}", record.id, e);
        }
    }

    /// Queue the same datagram for every online session
    fn broadcast(&self, datagram: Bytes) {
        for session in self.registry.online() {
            session.enqueue(datagram.clone());
        }
    }
}

fn encode_frame<T: Encodable>(value: &T) -> Result<Bytes> {
    encode(value).map_err(|e| ChatError::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::OutboundFrame;
    use crate::protocol::frame::Frame;
    use crate::store::MemoryStore;
    use std::time::Duration;

    struct Peer {
        socket: UdpSocket,
    }

    impl Peer {
        async fn bind() -> Self {
            Self {
                socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            }
        }

        fn addr(&self) -> SocketAddr {
            self.socket.local_addr().unwrap()
        }

        async fn recv_raw(&self) -> Vec<u8> {
            let mut buf = vec![0u8; 65536];
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), self.socket.recv_from(&mut buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            buf.truncate(n);
            buf
        }

        async fn recv(&self) -> OutboundFrame {
            let datagram = self.recv_raw().await;
            OutboundFrame::decode(&Frame::decode(&datagram).unwrap()).unwrap()
        }

        async fn recv_message(&self) -> Message {
            match self.recv().await {
                OutboundFrame::AddMessage(message) => message,
                other => panic!("expected a message, got {:?}", other),
            }
        }

        async fn assert_silent(&self) {
            let mut buf = vec![0u8; 65536];
            let result =
                tokio::time::timeout(Duration::from_millis(200), self.socket.recv_from(&mut buf))
                    .await;
            assert!(result.is_err(), "unexpected datagram");
        }

        /// Join and consume the replay, returning the assigned id
        async fn join(&self, hub: &HubHandle, login: LoginInput) -> (ClientId, Vec<Message>) {
            hub.send(HubEvent::Join {
                addr: self.addr(),
                login,
            })
            .await
            .unwrap();

            let OutboundFrame::InitialPayload(initial) = self.recv().await else {
                panic!("expected initial payload first");
            };
            let mut history = Vec::new();
            for expected in 0..initial.history_length {
                match self.recv().await {
                    OutboundFrame::AddHistory(entry) => {
                        assert_eq!(entry.order, expected);
                        history.push(entry.message);
                    }
                    other => panic!("expected history entry, got {:?}", other),
                }
            }
            (initial.assigned_id, history)
        }

        async fn say(&self, hub: &HubHandle, author_id: &str, content: &str) {
            hub.send(HubEvent::AddMessage {
                addr: self.addr(),
                message: Message::outgoing(content, author_id),
            })
            .await
            .unwrap();
        }
    }

    async fn start_hub(config: ChatConfig, store: Arc<dyn ChatStore>) -> HubHandle {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (hub, handle) = Hub::new(config, store, socket).await.unwrap();
        hub.spawn();
        handle
    }

    fn small_config(history_limit: usize) -> ChatConfig {
        ChatConfig {
            history_limit,
            outbound_queue_capacity: history_limit + 16,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_alice_and_bob() {
        let hub = start_hub(ChatConfig::default(), Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;
        let bob = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        let (bob_id, history) = bob.join(&hub, LoginInput::new("bob")).await;
        assert!(history.is_empty());
        assert_ne!(alice_id, bob_id);

        alice.say(&hub, &alice_id, "hi").await;

        let received = bob.recv_message().await;
        assert_eq!(received.content, "hi");
        assert_eq!(received.author_name, "alice");
        assert_eq!(received.author_id, "");
        assert!(!received.id.is_empty());

        let echo = alice.recv_message().await;
        assert_eq!(echo.author_id, alice_id);
        assert_eq!(echo.id, received.id);
    }

    #[tokio::test]
    async fn test_replay_precedes_live_messages() {
        let hub = start_hub(ChatConfig::default(), Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;
        let bob = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        for n in 0..3 {
            alice.say(&hub, &alice_id, &format!("m{n}")).await;
            alice.recv_message().await;
        }

        // Queue the join and a live message back to back
        hub.send(HubEvent::Join {
            addr: bob.addr(),
            login: LoginInput::new("bob"),
        })
        .await
        .unwrap();
        alice.say(&hub, &alice_id, "live").await;

        match bob.recv().await {
            OutboundFrame::InitialPayload(initial) => assert_eq!(initial.history_length, 3),
            other => panic!("expected initial payload, got {:?}", other),
        }
        for n in 0..3 {
            match bob.recv().await {
                OutboundFrame::AddHistory(entry) => {
                    assert_eq!(entry.order, n);
                    assert_eq!(entry.message.content, format!("m{n}"));
                    assert_eq!(entry.message.author_name, "alice");
                    assert_eq!(entry.message.author_id, "");
                }
                other => panic!("expected history entry, got {:?}", other),
            }
        }
        assert_eq!(bob.recv_message().await.content, "live");
    }

    #[tokio::test]
    async fn test_replay_keeps_own_identity() {
        let hub = start_hub(ChatConfig::default(), Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        alice.say(&hub, &alice_id, "mine").await;
        alice.recv_message().await;

        let (_, history) = alice
            .join(&hub, LoginInput::resume("", alice_id.clone()))
            .await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].author_id, alice_id);
    }

    #[tokio::test]
    async fn test_reconnect_does_not_grow_registry() {
        let store = Arc::new(MemoryStore::new());
        let hub = start_hub(ChatConfig::default(), store.clone()).await;
        let alice = Peer::bind().await;

        let (id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        let (again, _) = alice.join(&hub, LoginInput::resume("alice", id.clone())).await;
        assert_eq!(again, id);

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.connected, 1);

        hub.send(HubEvent::Disconnect {
            addr: alice.addr(),
            client_id: id.clone(),
        })
        .await
        .unwrap();
        // Second disconnect is a no-op
        hub.send(HubEvent::Disconnect {
            addr: alice.addr(),
            client_id: id.clone(),
        })
        .await
        .unwrap();
        assert_eq!(hub.stats().await.unwrap().connected, 0);

        alice.join(&hub, LoginInput::resume("alice", id.clone())).await;
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.connected, 1);

        let records = store.list_clients().await.unwrap();
        assert_eq!(
            records,
            vec![ClientRecord {
                name: "alice".to_string(),
                online: true,
                id,
            }]
        );
    }

    #[tokio::test]
    async fn test_delete_broadcasts_once() {
        let store = Arc::new(MemoryStore::new());
        let hub = start_hub(ChatConfig::default(), store.clone()).await;
        let alice = Peer::bind().await;
        let bob = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        bob.join(&hub, LoginInput::new("bob")).await;

        alice.say(&hub, &alice_id, "oops").await;
        let echo = alice.recv_message().await;
        bob.recv_message().await;

        for _ in 0..2 {
            hub.send(HubEvent::DeleteMessage {
                addr: alice.addr(),
                message: echo.clone(),
            })
            .await
            .unwrap();
        }

        for peer in [&alice, &bob] {
            assert_eq!(peer.recv().await, OutboundFrame::MessageDeleted(echo.id.clone()));
            peer.assert_silent().await;
        }
        assert!(store.list_history().await.unwrap().is_empty());
        assert!(hub.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_author() {
        let hub = start_hub(ChatConfig::default(), Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        alice.say(&hub, &alice_id, "keep").await;
        let mut echo = alice.recv_message().await;

        echo.author_id.clear();
        hub.send(HubEvent::DeleteMessage {
            addr: alice.addr(),
            message: echo,
        })
        .await
        .unwrap();

        alice.assert_silent().await;
        assert_eq!(hub.stats().await.unwrap().history_len, 1);
    }

    #[tokio::test]
    async fn test_last_disconnect_clears_history() {
        let store = Arc::new(MemoryStore::new());
        let hub = start_hub(ChatConfig::default(), store.clone()).await;
        let alice = Peer::bind().await;
        let bob = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        let (bob_id, _) = bob.join(&hub, LoginInput::new("bob")).await;
        alice.say(&hub, &alice_id, "hello").await;

        hub.send(HubEvent::Disconnect {
            addr: alice.addr(),
            client_id: alice_id,
        })
        .await
        .unwrap();
        assert_eq!(hub.stats().await.unwrap().history_len, 1);

        hub.send(HubEvent::Disconnect {
            addr: bob.addr(),
            client_id: bob_id,
        })
        .await
        .unwrap();

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connected, 0);
        assert_eq!(stats.history_len, 0);
        assert!(store.list_history().await.unwrap().is_empty());
        assert!(store.list_clients().await.unwrap().iter().all(|r| !r.online));
    }

    #[tokio::test]
    async fn test_history_keeps_newest() {
        let store = Arc::new(MemoryStore::new());
        let hub = start_hub(small_config(3), store.clone()).await;
        let alice = Peer::bind().await;

        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;
        for n in 0..5 {
            alice.say(&hub, &alice_id, &format!("m{n}")).await;
        }

        let contents = |history: Vec<Message>| -> Vec<String> {
            history.into_iter().map(|m| m.content).collect()
        };
        assert_eq!(contents(hub.history().await.unwrap()), ["m2", "m3", "m4"]);
        assert_eq!(contents(store.list_history().await.unwrap()), ["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_rejected_messages() {
        let config = ChatConfig {
            max_frame_size: 512,
            ..Default::default()
        };
        let hub = start_hub(config, Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;
        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;

        // Unknown author
        alice.say(&hub, "ghost", "boo").await;
        // Frame would exceed the limit
        alice.say(&hub, &alice_id, &"x".repeat(1000)).await;

        alice.assert_silent().await;
        assert_eq!(hub.stats().await.unwrap().history_len, 0);
    }

    #[tokio::test]
    async fn test_replay_frames_fit_frame_limit() {
        let max_frame_size = 512;
        let config = ChatConfig {
            max_frame_size,
            ..Default::default()
        };
        let hub = start_hub(config, Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;
        let (alice_id, _) = alice.join(&hub, LoginInput::new("alice")).await;

        let sizes: Vec<usize> = (100..=400).step_by(20).collect();
        for size in &sizes {
            alice.say(&hub, &alice_id, &"x".repeat(*size)).await;
        }
        let accepted = hub.history().await.unwrap().len();
        assert!(accepted > 0 && accepted < sizes.len());

        for _ in 0..accepted {
            assert!(alice.recv_raw().await.len() <= max_frame_size);
        }

        // Rejoin from a new address with the longest allowed name
        let again = Peer::bind().await;
        let login = LoginInput::resume("y".repeat(200), alice_id.clone());
        hub.send(HubEvent::Join {
            addr: again.addr(),
            login,
        })
        .await
        .unwrap();

        let mut replayed = 0;
        for _ in 0..=accepted {
            let datagram = again.recv_raw().await;
            assert!(
                datagram.len() <= max_frame_size,
                "replay frame of {} bytes",
                datagram.len()
            );
            if let OutboundFrame::AddHistory(entry) =
                OutboundFrame::decode(&Frame::decode(&datagram).unwrap()).unwrap()
            {
                assert_eq!(entry.message.author_id, alice_id);
                replayed += 1;
            }
        }
        assert_eq!(replayed, accepted);
    }

    #[tokio::test]
    async fn test_anonymous_message_is_guest() {
        let hub = start_hub(ChatConfig::default(), Arc::new(MemoryStore::new())).await;
        let alice = Peer::bind().await;
        alice.join(&hub, LoginInput::new("alice")).await;

        alice.say(&hub, "", "who am i").await;
        let received = alice.recv_message().await;
        assert_eq!(received.author_name, DEFAULT_USERNAME);
        assert_eq!(received.author_id, "");
    }

    #[tokio::test]
    async fn test_restore_from_store() {
        let store = Arc::new(MemoryStore::new());
        let record = ClientRecord {
            name: "carol".to_string(),
            online: true,
            id: "carol-id".to_string(),
        };
        store.upsert_client(&record).await.unwrap();
        for n in 0..25 {
            let message = Message {
                id: format!("m{n}"),
                ..Message::outgoing(format!("old {n}"), "carol-id")
            };
            store.append_history(&message, 100).await.unwrap();
        }

        let hub = start_hub(ChatConfig::default(), store.clone()).await;
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.connected, 0);
        assert_eq!(stats.history_len, 20);

        let stored = store.list_history().await.unwrap();
        assert_eq!(stored.len(), 20);
        assert_eq!(stored[0].id, "m5");
        assert_eq!(stored[19].id, "m24");
        assert_eq!(
            store.list_clients().await.unwrap(),
            vec![ClientRecord {
                online: false,
                ..record
            }]
        );

        let carol = Peer::bind().await;
        let (id, history) = carol
            .join(&hub, LoginInput::resume("", "carol-id"))
            .await;
        assert_eq!(id, "carol-id");
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "old 5");
        assert_eq!(history[0].author_name, "carol");
        assert_eq!(hub.stats().await.unwrap().connected, 1);
    }
}
