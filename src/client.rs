//! UDP chat client implementation
//!
//! This module provides a headless client for the chat hub: it joins, sends
//! and deletes messages, and turns inbound frames into [`ClientEvent`]s.
//! History replay is reassembled by [`ReplayGate`] before live traffic is
//! released.

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::protocol::codec::{DeleteRequest, DisconnectRequest, Encodable, OutboundFrame, encode};
use crate::protocol::frame::{DEFAULT_MAX_FRAME_SIZE, Frame, MAX_DATAGRAM_SIZE};
use crate::protocol::messages::{ClientId, LoginInput, Message, MessageId};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Hub address to talk to
    pub server_addr: SocketAddr,
    /// Client bind address (use 0.0.0.0:0 for auto)
    pub bind_addr: SocketAddr,
    /// Largest frame the client will send
    pub max_frame_size: usize,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ChatClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Default::default()
        }
    }
}

/// Events that the client can receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Join accepted; this many history messages follow
    Welcome {
        assigned_id: ClientId,
        history_length: usize,
    },
    /// Full history, oldest first
    HistoryLoaded(Vec<Message>),
    /// Live message
    Message(Message),
    /// A message was removed
    MessageDeleted(MessageId),
}

/// Reassembles a history replay and holds back live frames until it is
/// complete.
///
/// Completion is tracked by counting distinct entries received; the `order`
/// field only places each entry.
#[derive(Debug, Default)]
pub struct ReplayGate {
    /// Set once an initial payload announced the current replay
    started: bool,
    slots: Vec<Option<Message>>,
    received: usize,
    loaded: bool,
    /// Frames waiting for the replay to finish, in arrival order
    pending: VecDeque<OutboundFrame>,
}

impl ReplayGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the current replay has fully arrived
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Feed one inbound frame, returning the events it releases
    pub fn accept(&mut self, frame: OutboundFrame) -> Vec<ClientEvent> {
        let mut events = Vec::new();

        match frame {
            OutboundFrame::InitialPayload(initial) => {
                self.started = true;
                self.slots = vec![None; initial.history_length];
                self.received = 0;
                self.loaded = false;
                events.push(ClientEvent::Welcome {
                    assigned_id: initial.assigned_id,
                    history_length: initial.history_length,
                });

                // Entries that overtook the initial payload
                let early: Vec<_> = self.pending.drain(..).collect();
                for frame in early {
                    match frame {
                        OutboundFrame::AddHistory(entry) => self.place(entry.order, entry.message),
                        other => self.pending.push_back(other),
                    }
                }
                self.finish_if_complete(&mut events);
            }
            OutboundFrame::AddHistory(entry) => {
                if self.loaded || !self.started {
                    // May belong to a replay whose initial payload is still in flight
                    self.pending.push_back(OutboundFrame::AddHistory(entry));
                } else {
                    self.place(entry.order, entry.message);
                    self.finish_if_complete(&mut events);
                }
            }
            live => {
                if self.loaded {
                    events.extend(Self::live_event(live));
                } else {
                    self.pending.push_back(live);
                }
            }
        }

        events
    }

    fn place(&mut self, order: usize, message: Message) {
        match self.slots.get_mut(order) {
            Some(slot) if slot.is_none() => {
                *slot = Some(message);
                self.received += 1;
            }
            Some(_) => debug!("Duplicate history entry {}", order),
            None => debug!("Dropping history entry {} outside replay of {}", order, self.slots.len()),
        }
    }

    fn finish_if_complete(&mut self, events: &mut Vec<ClientEvent>) {
        if !self.started || self.loaded || self.received < self.slots.len() {
            return;
        }

        self.loaded = true;
        let history = self.slots.drain(..).flatten().collect();
        events.push(ClientEvent::HistoryLoaded(history));

        for frame in self.pending.drain(..) {
            events.extend(Self::live_event(frame));
        }
    }

    fn live_event(frame: OutboundFrame) -> Option<ClientEvent> {
        match frame {
            OutboundFrame::AddMessage(message) => Some(ClientEvent::Message(message)),
            OutboundFrame::MessageDeleted(id) => Some(ClientEvent::MessageDeleted(id)),
            OutboundFrame::InitialPayload(_) | OutboundFrame::AddHistory(_) => None,
        }
    }
}

/// UDP chat client
pub struct ChatClient {
    config: ChatClientConfig,
    socket: UdpSocket,
    assigned_id: Option<ClientId>,
    gate: ReplayGate,
    ready: VecDeque<ClientEvent>,
}

impl ChatClient {
    /// Bind a local socket aimed at the hub
    pub async fn bind(config: ChatClientConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|e| ChatError::network(format!("Failed to bind client socket: {}", e)))?;
        socket
            .connect(config.server_addr)
            .await
            .map_err(|e| ChatError::network(format!("Failed to reach {}: {}", config.server_addr, e)))?;

        Ok(Self {
            config,
            socket,
            assigned_id: None,
            gate: ReplayGate::new(),
            ready: VecDeque::new(),
        })
    }

    /// Identity issued by the hub on the last join
    pub fn assigned_id(&self) -> Option<&str> {
        self.assigned_id.as_deref()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Join the hub. Without an explicit `assigned_id` the identity from a
    /// previous join, if any, is resumed.
    pub async fn connect(&mut self, username: &str, assigned_id: Option<ClientId>) -> Result<()> {
        let login = LoginInput {
            username: username.to_string(),
            assigned_id: assigned_id.or_else(|| self.assigned_id.clone()),
        };
        info!("Joining {} as {:?}", self.config.server_addr, login.username);
        self.send(&login).await
    }

    /// Post a message under the current identity
    pub async fn send_message(&self, content: impl Into<String>) -> Result<()> {
        let author_id = self.assigned_id.clone().unwrap_or_default();
        self.send(&Message::outgoing(content, author_id)).await
    }

    /// Ask the hub to delete one of our messages
    pub async fn delete_message(&self, message: &Message) -> Result<()> {
        let mut request = message.clone();
        if request.is_anonymous() {
            request.author_id = self.require_id()?.to_string();
        }
        self.send(&DeleteRequest(request)).await
    }

    /// Leave the hub; the identity is kept for a later resume
    pub async fn disconnect(&self) -> Result<()> {
        let id = self.require_id()?.to_string();
        self.send(&DisconnectRequest(id)).await
    }

    /// Wait for the next event from the hub
    pub async fn next_event(&mut self) -> Result<ClientEvent> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(event);
            }

            let len = self.socket.recv(&mut buf).await?;
            let frame = match Frame::decode(&buf[..len]).and_then(|f| OutboundFrame::decode(&f)) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Dropping frame from hub: {}", e);
                    continue;
                }
            };

            for event in self.gate.accept(frame) {
                if let ClientEvent::Welcome { assigned_id, .. } = &event {
                    self.assigned_id = Some(assigned_id.clone());
                }
                self.ready.push_back(event);
            }
        }
    }

    fn require_id(&self) -> Result<&str> {
        self.assigned_id
            .as_deref()
            .ok_or_else(|| ChatError::user_not_found("client has not joined yet"))
    }

    async fn send<T: Encodable>(&self, value: &T) -> Result<()> {
        let datagram: Bytes =
            encode(value).map_err(|e| ChatError::serialization(e.to_string()))?;
        if datagram.len() > self.config.max_frame_size {
            return Err(ChatError::resource_limit(format!(
                "{} frame is {} bytes (max {})",
                value.command(),
                datagram.len(),
                self.config.max_frame_size
            )));
        }

        self.socket.send(&datagram).await?;
        debug!("Sent {} ({} bytes)", value.command(), datagram.len());
        Ok(())
    }
}
