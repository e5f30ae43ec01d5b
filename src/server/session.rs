//! Per-participant session state and outbound delivery
//!
//! Each session owns an [`Outbox`]: a bounded FIFO of encoded datagrams that a
//! dedicated delivery task drains onto the shared socket. The hub only ever
//! enqueues, so a slow or unreachable participant never blocks it.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::messages::{ClientId, ClientRecord, clamp_display_name};

#[derive(Debug, Default)]
struct OutboxState {
    queue: VecDeque<Bytes>,
    /// Where queued datagrams go; follows the participant across rejoins
    address: Option<SocketAddr>,
    dropped: u64,
}

/// Bounded outbound queue; when full the oldest datagram is discarded
#[derive(Debug)]
pub struct Outbox {
    state: Mutex<OutboxState>,
    notify: Notify,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(OutboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue a datagram. Returns false if an older datagram was dropped to
    /// make room.
    pub fn push(&self, datagram: Bytes) -> bool {
        let mut evicted = false;
        {
            let mut state = self.state.lock();
            if state.queue.len() >= self.capacity {
                state.queue.pop_front();
                state.dropped += 1;
                evicted = true;
            }
            state.queue.push_back(datagram);
        }
        self.notify.notify_one();
        !evicted
    }

    fn pop(&self) -> Option<(Bytes, Option<SocketAddr>)> {
        let mut state = self.state.lock();
        let address = state.address;
        state.queue.pop_front().map(|datagram| (datagram, address))
    }

    /// Wait for the next datagram together with its current destination
    pub async fn next(&self) -> (Bytes, Option<SocketAddr>) {
        loop {
            if let Some(item) = self.pop() {
                return item;
            }
            // notify_one keeps a permit if nobody is waiting yet
            self.notify.notified().await;
        }
    }

    pub fn set_address(&self, address: SocketAddr) {
        self.state.lock().address = Some(address);
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.state.lock().address
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Datagrams discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

/// A registered participant
#[derive(Debug)]
pub struct ClientSession {
    id: ClientId,
    display_name: String,
    online: bool,
    outbox: Arc<Outbox>,
    delivery: Option<JoinHandle<()>>,
}

impl ClientSession {
    pub fn new(id: ClientId, display_name: String, queue_capacity: usize) -> Self {
        Self {
            id,
            display_name,
            online: false,
            outbox: Arc::new(Outbox::new(queue_capacity)),
            delivery: None,
        }
    }

    /// Rebuild an offline session from its persisted record
    pub fn from_record(record: ClientRecord, queue_capacity: usize) -> Self {
        Self::new(record.id, clamp_display_name(&record.name), queue_capacity)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.outbox.address()
    }

    pub fn set_address(&self, address: SocketAddr) {
        self.outbox.set_address(address);
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Persisted form of this session
    pub fn record(&self) -> ClientRecord {
        ClientRecord {
            name: self.display_name.clone(),
            online: self.online,
            id: self.id.clone(),
        }
    }

    /// Queue an encoded frame for this participant
    pub fn enqueue(&self, datagram: Bytes) {
        if !self.outbox.push(datagram) {
            debug!(
                "Outbound queue for {} full, dropped oldest datagram ({} total)",
                self.id,
                self.outbox.dropped()
            );
        }
    }

    /// Start the delivery task if it is not running yet
    pub fn ensure_delivery(&mut self, socket: &Arc<UdpSocket>) {
        if self.delivery.is_some() {
            return;
        }
        let id = self.id.clone();
        let outbox = Arc::clone(&self.outbox);
        let socket = Arc::clone(socket);
        self.delivery = Some(tokio::spawn(deliver(id, outbox, socket)));
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Some(task) = self.delivery.take() {
            task.abort();
        }
    }
}

/// Drain an outbox onto the socket, one datagram at a time
async fn deliver(id: ClientId, outbox: Arc<Outbox>, socket: Arc<UdpSocket>) {
    loop {
        let (datagram, address) = outbox.next().await;
        let Some(address) = address else {
            debug!("No address for {}, dropping datagram", id);
            continue;
        };

        if let Err(e) = socket.send_to(&datagram, address).await {
            warn!("Failed to send to {} at {}: {}", id, address, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outbox_drops_oldest() {
        let outbox = Outbox::new(2);
        assert!(outbox.push(Bytes::from_static(b"a")));
        assert!(outbox.push(Bytes::from_static(b"b")));
        assert!(!outbox.push(Bytes::from_static(b"c")));

        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.dropped(), 1);
        assert_eq!(outbox.pop().unwrap().0, Bytes::from_static(b"b"));
        assert_eq!(outbox.pop().unwrap().0, Bytes::from_static(b"c"));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_record_reflects_session() {
        let mut session = ClientSession::new("id-1".to_string(), "alice".to_string(), 4);
        session.set_online(true);
        assert_eq!(
            session.record(),
            ClientRecord {
                name: "alice".to_string(),
                online: true,
                id: "id-1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_delivery_preserves_order() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut session = ClientSession::new("id-1".to_string(), "alice".to_string(), 8);
        session.set_address(peer.local_addr().unwrap());
        for datagram in ["one", "two", "three"] {
            session.enqueue(Bytes::from(datagram));
        }
        session.ensure_delivery(&server);

        let mut buf = [0u8; 64];
        for expected in ["one", "two", "three"] {
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..n], expected.as_bytes());
        }
    }
}
