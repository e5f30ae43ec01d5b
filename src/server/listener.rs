//! UDP listener: reads datagrams and feeds the hub
//!
//! One receive loop owns the socket's read side. Each datagram is decoded on
//! its own task and forwarded to the hub as a typed event.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::ChatConfig;
use crate::error::{ChatError, Result};
use crate::protocol::codec::InboundFrame;
use crate::protocol::frame::Frame;
use crate::server::hub::{Hub, HubEvent, HubHandle};
use crate::store::ChatStore;

/// Bound chat server: socket, running hub, and the receive loop
pub struct Listener {
    config: ChatConfig,
    socket: Arc<UdpSocket>,
    hub: HubHandle,
}

impl Listener {
    /// Bind the socket and start the hub
    pub async fn bind(config: ChatConfig, store: Arc<dyn ChatStore>) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|e| ChatError::network(format!("Failed to bind {}: {}", config.bind_addr, e)))?;
        let socket = Arc::new(socket);
        info!("Chat hub listening on {}", socket.local_addr()?);

        let (hub, handle) = Hub::new(config.clone(), store, Arc::clone(&socket)).await?;
        hub.spawn();

        Ok(Self {
            config,
            socket,
            hub: handle,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Handle to the hub this listener feeds
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Receive datagrams forever
    pub async fn run(self) -> Result<()> {
        let max_frame_size = self.config.max_frame_size;
        // One spare byte so oversized datagrams can be told apart
        let mut buf = vec![0u8; max_frame_size + 1];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Receive error: {}", e);
                    continue;
                }
            };

            if len > max_frame_size {
                let err = ChatError::resource_limit(format!(
                    "datagram from {} exceeds {} bytes",
                    addr, max_frame_size
                ));
                warn!("Dropping frame: {}", err);
                continue;
            }

            let datagram = Bytes::copy_from_slice(&buf[..len]);
            let hub = self.hub.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatch(&hub, &datagram, addr).await {
                    warn!("Dropping frame from {} [{}]: {}", addr, e.code(), e.message());
                }
            });
        }
    }

    /// Receive datagrams until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Shutting down listener");
                Ok(())
            }
        }
    }
}

/// Decode one datagram and hand it to the hub
async fn dispatch(hub: &HubHandle, datagram: &[u8], addr: SocketAddr) -> Result<()> {
    let frame = Frame::decode(datagram).map_err(|e| ChatError::protocol(e.to_string()))?;
    let inbound = InboundFrame::decode(&frame).map_err(|e| ChatError::protocol(e.to_string()))?;
    debug!("{} from {}", inbound.command(), addr);

    hub.send(HubEvent::from_frame(inbound, addr)).await
}
