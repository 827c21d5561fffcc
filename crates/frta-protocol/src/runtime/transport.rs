use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;

use crate::error::FrtaError;
use crate::types::NodeAddress;

/// Link-layer abstraction for the runtime.
///
/// Production: [`UdpTransport`] (one UDP socket on the control port).
/// Tests: `MockTransport` (records sends, injects receptions).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Put a packet on the shared medium for every neighbor in range.
    async fn broadcast(&self, data: &[u8]) -> Result<(), FrtaError>;

    /// Send a packet to one neighbor.
    async fn send_to(&self, neighbor: NodeAddress, data: &[u8]) -> Result<(), FrtaError>;

    /// Wait for the next packet and report which neighbor sent it.
    async fn recv(&self) -> Result<(NodeAddress, Vec<u8>), FrtaError>;
}

// ── UdpTransport (production) ───────────────────────────────────────

/// Largest control packet is 20 bytes; anything bigger is truncated on read.
const DEFAULT_RECV_BUFFER: usize = 1500;

/// Control packets over UDP, broadcast enabled.
///
/// Every node binds the same control port; unicast and broadcast both target
/// that port on the remote side.
pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
    broadcast_addr: Ipv4Addr,
    recv_buffer: usize,
}

impl UdpTransport {
    pub async fn bind(bind: SocketAddrV4, broadcast_addr: Ipv4Addr) -> Result<Self, FrtaError> {
        let socket = UdpSocket::bind(bind).await?;
        socket.set_broadcast(true)?;
        let port = socket.local_addr()?.port();
        tracing::info!(%bind, port, %broadcast_addr, "control socket bound");
        Ok(Self {
            socket,
            port,
            broadcast_addr,
            recv_buffer: DEFAULT_RECV_BUFFER,
        })
    }

    pub fn recv_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer = bytes.max(1);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FrtaError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    async fn broadcast(&self, data: &[u8]) -> Result<(), FrtaError> {
        let to = SocketAddrV4::new(self.broadcast_addr, self.port);
        self.socket.send_to(data, to).await?;
        Ok(())
    }

    async fn send_to(&self, neighbor: NodeAddress, data: &[u8]) -> Result<(), FrtaError> {
        let to = SocketAddrV4::new(neighbor, self.port);
        self.socket.send_to(data, to).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<(NodeAddress, Vec<u8>), FrtaError> {
        let mut buf = vec![0u8; self.recv_buffer];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        match from {
            SocketAddr::V4(v4) => {
                buf.truncate(n);
                Ok((*v4.ip(), buf))
            }
            SocketAddr::V6(v6) => Err(FrtaError::Transport(format!(
                "ignoring IPv6 sender {v6}"
            ))),
        }
    }
}

// ── MockTransport (tests) ───────────────────────────────────────────

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use crate::types::Target;

    /// Fake medium: records what the runtime sends and lets the test inject
    /// packets "from" any neighbor.
    #[derive(Clone)]
    pub struct MockTransport {
        sent: Arc<Mutex<Vec<(Target, Vec<u8>)>>>,
        fail_sends: Arc<Mutex<bool>>,
        inbox_tx: mpsc::UnboundedSender<(NodeAddress, Vec<u8>)>,
        inbox_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(NodeAddress, Vec<u8>)>>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                fail_sends: Arc::new(Mutex::new(false)),
                inbox_tx,
                inbox_rx: Arc::new(tokio::sync::Mutex::new(inbox_rx)),
            }
        }

        pub fn sent(&self) -> Vec<(Target, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn clear_sent(&self) {
            self.sent.lock().unwrap().clear();
        }

        pub fn set_fail_sends(&self, fail: bool) {
            *self.fail_sends.lock().unwrap() = fail;
        }

        /// Make `data` arrive as if `from` had transmitted it.
        pub fn deliver(&self, from: NodeAddress, data: Vec<u8>) {
            let _ = self.inbox_tx.send((from, data));
        }

        fn record(&self, target: Target, data: &[u8]) -> Result<(), FrtaError> {
            if *self.fail_sends.lock().unwrap() {
                return Err(FrtaError::Transport("mock: send failed".to_string()));
            }
            self.sent.lock().unwrap().push((target, data.to_vec()));
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn broadcast(&self, data: &[u8]) -> Result<(), FrtaError> {
            self.record(Target::Broadcast, data)
        }

        async fn send_to(&self, neighbor: NodeAddress, data: &[u8]) -> Result<(), FrtaError> {
            self.record(Target::Unicast(neighbor), data)
        }

        async fn recv(&self) -> Result<(NodeAddress, Vec<u8>), FrtaError> {
            let mut rx = self.inbox_rx.lock().await;
            rx.recv()
                .await
                .ok_or_else(|| FrtaError::Transport("mock: inbox closed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ControlMessage, TrustTag};

    #[tokio::test]
    async fn test_udp_loopback_send_to_self() {
        let bind = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
        let transport = UdpTransport::bind(bind, Ipv4Addr::LOCALHOST).await.unwrap();
        let packet = ControlMessage::TrustUpdate(Some(TrustTag { trust: 0.8 })).to_bytes();

        transport.send_to(Ipv4Addr::LOCALHOST, &packet).await.unwrap();
        let (from, data) = transport.recv().await.unwrap();

        assert_eq!(from, Ipv4Addr::LOCALHOST);
        assert_eq!(data, packet);
    }

    #[tokio::test]
    async fn test_mock_records_and_fails() {
        let mock = mock::MockTransport::new();
        mock.broadcast(&[1, 2]).await.unwrap();
        mock.send_to(Ipv4Addr::new(10, 0, 0, 2), &[3]).await.unwrap();
        assert_eq!(mock.sent().len(), 2);

        mock.set_fail_sends(true);
        assert!(mock.broadcast(&[4]).await.is_err());
        assert_eq!(mock.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_delivers_injected_packets() {
        let mock = mock::MockTransport::new();
        mock.deliver(Ipv4Addr::new(10, 0, 0, 7), vec![4]);
        let (from, data) = mock.recv().await.unwrap();
        assert_eq!(from, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(data, vec![4]);
    }
}
