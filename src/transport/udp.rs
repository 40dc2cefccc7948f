//! UDP substrate: an active transport, and a passive transport that
//! demultiplexes datagrams by source endpoint into per-peer accepted
//! transports (§4.6).

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

const ACCEPT_CHANNEL_CAPACITY: usize = 128;
const PER_PEER_CHANNEL_CAPACITY: usize = 256;

/// The originating side of a UDP "connection" (a socket connected to one peer).
pub struct ActiveUdpTransport {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    connected: bool,
    executor: Executor,
}

impl ActiveUdpTransport {
    pub fn new(host: impl Into<String>, port: u16, executor: Executor) -> Self {
        ActiveUdpTransport {
            host: host.into(),
            port,
            socket: None,
            connected: false,
            executor,
        }
    }
}

#[async_trait]
impl Transport for ActiveUdpTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.socket.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((self.host.as_str(), self.port)).await?;
        self.socket = Some(socket);
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.socket.take().is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        self.connected = false;
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        // Matches the original: an active UDP core has no inbound read path
        // of its own (datagrams destined to an ephemeral client socket are
        // read directly); reading is a protocol error here.
        let _ = buffer;
        Err(TransportError::Failed("active UDP transport has no read path".into()))
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::ConnectionClosed)?;
        socket.send(data).await?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        "UDP".into()
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        true
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

type PeerRegistry = Mutex<HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>>;

/// The listening side of a UDP socket. A single socket is shared among every
/// accepted transport; writes on an accepted transport call back into this
/// core to send via the shared socket.
pub struct PassiveUdpTransport {
    host: String,
    port: u16,
    socket: Option<Arc<UdpSocket>>,
    registry: Arc<PeerRegistry>,
    accept_rx: Option<mpsc::Receiver<AnyTransport>>,
    accept_tx: mpsc::Sender<AnyTransport>,
    recv_task: Option<tokio::task::JoinHandle<()>>,
    executor: Executor,
}

impl PassiveUdpTransport {
    pub fn new(host: impl Into<String>, port: u16, executor: Executor) -> Self {
        let (accept_tx, accept_rx) = mpsc::channel(ACCEPT_CHANNEL_CAPACITY);
        PassiveUdpTransport {
            host: host.into(),
            port,
            socket: None,
            registry: Arc::new(Mutex::new(HashMap::new())),
            accept_rx: Some(accept_rx),
            accept_tx,
            recv_task: None,
            executor,
        }
    }
}

#[async_trait]
impl Transport for PassiveUdpTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.socket.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let socket = Arc::new(UdpSocket::bind((self.host.as_str(), self.port)).await?);
        self.socket = Some(socket.clone());

        let registry = self.registry.clone();
        let accept_tx = self.accept_tx.clone();
        let executor = self.executor.clone();
        let socket_for_task = socket.clone();

        self.recv_task = Some(self.executor.spawn(async move {
            let mut buf = vec![0u8; 65_535];
            loop {
                let (n, peer) = match socket_for_task.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                let datagram = buf[..n].to_vec();

                let existing_sender = {
                    let guard = registry.lock().await;
                    guard.get(&peer).cloned()
                };

                if let Some(sender) = existing_sender {
                    if sender.send(datagram).await.is_err() {
                        registry.lock().await.remove(&peer);
                    }
                    continue;
                }

                let (tx, rx) = mpsc::channel(PER_PEER_CHANNEL_CAPACITY);
                registry.lock().await.insert(peer, tx.clone());

                let accepted = AcceptedUdpTransport {
                    socket: socket_for_task.clone(),
                    peer,
                    receiver: rx,
                    registry: Arc::downgrade(&registry),
                    connected: true,
                    executor: executor.clone(),
                };

                if accept_tx.send(AnyTransport::new(Box::new(accepted))).await.is_err() {
                    registry.lock().await.remove(&peer);
                    continue;
                }

                let _ = tx.send(datagram).await;
            }
        }));

        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.socket.take().is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.registry.lock().await.clear();
        Ok(())
    }

    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        let rx = self.accept_rx.as_mut().ok_or(TransportError::ConnectionClosed)?;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    async fn read(&mut self, _buffer: &mut [u8]) -> TransportResult<usize> {
        Err(TransportError::AccessDenied)
    }

    async fn write(&mut self, _data: &[u8]) -> TransportResult<usize> {
        Err(TransportError::AccessDenied)
    }

    fn name(&self) -> String {
        format!("UDP:{}:{}", self.host, self.port)
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        false
    }

    fn connected(&self) -> bool {
        self.socket.is_some()
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

/// A transport representing one peer endpoint demultiplexed out of a
/// [`PassiveUdpTransport`]'s shared socket.
pub struct AcceptedUdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    receiver: mpsc::Receiver<Vec<u8>>,
    registry: Weak<PeerRegistry>,
    connected: bool,
    executor: Executor,
}

#[async_trait]
impl Transport for AcceptedUdpTransport {
    async fn open(&mut self) -> TransportResult<()> {
        Err(TransportError::AddressInUse)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.connected = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().await.remove(&self.peer);
        }
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        match self.receiver.recv().await {
            Some(datagram) => {
                if buffer.len() < datagram.len() {
                    return Err(TransportError::InvalidArgument(
                        "buffer smaller than next datagram".into(),
                    ));
                }
                buffer[..datagram.len()].copy_from_slice(&datagram);
                Ok(datagram.len())
            }
            None => Ok(0),
        }
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.socket.send_to(data, self.peer).await?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        format!("UDP:{}", self.peer)
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        false
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demuxes_two_sources_into_two_accepted_transports() {
        let executor = Executor::current();
        let mut passive = PassiveUdpTransport::new("127.0.0.1", 19001, executor.clone());
        passive.open().await.unwrap();

        let s1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let s2 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest: SocketAddr = "127.0.0.1:19001".parse().unwrap();

        s1.send_to(b"from-s1", dest).await.unwrap();
        let mut t1 = passive.accept().await.unwrap();

        s2.send_to(b"from-s2", dest).await.unwrap();
        let mut t2 = passive.accept().await.unwrap();

        let mut buf = [0u8; 32];
        let n = t1.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"from-s1");

        let n = t2.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"from-s2");
    }

    #[tokio::test]
    async fn accepted_transport_writes_back_to_its_peer() {
        let executor = Executor::current();
        let mut passive = PassiveUdpTransport::new("127.0.0.1", 19002, executor.clone());
        passive.open().await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest: SocketAddr = "127.0.0.1:19002".parse().unwrap();
        client.send_to(b"ping", dest).await.unwrap();

        let mut accepted = passive.accept().await.unwrap();
        let mut buf = [0u8; 32];
        accepted.read(&mut buf).await.unwrap();
        accepted.write(b"pong").await.unwrap();

        let mut reply = [0u8; 32];
        let (n, _) = client.recv_from(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"pong");
    }
}
