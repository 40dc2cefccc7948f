//! In-process transport: a named, process-local rendezvous point. One side
//! binds passively under a name; the other connects actively to the same
//! name. No OS resources are involved, which makes this substrate the
//! natural one for deterministic session-layer tests.

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const CHANNEL_CAPACITY: usize = 256;

/// Owns the name → listener registry. Passed explicitly to every constructor
/// rather than reached through a global, per the no-hidden-globals design note.
#[derive(Clone, Default)]
pub struct InprocessTransportHost {
    listeners: Arc<Mutex<HashMap<String, mpsc::Sender<AnyTransport>>>>,
}

impl InprocessTransportHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_server(&self, name: impl Into<String>, executor: Executor) -> PassiveInprocessTransport {
        PassiveInprocessTransport {
            host: self.clone(),
            name: name.into(),
            accept_rx: None,
            executor,
            opened: false,
        }
    }

    pub fn create_client(&self, name: impl Into<String>, executor: Executor) -> ActiveInprocessTransport {
        ActiveInprocessTransport {
            host: self.clone(),
            name: name.into(),
            channel: None,
            executor,
        }
    }
}

/// One endpoint of an in-process rendezvous: a send half and a receive half.
struct ChannelHalf {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

fn make_pair() -> (ChannelHalf, ChannelHalf) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_to_a_tx, b_to_a_rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        ChannelHalf {
            tx: a_to_b_tx,
            rx: b_to_a_rx,
        },
        ChannelHalf {
            tx: b_to_a_tx,
            rx: a_to_b_rx,
        },
    )
}

/// The listening (server) side of a named in-process channel.
pub struct PassiveInprocessTransport {
    host: InprocessTransportHost,
    name: String,
    accept_rx: Option<mpsc::Receiver<AnyTransport>>,
    executor: Executor,
    opened: bool,
}

#[async_trait]
impl Transport for PassiveInprocessTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.opened {
            return Err(TransportError::AddressInUse);
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut listeners = self.host.listeners.lock().await;
        if listeners.contains_key(&self.name) {
            return Err(TransportError::AddressInUse);
        }
        listeners.insert(self.name.clone(), tx);
        self.accept_rx = Some(rx);
        self.opened = true;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.opened {
            return Err(TransportError::ConnectionClosed);
        }
        self.host.listeners.lock().await.remove(&self.name);
        self.opened = false;
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
        format!("server:{}", self.name)
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        false
    }

    fn connected(&self) -> bool {
        self.opened
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

/// The originating (client) side of a named in-process channel.
pub struct ActiveInprocessTransport {
    host: InprocessTransportHost,
    name: String,
    channel: Option<ChannelHalf>,
    executor: Executor,
}

#[async_trait]
impl Transport for ActiveInprocessTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.channel.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let server_tx = {
            let listeners = self.host.listeners.lock().await;
            listeners
                .get(&self.name)
                .cloned()
                .ok_or(TransportError::ConnectionClosed)?
        };

        let (client_half, server_half) = make_pair();
        let accepted = InprocessChannelTransport {
            tx: server_half.tx,
            rx: server_half.rx,
            name: format!("server:{}", self.name),
            connected: true,
            executor: self.executor.clone(),
        };

        server_tx
            .send(AnyTransport::new(Box::new(accepted)))
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;

        self.channel = Some(client_half);
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.channel.take().is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let channel = self.channel.as_mut().ok_or(TransportError::ConnectionClosed)?;
        match channel.rx.recv().await {
            Some(msg) => {
                if buffer.len() < msg.len() {
                    return Err(TransportError::InvalidArgument("buffer too small".into()));
                }
                buffer[..msg.len()].copy_from_slice(&msg);
                Ok(msg.len())
            }
            None => Ok(0),
        }
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let channel = self.channel.as_mut().ok_or(TransportError::ConnectionClosed)?;
        channel
            .tx
            .send(data.to_vec())
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        format!("client:{}", self.name)
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        true
    }

    fn connected(&self) -> bool {
        self.channel.is_some()
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

/// The accepted-side handle a server gets back from `accept()`.
struct InprocessChannelTransport {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    name: String,
    connected: bool,
    executor: Executor,
}

#[async_trait]
impl Transport for InprocessChannelTransport {
    async fn open(&mut self) -> TransportResult<()> {
        Err(TransportError::AddressInUse)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.connected = false;
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        match self.rx.recv().await {
            Some(msg) => {
                if buffer.len() < msg.len() {
                    return Err(TransportError::InvalidArgument("buffer too small".into()));
                }
                buffer[..msg.len()].copy_from_slice(&msg);
                Ok(msg.len())
            }
            None => Ok(0),
        }
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(data.to_vec())
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        self.name.clone()
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
    async fn client_and_server_exchange_messages() {
        let host = InprocessTransportHost::new();
        let executor = Executor::current();
        let mut server = host.create_server("chan-a", executor.clone());
        server.open().await.unwrap();

        let mut client = host.create_client("chan-a", executor.clone());
        client.open().await.unwrap();

        let mut accepted = server.accept().await.unwrap();

        client.write(b"hi").await.unwrap();
        let mut buf = [0u8; 8];
        let n = accepted.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi");

        accepted.write(b"there").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"there");
    }

    #[tokio::test]
    async fn connecting_to_unknown_name_fails() {
        let host = InprocessTransportHost::new();
        let mut client = host.create_client("missing", Executor::current());
        assert!(matches!(
            client.open().await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
