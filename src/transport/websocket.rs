//! WebSocket substrate. The handshake itself is delegated to
//! `tokio-tungstenite`; this module treats an established connection as an
//! opaque message-oriented accepted byte stream, one `Transport::read`/`write`
//! per WebSocket message frame.

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ServerStream = WebSocketStream<TcpStream>;

fn message_to_bytes(message: WsMessage) -> Option<Vec<u8>> {
    match message {
        WsMessage::Binary(data) => Some(data),
        WsMessage::Text(text) => Some(text.into_bytes()),
        _ => None,
    }
}

/// The originating side of a WebSocket connection.
pub struct ActiveWebSocketTransport {
    url: String,
    stream: Option<ClientStream>,
    connected: bool,
    executor: Executor,
}

impl ActiveWebSocketTransport {
    pub fn new(url: impl Into<String>, executor: Executor) -> Self {
        ActiveWebSocketTransport {
            url: url.into(),
            stream: None,
            connected: false,
            executor,
        }
    }
}

#[async_trait]
impl Transport for ActiveWebSocketTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.stream.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let (stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        self.stream = Some(stream);
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        let mut stream = self.stream.take().ok_or(TransportError::ConnectionClosed)?;
        self.connected = false;
        let _ = stream.close(None).await;
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        loop {
            match stream.next().await {
                Some(Ok(msg)) => {
                    if let Some(bytes) = message_to_bytes(msg) {
                        if buffer.len() < bytes.len() {
                            return Err(TransportError::InvalidArgument("buffer too small".into()));
                        }
                        buffer[..bytes.len()].copy_from_slice(&bytes);
                        return Ok(bytes.len());
                    }
                    continue;
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(TransportError::Failed(e.to_string()));
                }
                None => {
                    self.connected = false;
                    return Ok(0);
                }
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stream
            .send(WsMessage::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        format!("WS:{}", self.url)
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

/// The listening side of a WebSocket connection.
pub struct PassiveWebSocketTransport {
    host: String,
    port: u16,
    listener: Option<TcpListener>,
    executor: Executor,
}

impl PassiveWebSocketTransport {
    pub fn new(host: impl Into<String>, port: u16, executor: Executor) -> Self {
        PassiveWebSocketTransport {
            host: host.into(),
            port,
            listener: None,
            executor,
        }
    }
}

#[async_trait]
impl Transport for PassiveWebSocketTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.listener.is_some() {
            return Err(TransportError::AddressInUse);
        }
        self.listener = Some(TcpListener::bind((self.host.as_str(), self.port)).await?);
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.listener.take().is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }

    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        let listener = self.listener.as_ref().ok_or(TransportError::ConnectionClosed)?;
        let (tcp, peer) = listener.accept().await?;
        let stream = accept_async(tcp)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        let accepted = AcceptedWebSocketTransport {
            stream: Some(stream),
            peer: peer.to_string(),
            connected: true,
            executor: self.executor.clone(),
        };
        Ok(AnyTransport::new(Box::new(accepted)))
    }

    async fn read(&mut self, _buffer: &mut [u8]) -> TransportResult<usize> {
        Err(TransportError::AccessDenied)
    }

    async fn write(&mut self, _data: &[u8]) -> TransportResult<usize> {
        Err(TransportError::AccessDenied)
    }

    fn name(&self) -> String {
        format!("WS:{}:{}", self.host, self.port)
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        false
    }

    fn connected(&self) -> bool {
        self.listener.is_some()
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

struct AcceptedWebSocketTransport {
    stream: Option<ServerStream>,
    peer: String,
    connected: bool,
    executor: Executor,
}

#[async_trait]
impl Transport for AcceptedWebSocketTransport {
    async fn open(&mut self) -> TransportResult<()> {
        Err(TransportError::AddressInUse)
    }

    async fn close(&mut self) -> TransportResult<()> {
        let mut stream = self.stream.take().ok_or(TransportError::ConnectionClosed)?;
        self.connected = false;
        let _ = stream.close(None).await;
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        loop {
            match stream.next().await {
                Some(Ok(msg)) => {
                    if let Some(bytes) = message_to_bytes(msg) {
                        if buffer.len() < bytes.len() {
                            return Err(TransportError::InvalidArgument("buffer too small".into()));
                        }
                        buffer[..bytes.len()].copy_from_slice(&bytes);
                        return Ok(bytes.len());
                    }
                    continue;
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(TransportError::Failed(e.to_string()));
                }
                None => {
                    self.connected = false;
                    return Ok(0);
                }
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stream
            .send(WsMessage::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        format!("WS:{}", self.peer)
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
