//! TCP substrate: an active (client) transport and a passive (listening) transport.
//!
//! Grounded on the connection bookkeeping and `socket2` tuning already present
//! in the teacher's Unix-domain-socket and TCP-socket transports, generalized
//! to the [`Transport`] contract: a passive transport's `accept` hands back an
//! [`AnyTransport`] wrapping an [`IoTransport<TcpStream>`] rather than the
//! teacher's bespoke multi-client connection map.

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::io_transport::IoTransport;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

fn tune(stream: &TcpStream) -> TransportResult<()> {
    let sock = socket2::SockRef::from(stream);
    sock.set_nodelay(true)?;
    Ok(())
}

/// The originating side of a TCP connection.
pub struct ActiveTcpTransport {
    host: String,
    port: u16,
    stream: Option<IoTransport<TcpStream>>,
    executor: Executor,
}

impl ActiveTcpTransport {
    pub fn new(host: impl Into<String>, port: u16, executor: Executor) -> Self {
        ActiveTcpTransport {
            host: host.into(),
            port,
            stream: None,
            executor,
        }
    }
}

#[async_trait]
impl Transport for ActiveTcpTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.stream.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tune(&stream)?;
        self.stream = Some(IoTransport::new(
            stream,
            format!("TCP:{}:{}", self.host, self.port),
            true,
            self.executor.clone(),
        ));
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self.stream.as_mut() {
            Some(s) => s.close().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stream.read(buffer).await
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stream.write(data).await
    }

    fn name(&self) -> String {
        format!("TCP:{}:{}", self.host, self.port)
    }

    fn message_oriented(&self) -> bool {
        false
    }

    fn active(&self) -> bool {
        true
    }

    fn connected(&self) -> bool {
        self.stream.as_ref().map(|s| s.connected()).unwrap_or(false)
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}

/// The listening side of a TCP connection. `accept` yields one accepted
/// child per incoming connection.
pub struct PassiveTcpTransport {
    host: String,
    port: u16,
    listener: Option<TcpListener>,
    executor: Executor,
}

impl PassiveTcpTransport {
    pub fn new(host: impl Into<String>, port: u16, executor: Executor) -> Self {
        PassiveTcpTransport {
            host: host.into(),
            port,
            listener: None,
            executor,
        }
    }
}

#[async_trait]
impl Transport for PassiveTcpTransport {
    async fn open(&mut self) -> TransportResult<()> {
        if self.listener.is_some() {
            return Err(TransportError::AddressInUse);
        }
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        self.listener = Some(listener);
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
        let (stream, peer) = listener.accept().await?;
        tune(&stream)?;
        let io = IoTransport::new(stream, format!("TCP:{peer}"), false, self.executor.clone());
        Ok(AnyTransport::new(Box::new(io)))
    }

    async fn read(&mut self, _buffer: &mut [u8]) -> TransportResult<usize> {
        Err(TransportError::AccessDenied)
    }

    async fn write(&mut self, _data: &[u8]) -> TransportResult<usize> {
        Err(TransportError::AccessDenied)
    }

    fn name(&self) -> String {
        format!("TCP:{}:{}", self.host, self.port)
    }

    fn message_oriented(&self) -> bool {
        false
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
