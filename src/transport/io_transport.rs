//! Generic wrapper turning any non-blocking async I/O object into a [`Transport`].

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::Transport;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Extra per-substrate teardown a concrete `IoTransport` user provides.
///
/// Mirrors the original's `Cleanup()` hook, called once when the transport
/// transitions to closed (either via an explicit `close()` or a graceful
/// peer close observed on `read`).
#[async_trait]
pub trait IoCleanup: Send + Sync {
    async fn cleanup(&mut self) {}
}

/// Wraps any `AsyncRead + AsyncWrite` object as a byte-oriented [`Transport`].
///
/// `read` forwards to the inner object's `read`. `write` loops via
/// `write_all` until every byte is queued to the kernel. `close` is
/// idempotent in the sense described by the transport contract: calling it a
/// second time returns `ConnectionClosed`.
pub struct IoTransport<IO> {
    io: Option<IO>,
    name: String,
    active: bool,
    closed: bool,
    connected: bool,
    executor: Executor,
}

impl<IO> IoTransport<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(io: IO, name: impl Into<String>, active: bool, executor: Executor) -> Self {
        IoTransport {
            io: Some(io),
            name: name.into(),
            active,
            closed: false,
            connected: true,
            executor,
        }
    }

    pub fn io_mut(&mut self) -> Option<&mut IO> {
        self.io.as_mut()
    }
}

#[async_trait]
impl<IO> Transport for IoTransport<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn open(&mut self) -> TransportResult<()> {
        // The I/O object is already connected by the time it is wrapped;
        // concrete substrates perform the actual connect/bind before
        // constructing an `IoTransport`.
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.closed = true;
        self.connected = false;
        self.io = None;
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        let io = self.io.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let n = io.read(buffer).await?;
        if n == 0 {
            self.connected = false;
        }
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        if self.closed || !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        let io = self.io.as_mut().ok_or(TransportError::ConnectionClosed)?;
        io.write_all(data).await?;
        Ok(data.len())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn message_oriented(&self) -> bool {
        false
    }

    fn active(&self) -> bool {
        self.active
    }

    fn connected(&self) -> bool {
        self.connected && !self.closed
    }

    fn executor(&self) -> Executor {
        self.executor.clone()
    }
}
