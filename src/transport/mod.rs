//! The uniform transport contract and its owning wrapper.
//!
//! Every concrete substrate (TCP, UDP, serial, pipe, WebSocket, in-process) and
//! every decorator (framing, deferred, delegating/intercepting) implements
//! [`Transport`]. [`AnyTransport`] is the owning, type-erased handle callers
//! actually hold.

pub mod deferred;
pub mod delegating;
pub mod inprocess;
pub mod intercepting;
pub mod io_transport;
pub mod pipe;
pub mod serial;
pub mod tcp;
pub mod udp;
pub mod websocket;

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use async_trait::async_trait;

/// The capability set shared by every transport variant.
///
/// All operations may suspend and are cancellable by dropping the awaiting
/// task. Two concurrent `read`s (or two concurrent `write`s) on the same
/// transport produce an undefined interleaving and must be coordinated by the
/// caller, e.g. with [`crate::framing::write_queue::WriteQueue`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects (active transports) or binds and listens (passive transports).
    async fn open(&mut self) -> TransportResult<()>;

    /// Releases resources. Calling `close` twice returns `ConnectionClosed`
    /// the second time.
    async fn close(&mut self) -> TransportResult<()>;

    /// Produces one accepted child per call. Only valid on passive transports;
    /// non-passive transports return `InvalidArgument`.
    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        Err(TransportError::InvalidArgument(
            "accept is only valid on a passive transport".into(),
        ))
    }

    /// For stream transports, fills up to `buffer.len()` bytes. For
    /// message-oriented transports, reads exactly one whole message (and
    /// fails `InvalidArgument` if `buffer` is smaller than the next message).
    /// Returns `Ok(0)` iff the peer closed gracefully.
    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize>;

    /// Writes all of `data`, returning `data.len()` on success. Fails
    /// `ConnectionClosed` if the transport is not connected.
    async fn write(&mut self, data: &[u8]) -> TransportResult<usize>;

    /// A human-readable, non-suspending name for logging.
    fn name(&self) -> String;

    /// Whether `read`/`write` operate on whole messages rather than raw bytes.
    fn message_oriented(&self) -> bool;

    /// Whether this transport is the originating (client) side.
    fn active(&self) -> bool;

    /// Whether live I/O is currently permitted.
    fn connected(&self) -> bool;

    /// The executor this transport's operations are sequenced on.
    fn executor(&self) -> Executor;
}

/// An owning, type-erased handle to a [`Transport`] that tolerates being empty.
///
/// Every operation on an unbound `AnyTransport` returns `InvalidHandle` rather
/// than panicking; query methods return a safe default instead, since they are
/// non-suspending and have no error channel to report through.
pub struct AnyTransport {
    inner: Option<Box<dyn Transport>>,
}

impl AnyTransport {
    /// Wraps a concrete transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        AnyTransport {
            inner: Some(transport),
        }
    }

    /// An empty handle with no inner transport bound.
    pub fn empty() -> Self {
        AnyTransport { inner: None }
    }

    /// Whether an inner transport is bound.
    pub fn is_bound(&self) -> bool {
        self.inner.is_some()
    }

    /// Replaces the inner transport, returning the previous one (if any).
    pub fn rebind(&mut self, transport: Box<dyn Transport>) -> Option<Box<dyn Transport>> {
        self.inner.replace(transport)
    }

    /// Removes and returns the inner transport, leaving this handle empty.
    pub fn take(&mut self) -> Option<Box<dyn Transport>> {
        self.inner.take()
    }

    pub fn name(&self) -> String {
        match &self.inner {
            Some(t) => t.name(),
            None => String::new(),
        }
    }

    pub fn message_oriented(&self) -> bool {
        self.inner.as_ref().map(|t| t.message_oriented()).unwrap_or(false)
    }

    pub fn active(&self) -> bool {
        self.inner.as_ref().map(|t| t.active()).unwrap_or(false)
    }

    pub fn connected(&self) -> bool {
        self.inner.as_ref().map(|t| t.connected()).unwrap_or(false)
    }

    pub fn executor(&self) -> Option<Executor> {
        self.inner.as_ref().map(|t| t.executor())
    }

    pub async fn open(&mut self) -> TransportResult<()> {
        match &mut self.inner {
            Some(t) => t.open().await,
            None => Err(TransportError::InvalidHandle),
        }
    }

    pub async fn close(&mut self) -> TransportResult<()> {
        match &mut self.inner {
            Some(t) => t.close().await,
            None => Err(TransportError::InvalidHandle),
        }
    }

    pub async fn accept(&mut self) -> TransportResult<AnyTransport> {
        match &mut self.inner {
            Some(t) => t.accept().await,
            None => Err(TransportError::InvalidHandle),
        }
    }

    pub async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        match &mut self.inner {
            Some(t) => t.read(buffer).await,
            None => Err(TransportError::InvalidHandle),
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        match &mut self.inner {
            Some(t) => t.write(data).await,
            None => Err(TransportError::InvalidHandle),
        }
    }
}

impl Default for AnyTransport {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_any_transport_returns_invalid_handle() {
        let mut t = AnyTransport::empty();
        assert!(!t.is_bound());
        assert_eq!(t.name(), "");
        assert!(!t.connected());
        assert!(matches!(t.open().await, Err(TransportError::InvalidHandle)));
        assert!(matches!(t.close().await, Err(TransportError::InvalidHandle)));
        assert!(matches!(
            t.read(&mut [0u8; 4]).await,
            Err(TransportError::InvalidHandle)
        ));
        assert!(matches!(
            t.write(&[0u8; 4]).await,
            Err(TransportError::InvalidHandle)
        ));
    }
}
