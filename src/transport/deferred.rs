//! Decorator that runs an additional close handler alongside a wrapped
//! transport's own teardown, and treats a graceful zero-byte read as a close
//! event. Grounded on `original_source/transport/deferred_transport.{h,cpp}`;
//! the original dispatches its close handler onto the transport's executor
//! from a separate thread context. Every `Transport` method here already runs
//! on that executor (tokio tasks are not preemptively multiplexed across
//! threads the way the original's boost::asio strands are), so the handler is
//! simply called in place rather than re-dispatched.

use crate::error::TransportResult;
use crate::executor::Executor;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;

/// Called once, with the error the underlying transport closed with (`Ok(())`
/// for a graceful close).
pub type CloseHandler = Box<dyn FnMut(TransportResult<()>) + Send + Sync>;

pub struct DeferredTransport {
    inner: AnyTransport,
    close_handler: Option<CloseHandler>,
    fired: bool,
}

impl DeferredTransport {
    pub fn new(inner: AnyTransport) -> Self {
        DeferredTransport {
            inner,
            close_handler: None,
            fired: false,
        }
    }

    /// Rebinds the additional close handler. Replaces any previously set one.
    pub fn set_close_handler(&mut self, handler: CloseHandler) {
        self.close_handler = Some(handler);
    }

    fn fire(&mut self, result: TransportResult<()>) {
        if self.fired {
            return;
        }
        self.fired = true;
        if let Some(handler) = self.close_handler.as_mut() {
            handler(result);
        }
    }
}

#[async_trait]
impl Transport for DeferredTransport {
    async fn open(&mut self) -> TransportResult<()> {
        match self.inner.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fire(Err(e.clone()));
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        let result = self.inner.close().await;
        self.fire(result.clone());
        result
    }

    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        self.inner.accept().await
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let n = self.inner.read(buffer).await?;
        if n == 0 {
            self.fire(Ok(()));
        }
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        self.inner.write(data).await
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn message_oriented(&self) -> bool {
        self.inner.message_oriented()
    }

    fn active(&self) -> bool {
        self.inner.active()
    }

    fn connected(&self) -> bool {
        self.inner.connected()
    }

    fn executor(&self) -> Executor {
        self.inner
            .executor()
            .unwrap_or_else(Executor::current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::inprocess::InprocessTransportHost;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn zero_byte_read_fires_close_handler_once() {
        let host = InprocessTransportHost::new();
        let executor = Executor::current();
        let mut server = host.create_server("deferred-test", executor.clone());
        server.open().await.unwrap();
        let mut client = host.create_client("deferred-test", executor.clone());
        client.open().await.unwrap();
        let accepted = server.accept().await.unwrap();

        let mut deferred = DeferredTransport::new(accepted);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        deferred.set_close_handler(Box::new(move |_| {
            fired_clone.store(true, Ordering::SeqCst);
        }));

        drop(client);
        let mut buf = [0u8; 8];
        let n = deferred.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(fired.load(Ordering::SeqCst));
    }
}
