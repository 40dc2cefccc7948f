//! Decorator that gives a caller the chance to short-circuit `write` without
//! touching the wrapped transport. Grounded on
//! `original_source/transport/intercepting_transport.h` and
//! `transport_interceptor.h`.

use crate::error::TransportResult;
use crate::executor::Executor;
use crate::transport::delegating::DelegatingTransport;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;

/// A hook for redirecting writes. `intercept_write` returning `Some` replaces
/// the wrapped transport's write entirely; `None` falls through to it.
pub trait TransportInterceptor: Send + Sync {
    fn intercept_write(&self, _data: &[u8]) -> Option<TransportResult<usize>> {
        None
    }
}

pub struct InterceptingTransport<I: TransportInterceptor> {
    inner: DelegatingTransport,
    interceptor: I,
}

impl<I: TransportInterceptor> InterceptingTransport<I> {
    pub fn new(underlying: AnyTransport, interceptor: I) -> Self {
        InterceptingTransport {
            inner: DelegatingTransport::new(underlying),
            interceptor,
        }
    }
}

#[async_trait]
impl<I: TransportInterceptor + 'static> Transport for InterceptingTransport<I> {
    async fn open(&mut self) -> TransportResult<()> {
        self.inner.open().await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.inner.close().await
    }

    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        self.inner.accept().await
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        self.inner.read(buffer).await
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        if let Some(result) = self.interceptor.intercept_write(data) {
            return result;
        }
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
        self.inner.executor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::inprocess::InprocessTransportHost;

    struct DropAll;
    impl TransportInterceptor for DropAll {
        fn intercept_write(&self, data: &[u8]) -> Option<TransportResult<usize>> {
            Some(Ok(data.len()))
        }
    }

    #[tokio::test]
    async fn intercepted_write_never_reaches_the_delegate() {
        let host = InprocessTransportHost::new();
        let executor = Executor::current();
        let mut server = host.create_server("intercept-test", executor.clone());
        server.open().await.unwrap();
        let mut client = host.create_client("intercept-test", executor.clone());
        client.open().await.unwrap();
        let mut accepted = server.accept().await.unwrap();

        let mut intercepted = InterceptingTransport::new(AnyTransport::new(Box::new(client)), DropAll);
        let n = intercepted.write(b"swallowed").await.unwrap();
        assert_eq!(n, 9);

        accepted.write(b"ping").await.unwrap();
        let mut buf = [0u8; 8];
        let n = intercepted.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}
