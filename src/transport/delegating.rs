//! Pass-through base that forwards every `Transport` method to a wrapped
//! transport. Grounded on `original_source/transport/delegating_transport.h`.
//!
//! The original holds its delegate by reference, since C++ callers keep the
//! wrapped transport alive elsewhere. A `dyn Transport` trait object needs a
//! `'static` owner in Rust, so this version owns the delegate outright;
//! [`crate::transport::intercepting::InterceptingTransport`] builds on this
//! the same way the original builds on `DelegatingTransport`.

use crate::error::TransportResult;
use crate::executor::Executor;
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;

pub struct DelegatingTransport {
    delegate: AnyTransport,
}

impl DelegatingTransport {
    pub fn new(delegate: AnyTransport) -> Self {
        DelegatingTransport { delegate }
    }

    pub fn delegate(&self) -> &AnyTransport {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut AnyTransport {
        &mut self.delegate
    }
}

#[async_trait]
impl Transport for DelegatingTransport {
    async fn open(&mut self) -> TransportResult<()> {
        self.delegate.open().await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.delegate.close().await
    }

    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        self.delegate.accept().await
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        self.delegate.read(buffer).await
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        self.delegate.write(data).await
    }

    fn name(&self) -> String {
        self.delegate.name()
    }

    fn message_oriented(&self) -> bool {
        self.delegate.message_oriented()
    }

    fn active(&self) -> bool {
        self.delegate.active()
    }

    fn connected(&self) -> bool {
        self.delegate.connected()
    }

    fn executor(&self) -> Executor {
        self.delegate.executor().unwrap_or_else(Executor::current)
    }
}
