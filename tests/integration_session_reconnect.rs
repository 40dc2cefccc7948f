//! Verify a session recovers from a dropped transport: the originating side
//! reconnects with OPEN against the same session id, and the accepted side
//! (looked up from its listener's registry) keeps delivering on the same
//! logical session without the application ever seeing a new one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

use transport_rs::error::{TransportError, TransportResult};
use transport_rs::executor::Executor;
use transport_rs::session::wire::CreateInfo;
use transport_rs::session::{Session, SessionTransportObserver};
use transport_rs::transport::inprocess::InprocessTransportHost;
use transport_rs::transport::{AnyTransport, Transport};

/// Wraps a real transport and fails exactly its second `read` call, simulating
/// one transient drop of the underlying connection right after the handshake.
struct FlakyTransport {
    inner: Box<dyn Transport>,
    reads: AtomicUsize,
}

impl FlakyTransport {
    fn new(inner: Box<dyn Transport>) -> Self {
        FlakyTransport {
            inner,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn open(&mut self) -> TransportResult<()> {
        self.inner.open().await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.inner.close().await
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        let call = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 2 {
            return Err(TransportError::ConnectionClosed);
        }
        self.inner.read(buffer).await
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
        self.inner.executor()
    }
}

struct RecoveryObserver {
    recovered: Arc<Notify>,
}

impl SessionTransportObserver for RecoveryObserver {
    fn on_session_recovered(&self) {
        self.recovered.notify_one();
    }
}

#[tokio::test]
async fn session_reconnects_and_keeps_delivering_on_the_same_session() -> Result<()> {
    let host = InprocessTransportHost::new();
    let executor = Executor::current();

    let mut listener = Session::listen(
        AnyTransport::new(Box::new(host.create_server("reconnect-test", executor.clone()))),
        executor.clone(),
    );
    listener.open().await?;

    let flaky = FlakyTransport::new(Box::new(host.create_client("reconnect-test", executor.clone())));
    let mut client = Session::connect(
        AnyTransport::new(Box::new(flaky)),
        CreateInfo {
            name: "alice".into(),
            password: String::new(),
            force: false,
        },
        executor.clone(),
    );

    let recovered = Arc::new(Notify::new());
    client.set_session_transport_observer(Arc::new(RecoveryObserver {
        recovered: recovered.clone(),
    }));
    client.set_reconnection_period(Duration::from_millis(20));
    // Let the spawned setters land before the handshake starts racing them.
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.open().await?;
    let original_id = client.id().await;

    let mut server = listener.accept().await?;

    // The very next steady-state read fails, forcing a reconnect; wait for it.
    tokio::time::timeout(Duration::from_secs(5), recovered.notified())
        .await
        .expect("session did not recover from the induced drop");

    assert_eq!(client.id().await, original_id);
    assert!(client.is_opened().await);

    client.write(b"still here").await?;
    let mut buf = [0u8; 32];
    let n = server.read(&mut buf).await?;
    assert_eq!(&buf[..n], b"still here");

    Ok(())
}
