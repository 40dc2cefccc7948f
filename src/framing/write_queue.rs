//! Serializes writes onto a transport into FIFO order. Grounded on
//! `original_source/transport/write_queue.{h,cpp}`: each `write` call chains
//! behind the previous one via a handoff signal, generalized here from a
//! boost::asio channel to a chained `tokio::sync::oneshot`.

use crate::error::TransportResult;
use crate::executor::Executor;
use crate::transport::AnyTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

pub struct WriteQueue {
    transport: Arc<Mutex<AnyTransport>>,
    last_write: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    alive: Arc<AtomicBool>,
    executor: Executor,
}

impl WriteQueue {
    pub fn new(transport: Arc<Mutex<AnyTransport>>, executor: Executor) -> Self {
        WriteQueue {
            transport,
            last_write: Arc::new(Mutex::new(None)),
            alive: Arc::new(AtomicBool::new(true)),
            executor,
        }
    }

    async fn chained_write(
        transport: Arc<Mutex<AnyTransport>>,
        last_write: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
        data: Vec<u8>,
    ) -> TransportResult<usize> {
        let (tx, rx) = oneshot::channel();
        let previous = last_write.lock().await.replace(rx);

        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let result = transport.lock().await.write(&data).await;
        let _ = tx.send(());
        result
    }

    /// Queues `data` behind any write already in flight, then writes it and
    /// returns the result once it's this write's turn and it has completed.
    pub async fn write(&self, data: Vec<u8>) -> TransportResult<usize> {
        Self::chained_write(self.transport.clone(), self.last_write.clone(), data).await
    }

    /// Fire-and-forget write: enqueues the write on this queue's executor and
    /// returns immediately, preserving submission order relative to other
    /// writes on the same queue. Dropping the `WriteQueue` cancels any
    /// not-yet-run blind write.
    pub fn blind_write(&self, data: Vec<u8>) {
        let transport = self.transport.clone();
        let last_write = self.last_write.clone();
        let alive = self.alive.clone();
        self.executor.spawn(async move {
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = Self::chained_write(transport, last_write, data).await;
        });
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::inprocess::InprocessTransportHost;
    use crate::transport::Transport;

    #[tokio::test]
    async fn concurrent_writes_are_delivered_in_submission_order() {
        let host = InprocessTransportHost::new();
        let executor = Executor::current();
        let mut server = host.create_server("write-queue-test", executor.clone());
        server.open().await.unwrap();
        let mut client = host.create_client("write-queue-test", executor.clone());
        client.open().await.unwrap();
        let mut accepted = server.accept().await.unwrap();

        let transport = Arc::new(Mutex::new(AnyTransport::new(Box::new(client))));
        let queue = WriteQueue::new(transport, executor);

        let a = queue.write(b"first".to_vec());
        let b = queue.write(b"second".to_vec());
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();

        let mut buf = [0u8; 16];
        let n = accepted.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"first");
        let n = accepted.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"second");
    }
}
