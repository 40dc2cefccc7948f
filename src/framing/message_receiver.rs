//! Drives a transport's `read` in a loop, handing each message (or byte
//! chunk, for non-message-oriented transports) to a callback until the
//! connection closes. Grounded on
//! `original_source/transport/message_receiver.h`.

use crate::error::TransportResult;
use crate::transport::AnyTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag. Cloning shares the same underlying flag;
/// [`cancel`](Self::cancel) stops any [`MessageReceiver::run`] loop sharing it
/// before its next iteration.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct MessageReceiver {
    transport: AnyTransport,
    max_message_size: usize,
}

impl MessageReceiver {
    pub fn new(transport: AnyTransport, max_message_size: usize) -> Self {
        MessageReceiver {
            transport,
            max_message_size,
        }
    }

    /// Runs until the transport closes, a read errors, or `cancellation` is
    /// set, calling `handler` with each non-empty chunk read.
    pub async fn run<H>(&mut self, cancellation: CancellationToken, mut handler: H) -> TransportResult<()>
    where
        H: FnMut(&[u8]),
    {
        let mut buffer = vec![0u8; self.max_message_size];
        loop {
            let n = self.transport.read(&mut buffer).await?;
            if cancellation.is_cancelled() || n == 0 {
                return Ok(());
            }
            handler(&buffer[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::transport::inprocess::InprocessTransportHost;
    use crate::transport::Transport;

    #[tokio::test]
    async fn invokes_handler_for_each_message_until_peer_closes() {
        let host = InprocessTransportHost::new();
        let executor = Executor::current();
        let mut server = host.create_server("receiver-test", executor.clone());
        server.open().await.unwrap();
        let mut client = host.create_client("receiver-test", executor.clone());
        client.open().await.unwrap();
        let accepted = server.accept().await.unwrap();

        let handle = tokio::spawn(async move {
            let mut received = Vec::new();
            let mut receiver = MessageReceiver::new(accepted, 64);
            receiver
                .run(CancellationToken::new(), |chunk| received.push(chunk.to_vec()))
                .await
                .unwrap();
            received
        });

        client.write(b"one").await.unwrap();
        client.write(b"two").await.unwrap();
        client.close().await.unwrap();
        drop(client);

        let received = handle.await.unwrap();
        assert_eq!(received, vec![b"one".to_vec(), b"two".to_vec()]);
    }
}
