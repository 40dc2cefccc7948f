//! Wraps a byte- or message-oriented child transport to produce whole
//! messages from `read`, per a [`MessageReader`] policy. Grounded on
//! `original_source/transport/message_reader_transport.{h,cpp}`.

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::framing::message_reader::{BytesExpected, MessageReader, PopOutcome};
use crate::transport::{AnyTransport, Transport};
use async_trait::async_trait;

pub struct MessageReaderTransport<P: BytesExpected + Clone + 'static> {
    child: AnyTransport,
    reader: MessageReader<P>,
    opened: bool,
    reading: bool,
}

impl<P: BytesExpected + Clone + 'static> MessageReaderTransport<P> {
    pub fn new(child: AnyTransport, reader: MessageReader<P>) -> Self {
        MessageReaderTransport {
            child,
            reader,
            opened: false,
            reading: false,
        }
    }

    pub fn reader(&self) -> &MessageReader<P> {
        &self.reader
    }
}

#[async_trait]
impl<P: BytesExpected + Clone + 'static> Transport for MessageReaderTransport<P> {
    async fn open(&mut self) -> TransportResult<()> {
        if self.opened {
            return Err(TransportError::AddressInUse);
        }
        self.child.open().await?;
        self.opened = true;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.opened {
            return Err(TransportError::ConnectionClosed);
        }
        self.opened = false;
        self.reader.reset();
        self.child.close().await
    }

    async fn accept(&mut self) -> TransportResult<AnyTransport> {
        let accepted_child = self.child.accept().await?;
        let accepted = MessageReaderTransport::new(accepted_child, self.reader.clone());
        Ok(AnyTransport::new(Box::new(accepted)))
    }

    async fn read(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        if !self.opened {
            return Err(TransportError::ConnectionClosed);
        }
        if self.reading {
            return Err(TransportError::IoPending);
        }
        self.reading = true;
        let result = self.read_message(buffer).await;
        self.reading = false;
        if result.is_err() {
            self.opened = false;
        }
        result
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<usize> {
        self.child.write(data).await
    }

    fn name(&self) -> String {
        format!("MSG:{}", self.child.name())
    }

    fn message_oriented(&self) -> bool {
        true
    }

    fn active(&self) -> bool {
        self.child.active()
    }

    fn connected(&self) -> bool {
        self.child.connected()
    }

    fn executor(&self) -> Executor {
        self.child.executor().unwrap_or_else(Executor::current)
    }
}

impl<P: BytesExpected + Clone + 'static> MessageReaderTransport<P> {
    async fn read_message(&mut self, buffer: &mut [u8]) -> TransportResult<usize> {
        loop {
            match self.reader.pop()? {
                PopOutcome::Complete(message) => {
                    if buffer.len() < message.len() {
                        return Err(TransportError::InvalidArgument("buffer too small".into()));
                    }
                    buffer[..message.len()].copy_from_slice(&message);
                    return Ok(message.len());
                }
                PopOutcome::Incomplete => {}
            }

            // A message-oriented child must never hand back a partial message
            // while the reader still holds an unfinished one.
            if !self.reader.is_empty() && self.child.message_oriented() {
                return Err(TransportError::Failed(
                    "composite message contains a partial message".into(),
                ));
            }

            let slot = self.reader.prepare();
            if slot.is_empty() {
                return Err(TransportError::Failed("message exceeds reader capacity".into()));
            }
            let n = self.child.read(slot).await?;
            if n == 0 {
                return Ok(0);
            }
            self.reader.bytes_read(n)?;
        }
    }
}
