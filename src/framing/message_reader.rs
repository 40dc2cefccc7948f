//! Turns a byte or message stream into discrete application messages.
//! Grounded on `original_source/transport/message_reader.h`.
//!
//! The original's `Pop` returns 0 to mean both "no complete message yet" and,
//! ambiguously, is also the value a zero-length message would produce.
//! [`PopOutcome`] replaces that overload with an explicit sum type so a
//! legitimate empty message can never be mistaken for "incomplete".

use crate::error::{TransportError, TransportResult};
use crate::framing::byte_message::ByteMessage;

/// Implemented once per wire format to tell the reader how many bytes a
/// message needs once its length-defining prefix is available.
pub trait BytesExpected: Send + Sync {
    /// Given what has been buffered so far, returns the total number of bytes
    /// the current message needs (header included), or `None` if the prefix
    /// itself hasn't arrived yet. Returns an error if the buffered prefix is
    /// malformed.
    fn bytes_expected(&self, buffered: &[u8]) -> TransportResult<Option<usize>>;
}

pub enum PopOutcome {
    /// No complete message is buffered yet.
    Incomplete,
    /// A complete message, already removed from the internal buffer.
    Complete(Vec<u8>),
}

/// Buffers bytes from a transport and slices out whole messages per a
/// [`BytesExpected`] policy. One instance is bound to one connection; `Clone`
/// produces a fresh reader with the same policy and an empty buffer, used
/// when a passive [`super::message_reader_transport::MessageReaderTransport`]
/// accepts a new child.
pub struct MessageReader<P: BytesExpected + Clone> {
    buffer: ByteMessage,
    policy: P,
    error_correction: bool,
}

impl<P: BytesExpected + Clone> MessageReader<P> {
    pub fn new(capacity: usize, policy: P) -> Self {
        MessageReader {
            buffer: ByteMessage::with_capacity(capacity),
            policy,
            error_correction: false,
        }
    }

    pub fn set_error_correction(&mut self, enabled: bool) {
        self.error_correction = enabled;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// The free region a transport read should fill next.
    pub fn prepare(&mut self) -> &mut [u8] {
        self.buffer.write_buffer()
    }

    /// Registers bytes a transport read wrote into [`prepare`]'s slice.
    pub fn bytes_read(&mut self, count: usize) -> TransportResult<()> {
        self.buffer.commit_write(count)
    }

    /// Attempts to slice a complete message out of the buffer without reading
    /// any more bytes from the transport.
    pub fn pop(&mut self) -> TransportResult<PopOutcome> {
        let buffered = self.buffer.filled();
        let expected = match self.policy.bytes_expected(buffered) {
            Ok(Some(n)) => n,
            Ok(None) => return Ok(PopOutcome::Incomplete),
            Err(e) => {
                if self.error_correction && self.buffer.pop_front(1).is_ok() {
                    return Ok(PopOutcome::Incomplete);
                }
                return Err(e);
            }
        };

        if expected > self.buffer.len() {
            return Ok(PopOutcome::Incomplete);
        }

        let message = self.buffer.filled()[..expected].to_vec();
        self.buffer.pop_front(expected)?;
        Ok(PopOutcome::Complete(message))
    }
}

impl<P: BytesExpected + Clone> Clone for MessageReader<P> {
    fn clone(&self) -> Self {
        MessageReader {
            buffer: ByteMessage::with_capacity(self.buffer.capacity()),
            policy: self.policy.clone(),
            error_correction: self.error_correction,
        }
    }
}

/// A [`BytesExpected`] policy for a fixed-width length prefix: the first
/// `prefix_len` bytes (little-endian) give the number of bytes that follow.
#[derive(Clone)]
pub struct LengthPrefixed {
    pub prefix_len: usize,
}

impl LengthPrefixed {
    pub fn u16() -> Self {
        LengthPrefixed { prefix_len: 2 }
    }

    pub fn u32() -> Self {
        LengthPrefixed { prefix_len: 4 }
    }
}

impl BytesExpected for LengthPrefixed {
    fn bytes_expected(&self, buffered: &[u8]) -> TransportResult<Option<usize>> {
        if buffered.len() < self.prefix_len {
            return Ok(None);
        }
        let body_len = match self.prefix_len {
            2 => u16::from_le_bytes([buffered[0], buffered[1]]) as usize,
            4 => u32::from_le_bytes([buffered[0], buffered[1], buffered[2], buffered[3]]) as usize,
            other => {
                return Err(TransportError::Failed(format!(
                    "unsupported length prefix width: {other}"
                )))
            }
        };
        Ok(Some(self.prefix_len + body_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_until_prefix_and_body_arrive() {
        let mut reader = MessageReader::new(64, LengthPrefixed::u16());
        reader.prepare()[..2].copy_from_slice(&3u16.to_le_bytes());
        reader.bytes_read(2).unwrap();
        assert!(matches!(reader.pop().unwrap(), PopOutcome::Incomplete));

        reader.prepare()[..3].copy_from_slice(b"abc");
        reader.bytes_read(3).unwrap();
        match reader.pop().unwrap() {
            PopOutcome::Complete(msg) => assert_eq!(msg, b"\x03\x00abc"),
            PopOutcome::Incomplete => panic!("expected a complete message"),
        }
    }

    #[test]
    fn zero_length_body_is_complete_not_incomplete() {
        let mut reader = MessageReader::new(8, LengthPrefixed::u16());
        reader.prepare()[..2].copy_from_slice(&0u16.to_le_bytes());
        reader.bytes_read(2).unwrap();
        match reader.pop().unwrap() {
            PopOutcome::Complete(msg) => assert_eq!(msg, b"\x00\x00"),
            PopOutcome::Incomplete => panic!("a zero-length body is still a complete message"),
        }
    }

    #[test]
    fn clone_produces_independent_empty_reader() {
        let mut reader = MessageReader::new(8, LengthPrefixed::u16());
        reader.prepare()[..2].copy_from_slice(&0u16.to_le_bytes());
        reader.bytes_read(2).unwrap();

        let cloned = reader.clone();
        assert!(cloned.is_empty());
        assert!(!reader.is_empty());
    }
}
