//! Fixed-capacity cursor buffer underlying [`super::message_reader::MessageReader`].
//! Grounded on `original_source/transport/bytemsg.h`'s `ByteMessage`: a
//! capacity/size/pos triple over a flat buffer, generalized from raw-pointer
//! arithmetic to a `Vec<u8>` and from `throw`-on-misuse to `TransportResult`.

use crate::error::{TransportError, TransportResult};

/// A buffer with a fixed capacity, a filled length (`size`), and a read cursor
/// (`pos`). Bytes before `pos` have been consumed; bytes in `[pos, size)` are
/// unread; bytes in `[size, capacity)` are free write space.
#[derive(Debug)]
pub struct ByteMessage {
    data: Vec<u8>,
    capacity: usize,
    size: usize,
    pos: usize,
}

impl ByteMessage {
    pub fn with_capacity(capacity: usize) -> Self {
        ByteMessage {
            data: vec![0u8; capacity],
            capacity,
            size: 0,
            pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn end(&self) -> bool {
        self.pos >= self.size
    }

    /// Bytes available to read from the cursor onward.
    pub fn max_read(&self) -> usize {
        self.size - self.pos
    }

    /// Free space remaining after the filled region.
    pub fn max_write(&self) -> usize {
        self.capacity - self.size
    }

    /// The unread portion of the buffer, from the cursor to `size`.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..self.size]
    }

    /// The filled portion of the buffer from the start, ignoring the cursor.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// The free region past `size`, for a caller to read a transport into directly.
    pub fn write_buffer(&mut self) -> &mut [u8] {
        &mut self.data[self.size..self.capacity]
    }

    /// Extends `size` by `count` bytes already written into [`write_buffer`].
    pub fn commit_write(&mut self, count: usize) -> TransportResult<()> {
        if self.size + count > self.capacity {
            return Err(TransportError::Failed("byte message write overflow".into()));
        }
        self.size += count;
        Ok(())
    }

    pub fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        if self.size + bytes.len() > self.capacity {
            return Err(TransportError::Failed("byte message write overflow".into()));
        }
        let start = self.size;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
        Ok(())
    }

    pub fn read(&mut self, count: usize) -> TransportResult<&[u8]> {
        if self.pos + count > self.size {
            return Err(TransportError::Failed("byte message read overflow".into()));
        }
        let start = self.pos;
        self.pos += count;
        Ok(&self.data[start..start + count])
    }

    pub fn read_u8(&mut self) -> TransportResult<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> TransportResult<u16> {
        let bytes = self.read(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> TransportResult<u32> {
        let bytes = self.read(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_u8(&mut self, v: u8) -> TransportResult<()> {
        self.write(&[v])
    }

    pub fn write_u16_le(&mut self, v: u16) -> TransportResult<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, v: u32) -> TransportResult<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn seek(&mut self, pos: usize) -> TransportResult<()> {
        if pos > self.size {
            return Err(TransportError::Failed("byte message seek out of range".into()));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.size = 0;
        self.pos = 0;
    }

    pub fn reset_cursor(&mut self) {
        self.pos = 0;
    }

    /// Drops `count` bytes from the front, sliding the remainder down. Used to
    /// remove a fully-parsed message, or to drop one byte during error
    /// correction resync.
    pub fn pop_front(&mut self, count: usize) -> TransportResult<()> {
        if count > self.size {
            return Err(TransportError::Failed("too much data to pop".into()));
        }
        self.data.copy_within(count..self.size, 0);
        self.size -= count;
        self.pos = self.pos.saturating_sub(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_typed_values() {
        let mut msg = ByteMessage::with_capacity(16);
        msg.write_u8(7).unwrap();
        msg.write_u16_le(1234).unwrap();
        msg.write_u32_le(0xdead_beef).unwrap();

        assert_eq!(msg.read_u8().unwrap(), 7);
        assert_eq!(msg.read_u16_le().unwrap(), 1234);
        assert_eq!(msg.read_u32_le().unwrap(), 0xdead_beef);
        assert!(msg.end());
    }

    #[test]
    fn pop_front_slides_remaining_bytes_and_adjusts_cursor() {
        let mut msg = ByteMessage::with_capacity(8);
        msg.write(b"abcdef").unwrap();
        msg.read(2).unwrap();
        msg.pop_front(3).unwrap();
        assert_eq!(msg.filled(), b"def");
        assert_eq!(msg.pos(), 0);
    }

    #[test]
    fn write_past_capacity_is_an_error() {
        let mut msg = ByteMessage::with_capacity(2);
        assert!(msg.write(b"abc").is_err());
    }
}
