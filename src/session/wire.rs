//! The session wire format and the tunable constants that govern it.
//!
//! Grounded on `original_source/transport/session/session.h` and
//! `session.cpp`: each frame is length-prefixed (reusing
//! [`crate::framing::message_reader::LengthPrefixed`]) with a one-byte opcode
//! immediately following the prefix. Response frames set [`RESPONSE_BIT`] on
//! the request's opcode.

use crate::error::{TransportError, TransportResult};
use crate::framing::byte_message::ByteMessage;
use crate::session::id::SessionId;

/// Largest payload handed to a single `Session::write` before it is split
/// into sequence fragments. Matches the original's `kMaxMessage - 64`.
pub const MAX_PROTOCOL_MESSAGE: usize = 960;

/// In-flight unacknowledged messages allowed before `write` backs off.
pub const MAX_SENDING_COUNT: usize = 50;

/// Acknowledgments are flushed after this many arrive, whichever is first
/// relative to the 1s coalescing window run by the session's poll loop.
pub const MAX_ACKNOWLEDGE_COUNT: u32 = 8;

/// A long message reassembled from `SEQUENCE` fragments may not exceed
/// sixteen fragments' worth of payload.
pub const SEQUENCE_BUFFER_CAP: usize = 16 * MAX_PROTOCOL_MESSAGE;

/// Capacity of the length-prefixed framer wrapped around byte-oriented child
/// transports, sized generously above a single encoded protocol frame.
pub const FRAMER_CAPACITY: usize = 4096;

pub const RESPONSE_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Create = 1,
    Open = 2,
    Close = 3,
    Message = 4,
    Ack = 5,
    Test = 6,
    Sequence = 7,
}

impl Opcode {
    fn from_u8(byte: u8) -> TransportResult<Self> {
        match byte & !RESPONSE_BIT {
            1 => Ok(Opcode::Create),
            2 => Ok(Opcode::Open),
            3 => Ok(Opcode::Close),
            4 => Ok(Opcode::Message),
            5 => Ok(Opcode::Ack),
            6 => Ok(Opcode::Test),
            7 => Ok(Opcode::Sequence),
            other => Err(TransportError::Failed(format!("unknown session opcode {other}"))),
        }
    }
}

/// Result code carried in a response frame's first four bytes.
pub const STATUS_OK: u32 = 0;
pub const STATUS_REFUSED: u32 = 1;
pub const STATUS_NOT_FOUND: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateInfo {
    pub name: String,
    pub password: String,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: u32,
    pub user_rights: u32,
}

#[derive(Debug, Clone)]
pub enum Frame {
    Create(CreateInfo),
    CreateResponse {
        status: u32,
        session_id: SessionId,
        info: SessionInfo,
    },
    Open(SessionId),
    OpenResponse {
        status: u32,
        info: SessionInfo,
    },
    Close,
    Message {
        send_id: u16,
        ack: u16,
        payload: Vec<u8>,
    },
    Sequence {
        send_id: u16,
        ack: u16,
        payload: Vec<u8>,
    },
    Ack {
        ack: u16,
    },
    Test,
}

fn write_string(msg: &mut ByteMessage, s: &str) -> TransportResult<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u8::MAX as usize {
        return Err(TransportError::InvalidArgument("string too long for session frame".into()));
    }
    msg.write_u8(bytes.len() as u8)?;
    msg.write(bytes)
}

fn read_string(msg: &mut ByteMessage) -> TransportResult<String> {
    let len = msg.read_u8()? as usize;
    let bytes = msg.read(len)?.to_vec();
    String::from_utf8(bytes).map_err(|e| TransportError::Failed(e.to_string()))
}

/// Encodes `frame`'s opcode and body, without the outer length prefix.
fn encode_body(frame: &Frame) -> TransportResult<Vec<u8>> {
    let mut msg = ByteMessage::with_capacity(FRAMER_CAPACITY);
    match frame {
        Frame::Create(info) => {
            msg.write_u8(Opcode::Create as u8)?;
            write_string(&mut msg, &info.name)?;
            write_string(&mut msg, &info.password)?;
            msg.write_u8(info.force as u8)?;
        }
        Frame::CreateResponse { status, session_id, info } => {
            msg.write_u8(Opcode::Create as u8 | RESPONSE_BIT)?;
            msg.write_u32_le(*status)?;
            msg.write(session_id.as_bytes())?;
            msg.write_u32_le(info.user_id)?;
            msg.write_u32_le(info.user_rights)?;
        }
        Frame::Open(id) => {
            msg.write_u8(Opcode::Open as u8)?;
            msg.write(id.as_bytes())?;
        }
        Frame::OpenResponse { status, info } => {
            msg.write_u8(Opcode::Open as u8 | RESPONSE_BIT)?;
            msg.write_u32_le(*status)?;
            msg.write_u32_le(info.user_id)?;
            msg.write_u32_le(info.user_rights)?;
        }
        Frame::Close => {
            msg.write_u8(Opcode::Close as u8)?;
        }
        Frame::Message { send_id, ack, payload } => {
            msg.write_u8(Opcode::Message as u8)?;
            msg.write_u16_le(*send_id)?;
            msg.write_u16_le(*ack)?;
            msg.write(payload)?;
        }
        Frame::Sequence { send_id, ack, payload } => {
            msg.write_u8(Opcode::Sequence as u8)?;
            msg.write_u16_le(*send_id)?;
            msg.write_u16_le(*ack)?;
            msg.write(payload)?;
        }
        Frame::Ack { ack } => {
            msg.write_u8(Opcode::Ack as u8)?;
            msg.write_u16_le(*ack)?;
        }
        Frame::Test => {
            msg.write_u8(Opcode::Test as u8)?;
        }
    }
    Ok(msg.filled().to_vec())
}

/// Encodes a complete, ready-to-write wire frame: a two-byte little-endian
/// length prefix followed by the opcode and body.
pub fn encode_frame(frame: &Frame) -> TransportResult<Vec<u8>> {
    let body = encode_body(frame)?;
    if body.len() > u16::MAX as usize {
        return Err(TransportError::InvalidArgument("session frame too large".into()));
    }
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a frame previously reassembled by the length-prefixed framer,
/// including its two-byte prefix.
pub fn decode_frame(raw: &[u8]) -> TransportResult<Frame> {
    if raw.len() < 3 {
        return Err(TransportError::Failed("session frame too short".into()));
    }
    let mut msg = ByteMessage::with_capacity(raw.len());
    msg.write(raw)?;
    msg.seek(2)?;

    let opcode_byte = msg.read_u8()?;
    let response = opcode_byte & RESPONSE_BIT != 0;
    let opcode = Opcode::from_u8(opcode_byte)?;

    match (opcode, response) {
        (Opcode::Create, false) => Ok(Frame::Create(CreateInfo {
            name: read_string(&mut msg)?,
            password: read_string(&mut msg)?,
            force: msg.read_u8()? != 0,
        })),
        (Opcode::Create, true) => {
            let status = msg.read_u32_le()?;
            let mut id_bytes = [0u8; 16];
            id_bytes.copy_from_slice(msg.read(16)?);
            let user_id = msg.read_u32_le()?;
            let user_rights = msg.read_u32_le()?;
            Ok(Frame::CreateResponse {
                status,
                session_id: SessionId::from_bytes(id_bytes),
                info: SessionInfo { user_id, user_rights },
            })
        }
        (Opcode::Open, false) => {
            let mut id_bytes = [0u8; 16];
            id_bytes.copy_from_slice(msg.read(16)?);
            Ok(Frame::Open(SessionId::from_bytes(id_bytes)))
        }
        (Opcode::Open, true) => {
            let status = msg.read_u32_le()?;
            let user_id = msg.read_u32_le()?;
            let user_rights = msg.read_u32_le()?;
            Ok(Frame::OpenResponse {
                status,
                info: SessionInfo { user_id, user_rights },
            })
        }
        (Opcode::Close, _) => Ok(Frame::Close),
        (Opcode::Message, _) => {
            let send_id = msg.read_u16_le()?;
            let ack = msg.read_u16_le()?;
            let payload = msg.read(msg.max_read())?.to_vec();
            Ok(Frame::Message { send_id, ack, payload })
        }
        (Opcode::Sequence, _) => {
            let send_id = msg.read_u16_le()?;
            let ack = msg.read_u16_le()?;
            let payload = msg.read(msg.max_read())?.to_vec();
            Ok(Frame::Sequence { send_id, ack, payload })
        }
        (Opcode::Ack, _) => Ok(Frame::Ack { ack: msg.read_u16_le()? }),
        (Opcode::Test, _) => Ok(Frame::Test),
    }
}

/// `a < b` in the modulo-2^16 message id space the session uses for send
/// ids, receive ids, and acks, so wraparound after 65535 orders correctly.
pub fn id_less(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) < 0 && a != b
}

pub fn id_less_eq(a: u16, b: u16) -> bool {
    a == b || id_less(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_frame_round_trips() {
        let frame = Frame::Create(CreateInfo {
            name: "alice".into(),
            password: "secret".into(),
            force: true,
        });
        let encoded = encode_frame(&frame).unwrap();
        match decode_frame(&encoded).unwrap() {
            Frame::Create(info) => {
                assert_eq!(info.name, "alice");
                assert_eq!(info.password, "secret");
                assert!(info.force);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn message_frame_round_trips_with_payload() {
        let frame = Frame::Message {
            send_id: 7,
            ack: 3,
            payload: b"hello".to_vec(),
        };
        let encoded = encode_frame(&frame).unwrap();
        match decode_frame(&encoded).unwrap() {
            Frame::Message { send_id, ack, payload } => {
                assert_eq!(send_id, 7);
                assert_eq!(ack, 3);
                assert_eq!(payload, b"hello");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn create_response_round_trips() {
        let id = SessionId::new_random();
        let frame = Frame::CreateResponse {
            status: STATUS_OK,
            session_id: id,
            info: SessionInfo {
                user_id: 42,
                user_rights: 7,
            },
        };
        let encoded = encode_frame(&frame).unwrap();
        match decode_frame(&encoded).unwrap() {
            Frame::CreateResponse { status, session_id, info } => {
                assert_eq!(status, STATUS_OK);
                assert_eq!(session_id, id);
                assert_eq!(info.user_id, 42);
                assert_eq!(info.user_rights, 7);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn modulo_16_ordering_wraps_around() {
        assert!(id_less(1, 2));
        assert!(!id_less(2, 1));
        assert!(id_less(65535, 0));
        assert!(!id_less(0, 65535));
        assert!(id_less_eq(5, 5));
    }
}
