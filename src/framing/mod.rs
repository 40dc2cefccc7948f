//! Message framing: turning streams of bytes (or streams of lower-level
//! messages) into the application's discrete messages, and back.

pub mod byte_message;
pub mod message_reader;
pub mod message_reader_transport;
pub mod message_receiver;
pub mod write_queue;
