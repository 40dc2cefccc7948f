//! # transport-rs
//!
//! An asynchronous transport abstraction, message framing layer, and
//! reliable session protocol over TCP, UDP, serial, named pipes, WebSocket,
//! and in-process channels.
//!
//! The [`transport`] module defines the core `Transport` trait every
//! substrate implements; [`framing`] turns byte or datagram streams into
//! discrete application messages; [`session`] layers a reconnecting,
//! ordered, ack-based protocol on top of any transport; [`transport_string`]
//! and [`factory`] parse a connection-string DSL into a concrete transport.

pub mod error;
pub mod executor;
pub mod factory;
pub mod framing;
pub mod logging;
pub mod session;
pub mod transport;
pub mod transport_string;

pub use error::{TransportError, TransportResult};
pub use executor::Executor;
pub use factory::Factory;
pub use transport::{AnyTransport, Transport};
