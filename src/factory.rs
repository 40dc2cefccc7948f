//! Builds a concrete [`Transport`] from a parsed [`TransportString`].
//! Grounded on `original_source/transport/transport_factory_impl.h/.cpp`'s
//! `TransportFactoryImpl::CreateTransport`.

use crate::error::{TransportError, TransportResult};
use crate::executor::Executor;
use crate::transport::inprocess::InprocessTransportHost;
use crate::transport::pipe::PipeTransport;
use crate::transport::serial::{SerialOptions, SerialTransport};
use crate::transport::tcp::{ActiveTcpTransport, PassiveTcpTransport};
use crate::transport::udp::{ActiveUdpTransport, PassiveUdpTransport};
use crate::transport::websocket::{ActiveWebSocketTransport, PassiveWebSocketTransport};
use crate::transport::{AnyTransport, Transport};
use crate::transport_string::{self, Protocol, TransportString};
use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

fn parse_parity(s: &str) -> TransportResult<Parity> {
    match s {
        "" | "No" => Ok(Parity::None),
        "Even" => Ok(Parity::Even),
        "Odd" => Ok(Parity::Odd),
        other => Err(TransportError::InvalidArgument(format!("unknown parity: {other}"))),
    }
}

fn parse_stop_bits(s: &str) -> TransportResult<StopBits> {
    match s {
        "" | "1" => Ok(StopBits::One),
        "1.5" => Ok(StopBits::One), // tokio-serial has no 1.5 variant; round to one.
        "2" => Ok(StopBits::Two),
        other => Err(TransportError::InvalidArgument(format!("unknown stop bits: {other}"))),
    }
}

fn parse_flow_control(s: &str) -> TransportResult<FlowControl> {
    match s {
        "" | transport_string::FLOW_CONTROL_NONE => Ok(FlowControl::None),
        transport_string::FLOW_CONTROL_SOFTWARE => Ok(FlowControl::Software),
        transport_string::FLOW_CONTROL_HARDWARE => Ok(FlowControl::Hardware),
        other => Err(TransportError::InvalidArgument(format!("unknown flow control: {other}"))),
    }
}

fn required_port(transport_string: &TransportString) -> TransportResult<u16> {
    let port = transport_string.get_param_int(transport_string::PARAM_PORT);
    if port <= 0 || port > u16::MAX as i64 {
        return Err(TransportError::InvalidArgument("port is not specified or out of range".into()));
    }
    Ok(port as u16)
}

/// Constructs transports from transport strings. Owns the one piece of state
/// the original's factory carried across calls: the registry of named
/// in-process channels, so repeated `INPROCESS;Name=x` strings from the same
/// factory rendezvous with each other.
#[derive(Default)]
pub struct Factory {
    inprocess_host: InprocessTransportHost,
}

impl Factory {
    pub fn new() -> Self {
        Factory::default()
    }

    /// Parses `transport_string` and builds the transport it describes.
    /// Defaults to TCP when the string names no protocol, matching the
    /// original's fallback.
    pub fn create(&self, transport_string: &str, executor: Executor) -> TransportResult<AnyTransport> {
        let parsed = TransportString::parse(transport_string);
        self.create_parsed(&parsed, executor)
    }

    pub fn create_parsed(&self, parsed: &TransportString, executor: Executor) -> TransportResult<AnyTransport> {
        let protocol = parsed.protocol().unwrap_or(Protocol::Tcp);
        let active = parsed.active();

        match protocol {
            Protocol::Tcp => {
                let host = parsed.get_param_str(transport_string::PARAM_HOST).to_string();
                let port = required_port(parsed)?;
                Ok(if active {
                    AnyTransport::new(Box::new(ActiveTcpTransport::new(host, port, executor)))
                } else {
                    AnyTransport::new(Box::new(PassiveTcpTransport::new(host, port, executor)))
                })
            }
            Protocol::Udp => {
                let host = parsed.get_param_str(transport_string::PARAM_HOST).to_string();
                let port = required_port(parsed)?;
                Ok(if active {
                    AnyTransport::new(Box::new(ActiveUdpTransport::new(host, port, executor)))
                } else {
                    AnyTransport::new(Box::new(PassiveUdpTransport::new(host, port, executor)))
                })
            }
            Protocol::Serial => {
                let device = parsed.get_param_str(transport_string::PARAM_NAME);
                if device.is_empty() {
                    return Err(TransportError::InvalidArgument("serial port name is not specified".into()));
                }

                let mut options = SerialOptions::default();
                if parsed.has_param(transport_string::PARAM_BAUD_RATE) {
                    options.baud_rate = parsed.get_param_int(transport_string::PARAM_BAUD_RATE) as u32;
                }
                if parsed.has_param(transport_string::PARAM_BYTE_SIZE) {
                    options.data_bits = match parsed.get_param_int(transport_string::PARAM_BYTE_SIZE) {
                        5 => DataBits::Five,
                        6 => DataBits::Six,
                        7 => DataBits::Seven,
                        _ => DataBits::Eight,
                    };
                }
                if parsed.has_param(transport_string::PARAM_PARITY) {
                    options.parity = parse_parity(parsed.get_param_str(transport_string::PARAM_PARITY))?;
                }
                if parsed.has_param(transport_string::PARAM_STOP_BITS) {
                    options.stop_bits = parse_stop_bits(parsed.get_param_str(transport_string::PARAM_STOP_BITS))?;
                }
                if parsed.has_param(transport_string::PARAM_FLOW_CONTROL) {
                    options.flow_control =
                        parse_flow_control(parsed.get_param_str(transport_string::PARAM_FLOW_CONTROL))?;
                }

                Ok(AnyTransport::new(Box::new(SerialTransport::new(device, options, executor))))
            }
            Protocol::Pipe => {
                let name = parsed.get_param_str(transport_string::PARAM_NAME);
                if name.is_empty() {
                    return Err(TransportError::InvalidArgument("pipe name is not specified".into()));
                }
                Ok(AnyTransport::new(Box::new(PipeTransport::new(name, !active, executor))))
            }
            Protocol::WebSocket => {
                let host = parsed.get_param_str(transport_string::PARAM_HOST).to_string();
                let port = required_port(parsed)?;
                Ok(if active {
                    let url = format!("ws://{host}:{port}");
                    AnyTransport::new(Box::new(ActiveWebSocketTransport::new(url, executor)))
                } else {
                    AnyTransport::new(Box::new(PassiveWebSocketTransport::new(host, port, executor)))
                })
            }
            Protocol::Inprocess => {
                let name = parsed.get_param_str(transport_string::PARAM_NAME);
                Ok(if active {
                    AnyTransport::new(Box::new(self.inprocess_host.create_client(name, executor)))
                } else {
                    AnyTransport::new(Box::new(self.inprocess_host.create_server(name, executor)))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_an_active_tcp_transport_from_a_transport_string() {
        let factory = Factory::new();
        let transport = factory
            .create("TCP;Active;Host=localhost;Port=3000", Executor::current())
            .unwrap();
        assert!(transport.active());
        assert!(transport.message_oriented());
    }

    #[tokio::test]
    async fn tcp_without_a_port_is_rejected() {
        let factory = Factory::new();
        assert!(factory.create("TCP;Active;Host=localhost", Executor::current()).is_err());
    }

    #[tokio::test]
    async fn defaults_to_tcp_when_no_protocol_is_named() {
        let factory = Factory::new();
        let transport = factory.create("Active;Host=localhost;Port=80", Executor::current()).unwrap();
        assert!(transport.active());
    }

    #[tokio::test]
    async fn two_inprocess_requests_for_the_same_name_share_a_host() {
        let factory = Factory::new();
        let server = factory.create("INPROCESS;Passive;Name=shared", Executor::current()).unwrap();
        let client = factory.create("INPROCESS;Active;Name=shared", Executor::current()).unwrap();
        assert!(!server.active());
        assert!(client.active());
    }

    #[tokio::test]
    async fn serial_without_a_device_name_is_rejected() {
        let factory = Factory::new();
        assert!(factory.create("SERIAL;BaudRate=9600", Executor::current()).is_err());
    }
}
