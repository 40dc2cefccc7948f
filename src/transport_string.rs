//! The transport string DSL: a `;`-separated, case-insensitive parameter list
//! describing how to construct a transport. Grounded on
//! `original_source/transport/transport_string.h/.cpp`.
//!
//! `TCP;Active;Host=localhost;Port=3000` and `INPROCESS;Passive;Name=demo` are
//! both valid transport strings; [`Factory::create`](crate::factory::Factory::create)
//! consumes the parsed form to build a concrete [`crate::transport::Transport`].

use std::collections::BTreeMap;

const PARAM_DELIMITER: char = ';';
const VALUE_DELIMITER: char = '=';

pub const PARAM_ACTIVE: &str = "Active";
pub const PARAM_PASSIVE: &str = "Passive";
pub const PARAM_HOST: &str = "Host";
pub const PARAM_PORT: &str = "Port";
pub const PARAM_NAME: &str = "Name";
pub const PARAM_BAUD_RATE: &str = "BaudRate";
pub const PARAM_BYTE_SIZE: &str = "ByteSize";
pub const PARAM_PARITY: &str = "Parity";
pub const PARAM_STOP_BITS: &str = "StopBits";
pub const PARAM_FLOW_CONTROL: &str = "FlowControl";

pub const FLOW_CONTROL_NONE: &str = "No";
pub const FLOW_CONTROL_SOFTWARE: &str = "XON/XOFF";
pub const FLOW_CONTROL_HARDWARE: &str = "Hardware";

/// Canonical order `ToString` emits named parameters in, ahead of anything
/// else present in the map.
const PARAM_ORDER: &[&str] = &[
    PARAM_ACTIVE,
    PARAM_PASSIVE,
    PARAM_HOST,
    PARAM_PORT,
    PARAM_NAME,
    PARAM_BAUD_RATE,
    PARAM_PARITY,
    PARAM_STOP_BITS,
];

const PROTOCOL_NAMES: [&str; 6] = ["TCP", "UDP", "SERIAL", "PIPE", "WS", "INPROCESS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Serial,
    Pipe,
    WebSocket,
    Inprocess,
}

impl Protocol {
    fn name(self) -> &'static str {
        PROTOCOL_NAMES[self as usize]
    }

    fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Protocol::Tcp),
            1 => Some(Protocol::Udp),
            2 => Some(Protocol::Serial),
            3 => Some(Protocol::Pipe),
            4 => Some(Protocol::WebSocket),
            5 => Some(Protocol::Inprocess),
            _ => None,
        }
    }
}

fn lower(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// A parsed transport string: a case-insensitive parameter map plus the
/// derived protocol and direction.
#[derive(Debug, Clone, Default)]
pub struct TransportString {
    // Keyed by lower-cased parameter name; the original-case name and value
    // are the stored pair, so `ToString` reproduces what the caller wrote.
    params: BTreeMap<String, (String, String)>,
}

impl TransportString {
    pub fn new() -> Self {
        TransportString::default()
    }

    pub fn parse(s: &str) -> Self {
        let mut out = TransportString::new();
        let mut rest = s;
        loop {
            let (token, remainder) = match rest.split_once(PARAM_DELIMITER) {
                Some((token, remainder)) => (token, Some(remainder)),
                None => (rest, None),
            };
            let token = token.trim();
            if !token.is_empty() {
                match token.split_once(VALUE_DELIMITER) {
                    Some((name, value)) => {
                        out.set_param(name.trim(), value.trim());
                    }
                    None => {
                        out.set_flag(token);
                    }
                }
            }
            match remainder {
                Some(remainder) => rest = remainder,
                None => break,
            }
        }
        out
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(&lower(name))
    }

    pub fn get_param_str(&self, name: &str) -> &str {
        self.params
            .get(&lower(name))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    pub fn get_param_int(&self, name: &str) -> i64 {
        self.get_param_str(name).parse().unwrap_or(0)
    }

    pub fn active(&self) -> bool {
        !self.has_param(PARAM_PASSIVE)
    }

    pub fn protocol(&self) -> Option<Protocol> {
        PROTOCOL_NAMES
            .iter()
            .position(|name| self.has_param(name))
            .and_then(Protocol::from_index)
    }

    pub fn set_flag(&mut self, name: &str) -> &mut Self {
        self.set_param(name, "")
    }

    pub fn set_param(&mut self, name: &str, value: &str) -> &mut Self {
        self.params.insert(lower(name), (name.to_string(), value.to_string()));
        self
    }

    pub fn set_param_int(&mut self, name: &str, value: i64) -> &mut Self {
        self.set_param(name, &value.to_string())
    }

    pub fn set_active(&mut self, active: bool) -> &mut Self {
        self.remove_param(PARAM_ACTIVE);
        self.remove_param(PARAM_PASSIVE);
        self.set_flag(if active { PARAM_ACTIVE } else { PARAM_PASSIVE })
    }

    pub fn set_protocol(&mut self, protocol: Protocol) -> &mut Self {
        for name in PROTOCOL_NAMES {
            self.remove_param(name);
        }
        self.set_flag(protocol.name())
    }

    pub fn remove_param(&mut self, name: &str) -> &mut Self {
        self.params.remove(&lower(name));
        self
    }

    /// Parses a Windows-style `COMn` device name into its numeric port, or 0
    /// if `str` isn't of that form.
    pub fn parse_serial_port_number(s: &str) -> u32 {
        s.strip_prefix("COM").and_then(|rest| rest.parse().ok()).unwrap_or(0)
    }
}

impl std::fmt::Display for TransportString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut remaining: BTreeMap<String, (String, String)> = self.params.clone();
        let mut emitted = false;

        let mut append = |f: &mut std::fmt::Formatter<'_>, name: &str, value: &str| -> std::fmt::Result {
            if emitted {
                write!(f, "{PARAM_DELIMITER}")?;
            }
            emitted = true;
            write!(f, "{name}")?;
            if !value.is_empty() {
                write!(f, "{VALUE_DELIMITER}{value}")?;
            }
            Ok(())
        };

        if let Some(protocol) = self.protocol() {
            append(f, protocol.name(), "")?;
            remaining.remove(&lower(protocol.name()));
        }

        for name in PARAM_ORDER {
            remaining.remove(&lower(name));
            if let Some((original, value)) = self.params.get(&lower(name)) {
                append(f, original, value)?;
            }
        }

        for (original, value) in remaining.values() {
            append(f, original, value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_key_value_parameters() {
        let parsed = TransportString::parse("TCP;Active;Host=localhost;Port=3000");
        assert_eq!(parsed.protocol(), Some(Protocol::Tcp));
        assert!(parsed.active());
        assert_eq!(parsed.get_param_str(PARAM_HOST), "localhost");
        assert_eq!(parsed.get_param_int(PARAM_PORT), 3000);
    }

    #[test]
    fn passive_flag_overrides_default_active() {
        let parsed = TransportString::parse("UDP;Passive;Port=9001");
        assert!(!parsed.active());
    }

    #[test]
    fn round_trips_through_display_and_parse() {
        let mut built = TransportString::new();
        built.set_protocol(Protocol::Tcp);
        built.set_active(true);
        built.set_param(PARAM_HOST, "example.com");
        built.set_param_int(PARAM_PORT, 443);

        let rendered = built.to_string();
        let reparsed = TransportString::parse(&rendered);
        assert_eq!(reparsed.protocol(), Some(Protocol::Tcp));
        assert!(reparsed.active());
        assert_eq!(reparsed.get_param_str(PARAM_HOST), "example.com");
        assert_eq!(reparsed.get_param_int(PARAM_PORT), 443);
    }

    #[test]
    fn parameter_names_are_case_insensitive() {
        let parsed = TransportString::parse("tcp;active;host=localhost;PORT=80");
        assert_eq!(parsed.protocol(), Some(Protocol::Tcp));
        assert_eq!(parsed.get_param_int(PARAM_PORT), 80);
    }

    #[test]
    fn parses_serial_port_numbers_from_com_device_names() {
        assert_eq!(TransportString::parse_serial_port_number("COM3"), 3);
        assert_eq!(TransportString::parse_serial_port_number("ttyUSB0"), 0);
    }

    #[test]
    fn missing_protocol_yields_none() {
        let parsed = TransportString::parse("Host=localhost");
        assert_eq!(parsed.protocol(), None);
    }
}
