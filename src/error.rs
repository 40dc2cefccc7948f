//! Error taxonomy shared by every transport, decorator, and the session layer.

use thiserror::Error;

/// The result type returned by every transport operation.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors produced by the transport stack.
///
/// Variant names are semantic, not wrappers around a particular platform error
/// code; substrate-specific errors are mapped onto the closest variant below.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Generic I/O failure with no more specific classification.
    #[error("failed: {0}")]
    Failed(String),

    /// The operation was canceled, typically because the awaiting task was dropped.
    #[error("aborted")]
    Aborted,

    /// Malformed input, e.g. a transport string missing a required parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not supported by this transport variant.
    #[error("access denied")]
    AccessDenied,

    /// The transport is already open, or the requested address is occupied.
    #[error("address in use")]
    AddressInUse,

    /// The peer or the local side closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation attempted on an unbound `AnyTransport`.
    #[error("invalid handle")]
    InvalidHandle,

    /// A conflicting operation is already in flight.
    #[error("io pending")]
    IoPending,

    /// The substrate does not implement this operation on this platform.
    #[error("not implemented")]
    NotImplemented,

    /// Reserved for future deadline support.
    #[error("timed out")]
    TimedOut,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof => {
                TransportError::ConnectionClosed
            }
            AddrInUse => TransportError::AddressInUse,
            InvalidInput | InvalidData => TransportError::InvalidArgument(err.to_string()),
            PermissionDenied => TransportError::AccessDenied,
            TimedOut => TransportError::TimedOut,
            WouldBlock => TransportError::IoPending,
            _ => TransportError::Failed(err.to_string()),
        }
    }
}

impl From<bincode::Error> for TransportError {
    fn from(err: bincode::Error) -> Self {
        TransportError::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_map_to_expected_variants() {
        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, TransportError::ConnectionClosed));

        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use").into();
        assert!(matches!(err, TransportError::AddressInUse));

        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, TransportError::Failed(_)));
    }
}
