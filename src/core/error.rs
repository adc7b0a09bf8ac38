//! Error types for the udp-connect engine.

use std::io;

use thiserror::Error;

use crate::endpoint::EndpointId;

/// Address family of a socket, used in bind errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Top-level errors.
///
/// Only [`Error::Bind`] is fatal: it means no server was produced. Every
/// other variant reports a rejected call and leaves the server untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding one of the two sockets failed.
    #[error("failed to bind {family} socket on port {port}: {source}")]
    Bind {
        /// Family of the socket that failed.
        family: AddressFamily,
        /// Requested port.
        port: u16,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A node/service pair could not be resolved to an address.
    #[error("cannot resolve {node}:{service}: {reason}")]
    Resolve {
        /// Node name or literal address.
        node: String,
        /// Service name or port.
        service: String,
        /// What went wrong.
        reason: String,
    },

    /// The endpoint id is not (or no longer) known to the server.
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),

    /// An endpoint for the target address already exists.
    #[error("address already has endpoint {0}")]
    AlreadyConnected(EndpointId),

    /// The payload does not fit in a single datagram.
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Payload length.
        size: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The connection table reached its configured capacity.
    #[error("connection table is full")]
    TableFull,

    /// The server configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error outside of binding.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The async driver task has stopped.
    #[cfg(feature = "async")]
    #[error("driver task has shut down")]
    DriverClosed,
}

impl Error {
    /// Whether this error prevented a server from being created.
    pub fn is_construction_failure(&self) -> bool {
        matches!(self, Error::Bind { .. } | Error::InvalidConfig(_))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_failures() {
        let bind = Error::Bind {
            family: AddressFamily::V6,
            port: 9000,
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(bind.is_construction_failure());
        assert!(Error::InvalidConfig("zero ping".into()).is_construction_failure());

        assert!(!Error::UnknownEndpoint(EndpointId::from_raw(3)).is_construction_failure());
        assert!(!Error::TableFull.is_construction_failure());
    }

    #[test]
    fn test_display() {
        let err = Error::PayloadTooLarge { size: 2000, max: 1384 };
        assert_eq!(err.to_string(), "payload of 2000 bytes exceeds maximum of 1384");

        let err = Error::Bind {
            family: AddressFamily::V4,
            port: 1234,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("failed to bind IPv4 socket on port 1234"));
    }
}
