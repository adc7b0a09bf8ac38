//! Protocol constants.
//!
//! Sizes, timer defaults, and window limits shared by every layer.

use std::time::Duration;

/// Length of the application signature carried by every packet.
pub const SIGNATURE_SIZE: usize = 4;

/// Largest datagram the engine sends or expects to receive.
///
/// Chosen to stay below the common 1500 byte Ethernet MTU once IPv6 and UDP
/// headers are added.
pub const MAX_DATAGRAM_SIZE: usize = 1400;

/// Bytes added on top of the caller's requested receive buffer size.
///
/// Guarantees at least one full datagram always fits in the buffer.
pub const MINIMUM_BUFFER_OVERHEAD: usize = MAX_DATAGRAM_SIZE;

/// Timer defaults.
pub mod timing {
    use super::Duration;

    /// Interval between connection request retransmissions while connecting.
    pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

    /// Default interval between liveness probes.
    pub const PING_INTERVAL: Duration = Duration::from_millis(250);

    /// Floor for the effective ping interval.
    pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

    /// Default liveness window for endpoints opened by a remote peer.
    pub const INBOUND_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default time an endpoint may stay lost before it is dropped.
    pub const MAX_LOST_DURATION: Duration = Duration::from_secs(30);

    /// Default tick period used by the async driver.
    pub const DRIVER_TICK_INTERVAL: Duration = Duration::from_millis(5);
}

/// Reliable channel limits.
pub mod window {
    /// Maximum number of unacknowledged reliable messages in flight.
    pub const SEND_WINDOW: u32 = 256;

    /// How far ahead of the next expected sequence the receiver buffers.
    ///
    /// Must be at least [`SEND_WINDOW`] or a full window of in-flight
    /// messages could be dropped after a single loss.
    pub const REORDER_WINDOW: u32 = 1024;
}

/// Default upper bound on simultaneously tracked endpoints.
pub const DEFAULT_MAX_ENDPOINTS: usize = 1024;
