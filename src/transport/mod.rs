//! Transport layer.
//!
//! Everything between the raw UDP sockets and the endpoint state machines:
//!
//! - **Wire codec**: [`Packet`] encoding/decoding with signature checks
//! - **Sockets**: [`DualSocket`] owning one IPv4 and one IPv6 socket
//! - **Addresses**: [`parse_address`] and friends
//! - **Timing**: [`RttEstimator`] (RFC 6298) and [`WireClock`]
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Server / Connection Table           │
//! ├─────────────────────────────────────────┤
//! │   Endpoint state + Reliable Channel     │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   codec, sockets, addresses, timing     │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

mod address;
mod frame;
mod socket;
mod timing;

use std::net::SocketAddr;

pub use address::*;
pub use frame::*;
pub use socket::*;
pub use timing::{RttEstimator, WireClock, backoff, constants as timing_constants};

/// Destination for outbound packets.
///
/// Endpoint logic never touches sockets directly; it hands packets to a
/// sink. The server's sink encodes and sends them, tests record them.
pub trait PacketSink {
    /// Deliver `packet` to `to`. Failures count as packet loss.
    fn send_packet(&mut self, to: SocketAddr, packet: &Packet<'_>);
}
