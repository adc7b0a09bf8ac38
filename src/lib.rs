//! # udp-connect
//!
//! Connection-oriented sessions over plain UDP.
//!
//! A [`Server`] owns one IPv4 and one IPv6 socket and multiplexes any number
//! of peer connections over them. It provides:
//!
//! - **Handshake**: connections open with a request/accept exchange tagged
//!   with a 4-byte application [`Signature`]; foreign traffic is ignored
//! - **Unreliable messages**: fire-and-forget datagrams
//! - **Reliable messages**: in-order, exactly-once delivery with cumulative
//!   acknowledgments and backoff retransmission
//! - **Liveness**: pings, loss detection and recovery reported as events
//!
//! The engine is poll-driven. Nothing runs in the background: each call to
//! [`Server::tick`] reads pending datagrams, runs timers, and returns the
//! events produced. Message payloads borrow the server's receive buffer and
//! stay valid until the next tick.
//!
//! ## Feature Flags
//!
//! - `async` (default): [`server::driver`], a tokio task that owns a server
//!   and forwards events over a channel
//!
//! ## Modules
//!
//! - [`core`]: constants and error types
//! - [`transport`]: wire codec, sockets, addresses, RTT estimation
//! - [`reliable`]: reliable channel sender and receiver
//! - [`endpoint`]: endpoint ids, states and status
//! - [`server`]: the server, its configuration and events
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use udp_connect::prelude::*;
//!
//! let signature = Signature::new([1, 2, 3, 4]);
//! let mut a = Server::bind(signature, 0, 0, 64 * 1024)?;
//! let mut b = Server::bind(signature, 0, 7777, 64 * 1024)?;
//!
//! let peer = a.connect("127.0.0.1", "7777", Duration::from_secs(3))?;
//!
//! loop {
//!     for event in a.tick() {
//!         if let Event::ConnectionSuccess(id) = event {
//!             println!("connected to {id}");
//!         }
//!     }
//!     a.send(peer, b"hello", Reliability::Reliable).ok();
//!
//!     for event in b.tick() {
//!         if let Event::MessageReceived { payload, .. } = event {
//!             println!("received {:?}", payload);
//!         }
//!     }
//!     # break;
//! }
//! # Ok::<(), udp_connect::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod endpoint;
pub mod reliable;
pub mod server;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{Error, Result};
    pub use crate::endpoint::{EndpointId, EndpointState, EndpointStatus};
    pub use crate::server::{Event, OwnedEvent, Reliability, Server, ServerBuilder, ServerConfig};
    pub use crate::transport::{
        FamilyPreference, Signature, parse_address, parse_address_v4, parse_address_v6,
    };

    #[cfg(feature = "async")]
    pub use crate::server::driver::ServerHandle;
}

// Re-export commonly used items at crate root
pub use crate::core::{Error, Result};
pub use endpoint::{EndpointId, EndpointState, EndpointStatus};
pub use server::{Event, Events, OwnedEvent, Reliability, Server, ServerBuilder, ServerConfig};
pub use transport::{Signature, parse_address, parse_address_v4, parse_address_v6};
