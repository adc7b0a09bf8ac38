//! Server façade.
//!
//! [`Server`] ties sockets, endpoints, and the event queue together behind a
//! poll-and-drain API. With the `async` feature, [`driver`] runs it on a
//! tokio task instead.

mod config;
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub mod driver;
mod event;
#[allow(clippy::module_inception)]
mod server;

pub use config::{ServerBuilder, ServerConfig};
pub use event::{Event, Events, OwnedEvent, Reliability};
pub use server::{PACKET_TARGET, Server};
