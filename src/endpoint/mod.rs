//! Per-peer endpoints and the table that holds them.
//!
//! Each remote peer gets one endpoint: its [`EndpointState`], reliable
//! channel, and RTT estimate. The public surface is the id, the state, and
//! the status snapshot; the state machine itself is driven by the server.

#[allow(clippy::module_inception)]
mod endpoint;
mod id;
mod state;
mod table;

pub use endpoint::{Direction, EndpointStatus};
pub use id::EndpointId;
pub use state::EndpointState;

pub(crate) use endpoint::{Delivery, Endpoint, EndpointSettings, Received, Transition};
pub(crate) use table::ConnectionTable;
