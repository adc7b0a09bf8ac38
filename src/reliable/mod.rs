//! Reliable ordered delivery.
//!
//! A per-endpoint channel layered on the unreliable datagrams:
//!
//! - [`ReliableSender`] numbers messages, keeps them until cumulatively
//!   acknowledged, and retransmits with exponential backoff
//! - [`ReliableReceiver`] delivers in order exactly once, buffering gaps
//!
//! Sequence numbers start at 1 and wrap; see [`sequence`].

mod receiver;
mod sender;
pub mod sequence;

pub use receiver::{Receipt, ReliableReceiver};
pub use sender::{AckOutcome, ReliableSender};
