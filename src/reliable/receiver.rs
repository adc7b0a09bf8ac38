//! Receiver side of the reliable channel.
//!
//! Tracks the next expected sequence number and buffers out-of-order
//! arrivals until the gap before them fills. Messages are released to the
//! application strictly in sequence order, each exactly once.

use std::collections::HashMap;

use super::sequence::{INITIAL_SEQUENCE, distance, seq_lt};
use crate::core::constants::window::REORDER_WINDOW;

/// What happened to an incoming reliable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    /// The message is next in order and should be delivered now.
    ///
    /// `released` holds buffered messages that directly follow it, in order.
    Deliver {
        /// Buffered successors released by this arrival.
        released: Vec<Vec<u8>>,
    },
    /// Arrived ahead of a gap and was buffered.
    Buffered,
    /// Already delivered or already buffered.
    Duplicate,
    /// Too far ahead of the next expected sequence; dropped.
    OutOfWindow,
}

impl Receipt {
    /// Whether this arrival should trigger an acknowledgment.
    ///
    /// Every accepted or duplicate message is acknowledged so the sender
    /// learns about lost acks. Out-of-window arrivals are not.
    pub fn needs_ack(&self) -> bool {
        !matches!(self, Receipt::OutOfWindow)
    }
}

/// Reliable receiver state for one endpoint.
#[derive(Debug, Clone)]
pub struct ReliableReceiver {
    next_expected: u32,
    /// Out-of-order messages keyed by sequence number.
    reorder: HashMap<u32, Vec<u8>>,
}

impl Default for ReliableReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableReceiver {
    /// Create a receiver expecting the first sequence number.
    pub fn new() -> Self {
        Self {
            next_expected: INITIAL_SEQUENCE,
            reorder: HashMap::new(),
        }
    }

    /// Sequence number that would be delivered next.
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// Cumulative acknowledgment: every sequence up to this one was delivered.
    pub fn ack(&self) -> u32 {
        self.next_expected.wrapping_sub(1)
    }

    /// Number of buffered out-of-order messages.
    pub fn buffered(&self) -> usize {
        self.reorder.len()
    }

    /// Process an incoming reliable message.
    ///
    /// The in-order payload itself is not copied; on [`Receipt::Deliver`]
    /// the caller delivers the payload it passed in, then `released`.
    pub fn on_message(&mut self, sequence: u32, payload: &[u8]) -> Receipt {
        if seq_lt(sequence, self.next_expected) {
            return Receipt::Duplicate;
        }

        if sequence != self.next_expected {
            if distance(self.next_expected, sequence) >= REORDER_WINDOW {
                return Receipt::OutOfWindow;
            }
            if self.reorder.contains_key(&sequence) {
                return Receipt::Duplicate;
            }
            self.reorder.insert(sequence, payload.to_vec());
            return Receipt::Buffered;
        }

        self.next_expected = self.next_expected.wrapping_add(1);
        let mut released = Vec::new();
        while let Some(next) = self.reorder.remove(&self.next_expected) {
            released.push(next);
            self.next_expected = self.next_expected.wrapping_add(1);
        }

        Receipt::Deliver { released }
    }

    /// Forget all buffered messages and start over at the first sequence.
    pub fn reset(&mut self) {
        self.next_expected = INITIAL_SEQUENCE;
        self.reorder.clear();
    }
}
