//! Sender side of the reliable channel.
//!
//! Messages get consecutive sequence numbers and stay queued until a
//! cumulative acknowledgment covers them. Only the oldest
//! [`SEND_WINDOW`](crate::core::constants::window::SEND_WINDOW) entries are
//! ever on the wire; each one is retransmitted with exponential backoff.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::sequence::{INITIAL_SEQUENCE, seq_le, seq_lt};
use crate::core::constants::window::SEND_WINDOW;
use crate::transport::backoff;

/// A queued reliable message.
#[derive(Debug, Clone)]
struct Pending {
    sequence: u32,
    payload: Vec<u8>,
    /// Last time this entry went out, `None` when due immediately.
    last_sent: Option<Instant>,
    /// Total transmissions, used for Karn's rule.
    transmissions: u32,
    /// Retransmissions since the last backoff reset.
    backoff_level: u32,
}

/// Outcome of processing an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckOutcome {
    /// Number of messages newly acknowledged.
    pub acked: usize,
    /// RTT sample, if an entry sent exactly once was acknowledged.
    pub rtt_sample: Option<Duration>,
}

/// Reliable sender state for one endpoint.
#[derive(Debug, Clone)]
pub struct ReliableSender {
    /// Sequence number for the next queued message.
    next_sequence: u32,
    /// Unacknowledged messages in sequence order.
    queue: VecDeque<Pending>,
}

impl Default for ReliableSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableSender {
    /// Create an empty sender.
    pub fn new() -> Self {
        Self {
            next_sequence: INITIAL_SEQUENCE,
            queue: VecDeque::new(),
        }
    }

    /// Queue a message and return its sequence number.
    pub fn push(&mut self, payload: Vec<u8>) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.queue.push_back(Pending {
            sequence,
            payload,
            last_sent: None,
            transmissions: 0,
            backoff_level: 0,
        });
        sequence
    }

    /// Number of messages not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is waiting for acknowledgment.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Highest sequence number assigned so far.
    pub fn last_sequence(&self) -> u32 {
        self.next_sequence.wrapping_sub(1)
    }

    /// Apply a cumulative acknowledgment.
    ///
    /// Acks for sequences never sent are ignored.
    pub fn on_ack(&mut self, ack: u32, now: Instant) -> AckOutcome {
        let mut outcome = AckOutcome::default();

        if seq_lt(self.last_sequence(), ack) {
            return outcome;
        }

        while let Some(front) = self.queue.front() {
            if !seq_le(front.sequence, ack) {
                break;
            }
            if let Some(entry) = self.queue.pop_front() {
                outcome.acked += 1;
                if entry.transmissions == 1 {
                    if let Some(sent) = entry.last_sent {
                        outcome.rtt_sample = Some(now.saturating_duration_since(sent));
                    }
                }
            }
        }

        outcome
    }

    /// Transmit every windowed entry whose timer expired.
    ///
    /// `send` receives the sequence number and payload of each entry that
    /// should go on the wire now. Returns how many entries were sent.
    pub fn transmit_due<F>(&mut self, now: Instant, rto: Duration, mut send: F) -> usize
    where
        F: FnMut(u32, &[u8]),
    {
        let mut sent = 0;

        for entry in self.queue.iter_mut().take(SEND_WINDOW as usize) {
            let due = match entry.last_sent {
                None => true,
                Some(last) => now >= last + backoff(rto, entry.backoff_level),
            };
            if !due {
                continue;
            }

            if entry.last_sent.is_some() {
                entry.backoff_level = entry.backoff_level.saturating_add(1);
            }
            entry.last_sent = Some(now);
            entry.transmissions = entry.transmissions.saturating_add(1);
            send(entry.sequence, &entry.payload);
            sent += 1;
        }

        sent
    }

    /// Earliest instant at which a windowed entry needs (re)transmission.
    pub fn next_deadline(&self, rto: Duration) -> Option<Instant> {
        self.queue
            .iter()
            .take(SEND_WINDOW as usize)
            .filter_map(|entry| {
                entry
                    .last_sent
                    .map(|last| last + backoff(rto, entry.backoff_level))
            })
            .min()
    }

    /// Make every outstanding entry due now and forget accumulated backoff.
    pub fn reset_backoff(&mut self) {
        for entry in &mut self.queue {
            entry.last_sent = None;
            entry.backoff_level = 0;
        }
    }

    /// Discard every pending message, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
