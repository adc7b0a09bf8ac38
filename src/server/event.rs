//! Protocol events.
//!
//! Events are queued during a tick and drained by the caller through
//! [`Events`]. Message payloads are not copied: they borrow either the
//! server's receive buffer or its per-tick stash of reordered messages, so
//! they stay valid until the next tick.

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::endpoint::{EndpointId, Transition};

/// How a message was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    /// Best effort: may be lost, duplicated or reordered.
    Unreliable,
    /// Delivered exactly once, in send order.
    Reliable,
}

/// A protocol event borrowing from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// Our connection request was accepted.
    ConnectionSuccess(EndpointId),
    /// Our connection request was never accepted.
    ConnectionTimeout(EndpointId),
    /// The peer went silent.
    ConnectionLost(EndpointId),
    /// A lost peer is reachable again.
    ConnectionRegained(EndpointId),
    /// A remote peer opened a connection to us.
    ConnectionAccepted(EndpointId, SocketAddr),
    /// A message arrived.
    MessageReceived {
        /// Endpoint the message belongs to.
        endpoint: EndpointId,
        /// Sender address.
        from: SocketAddr,
        /// Channel the message arrived on.
        reliability: Reliability,
        /// Message bytes, valid until the next tick.
        payload: &'a [u8],
    },
}

impl Event<'_> {
    /// Endpoint the event refers to.
    pub fn endpoint(&self) -> EndpointId {
        match *self {
            Event::ConnectionSuccess(id)
            | Event::ConnectionTimeout(id)
            | Event::ConnectionLost(id)
            | Event::ConnectionRegained(id)
            | Event::ConnectionAccepted(id, _) => id,
            Event::MessageReceived { endpoint, .. } => endpoint,
        }
    }

    /// Copy the event so it can outlive the tick.
    pub fn into_owned(self) -> OwnedEvent {
        match self {
            Event::ConnectionSuccess(id) => OwnedEvent::ConnectionSuccess(id),
            Event::ConnectionTimeout(id) => OwnedEvent::ConnectionTimeout(id),
            Event::ConnectionLost(id) => OwnedEvent::ConnectionLost(id),
            Event::ConnectionRegained(id) => OwnedEvent::ConnectionRegained(id),
            Event::ConnectionAccepted(id, addr) => OwnedEvent::ConnectionAccepted(id, addr),
            Event::MessageReceived {
                endpoint,
                from,
                reliability,
                payload,
            } => OwnedEvent::MessageReceived {
                endpoint,
                from,
                reliability,
                payload: payload.to_vec(),
            },
        }
    }
}

/// An [`Event`] that owns its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedEvent {
    /// Our connection request was accepted.
    ConnectionSuccess(EndpointId),
    /// Our connection request was never accepted.
    ConnectionTimeout(EndpointId),
    /// The peer went silent.
    ConnectionLost(EndpointId),
    /// A lost peer is reachable again.
    ConnectionRegained(EndpointId),
    /// A remote peer opened a connection to us.
    ConnectionAccepted(EndpointId, SocketAddr),
    /// A message arrived.
    MessageReceived {
        /// Endpoint the message belongs to.
        endpoint: EndpointId,
        /// Sender address.
        from: SocketAddr,
        /// Channel the message arrived on.
        reliability: Reliability,
        /// Message bytes.
        payload: Vec<u8>,
    },
}

impl From<Event<'_>> for OwnedEvent {
    fn from(event: Event<'_>) -> Self {
        event.into_owned()
    }
}

/// Where a queued message's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadRef {
    /// Range in the receive buffer.
    Buffer { start: usize, len: usize },
    /// Index into the per-tick stash.
    Stash(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queued {
    Success(EndpointId),
    Timeout(EndpointId),
    Lost(EndpointId),
    Regained(EndpointId),
    Accepted(EndpointId, SocketAddr),
    Message {
        endpoint: EndpointId,
        from: SocketAddr,
        reliability: Reliability,
        payload: PayloadRef,
    },
}

impl Queued {
    fn endpoint(&self) -> EndpointId {
        match *self {
            Queued::Success(id)
            | Queued::Timeout(id)
            | Queued::Lost(id)
            | Queued::Regained(id)
            | Queued::Accepted(id, _) => id,
            Queued::Message { endpoint, .. } => endpoint,
        }
    }

    fn is_message(&self) -> bool {
        matches!(self, Queued::Message { .. })
    }
}

/// Pending events, in the order they happened.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    queue: VecDeque<Queued>,
}

impl EventQueue {
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// Queue the event matching an endpoint transition, if it has one.
    pub(crate) fn push_transition(&mut self, id: EndpointId, transition: Transition) {
        let queued = match transition {
            Transition::Connected => Queued::Success(id),
            Transition::TimedOut => Queued::Timeout(id),
            Transition::Lost => Queued::Lost(id),
            Transition::Regained => Queued::Regained(id),
            Transition::Expired => return,
        };
        self.queue.push_back(queued);
    }

    pub(crate) fn push_accepted(&mut self, id: EndpointId, from: SocketAddr) {
        self.queue.push_back(Queued::Accepted(id, from));
    }

    /// Queue a message whose bytes sit in the receive buffer.
    pub(crate) fn push_buffered_message(
        &mut self,
        endpoint: EndpointId,
        from: SocketAddr,
        reliability: Reliability,
        start: usize,
        len: usize,
    ) {
        self.queue.push_back(Queued::Message {
            endpoint,
            from,
            reliability,
            payload: PayloadRef::Buffer { start, len },
        });
    }

    /// Queue a reliable message whose bytes sit in the stash at `index`.
    pub(crate) fn push_stashed_message(&mut self, endpoint: EndpointId, from: SocketAddr, index: usize) {
        self.queue.push_back(Queued::Message {
            endpoint,
            from,
            reliability: Reliability::Reliable,
            payload: PayloadRef::Stash(index),
        });
    }

    /// Drop every message event, returning how many were dropped.
    ///
    /// Called before the buffers they point into are reused.
    pub(crate) fn discard_messages(&mut self) -> usize {
        let before = self.queue.len();
        self.queue.retain(|queued| !queued.is_message());
        before - self.queue.len()
    }

    /// Drop every event for `id`.
    pub(crate) fn purge(&mut self, id: EndpointId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|queued| queued.endpoint() != id);
        before - self.queue.len()
    }

    /// Drain events against the storage their payloads point into.
    pub(crate) fn drain<'a>(&'a mut self, buffer: &'a [u8], stash: &'a [Vec<u8>]) -> Events<'a> {
        Events {
            queue: &mut self.queue,
            buffer,
            stash,
        }
    }
}

/// Iterator over the events of a tick.
///
/// Events not consumed stay queued. Connection events are returned again
/// by the next drain; message events are discarded when the next tick
/// starts, since their bytes are about to be overwritten.
#[derive(Debug)]
pub struct Events<'a> {
    queue: &'a mut VecDeque<Queued>,
    buffer: &'a [u8],
    stash: &'a [Vec<u8>],
}

impl<'a> Events<'a> {
    fn resolve(&self, payload: PayloadRef) -> &'a [u8] {
        let buffer: &'a [u8] = self.buffer;
        let stash: &'a [Vec<u8>] = self.stash;
        match payload {
            PayloadRef::Buffer { start, len } => buffer.get(start..start + len).unwrap_or_default(),
            PayloadRef::Stash(index) => stash.get(index).map(Vec::as_slice).unwrap_or_default(),
        }
    }
}

impl<'a> Iterator for Events<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        let queued = self.queue.pop_front()?;
        Some(match queued {
            Queued::Success(id) => Event::ConnectionSuccess(id),
            Queued::Timeout(id) => Event::ConnectionTimeout(id),
            Queued::Lost(id) => Event::ConnectionLost(id),
            Queued::Regained(id) => Event::ConnectionRegained(id),
            Queued::Accepted(id, from) => Event::ConnectionAccepted(id, from),
            Queued::Message {
                endpoint,
                from,
                reliability,
                payload,
            } => Event::MessageReceived {
                endpoint,
                from,
                reliability,
                payload: self.resolve(payload),
            },
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.queue.len(), Some(self.queue.len()))
    }
}

impl ExactSizeIterator for Events<'_> {}
