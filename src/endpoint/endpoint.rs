//! Per-peer connection state machine.
//!
//! An [`Endpoint`] never touches a socket or reads the clock. Every handler
//! takes the tick's `now` and writes outbound packets to a [`PacketSink`];
//! state changes the application must hear about come back as a
//! [`Transition`].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{EndpointId, EndpointState};
use crate::core::constants::timing::{CONNECT_RETRY_INTERVAL, MIN_PING_INTERVAL};
use crate::reliable::{Receipt, ReliableReceiver, ReliableSender};
use crate::transport::{Packet, PacketSink, RttEstimator, WireClock};

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Opened locally through `connect`.
    Outbound,
    /// Accepted from a remote connection request.
    Inbound,
}

/// Timer settings shared by all endpoints of a server.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EndpointSettings {
    pub inbound_timeout: Duration,
    pub ping_interval: Duration,
    pub max_lost_duration: Duration,
    /// Mixed into every handshake token so a restarted process on the
    /// same address never reuses the tokens of its previous run.
    pub token_salt: u32,
}

/// A state change worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Handshake completed.
    Connected,
    /// Handshake did not complete in time; the endpoint is finished.
    TimedOut,
    /// The peer went silent.
    Lost,
    /// The peer came back.
    Regained,
    /// Lost for too long; the endpoint is finished without an event.
    Expired,
}

impl Transition {
    /// Whether the endpoint must be removed from the table.
    pub(crate) fn is_final(self) -> bool {
        matches!(self, Transition::TimedOut | Transition::Expired)
    }
}

/// Application data carried by an inbound packet.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Nothing to hand to the application.
    #[default]
    Nothing,
    /// Deliver the packet's unreliable payload.
    Unreliable,
    /// Deliver the packet's reliable payload, then `released` in order.
    Reliable { released: Vec<Vec<u8>> },
}

/// Result of handling an inbound data or liveness packet.
#[derive(Debug, Default)]
pub(crate) struct Received {
    pub transition: Option<Transition>,
    pub delivery: Delivery,
}

/// Snapshot of an endpoint reported by `Server::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStatus {
    /// Current connection state.
    pub state: EndpointState,
    /// Remote address.
    pub address: SocketAddr,
    /// Smoothed round-trip time, zero until measured.
    pub ping: Duration,
    /// Reliable messages queued or awaiting acknowledgment.
    pub pending_reliable: usize,
}

impl EndpointStatus {
    /// Whether the endpoint is connected right now.
    pub fn is_live(&self) -> bool {
        self.state.is_connected()
    }
}

/// Ping at least four times per liveness window, but not absurdly often.
fn effective_ping_interval(requested: Duration, liveness: Duration) -> Duration {
    requested.min(liveness / 4).max(MIN_PING_INTERVAL)
}

/// Local state for one remote peer.
#[derive(Debug)]
pub(crate) struct Endpoint {
    id: EndpointId,
    address: SocketAddr,
    direction: Direction,
    state: EndpointState,

    /// Our handshake token: the id mixed with the server's salt.
    token: u32,
    /// Peer's handshake token, learned during the handshake.
    peer_token: Option<u32>,

    /// Maximum silence before the peer is considered lost.
    liveness: Duration,
    ping_interval: Duration,
    max_lost: Duration,

    connect_deadline: Option<Instant>,
    last_request: Option<Instant>,
    last_received: Instant,
    last_ping: Option<Instant>,
    lost_since: Option<Instant>,

    /// Peer data arrived that no outbound packet has acknowledged yet.
    ack_pending: bool,

    rtt: RttEstimator,
    sender: ReliableSender,
    receiver: ReliableReceiver,
}

impl Endpoint {
    /// Endpoint for a locally initiated connection.
    ///
    /// `timeout` bounds the handshake and doubles as the liveness window.
    pub(crate) fn outbound(
        id: EndpointId,
        address: SocketAddr,
        timeout: Duration,
        settings: &EndpointSettings,
        now: Instant,
    ) -> Self {
        let mut endpoint = Self::new(id, address, Direction::Outbound, timeout, settings, now);
        endpoint.connect_deadline = Some(now + timeout);
        endpoint
    }

    /// Endpoint for a peer whose connection request was accepted.
    pub(crate) fn inbound(
        id: EndpointId,
        address: SocketAddr,
        peer_token: u32,
        settings: &EndpointSettings,
        now: Instant,
    ) -> Self {
        let mut endpoint = Self::new(
            id,
            address,
            Direction::Inbound,
            settings.inbound_timeout,
            settings,
            now,
        );
        endpoint.state = EndpointState::Connected;
        endpoint.peer_token = Some(peer_token);
        endpoint
    }

    fn new(
        id: EndpointId,
        address: SocketAddr,
        direction: Direction,
        liveness: Duration,
        settings: &EndpointSettings,
        now: Instant,
    ) -> Self {
        Self {
            id,
            address,
            direction,
            state: EndpointState::Connecting,
            token: id.raw() ^ settings.token_salt,
            peer_token: None,
            liveness,
            ping_interval: effective_ping_interval(settings.ping_interval, liveness),
            max_lost: settings.max_lost_duration,
            connect_deadline: None,
            last_request: None,
            last_received: now,
            last_ping: None,
            lost_since: None,
            ack_pending: false,
            rtt: RttEstimator::new(),
            sender: ReliableSender::new(),
            receiver: ReliableReceiver::new(),
        }
    }

    pub(crate) fn id(&self) -> EndpointId {
        self.id
    }

    pub(crate) fn address(&self) -> SocketAddr {
        self.address
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn state(&self) -> EndpointState {
        self.state
    }

    pub(crate) fn token(&self) -> u32 {
        self.token
    }

    pub(crate) fn peer_token(&self) -> Option<u32> {
        self.peer_token
    }

    pub(crate) fn status(&self) -> EndpointStatus {
        EndpointStatus {
            state: self.state,
            address: self.address,
            ping: self.rtt.srtt(),
            pending_reliable: self.sender.pending(),
        }
    }

    /// Send the first connection request.
    pub(crate) fn start<S>(&mut self, now: Instant, clock: &WireClock, sink: &mut S)
    where
        S: PacketSink + ?Sized,
    {
        if self.state == EndpointState::Connecting {
            self.send_request(now, clock, sink);
        }
    }

    fn send_request<S>(&mut self, now: Instant, clock: &WireClock, sink: &mut S)
    where
        S: PacketSink + ?Sized,
    {
        sink.send_packet(
            self.address,
            &Packet::ConnectRequest {
                token: self.token,
                timestamp: clock.timestamp(now),
            },
        );
        self.last_request = Some(now);
    }

    /// Answer a connection request from this endpoint's peer.
    ///
    /// Covers both a retransmitted request whose accept was lost and a
    /// simultaneous open while we are still connecting ourselves.
    pub(crate) fn on_connect_request<S>(
        &mut self,
        token: u32,
        timestamp: u32,
        now: Instant,
        sink: &mut S,
    ) -> Option<Transition>
    where
        S: PacketSink + ?Sized,
    {
        if self.state.is_terminal() {
            return None;
        }

        self.peer_token = Some(token);
        sink.send_packet(
            self.address,
            &Packet::ConnectAccept {
                requester: token,
                acceptor: self.token,
                echo: timestamp,
            },
        );

        if self.state == EndpointState::Connecting {
            None
        } else {
            self.touch(now)
        }
    }

    /// Handle the peer's answer to our connection request.
    pub(crate) fn on_connect_accept<S>(
        &mut self,
        requester: u32,
        acceptor: u32,
        echo: u32,
        now: Instant,
        clock: &WireClock,
        sink: &mut S,
    ) -> Option<Transition>
    where
        S: PacketSink + ?Sized,
    {
        if requester != self.token {
            trace!(endpoint = %self.id, requester, "accept for another endpoint ignored");
            return None;
        }

        match self.state {
            EndpointState::Connecting => {
                self.state = EndpointState::Connected;
                self.peer_token = Some(acceptor);
                self.connect_deadline = None;
                self.last_received = now;
                self.rtt.update(clock.elapsed_since(now, echo));
                debug!(
                    endpoint = %self.id,
                    peer = %self.address,
                    rtt_ms = self.rtt.ping_ms(),
                    "connection established"
                );
                // Reliable messages queued while connecting go out now
                self.transmit(now, sink);
                Some(Transition::Connected)
            }
            EndpointState::Connected | EndpointState::Lost => self.touch(now),
            EndpointState::Disconnected => None,
        }
    }

    /// Handle a liveness or data packet from the peer.
    pub(crate) fn on_packet<S>(
        &mut self,
        packet: &Packet<'_>,
        now: Instant,
        clock: &WireClock,
        sink: &mut S,
    ) -> Received
    where
        S: PacketSink + ?Sized,
    {
        if !self.state.is_established() {
            // The peer retransmits once our handshake completes
            trace!(endpoint = %self.id, state = %self.state, kind = ?packet.kind(), "packet ignored");
            return Received::default();
        }

        let transition = self.touch(now);

        if let Some(ack) = packet.ack() {
            let outcome = self.sender.on_ack(ack, now);
            if let Some(sample) = outcome.rtt_sample {
                self.rtt.update(sample);
            }
        }

        let delivery = match *packet {
            Packet::Ping { timestamp, .. } => {
                sink.send_packet(
                    self.address,
                    &Packet::Pong {
                        ack: self.receiver.ack(),
                        echo: timestamp,
                    },
                );
                self.ack_pending = false;
                Delivery::Nothing
            }
            Packet::Pong { echo, .. } => {
                self.rtt.update(clock.elapsed_since(now, echo));
                Delivery::Nothing
            }
            Packet::Unreliable { .. } => Delivery::Unreliable,
            Packet::Reliable {
                sequence, payload, ..
            } => {
                let receipt = self.receiver.on_message(sequence, payload);
                if receipt.needs_ack() {
                    self.ack_pending = true;
                }
                match receipt {
                    Receipt::Deliver { released } => Delivery::Reliable { released },
                    Receipt::Buffered | Receipt::Duplicate => Delivery::Nothing,
                    Receipt::OutOfWindow => {
                        trace!(endpoint = %self.id, sequence, "reliable message outside reorder window");
                        Delivery::Nothing
                    }
                }
            }
            Packet::Ack { .. } | Packet::ConnectRequest { .. } | Packet::ConnectAccept { .. } => {
                Delivery::Nothing
            }
        };

        Received {
            transition,
            delivery,
        }
    }

    /// Record traffic from the peer, regaining a lost connection.
    fn touch(&mut self, now: Instant) -> Option<Transition> {
        self.last_received = now;

        if self.state != EndpointState::Lost {
            return None;
        }

        self.state = EndpointState::Connected;
        self.lost_since = None;
        self.sender.reset_backoff();
        debug!(endpoint = %self.id, peer = %self.address, "connection regained");
        Some(Transition::Regained)
    }

    /// Send an unreliable message. Returns `false` if it was dropped.
    pub(crate) fn send_unreliable<S>(&mut self, payload: &[u8], sink: &mut S) -> bool
    where
        S: PacketSink + ?Sized,
    {
        if !self.state.is_connected() {
            trace!(endpoint = %self.id, state = %self.state, "unreliable message dropped");
            return false;
        }

        sink.send_packet(self.address, &Packet::Unreliable { payload });
        true
    }

    /// Queue a reliable message, transmitting right away when connected.
    pub(crate) fn send_reliable<S>(&mut self, payload: Vec<u8>, now: Instant, sink: &mut S) -> u32
    where
        S: PacketSink + ?Sized,
    {
        let sequence = self.sender.push(payload);
        if self.state.is_connected() {
            self.transmit(now, sink);
        }
        sequence
    }

    fn transmit<S>(&mut self, now: Instant, sink: &mut S)
    where
        S: PacketSink + ?Sized,
    {
        let ack = self.receiver.ack();
        let to = self.address;
        let sent = self
            .sender
            .transmit_due(now, self.rtt.rto(), |sequence, payload| {
                sink.send_packet(
                    to,
                    &Packet::Reliable {
                        sequence,
                        ack,
                        payload,
                    },
                );
            });
        if sent > 0 {
            self.ack_pending = false;
        }
    }

    /// Run timers: handshake retries, liveness, pings, retransmissions and
    /// the end-of-tick acknowledgment.
    pub(crate) fn poll<S>(&mut self, now: Instant, clock: &WireClock, sink: &mut S) -> Option<Transition>
    where
        S: PacketSink + ?Sized,
    {
        match self.state {
            EndpointState::Disconnected => None,
            EndpointState::Connecting => {
                if self.connect_deadline.is_some_and(|deadline| now >= deadline) {
                    self.state = EndpointState::Disconnected;
                    let dropped = self.sender.clear();
                    debug!(endpoint = %self.id, peer = %self.address, dropped, "connection timed out");
                    return Some(Transition::TimedOut);
                }

                let retry_due = self
                    .last_request
                    .is_none_or(|last| now.saturating_duration_since(last) >= CONNECT_RETRY_INTERVAL);
                if retry_due {
                    self.send_request(now, clock, sink);
                }
                None
            }
            EndpointState::Connected | EndpointState::Lost => {
                let mut transition = None;
                let silence = now.saturating_duration_since(self.last_received);

                if self.state == EndpointState::Connected && silence >= self.liveness {
                    self.state = EndpointState::Lost;
                    self.lost_since = Some(now);
                    debug!(
                        endpoint = %self.id,
                        peer = %self.address,
                        silence_ms = silence.as_millis() as u64,
                        "connection lost"
                    );
                    transition = Some(Transition::Lost);
                } else if self
                    .lost_since
                    .is_some_and(|since| now.saturating_duration_since(since) >= self.max_lost)
                {
                    self.state = EndpointState::Disconnected;
                    let dropped = self.sender.clear();
                    debug!(endpoint = %self.id, peer = %self.address, dropped, "lost connection expired");
                    return Some(Transition::Expired);
                }

                let ping_due = self
                    .last_ping
                    .is_none_or(|last| now.saturating_duration_since(last) >= self.ping_interval);
                if ping_due {
                    sink.send_packet(
                        self.address,
                        &Packet::Ping {
                            ack: self.receiver.ack(),
                            timestamp: clock.timestamp(now),
                        },
                    );
                    self.last_ping = Some(now);
                    self.ack_pending = false;
                }

                self.transmit(now, sink);

                if self.ack_pending {
                    sink.send_packet(
                        self.address,
                        &Packet::Ack {
                            ack: self.receiver.ack(),
                        },
                    );
                    self.ack_pending = false;
                }

                transition
            }
        }
    }

    /// Move to `Disconnected`, discarding pending reliable messages.
    pub(crate) fn close(&mut self) -> usize {
        self.state = EndpointState::Disconnected;
        self.sender.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PacketKind, Signature};

    const SIG: Signature = Signature::new([1, 2, 3, 4]);

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn settings() -> EndpointSettings {
        EndpointSettings {
            inbound_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_millis(250),
            max_lost_duration: Duration::from_secs(30),
            token_salt: 0,
        }
    }

    /// Records every packet as encoded bytes.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<(SocketAddr, Vec<u8>)>,
    }

    impl PacketSink for RecordingSink {
        fn send_packet(&mut self, to: SocketAddr, packet: &Packet<'_>) {
            let mut buf = Vec::new();
            packet.encode(SIG, &mut buf).unwrap();
            self.sent.push((to, buf));
        }
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<PacketKind> {
            self.packets().iter().map(Packet::kind).collect()
        }

        fn packets(&self) -> Vec<Packet<'_>> {
            self.sent
                .iter()
                .map(|(_, bytes)| Packet::decode(SIG, bytes).unwrap())
                .collect()
        }

        fn clear(&mut self) {
            self.sent.clear();
        }
    }

    fn connected_outbound(now: Instant, clock: &WireClock, sink: &mut RecordingSink) -> Endpoint {
        let id = EndpointId::from_raw(7);
        let mut endpoint = Endpoint::outbound(id, peer(), Duration::from_secs(1), &settings(), now);
        endpoint.start(now, clock, sink);
        let transition =
            endpoint.on_connect_accept(7, 99, clock.timestamp(now), now, clock, sink);
        assert_eq!(transition, Some(Transition::Connected));
        sink.clear();
        endpoint
    }

    #[test]
    fn test_outbound_sends_request_and_retries() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = Endpoint::outbound(
            EndpointId::from_raw(3),
            peer(),
            Duration::from_secs(1),
            &settings(),
            now,
        );

        endpoint.start(now, &clock, &mut sink);
        assert_eq!(
            sink.packets(),
            vec![Packet::ConnectRequest {
                token: 3,
                timestamp: 0
            }]
        );

        // Not yet time to retry
        sink.clear();
        endpoint.poll(now + Duration::from_millis(100), &clock, &mut sink);
        assert!(sink.sent.is_empty());

        endpoint.poll(now + CONNECT_RETRY_INTERVAL, &clock, &mut sink);
        assert_eq!(sink.kinds(), vec![PacketKind::ConnectRequest]);
    }

    #[test]
    fn test_accept_for_other_token_ignored() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = Endpoint::outbound(
            EndpointId::from_raw(3),
            peer(),
            Duration::from_secs(1),
            &settings(),
            now,
        );

        assert_eq!(endpoint.on_connect_accept(4, 1, 0, now, &clock, &mut sink), None);
        assert_eq!(endpoint.state(), EndpointState::Connecting);
    }

    #[test]
    fn test_token_is_salted() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let salted = EndpointSettings {
            token_salt: 0xdead_0000,
            ..settings()
        };
        let mut endpoint =
            Endpoint::outbound(EndpointId::from_raw(3), peer(), Duration::from_secs(1), &salted, now);
        assert_eq!(endpoint.token(), 0xdead_0003);

        endpoint.start(now, &clock, &mut sink);
        assert_eq!(
            sink.packets(),
            vec![Packet::ConnectRequest {
                token: 0xdead_0003,
                timestamp: 0
            }]
        );

        // The bare id is not enough to complete the handshake
        assert_eq!(endpoint.on_connect_accept(3, 1, 0, now, &clock, &mut sink), None);
        assert_eq!(
            endpoint.on_connect_accept(0xdead_0003, 1, 0, now, &clock, &mut sink),
            Some(Transition::Connected)
        );
    }

    #[test]
    fn test_accept_flushes_queued_reliable() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = Endpoint::outbound(
            EndpointId::from_raw(3),
            peer(),
            Duration::from_secs(1),
            &settings(),
            now,
        );
        endpoint.start(now, &clock, &mut sink);
        sink.clear();

        endpoint.send_reliable(b"early".to_vec(), now, &mut sink);
        assert!(sink.sent.is_empty());

        let later = now + Duration::from_millis(40);
        let transition = endpoint.on_connect_accept(3, 11, 0, later, &clock, &mut sink);
        assert_eq!(transition, Some(Transition::Connected));
        assert_eq!(endpoint.peer_token(), Some(11));
        assert_eq!(endpoint.status().ping, Duration::from_millis(40));
        assert_eq!(
            sink.packets(),
            vec![Packet::Reliable {
                sequence: 1,
                ack: 0,
                payload: b"early"
            }]
        );
    }

    #[test]
    fn test_connect_timeout() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = Endpoint::outbound(
            EndpointId::from_raw(3),
            peer(),
            Duration::from_millis(500),
            &settings(),
            now,
        );
        endpoint.send_reliable(b"never".to_vec(), now, &mut sink);

        assert_eq!(endpoint.poll(now + Duration::from_millis(499), &clock, &mut sink), None);
        let transition = endpoint.poll(now + Duration::from_millis(500), &clock, &mut sink);
        assert_eq!(transition, Some(Transition::TimedOut));
        assert!(transition.is_some_and(Transition::is_final));
        assert_eq!(endpoint.state(), EndpointState::Disconnected);
        assert_eq!(endpoint.status().pending_reliable, 0);

        // A late accept changes nothing
        assert_eq!(
            endpoint.on_connect_accept(3, 1, 0, now + Duration::from_secs(1), &clock, &mut sink),
            None
        );
    }

    #[test]
    fn test_lost_and_regained() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = connected_outbound(now, &clock, &mut sink);

        let silent = now + Duration::from_secs(1);
        assert_eq!(endpoint.poll(silent, &clock, &mut sink), Some(Transition::Lost));
        assert_eq!(endpoint.state(), EndpointState::Lost);
        // Reported once
        assert_eq!(endpoint.poll(silent + Duration::from_millis(10), &clock, &mut sink), None);

        // Unreliable traffic is suppressed while lost
        sink.clear();
        assert!(!endpoint.send_unreliable(b"gone", &mut sink));
        assert!(sink.sent.is_empty());

        let back = silent + Duration::from_millis(100);
        let received = endpoint.on_packet(&Packet::Ack { ack: 0 }, back, &clock, &mut sink);
        assert_eq!(received.transition, Some(Transition::Regained));
        assert!(endpoint.status().is_live());
        assert!(endpoint.send_unreliable(b"here", &mut sink));
    }

    #[test]
    fn test_lost_expires() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = connected_outbound(now, &clock, &mut sink);

        let lost_at = now + Duration::from_secs(1);
        endpoint.poll(lost_at, &clock, &mut sink);
        let transition = endpoint.poll(lost_at + settings().max_lost_duration, &clock, &mut sink);
        assert_eq!(transition, Some(Transition::Expired));
        assert_eq!(endpoint.state(), EndpointState::Disconnected);
    }

    #[test]
    fn test_regain_retransmits_immediately() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = connected_outbound(now, &clock, &mut sink);

        endpoint.send_reliable(b"x".to_vec(), now, &mut sink);
        let lost_at = now + Duration::from_secs(1);
        endpoint.poll(lost_at, &clock, &mut sink);

        let back = lost_at + Duration::from_millis(1);
        endpoint.on_packet(&Packet::Ack { ack: 0 }, back, &clock, &mut sink);
        sink.clear();
        endpoint.poll(back, &clock, &mut sink);
        assert!(sink.kinds().contains(&PacketKind::Reliable));
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = connected_outbound(now, &clock, &mut sink);

        endpoint.on_packet(
            &Packet::Ping {
                ack: 0,
                timestamp: 1234,
            },
            now,
            &clock,
            &mut sink,
        );
        assert_eq!(sink.packets(), vec![Packet::Pong { ack: 0, echo: 1234 }]);
    }

    #[test]
    fn test_reliable_receive_and_standalone_ack() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = connected_outbound(now, &clock, &mut sink);
        // Keep the ping timer from firing during this test
        endpoint.poll(now, &clock, &mut sink);
        sink.clear();

        let second = Packet::Reliable {
            sequence: 2,
            ack: 0,
            payload: b"b",
        };
        let received = endpoint.on_packet(&second, now, &clock, &mut sink);
        assert_eq!(received.delivery, Delivery::Nothing);

        let first = Packet::Reliable {
            sequence: 1,
            ack: 0,
            payload: b"a",
        };
        let received = endpoint.on_packet(&first, now, &clock, &mut sink);
        assert_eq!(
            received.delivery,
            Delivery::Reliable {
                released: vec![b"b".to_vec()]
            }
        );

        endpoint.poll(now + Duration::from_millis(1), &clock, &mut sink);
        assert_eq!(sink.packets(), vec![Packet::Ack { ack: 2 }]);
    }

    #[test]
    fn test_data_ignored_while_connecting() {
        let now = Instant::now();
        let clock = WireClock::new(now);
        let mut sink = RecordingSink::default();
        let mut endpoint = Endpoint::outbound(
            EndpointId::from_raw(3),
            peer(),
            Duration::from_secs(1),
            &settings(),
            now,
        );

        let received = endpoint.on_packet(
            &Packet::Unreliable { payload: b"early" },
            now,
            &clock,
            &mut sink,
        );
        assert_eq!(received.delivery, Delivery::Nothing);
        assert!(!endpoint.send_unreliable(b"early", &mut sink));
    }

    #[test]
    fn test_inbound_answers_duplicate_request() {
        let now = Instant::now();
        let mut sink = RecordingSink::default();
        let mut endpoint = Endpoint::inbound(EndpointId::from_raw(5), peer(), 9, &settings(), now);
        assert_eq!(endpoint.direction(), Direction::Inbound);
        assert!(endpoint.state().is_connected());

        endpoint.on_connect_request(9, 77, now, &mut sink);
        assert_eq!(
            sink.packets(),
            vec![Packet::ConnectAccept {
                requester: 9,
                acceptor: 5,
                echo: 77
            }]
        );
    }

    #[test]
    fn test_ping_interval_clamped() {
        assert_eq!(
            effective_ping_interval(Duration::from_millis(250), Duration::from_millis(400)),
            Duration::from_millis(100)
        );
        assert_eq!(
            effective_ping_interval(Duration::from_millis(250), Duration::from_millis(1)),
            MIN_PING_INTERVAL
        );
    }
}
