//! The poll-driven server.
//!
//! A [`Server`] owns both sockets, the connection table, the event queue,
//! and one receive buffer. Nothing happens in the background: every call to
//! [`Server::tick`] reads whatever datagrams are waiting, advances every
//! endpoint's timers against a single `Instant`, and hands back the events
//! produced.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::config::ServerConfig;
use super::event::{EventQueue, Events, Reliability};
use crate::core::constants::{MAX_DATAGRAM_SIZE, MINIMUM_BUFFER_OVERHEAD};
use crate::core::{AddressFamily, Error, Result};
use crate::endpoint::{
    ConnectionTable, Delivery, Endpoint, EndpointId, EndpointSettings, EndpointState,
    EndpointStatus,
};
use crate::transport::{
    self, DualSocket, MAX_RELIABLE_PAYLOAD, MAX_UNRELIABLE_PAYLOAD, Packet, PacketSink, Signature,
    WireClock, is_transient_recv_error, normalize, sizes,
};

/// Tracing target for per-packet logging.
pub const PACKET_TARGET: &str = "udp_connect::packet";

/// Encodes packets into a scratch buffer and sends them.
struct SocketSink<'a> {
    socket: &'a DualSocket,
    signature: Signature,
    scratch: &'a mut Vec<u8>,
}

impl PacketSink for SocketSink<'_> {
    fn send_packet(&mut self, to: SocketAddr, packet: &Packet<'_>) {
        if let Err(err) = packet.encode(self.signature, self.scratch) {
            warn!(%to, error = %err, "failed to encode packet");
            return;
        }

        match self.socket.send_to(self.scratch.as_slice(), to) {
            Ok(_) => trace!(
                target: PACKET_TARGET,
                %to,
                kind = ?packet.kind(),
                len = self.scratch.len(),
                "sent"
            ),
            // Treated as packet loss; retransmission and liveness cover it
            Err(err) => trace!(
                target: PACKET_TARGET,
                %to,
                kind = ?packet.kind(),
                error = %err,
                "send failed"
            ),
        }
    }
}

/// Everything except the receive buffer, so datagrams borrowed from the
/// buffer can be processed while the rest of the state is mutated.
#[derive(Debug)]
struct Engine {
    config: ServerConfig,
    settings: EndpointSettings,
    socket: DualSocket,
    table: ConnectionTable,
    events: EventQueue,
    /// Owned payloads released from reorder buffers during this tick.
    stash: Vec<Vec<u8>>,
    clock: WireClock,
    scratch: Vec<u8>,
}

/// Connection-oriented UDP server.
///
/// ```no_run
/// use std::time::Duration;
/// use udp_connect::prelude::*;
///
/// let mut server = Server::bind([1, 2, 3, 4], 0, 0, 64 * 1024)?;
/// let peer = server.connect("127.0.0.1", "7777", Duration::from_secs(3))?;
///
/// loop {
///     for event in server.tick() {
///         match event {
///             Event::ConnectionSuccess(id) => println!("connected: {id}"),
///             Event::MessageReceived { payload, .. } => {
///                 println!("{} bytes", payload.len());
///             }
///             _ => {}
///         }
///     }
///     # break;
/// }
/// # let _ = peer;
/// # Ok::<(), udp_connect::Error>(())
/// ```
#[derive(Debug)]
pub struct Server {
    engine: Engine,
    /// Shared receive buffer; message events borrow from it.
    buffer: Vec<u8>,
    /// Flips every tick so neither socket can monopolize the buffer.
    v6_first: bool,
}

impl Server {
    /// Bind a server on all interfaces.
    ///
    /// The receive buffer holds `receive_buffer_size` bytes plus one full
    /// datagram. Port 0 picks an ephemeral port.
    pub fn bind(
        signature: impl Into<Signature>,
        port_v6: u16,
        port_v4: u16,
        receive_buffer_size: usize,
    ) -> Result<Self> {
        Self::from_config(ServerConfig {
            signature: signature.into(),
            port_v6,
            port_v4,
            receive_buffer_size,
            ..ServerConfig::default()
        })
    }

    /// Bind a server from a full configuration.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let socket = DualSocket::bind_on(config.bind_v6, config.port_v6, config.bind_v4, config.port_v4)?;
        let buffer = vec![0u8; config.receive_buffer_size.saturating_add(MINIMUM_BUFFER_OVERHEAD)];

        // Fresh per instance, so a restart on the same port is detectable
        let token_salt: u32 = rand::random();

        debug!(
            signature = %config.signature,
            buffer = buffer.len(),
            accept_inbound = config.accept_inbound,
            "server started"
        );

        Ok(Self {
            engine: Engine {
                settings: config.endpoint_settings(token_salt),
                table: ConnectionTable::new(config.max_endpoints),
                events: EventQueue::default(),
                stash: Vec::new(),
                clock: WireClock::new(Instant::now()),
                scratch: Vec::with_capacity(MAX_DATAGRAM_SIZE),
                socket,
                config,
            },
            buffer,
            v6_first: false,
        })
    }

    /// The configuration this server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.engine.config
    }

    /// Local address of the IPv4 socket.
    pub fn local_addr_v4(&self) -> Result<SocketAddr> {
        Ok(self.engine.socket.local_addr_v4()?)
    }

    /// Local address of the IPv6 socket.
    pub fn local_addr_v6(&self) -> Result<SocketAddr> {
        Ok(self.engine.socket.local_addr_v6()?)
    }

    /// Number of endpoints currently tracked.
    pub fn endpoint_count(&self) -> usize {
        self.engine.table.len()
    }

    /// Resolve `node`/`service` and start connecting.
    ///
    /// Returns at once; the outcome arrives as
    /// [`Event::ConnectionSuccess`](super::Event::ConnectionSuccess) or
    /// [`Event::ConnectionTimeout`](super::Event::ConnectionTimeout).
    pub fn connect(&mut self, node: &str, service: &str, timeout: Duration) -> Result<EndpointId> {
        let address = transport::resolve(node, service, self.engine.config.family_preference)?;
        self.connect_addr(address, timeout)
    }

    /// Start connecting to an already resolved address.
    ///
    /// `timeout` bounds the handshake and is also the liveness window of
    /// the resulting connection.
    pub fn connect_addr(&mut self, address: SocketAddr, timeout: Duration) -> Result<EndpointId> {
        self.engine.open(normalize(address), timeout, Instant::now())
    }

    /// Send a message to a peer.
    ///
    /// Unreliable messages are dropped silently unless the endpoint is
    /// connected. Reliable messages are queued until acknowledged.
    pub fn send(&mut self, id: EndpointId, payload: &[u8], reliability: Reliability) -> Result<()> {
        self.engine.send(id, payload, reliability, Instant::now())
    }

    /// Close a connection, discarding its pending reliable messages.
    ///
    /// Queued events for `id` are discarded too. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: EndpointId) {
        self.engine.disconnect(id);
    }

    /// Current state of an endpoint.
    pub fn status(&self, id: EndpointId) -> Result<EndpointStatus> {
        self.engine
            .table
            .get(id)
            .map(Endpoint::status)
            .ok_or(Error::UnknownEndpoint(id))
    }

    /// Run one processing step and return the events it produced.
    ///
    /// Message payloads borrow the server's buffers, so the returned
    /// iterator must be dropped before the next call.
    pub fn tick(&mut self) -> Events<'_> {
        let now = Instant::now();

        let stale = self.engine.events.discard_messages();
        if stale > 0 {
            warn!(stale, "discarding message events left over from the previous tick");
        }
        self.engine.stash.clear();

        let order = if self.v6_first {
            [AddressFamily::V6, AddressFamily::V4]
        } else {
            [AddressFamily::V4, AddressFamily::V6]
        };
        self.v6_first = !self.v6_first;

        let mut used = 0;
        for family in order {
            used = self.drain_socket(family, used, now);
        }

        self.engine.poll_timers(now);
        self.events()
    }

    /// Drain events still queued without running a tick.
    pub fn events(&mut self) -> Events<'_> {
        self.engine.events.drain(&self.buffer, &self.engine.stash)
    }

    /// Read datagrams from one socket into the buffer starting at `used`.
    ///
    /// Returns the new fill level; only datagrams that produced a message
    /// event keep their bytes.
    fn drain_socket(&mut self, family: AddressFamily, mut used: usize, now: Instant) -> usize {
        loop {
            if self.buffer.len() - used < MAX_DATAGRAM_SIZE {
                trace!(target: PACKET_TARGET, %family, "receive buffer full, deferring to next tick");
                break;
            }

            let slot = &mut self.buffer[used..used + MAX_DATAGRAM_SIZE];
            match self.engine.socket.try_recv_from(family, slot) {
                Ok(Some((len, from))) => {
                    let datagram = &self.buffer[used..used + len];
                    if self.engine.handle_datagram(datagram, used, from, now) {
                        used += len;
                    }
                }
                Ok(None) => break,
                Err(err) if is_transient_recv_error(&err) => {
                    trace!(target: PACKET_TARGET, %family, error = %err, "transient receive error");
                }
                Err(err) => {
                    warn!(%family, error = %err, "receive failed");
                    break;
                }
            }
        }
        used
    }
}

impl Engine {
    fn open(&mut self, address: SocketAddr, timeout: Duration, now: Instant) -> Result<EndpointId> {
        let settings = self.settings;
        let id = self
            .table
            .insert_with(address, |id| Endpoint::outbound(id, address, timeout, &settings, now))?;

        let mut sink = SocketSink {
            socket: &self.socket,
            signature: self.config.signature,
            scratch: &mut self.scratch,
        };
        if let Some(endpoint) = self.table.get_mut(id) {
            endpoint.start(now, &self.clock, &mut sink);
        }

        debug!(endpoint = %id, peer = %address, timeout_ms = timeout.as_millis() as u64, "connecting");
        Ok(id)
    }

    fn send(&mut self, id: EndpointId, payload: &[u8], reliability: Reliability, now: Instant) -> Result<()> {
        if self.table.get(id).is_none() {
            return Err(Error::UnknownEndpoint(id));
        }

        let max = match reliability {
            Reliability::Unreliable => MAX_UNRELIABLE_PAYLOAD,
            Reliability::Reliable => MAX_RELIABLE_PAYLOAD,
        };
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut sink = SocketSink {
            socket: &self.socket,
            signature: self.config.signature,
            scratch: &mut self.scratch,
        };
        let endpoint = self.table.get_mut(id).ok_or(Error::UnknownEndpoint(id))?;
        match reliability {
            Reliability::Unreliable => {
                endpoint.send_unreliable(payload, &mut sink);
            }
            Reliability::Reliable => {
                endpoint.send_reliable(payload.to_vec(), now, &mut sink);
            }
        }
        Ok(())
    }

    fn disconnect(&mut self, id: EndpointId) {
        // Events already queued for the id are suppressed even if the
        // endpoint itself is gone
        let purged = self.events.purge(id);
        let Some(mut endpoint) = self.table.remove(id) else {
            trace!(endpoint = %id, purged, "disconnect of unknown endpoint");
            return;
        };

        let dropped = endpoint.close();
        debug!(
            endpoint = %id,
            peer = %endpoint.address(),
            direction = ?endpoint.direction(),
            dropped,
            purged,
            "disconnected"
        );
    }

    /// Route one datagram. Returns `true` if an event borrows its bytes.
    fn handle_datagram(&mut self, datagram: &[u8], offset: usize, from: SocketAddr, now: Instant) -> bool {
        let packet = match Packet::decode(self.config.signature, datagram) {
            Ok(packet) => packet,
            Err(err) => {
                trace!(target: PACKET_TARGET, %from, len = datagram.len(), error = %err, "dropped datagram");
                return false;
            }
        };
        trace!(target: PACKET_TARGET, %from, kind = ?packet.kind(), len = datagram.len(), "received");

        match packet {
            Packet::ConnectRequest { token, timestamp } => {
                self.on_connect_request(from, token, timestamp, now);
                false
            }
            Packet::ConnectAccept {
                requester,
                acceptor,
                echo,
            } => {
                self.on_connect_accept(from, requester, acceptor, echo, now);
                false
            }
            _ => self.on_endpoint_packet(&packet, offset, from, now),
        }
    }

    fn on_connect_request(&mut self, from: SocketAddr, token: u32, timestamp: u32, now: Instant) {
        if let Some(id) = self.table.id_for(&from) {
            let mut sink = SocketSink {
                socket: &self.socket,
                signature: self.config.signature,
                scratch: &mut self.scratch,
            };
            if let Some(endpoint) = self.table.get_mut(id) {
                // A new token from an established peer means it restarted
                let restarted = endpoint.state() != EndpointState::Connecting
                    && endpoint.peer_token().is_some_and(|known| known != token);
                if !restarted {
                    if let Some(transition) = endpoint.on_connect_request(token, timestamp, now, &mut sink) {
                        self.events.push_transition(id, transition);
                    }
                    return;
                }
            }

            if let Some(mut stale) = self.table.remove(id) {
                let dropped = stale.close();
                debug!(endpoint = %id, peer = %from, dropped, "peer restarted, replacing endpoint");
            }
        }

        if !self.config.accept_inbound {
            trace!(target: PACKET_TARGET, %from, "inbound connection refused");
            return;
        }

        let settings = self.settings;
        let id = match self
            .table
            .insert_with(from, |id| Endpoint::inbound(id, from, token, &settings, now))
        {
            Ok(id) => id,
            Err(err) => {
                debug!(peer = %from, error = %err, "inbound connection dropped");
                return;
            }
        };

        let mut sink = SocketSink {
            socket: &self.socket,
            signature: self.config.signature,
            scratch: &mut self.scratch,
        };
        if let Some(endpoint) = self.table.get_mut(id) {
            endpoint.on_connect_request(token, timestamp, now, &mut sink);
        }
        self.events.push_accepted(id, from);
        debug!(endpoint = %id, peer = %from, "connection accepted");
    }

    fn on_connect_accept(&mut self, from: SocketAddr, requester: u32, acceptor: u32, echo: u32, now: Instant) {
        let Some(id) = self.table.id_for(&from) else {
            trace!(target: PACKET_TARGET, %from, "accept from unknown address ignored");
            return;
        };

        let mut sink = SocketSink {
            socket: &self.socket,
            signature: self.config.signature,
            scratch: &mut self.scratch,
        };
        if let Some(endpoint) = self.table.get_mut(id) {
            if let Some(transition) =
                endpoint.on_connect_accept(requester, acceptor, echo, now, &self.clock, &mut sink)
            {
                self.events.push_transition(id, transition);
            }
        }
    }

    fn on_endpoint_packet(&mut self, packet: &Packet<'_>, offset: usize, from: SocketAddr, now: Instant) -> bool {
        let Some(id) = self.table.id_for(&from) else {
            trace!(target: PACKET_TARGET, %from, kind = ?packet.kind(), "packet from unknown address");
            return false;
        };

        let mut sink = SocketSink {
            socket: &self.socket,
            signature: self.config.signature,
            scratch: &mut self.scratch,
        };
        let Some(endpoint) = self.table.get_mut(id) else {
            return false;
        };
        let received = endpoint.on_packet(packet, now, &self.clock, &mut sink);

        if let Some(transition) = received.transition {
            self.events.push_transition(id, transition);
        }

        let len = packet.payload().map_or(0, <[u8]>::len);
        match received.delivery {
            Delivery::Nothing => false,
            Delivery::Unreliable => {
                let start = offset + sizes::UNRELIABLE_HEADER_SIZE;
                self.events
                    .push_buffered_message(id, from, Reliability::Unreliable, start, len);
                true
            }
            Delivery::Reliable { released } => {
                let start = offset + sizes::RELIABLE_HEADER_SIZE;
                self.events
                    .push_buffered_message(id, from, Reliability::Reliable, start, len);
                for payload in released {
                    self.stash.push(payload);
                    self.events.push_stashed_message(id, from, self.stash.len() - 1);
                }
                true
            }
        }
    }

    fn poll_timers(&mut self, now: Instant) {
        let mut finished = Vec::new();
        let mut sink = SocketSink {
            socket: &self.socket,
            signature: self.config.signature,
            scratch: &mut self.scratch,
        };

        for endpoint in self.table.iter_mut() {
            if let Some(transition) = endpoint.poll(now, &self.clock, &mut sink) {
                self.events.push_transition(endpoint.id(), transition);
                if transition.is_final() {
                    finished.push(endpoint.id());
                }
            }
        }

        for id in finished {
            self.table.remove(id);
        }
    }
}
