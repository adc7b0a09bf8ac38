//! Server configuration.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::core::constants::timing::{
    INBOUND_TIMEOUT, MAX_LOST_DURATION, MIN_PING_INTERVAL, PING_INTERVAL,
};
use crate::core::constants::DEFAULT_MAX_ENDPOINTS;
use crate::core::{Error, Result};
use crate::endpoint::EndpointSettings;
use crate::transport::{FamilyPreference, Signature};

use super::Server;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Application signature; peers must use the same one.
    pub signature: Signature,

    /// Local interface for the IPv6 socket.
    pub bind_v6: Ipv6Addr,

    /// Port for the IPv6 socket, 0 for ephemeral.
    pub port_v6: u16,

    /// Local interface for the IPv4 socket.
    pub bind_v4: Ipv4Addr,

    /// Port for the IPv4 socket, 0 for ephemeral.
    pub port_v4: u16,

    /// Bytes of received data the caller wants to hold per tick.
    ///
    /// One datagram's worth of headroom is always added on top.
    pub receive_buffer_size: usize,

    /// Whether unknown peers may open connections.
    pub accept_inbound: bool,

    /// Maximum number of endpoints tracked at once.
    pub max_endpoints: usize,

    /// Liveness window for endpoints opened by a remote peer.
    pub inbound_timeout: Duration,

    /// Interval between liveness probes.
    pub ping_interval: Duration,

    /// How long an endpoint may stay lost before it is dropped.
    pub max_lost_duration: Duration,

    /// Which family `connect` picks when a name resolves to both.
    pub family_preference: FamilyPreference,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            signature: Signature::new([0; 4]),
            bind_v6: Ipv6Addr::UNSPECIFIED,
            port_v6: 0,
            bind_v4: Ipv4Addr::UNSPECIFIED,
            port_v4: 0,
            receive_buffer_size: 64 * 1024,
            accept_inbound: true,
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            inbound_timeout: INBOUND_TIMEOUT,
            ping_interval: PING_INTERVAL,
            max_lost_duration: MAX_LOST_DURATION,
            family_preference: FamilyPreference::default(),
        }
    }
}

impl ServerConfig {
    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_endpoints == 0 {
            return Err(Error::InvalidConfig("max_endpoints must be at least 1".into()));
        }
        if self.inbound_timeout.is_zero() {
            return Err(Error::InvalidConfig("inbound_timeout must be non-zero".into()));
        }
        if self.ping_interval < MIN_PING_INTERVAL {
            return Err(Error::InvalidConfig(format!(
                "ping_interval must be at least {}ms",
                MIN_PING_INTERVAL.as_millis()
            )));
        }
        if self.max_lost_duration.is_zero() {
            return Err(Error::InvalidConfig("max_lost_duration must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn endpoint_settings(&self, token_salt: u32) -> EndpointSettings {
        EndpointSettings {
            inbound_timeout: self.inbound_timeout,
            ping_interval: self.ping_interval,
            max_lost_duration: self.max_lost_duration,
            token_salt,
        }
    }
}

/// Builder for a [`Server`].
///
/// ```no_run
/// use udp_connect::prelude::*;
///
/// let server = ServerBuilder::new()
///     .signature(Signature::new([1, 2, 3, 4]))
///     .ports(0, 7777)
///     .accept_inbound(true)
///     .bind()?;
/// # Ok::<(), udp_connect::Error>(())
/// ```
#[derive(Debug)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the application signature.
    pub fn signature(mut self, signature: impl Into<Signature>) -> Self {
        self.config.signature = signature.into();
        self
    }

    /// Set both ports.
    pub fn ports(mut self, port_v6: u16, port_v4: u16) -> Self {
        self.config.port_v6 = port_v6;
        self.config.port_v4 = port_v4;
        self
    }

    /// Set the local IPv6 interface.
    pub fn bind_v6(mut self, ip: Ipv6Addr) -> Self {
        self.config.bind_v6 = ip;
        self
    }

    /// Set the local IPv4 interface.
    pub fn bind_v4(mut self, ip: Ipv4Addr) -> Self {
        self.config.bind_v4 = ip;
        self
    }

    /// Set the requested receive buffer size.
    pub fn receive_buffer_size(mut self, bytes: usize) -> Self {
        self.config.receive_buffer_size = bytes;
        self
    }

    /// Allow or refuse connections opened by remote peers.
    pub fn accept_inbound(mut self, accept: bool) -> Self {
        self.config.accept_inbound = accept;
        self
    }

    /// Set the maximum number of endpoints.
    pub fn max_endpoints(mut self, max: usize) -> Self {
        self.config.max_endpoints = max;
        self
    }

    /// Set the liveness window for inbound endpoints.
    pub fn inbound_timeout(mut self, timeout: Duration) -> Self {
        self.config.inbound_timeout = timeout;
        self
    }

    /// Set the liveness probe interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Set how long a lost endpoint is kept before it is dropped.
    pub fn max_lost_duration(mut self, duration: Duration) -> Self {
        self.config.max_lost_duration = duration;
        self
    }

    /// Set the address family preference used by `connect`.
    pub fn family_preference(mut self, preference: FamilyPreference) -> Self {
        self.config.family_preference = preference;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }

    /// Build the configuration and bind a server with it.
    pub fn bind(self) -> Result<Server> {
        Server::from_config(self.config)
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
