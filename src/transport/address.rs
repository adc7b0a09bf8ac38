//! Address parsing and normalization.
//!
//! Node names may be literal IPv4/IPv6 addresses or host names resolved
//! through the system resolver; services are decimal port numbers.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::core::{Error, Result};

/// Which address family to prefer when a name resolves to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyPreference {
    /// Use the first IPv4 result, falling back to IPv6.
    #[default]
    Ipv4First,
    /// Use the first IPv6 result, falling back to IPv4.
    Ipv6First,
    /// Only accept IPv4 results.
    Ipv4Only,
    /// Only accept IPv6 results.
    Ipv6Only,
}

impl FamilyPreference {
    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            FamilyPreference::Ipv4Only => addr.is_ipv4(),
            FamilyPreference::Ipv6Only => addr.is_ipv6(),
            FamilyPreference::Ipv4First | FamilyPreference::Ipv6First => true,
        }
    }

    fn prefers(self, addr: &SocketAddr) -> bool {
        match self {
            FamilyPreference::Ipv4First | FamilyPreference::Ipv4Only => addr.is_ipv4(),
            FamilyPreference::Ipv6First | FamilyPreference::Ipv6Only => addr.is_ipv6(),
        }
    }
}

/// Resolve a node/service pair to a single socket address.
pub fn parse_address(node: &str, service: &str) -> Result<SocketAddr> {
    resolve(node, service, FamilyPreference::default())
}

/// Resolve a node/service pair to an IPv4 socket address.
pub fn parse_address_v4(node: &str, service: &str) -> Result<SocketAddr> {
    resolve(node, service, FamilyPreference::Ipv4Only)
}

/// Resolve a node/service pair to an IPv6 socket address.
pub fn parse_address_v6(node: &str, service: &str) -> Result<SocketAddr> {
    resolve(node, service, FamilyPreference::Ipv6Only)
}

/// Resolve a node/service pair, picking a result according to `preference`.
pub fn resolve(node: &str, service: &str, preference: FamilyPreference) -> Result<SocketAddr> {
    let fail = |reason: String| Error::Resolve {
        node: node.to_string(),
        service: service.to_string(),
        reason,
    };

    let port: u16 = service
        .trim()
        .parse()
        .map_err(|_| fail("service must be a port number".to_string()))?;

    let host = node.trim();
    // Bracketed IPv6 literals as they appear in URLs
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() {
        return Err(fail("empty node name".to_string()));
    }

    // Literal addresses skip the resolver
    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = normalize(SocketAddr::new(ip, port));
        if !preference.accepts(&addr) {
            return Err(fail("address family not allowed".to_string()));
        }
        return Ok(addr);
    }

    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| fail(e.to_string()))?
        .map(normalize)
        .filter(|addr| preference.accepts(addr))
        .collect();

    candidates
        .iter()
        .find(|addr| preference.prefers(addr))
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| fail("no address of an allowed family".to_string()))
}

/// Collapse IPv4-mapped IPv6 addresses to plain IPv4.
///
/// Dual-stack IPv6 sockets report IPv4 peers as `::ffff:a.b.c.d`; the
/// connection table keys on the canonical form so both sockets agree.
pub fn normalize(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => addr,
        },
        SocketAddr::V4(_) => addr,
    }
}
