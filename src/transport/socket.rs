//! Dual-stack UDP socket pair.
//!
//! The engine owns one IPv4 and one IPv6 socket, both non-blocking. Reads
//! return `Ok(None)` once nothing more is queued so a tick never waits.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, UdpSocket};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use super::address::normalize;
use crate::core::{AddressFamily, Error, Result};

/// One IPv4 and one IPv6 non-blocking UDP socket.
#[derive(Debug)]
pub struct DualSocket {
    v4: UdpSocket,
    v6: UdpSocket,
}

impl DualSocket {
    /// Bind both sockets on the unspecified addresses.
    ///
    /// Port 0 picks an ephemeral port; see [`DualSocket::local_addr_v4`].
    pub fn bind(port_v6: u16, port_v4: u16) -> Result<Self> {
        Self::bind_on(Ipv6Addr::UNSPECIFIED, port_v6, Ipv4Addr::UNSPECIFIED, port_v4)
    }

    /// Bind both sockets on explicit local interfaces.
    pub fn bind_on(ip_v6: Ipv6Addr, port_v6: u16, ip_v4: Ipv4Addr, port_v4: u16) -> Result<Self> {
        let v6 = open(
            SocketAddr::V6(SocketAddrV6::new(ip_v6, port_v6, 0, 0)),
            AddressFamily::V6,
        )?;
        let v4 = open(
            SocketAddr::V4(SocketAddrV4::new(ip_v4, port_v4)),
            AddressFamily::V4,
        )?;

        debug!(
            v4 = ?v4.local_addr().ok(),
            v6 = ?v6.local_addr().ok(),
            "bound dual socket"
        );

        Ok(Self { v4, v6 })
    }

    /// Local address of the IPv4 socket.
    pub fn local_addr_v4(&self) -> io::Result<SocketAddr> {
        self.v4.local_addr()
    }

    /// Local address of the IPv6 socket.
    pub fn local_addr_v6(&self) -> io::Result<SocketAddr> {
        self.v6.local_addr()
    }

    /// Send a datagram through the socket matching the destination family.
    pub fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<usize> {
        match to {
            SocketAddr::V4(_) => self.v4.send_to(data, to),
            SocketAddr::V6(_) => self.v6.send_to(data, to),
        }
    }

    /// Try to receive one datagram from the socket of the given family.
    ///
    /// Returns `Ok(None)` when nothing is queued. The source address is
    /// normalized (IPv4-mapped IPv6 becomes IPv4).
    pub fn try_recv_from(
        &self,
        family: AddressFamily,
        buf: &mut [u8],
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        let socket = match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        };

        match socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, normalize(from)))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn open(addr: SocketAddr, family: AddressFamily) -> Result<UdpSocket> {
    let bind_err = |source| Error::Bind {
        family,
        port: addr.port(),
        source,
    };

    let domain = match family {
        AddressFamily::V4 => Domain::IPV4,
        AddressFamily::V6 => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    if family == AddressFamily::V6 {
        // Otherwise the v6 socket also claims the IPv4 port on Linux
        socket.set_only_v6(true).map_err(bind_err)?;
    }
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&SockAddr::from(addr)).map_err(bind_err)?;
    Ok(socket.into())
}

/// Whether a receive error is transient feedback that should not stop a drain.
///
/// Some platforms surface ICMP port-unreachable replies to earlier sends as
/// errors on the next `recv_from` of an unconnected socket.
pub fn is_transient_recv_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv6_loopback_available() -> bool {
        UdpSocket::bind("[::1]:0").is_ok()
    }

    #[test]
    fn test_bind_ephemeral() {
        let socket = DualSocket::bind(0, 0).unwrap();
        assert_ne!(socket.local_addr_v4().unwrap().port(), 0);
        assert_ne!(socket.local_addr_v6().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_conflict_reports_family() {
        let first = DualSocket::bind_on(Ipv6Addr::LOCALHOST, 0, Ipv4Addr::LOCALHOST, 0);
        let Ok(first) = first else {
            // No IPv6 loopback on this host
            return;
        };
        let taken = first.local_addr_v4().unwrap().port();

        let err = DualSocket::bind_on(Ipv6Addr::LOCALHOST, 0, Ipv4Addr::LOCALHOST, taken)
            .unwrap_err();
        match err {
            Error::Bind { family, port, .. } => {
                assert_eq!(family, AddressFamily::V4);
                assert_eq!(port, taken);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_port_for_both_families() {
        let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let socket = DualSocket::bind(port, port).unwrap();
        assert_eq!(socket.local_addr_v4().unwrap().port(), port);
        assert_eq!(socket.local_addr_v6().unwrap().port(), port);
    }

    #[test]
    fn test_try_recv_empty() {
        let socket = DualSocket::bind(0, 0).unwrap();
        let mut buf = [0u8; 64];
        assert!(socket.try_recv_from(AddressFamily::V4, &mut buf).unwrap().is_none());
        assert!(socket.try_recv_from(AddressFamily::V6, &mut buf).unwrap().is_none());
    }

    #[test]
    fn test_send_recv_v4() {
        let a = DualSocket::bind(0, 0).unwrap();
        let b = DualSocket::bind(0, 0).unwrap();
        let b_port = b.local_addr_v4().unwrap().port();

        let to: SocketAddr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), b_port);
        a.send_to(b"ping", to).unwrap();

        let mut buf = [0u8; 64];
        let mut received = None;
        for _ in 0..200 {
            if let Some(r) = b.try_recv_from(AddressFamily::V4, &mut buf).unwrap() {
                received = Some(r);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let (len, from) = received.expect("datagram should arrive on loopback");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from.port(), a.local_addr_v4().unwrap().port());
        assert!(from.is_ipv4());
    }

    #[test]
    fn test_send_recv_v6() {
        if !ipv6_loopback_available() {
            return;
        }
        let a = DualSocket::bind(0, 0).unwrap();
        let b = DualSocket::bind(0, 0).unwrap();
        let to = SocketAddr::new(Ipv6Addr::LOCALHOST.into(), b.local_addr_v6().unwrap().port());
        a.send_to(b"six", to).unwrap();

        let mut buf = [0u8; 64];
        for _ in 0..200 {
            if let Some((len, from)) = b.try_recv_from(AddressFamily::V6, &mut buf).unwrap() {
                assert_eq!(&buf[..len], b"six");
                assert!(from.is_ipv6());
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        panic!("datagram never arrived on ::1");
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient_recv_error(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(!is_transient_recv_error(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }
}
