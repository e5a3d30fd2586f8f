//! Socket plumbing for the engine.
//!
//! [`MulticastSocket`] builds the real UDP socket: bound to `0.0.0.0:5353`
//! with `SO_REUSEADDR` and `SO_REUSEPORT`, non-blocking, joined to the mDNS
//! multicast group. [`Transport`] is the narrow seam the engine talks
//! through, so tests can swap in a recording implementation.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};

use crate::engine::{MDNS_DEST_ADDR, MDNS_MULTICAST_IPV4, MDNS_PORT};

/// What the engine needs from the wire: a pollable descriptor, non-blocking
/// reads, and multicast sends.
pub trait Transport {
    /// Descriptor registered with the host poller.
    fn fd(&self) -> RawFd;

    /// Non-blocking receive of one datagram.
    fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to the multicast group.
    fn broadcast(&self, payload: &[u8]) -> io::Result<usize>;
}

/// Builder for the mDNS multicast socket.
#[derive(Debug, Clone, Default)]
pub struct MulticastSocket {
    interface: Option<Ipv4Addr>,
}

impl MulticastSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the multicast group on a specific interface instead of
    /// `INADDR_ANY`.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Create the configured `std::net::UdpSocket`.
    pub fn into_std(self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // Several responders may share the port on one host
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;

        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), MDNS_PORT);
        socket.bind(&bind_addr.into())?;

        let iface = self.interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&MDNS_MULTICAST_IPV4, &iface)?;

        Ok(socket.into())
    }
}

/// The production [`Transport`] over a real multicast socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn new(interface: Option<Ipv4Addr>) -> io::Result<Self> {
        let mut builder = MulticastSocket::new();
        if let Some(iface) = interface {
            builder = builder.with_interface(iface);
        }
        Ok(Self {
            socket: builder.into_std()?,
        })
    }
}

impl Transport for UdpTransport {
    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    fn broadcast(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, MDNS_DEST_ADDR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_constants() {
        assert_eq!(MDNS_MULTICAST_IPV4, Ipv4Addr::new(224, 0, 0, 251));
        assert_eq!(MDNS_PORT, 5353);
        assert_eq!(MDNS_DEST_ADDR.to_string(), "224.0.0.251:5353");
    }

    #[test]
    fn test_multicast_socket_builder() {
        let interface = Ipv4Addr::new(192, 168, 1, 100);
        let builder = MulticastSocket::new().with_interface(interface);
        assert_eq!(builder.interface, Some(interface));
    }

    // Creating the real socket needs the mDNS port, which may be taken by a
    // system responder, so socket tests stay at the builder level.
}
