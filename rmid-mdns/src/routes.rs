//! Local IPv4 route resolution.
//!
//! The engine substitutes its own address into A records at send time; which
//! address is "its own" depends on which subnet the peer lives in. The table
//! is built once at startup from the interface list and consulted per packet.

use std::net::Ipv4Addr;

use shared::error::Result;
use shared::ifaces::{self, Iface};

#[derive(Debug, Clone, Copy)]
struct Route {
    ip: Ipv4Addr,
    mask: Ipv4Addr,
}

impl Route {
    fn matches(&self, other: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(other) & mask == u32::from(self.ip) & mask
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    default_ip: Option<Ipv4Addr>,
}

impl RouteTable {
    /// Build the table from an interface list. The first non-loopback
    /// address becomes the default local IP.
    pub fn from_ifaces(ifaces: &[Iface]) -> Self {
        let mut table = RouteTable::default();
        for iface in ifaces {
            table.routes.push(Route {
                ip: iface.addr,
                mask: iface.netmask,
            });
            if table.default_ip.is_none() && !iface.loopback {
                table.default_ip = Some(iface.addr);
            }
        }
        table
    }

    /// Build the table from the operating system's interface list.
    pub fn discover() -> Result<Self> {
        Ok(Self::from_ifaces(&ifaces::ifaces()?))
    }

    pub fn default_ip(&self) -> Option<Ipv4Addr> {
        self.default_ip
    }

    /// The local address sharing a subnet with `peer`, if any. `None` means
    /// the caller should fall back to the default.
    pub fn ip_for_peer(&self, peer: Ipv4Addr) -> Option<Ipv4Addr> {
        self.routes
            .iter()
            .find(|route| route.matches(peer))
            .map(|route| route.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(addr: [u8; 4], netmask: [u8; 4], loopback: bool) -> Iface {
        Iface::new(Ipv4Addr::from(addr), Ipv4Addr::from(netmask), loopback)
    }

    #[test]
    fn test_default_skips_loopback() {
        let table = RouteTable::from_ifaces(&[
            iface([127, 0, 0, 1], [255, 0, 0, 0], true),
            iface([10, 0, 0, 7], [255, 255, 255, 0], false),
            iface([192, 168, 1, 4], [255, 255, 255, 0], false),
        ]);
        assert_eq!(table.default_ip(), Some(Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[test]
    fn test_ip_for_peer_matches_subnet() {
        let table = RouteTable::from_ifaces(&[
            iface([10, 0, 0, 7], [255, 255, 255, 0], false),
            iface([192, 168, 1, 4], [255, 255, 255, 0], false),
        ]);
        assert_eq!(
            table.ip_for_peer(Ipv4Addr::new(192, 168, 1, 77)),
            Some(Ipv4Addr::new(192, 168, 1, 4))
        );
        assert_eq!(
            table.ip_for_peer(Ipv4Addr::new(10, 0, 0, 200)),
            Some(Ipv4Addr::new(10, 0, 0, 7))
        );
        assert_eq!(table.ip_for_peer(Ipv4Addr::new(172, 16, 0, 1)), None);
    }

    #[test]
    fn test_empty_table() {
        let table = RouteTable::from_ifaces(&[]);
        assert_eq!(table.default_ip(), None);
        assert_eq!(table.ip_for_peer(Ipv4Addr::new(10, 0, 0, 1)), None);
    }
}
