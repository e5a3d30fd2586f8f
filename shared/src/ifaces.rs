//! IPv4 interface enumeration.
//!
//! Thin wrapper over the `if-addrs` crate that reduces each interface to the
//! triple the route resolver cares about: address, netmask and whether the
//! interface is a loopback. IPv6 addresses are skipped.

use std::net::Ipv4Addr;

use if_addrs::IfAddr;

use crate::error::Result;

/// One IPv4 interface address as reported by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iface {
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub loopback: bool,
}

impl Iface {
    pub fn new(addr: Ipv4Addr, netmask: Ipv4Addr, loopback: bool) -> Self {
        Self {
            addr,
            netmask,
            loopback,
        }
    }
}

/// Enumerate the IPv4 addresses of all local interfaces.
pub fn ifaces() -> Result<Vec<Iface>> {
    let mut out = Vec::new();
    for iface in if_addrs::get_if_addrs().map_err(crate::error::Error::from)? {
        let loopback = iface.is_loopback();
        if let IfAddr::V4(v4) = iface.addr {
            out.push(Iface::new(v4.ip, v4.netmask, loopback));
        }
    }
    Ok(out)
}
