//! Engine configuration and protocol limits.

use std::net::Ipv4Addr;

/// Largest datagram accepted or produced, in bytes.
pub(crate) const MAX_PACKET_SIZE: usize = 1500;

/// Anything shorter than this cannot hold a header plus a question and is
/// dropped outright.
pub(crate) const MIN_PACKET_SIZE: usize = 16;

/// Longest service or query name accepted by the public API, in bytes.
pub(crate) const MAX_NAME_LEN: usize = 100;

/// Configuration for an mDNS engine.
///
/// ```rust
/// use std::net::Ipv4Addr;
/// use rmid_mdns::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_local_ip(Ipv4Addr::new(192, 168, 1, 30));
/// ```
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Local IPv4 address advertised in A records.
    ///
    /// When unset, the first non-loopback interface address is used, and the
    /// route table refines the choice per peer as packets arrive.
    pub local_ip: Option<Ipv4Addr>,

    /// Interface on which to join the multicast group.
    ///
    /// When unset the group is joined on the unspecified interface, letting
    /// the kernel pick.
    pub interface: Option<Ipv4Addr>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the advertised local IP instead of taking the route table's
    /// default.
    pub fn with_local_ip(mut self, local_ip: Ipv4Addr) -> Self {
        self.local_ip = Some(local_ip);
        self
    }

    /// Join the multicast group on a specific interface.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }
}
