//! # rmid-mdns
//!
//! Multicast DNS responder and discoverer for the rmid daemon, which bridges
//! local MIDI sequencer ports to RTP-MIDI peers on the LAN.
//!
//! The engine owns one UDP socket on the mDNS group (`224.0.0.251:5353`) and
//! drives the full protocol in both directions:
//!
//! - **Responder**: records passed to [`Mdns::announce`] are served
//!   authoritatively. Questions for an announced `(type, label)` are answered
//!   immediately, and broadcast announcements are re-emitted every TTL until
//!   withdrawn with [`Mdns::unannounce`].
//! - **Discoverer**: [`Mdns::on_discovery`] subscribes a callback to observed
//!   answers by `(type, pattern)`, where a `*.suffix` pattern matches any
//!   label under that suffix. [`Mdns::query_with`] sends a one-shot question
//!   and fires its callback on the first answer.
//! - **Cache**: observed answers are cached by `(type, label)`; a later
//!   [`Mdns::query`] for a cached key is answered synchronously from the
//!   cache without touching the network. Goodbye records (ttl 0) evict.
//!
//! Record types supported: `A`, `PTR`, `SRV`, `TXT` (IPv4 only). Inbound
//! packets may use DNS compression pointers; outbound packets never do.
//!
//! ## Event loop
//!
//! The engine performs no waiting of its own. The host hands it a
//! [`Poller`]: the engine registers its socket for readability and schedules
//! one-shot reannouncement timers. All callbacks run on the poller's thread,
//! one at a time, so the engine is single-threaded and lock-free.
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use rmid_mdns::{EngineConfig, Mdns, RecordType, ServiceRecord};
//!
//! let poller: Rc<dyn rmid_mdns::Poller> = daemon.poller();
//! let mdns = Mdns::new(EngineConfig::default(), poller)?;
//!
//! // Serve our session under the RTP-MIDI service type.
//! mdns.announce(
//!     ServiceRecord::ptr("_apple-midi._udp.local", 60, "studio._apple-midi._udp.local"),
//!     true,
//! )?;
//!
//! // Watch for everyone else's sessions.
//! mdns.on_discovery("_apple-midi._udp.local", RecordType::Ptr, |record| {
//!     log::info!("rtp-midi peer: {record}");
//! })?;
//! ```
//!
//! ## Records
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use rmid_mdns::{RecordType, ServiceRecord};
//!
//! let srv = ServiceRecord::srv("studio._apple-midi._udp.local", 60, "host.local", 5004);
//! assert_eq!(srv.rtype(), RecordType::Srv);
//!
//! // TTL is freshness, not identity: a goodbye equals the record it
//! // withdraws.
//! let goodbye = ServiceRecord::srv("studio._apple-midi._udp.local", 0, "host.local", 5004);
//! assert_eq!(srv, goodbye);
//!
//! // An unspecified A address means "my current IP" at send time.
//! let a = ServiceRecord::a("host.local", 60, Ipv4Addr::UNSPECIFIED);
//! assert_eq!(a.to_string(), "A record. label: host.local, ip: 0.0.0.0");
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub(crate) mod config;
pub(crate) mod engine;
pub(crate) mod message;
pub(crate) mod poller;
pub(crate) mod record;
pub(crate) mod routes;
pub(crate) mod socket;

pub use config::EngineConfig;
pub use engine::{
    AnnounceHandle, DiscoveryCallback, MDNS_DEST_ADDR, MDNS_MULTICAST_IPV4, MDNS_PORT, Mdns,
    QueryCallback,
};
pub use message::RecordType;
pub use poller::{Poller, ReadableCallback, TimerCallback, TimerHandle};
pub use record::{RecordData, ServiceRecord};
pub use routes::RouteTable;
pub use socket::{MulticastSocket, Transport, UdpTransport};

// Re-export interface enumeration for hosts wiring up the engine
pub use shared::ifaces;
