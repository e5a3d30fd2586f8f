#![allow(dead_code)]

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The mDNS socket could not be created, configured or bound at startup.
    /// Fatal: the daemon cannot run without it.
    #[error("mdns socket unavailable: {0}")]
    ErrSocketUnavailable(String),
    /// A service or query name exceeded the 100-byte limit. The offending
    /// call is rejected without touching any engine state.
    #[error("name too long, the limit is 100 bytes")]
    ErrNameTooLong,
    /// An inbound datagram referenced bytes past its end, or an outbound
    /// record did not fit the packet buffer. Processing of that single
    /// packet is aborted; registries are left untouched.
    #[error("packet buffer bounds exceeded")]
    ErrParseFault,
    /// `sendto` on the multicast socket failed. Logged, never retried.
    #[error("mdns send failed: {0}")]
    ErrSendFailed(String),
    /// No non-loopback IPv4 interface was found and no local IP was
    /// configured explicitly.
    #[error("no usable ipv4 interface")]
    ErrNoInterface,
    /// The host poller refused a callback or timer registration.
    #[error("poller registration failed: {0}")]
    ErrPollerRegistration(String),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}
