//! The event-loop contract the engine consumes from its host.
//!
//! The daemon owns a single-threaded poller; the engine only asks it for two
//! things: "call me when my socket is readable" and "call me once after this
//! delay". Callbacks never run concurrently with each other, so the engine
//! needs no locking.

use std::os::fd::RawFd;
use std::time::Duration;

use shared::error::Result;

/// Callback invoked whenever a registered file descriptor is readable.
pub type ReadableCallback = Box<dyn FnMut()>;

/// Callback invoked once when a scheduled timer fires.
pub type TimerCallback = Box<dyn FnOnce()>;

/// Host event loop as seen by the engine.
///
/// Delivery is single-threaded and cooperative: the host dispatches at most
/// one callback at a time, from [`wait`](Poller::wait). Implementations
/// report registration failures as
/// [`Error::ErrPollerRegistration`](shared::error::Error::ErrPollerRegistration);
/// the engine treats those as fatal.
pub trait Poller {
    /// Invoke `callback` every time `fd` becomes readable.
    fn add_readable(&self, fd: RawFd, callback: ReadableCallback) -> Result<()>;

    /// Schedule a one-shot timer. Dropping the returned handle cancels the
    /// pending invocation; cancelling an already-fired timer is a no-op.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerHandle>;

    /// Block until the next event and dispatch it.
    fn wait(&self) -> Result<()>;
}

/// Cancellation guard for a scheduled timer.
///
/// Constructed by the poller implementation with whatever closure undoes the
/// registration. The pending callback is cancelled when the handle is
/// dropped.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TimerHandle")
    }
}
