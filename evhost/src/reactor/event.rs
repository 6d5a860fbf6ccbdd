use super::poller::common::Interest;

use std::os::fd::RawFd;

/// An I/O event reported by the poller.
///
/// An `Event` carries readiness information for one registered file
/// descriptor. It is produced by the poller and consumed by the loop,
/// which turns it into pending `READ`/`WRITE` events for every io watcher
/// interested in that descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    /// The descriptor this readiness belongs to.
    pub(crate) fd: RawFd,

    /// Indicates that the file descriptor is readable.
    pub(crate) readable: bool,

    /// Indicates that the file descriptor is writable.
    pub(crate) writable: bool,

    /// The descriptor is not open any more (`POLLNVAL`).
    pub(crate) invalid: bool,
}

impl Event {
    /// Readiness as an [`Interest`], for matching against watcher masks.
    pub(crate) fn ready(&self) -> Interest {
        Interest {
            read: self.readable,
            write: self.writable,
        }
    }
}

/// Merges readiness for `fd` into `events`, keeping one entry per descriptor.
pub(crate) fn merge(events: &mut Vec<Event>, fd: RawFd, readable: bool, writable: bool, invalid: bool) {
    if let Some(e) = events.iter_mut().find(|e| e.fd == fd) {
        e.readable |= readable;
        e.writable |= writable;
        e.invalid |= invalid;
    } else {
        events.push(Event {
            fd,
            readable,
            writable,
            invalid,
        });
    }
}
