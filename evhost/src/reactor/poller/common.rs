use super::unix::{sys_close, sys_pipe, sys_read, sys_write};
use crate::Revents;

use std::io;
use std::os::fd::RawFd;

/// Readiness a file descriptor is registered for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const NONE: Interest = Interest {
        read: false,
        write: false,
    };

    /// Extracts the `READ`/`WRITE` part of an event mask.
    pub(crate) fn from_revents(revents: Revents) -> Self {
        Self {
            read: revents.contains(Revents::READ),
            write: revents.contains(Revents::WRITE),
        }
    }

    pub(crate) fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    pub(crate) fn union(self, other: Interest) -> Self {
        Self {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }
}

/// Wake-up channel of a poller.
///
/// Writing to it makes a blocking poll return. The signal handler uses it
/// to hand signals over to the loop that watches them, so [`wake_fd`] only
/// performs async-signal-safe calls.
///
/// On Linux both ends are the same `eventfd`; elsewhere it is a pipe.
pub(crate) struct Waker {
    read: RawFd,
    write: RawFd,
}

impl Waker {
    /// Creates a waker backed by a non-blocking pipe.
    pub(crate) fn pipe() -> io::Result<Self> {
        let (read, write) = sys_pipe()?;
        Ok(Self { read, write })
    }

    /// Creates a waker backed by a single `eventfd`.
    #[cfg(target_os = "linux")]
    pub(crate) fn eventfd() -> io::Result<Self> {
        let fd = super::unix::sys_eventfd()?;
        Ok(Self {
            read: fd,
            write: fd,
        })
    }

    /// Descriptor the poller watches for wake-ups.
    pub(crate) fn read_fd(&self) -> RawFd {
        self.read
    }

    /// Descriptor written to in order to wake the poller.
    pub(crate) fn write_fd(&self) -> RawFd {
        self.write
    }

    /// Consumes every pending wake-up.
    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 64];
        while sys_read(self.read, &mut buf) > 0 {}
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        sys_close(self.read);
        if self.write != self.read {
            sys_close(self.write);
        }
    }
}

/// Writes a wake-up token to `fd`.
///
/// Eight bytes are written because an `eventfd` rejects anything else;
/// a pipe accepts them just as well.
pub(crate) fn wake_fd(fd: RawFd) {
    let buf = 1u64.to_ne_bytes();
    sys_write(fd, &buf);
}
