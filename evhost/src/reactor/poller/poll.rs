//! Portable `poll(2)`-based poller implementation.
//!
//! Keeps the registered descriptors in a map and rebuilds the `pollfd`
//! array before every wait. Slower than `epoll` for large descriptor sets
//! but available on every unix, and selectable explicitly through
//! [`LoopBuilder::backend`](crate::LoopBuilder::backend).

use super::common::{Interest, Waker};
use super::unix::timeout_ms;
use crate::reactor::event::{self, Event};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};
use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub(crate) struct PollPoller {
    /// Registered descriptors and their interests, ordered by descriptor.
    registered: BTreeMap<RawFd, Interest>,

    /// Reusable `pollfd` buffer; slot 0 is always the waker.
    fds: Vec<pollfd>,

    /// Self-pipe used as a wake-up signal.
    waker: Waker,
}

impl PollPoller {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            registered: BTreeMap::new(),
            fds: Vec::with_capacity(capacity.max(1) + 1),
            waker: Waker::pipe()?,
        })
    }

    pub(crate) fn waker(&self) -> &Waker {
        &self.waker
    }

    pub(crate) fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        if self.registered.contains_key(&fd) {
            return Err(io::Error::from_raw_os_error(libc::EEXIST));
        }

        self.registered.insert(fd, interest);
        Ok(())
    }

    pub(crate) fn reregister(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.registered.get_mut(&fd) {
            Some(current) => {
                *current = interest;
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    pub(crate) fn deregister(&mut self, fd: RawFd) {
        self.registered.remove(&fd);
    }

    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();
        self.fds.clear();

        self.fds.push(pollfd {
            fd: self.waker.read_fd(),
            events: POLLIN,
            revents: 0,
        });

        for (&fd, interest) in &self.registered {
            let mut flags = 0;
            if interest.read {
                flags |= POLLIN;
            }
            if interest.write {
                flags |= POLLOUT;
            }

            self.fds.push(pollfd {
                fd,
                events: flags,
                revents: 0,
            });
        }

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        if self.fds[0].revents != 0 {
            self.waker.drain();
        }

        for pfd in &self.fds[1..] {
            if pfd.revents == 0 {
                continue;
            }

            let invalid = pfd.revents & POLLNVAL != 0;
            let failed = pfd.revents & (POLLERR | POLLHUP) != 0;
            let readable = failed || pfd.revents & POLLIN != 0;
            let writable = failed || pfd.revents & POLLOUT != 0;

            event::merge(events, pfd.fd, readable, writable, invalid);
        }

        Ok(())
    }
}
