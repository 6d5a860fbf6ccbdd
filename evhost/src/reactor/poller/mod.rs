//! Platform-specific I/O poller abstraction.
//!
//! This module provides a single interface over the readiness mechanisms
//! the reactor can run on: `epoll` on Linux and `poll(2)` on every unix.
//!
//! The poller is used by the reactor to:
//! - wait for I/O readiness events,
//! - wake up when a watched signal arrives,
//! - bound the wait by the next timer deadline.
//!
//! The backend is chosen when the loop is built, see [`Backend`].

pub(crate) mod common;
pub(crate) mod unix;

#[cfg(target_os = "linux")]
mod epoll;
mod poll;

use crate::Backend;
use crate::reactor::event::Event;
use common::{Interest, Waker};

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub(crate) enum Poller {
    #[cfg(target_os = "linux")]
    Epoll(epoll::EpollPoller),
    Poll(poll::PollPoller),
}

impl Poller {
    /// Creates a poller for `backend`.
    ///
    /// `backend` must hold exactly one supported flag; the builder resolves
    /// the user's choice before getting here.
    pub(crate) fn new(backend: Backend, capacity: usize) -> io::Result<Self> {
        #[cfg(target_os = "linux")]
        {
            if backend == Backend::EPOLL {
                return Ok(Poller::Epoll(epoll::EpollPoller::new(capacity)?));
            }
        }

        if backend == Backend::POLL {
            return Ok(Poller::Poll(poll::PollPoller::new(capacity)?));
        }

        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("backend {backend:?} is not available on this platform"),
        ))
    }

    pub(crate) fn backend(&self) -> Backend {
        match self {
            #[cfg(target_os = "linux")]
            Poller::Epoll(_) => Backend::EPOLL,
            Poller::Poll(_) => Backend::POLL,
        }
    }

    pub(crate) fn waker(&self) -> &Waker {
        match self {
            #[cfg(target_os = "linux")]
            Poller::Epoll(p) => p.waker(),
            Poller::Poll(p) => p.waker(),
        }
    }

    pub(crate) fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Poller::Epoll(p) => p.register(fd, interest),
            Poller::Poll(p) => p.register(fd, interest),
        }
    }

    pub(crate) fn reregister(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Poller::Epoll(p) => p.reregister(fd, interest),
            Poller::Poll(p) => p.reregister(fd, interest),
        }
    }

    pub(crate) fn deregister(&mut self, fd: RawFd) {
        match self {
            #[cfg(target_os = "linux")]
            Poller::Epoll(p) => p.deregister(fd),
            Poller::Poll(p) => p.deregister(fd),
        }
    }

    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Poller::Epoll(p) => p.poll(events, timeout),
            Poller::Poll(p) => p.poll(events, timeout),
        }
    }
}
