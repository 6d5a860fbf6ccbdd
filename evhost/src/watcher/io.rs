//! File descriptor readiness.

use super::{CallbackResult, Kind, Watcher, WatcherKind, sealed};
use crate::error::{Error, Result};
use crate::reactor::{RawIo, RawLoop};
use crate::{Loop, Revents};

use std::os::fd::RawFd;

/// Marker type of io watchers.
#[derive(Debug)]
pub enum IoKind {}

impl sealed::Sealed for IoKind {}

impl Kind for IoKind {
    type Raw = RawIo;

    const KIND: WatcherKind = WatcherKind::Io;

    unsafe fn start(lp: &RawLoop, raw: &RawIo) -> Result<()> {
        unsafe { lp.io_start(raw) };
        Ok(())
    }

    fn stop(lp: &RawLoop, raw: &RawIo) {
        lp.io_stop(raw);
    }
}

/// A watcher firing when a file descriptor becomes readable or writable.
///
/// The callback receives the subset of [`Revents::READ`] and
/// [`Revents::WRITE`] that is ready. If the descriptor turns out to be
/// invalid, the watcher is stopped and receives [`Revents::ERROR`] together
/// with both readiness bits.
///
/// The watcher does not own the descriptor.
pub type Io = Watcher<IoKind>;

fn check(fd: RawFd, events: Revents) -> Result<()> {
    if fd < 0 {
        return Err(Error::InvalidArgument(format!("invalid file descriptor {fd}")));
    }

    let allowed = Revents::READ | Revents::WRITE;
    if events.is_empty() || !allowed.contains(events) {
        return Err(Error::InvalidArgument(format!(
            "io events must be a non-empty combination of READ and WRITE, got {events:?}"
        )));
    }

    Ok(())
}

impl Watcher<IoKind> {
    /// Creates an inactive io watcher for `fd`.
    pub fn new<F>(callback: F, fd: RawFd, events: Revents) -> Result<Io>
    where
        F: Fn(&Io, &Loop, Revents) -> CallbackResult + 'static,
    {
        check(fd, events)?;

        Ok(Watcher::construct(RawIo::new(fd, events), callback))
    }

    pub fn fd(&self) -> RawFd {
        self.raw().fd()
    }

    pub fn events(&self) -> Revents {
        self.raw().events()
    }

    /// Points an inactive watcher at another descriptor or event set.
    pub fn set(&self, fd: RawFd, events: Revents) -> Result<()> {
        check(fd, events)?;

        if self.is_active() {
            return Err(Error::LifecycleMisuse("cannot reconfigure an active io watcher".into()));
        }

        self.raw().set(fd, events);
        Ok(())
    }
}
