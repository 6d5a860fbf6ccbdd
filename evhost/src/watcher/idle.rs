//! Idle watchers: run when the loop has nothing else to do.

use super::{CallbackResult, Kind, Watcher, WatcherKind, sealed};
use crate::error::Result;
use crate::reactor::{Phase, RawHook, RawLoop};
use crate::{Loop, Revents};

/// Marker type of idle watchers.
#[derive(Debug)]
pub enum IdleKind {}

impl sealed::Sealed for IdleKind {}

impl Kind for IdleKind {
    type Raw = RawHook;

    const KIND: WatcherKind = WatcherKind::Idle;

    unsafe fn start(lp: &RawLoop, raw: &RawHook) -> Result<()> {
        unsafe { lp.hook_start(Phase::Idle, raw) };
        Ok(())
    }

    fn stop(lp: &RawLoop, raw: &RawHook) {
        lp.hook_stop(Phase::Idle, raw);
    }
}

/// A watcher receiving [`Revents::IDLE`] on every iteration in which no
/// other event is pending.
///
/// While an idle watcher is active the loop polls without blocking, so a
/// non-daemon idle watcher keeps the loop spinning until it is stopped.
pub type Idle = Watcher<IdleKind>;

impl Watcher<IdleKind> {
    pub fn new<F>(callback: F) -> Idle
    where
        F: Fn(&Idle, &Loop, Revents) -> CallbackResult + 'static,
    {
        Watcher::construct(RawHook::new(), callback)
    }
}
