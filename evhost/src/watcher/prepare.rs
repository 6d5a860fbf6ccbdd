//! Prepare watchers: run right before the loop blocks.

use super::{CallbackResult, Kind, Watcher, WatcherKind, sealed};
use crate::error::Result;
use crate::reactor::{Phase, RawHook, RawLoop};
use crate::{Loop, Revents};

/// Marker type of prepare watchers.
#[derive(Debug)]
pub enum PrepareKind {}

impl sealed::Sealed for PrepareKind {}

impl Kind for PrepareKind {
    type Raw = RawHook;

    const KIND: WatcherKind = WatcherKind::Prepare;

    unsafe fn start(lp: &RawLoop, raw: &RawHook) -> Result<()> {
        unsafe { lp.hook_start(Phase::Prepare, raw) };
        Ok(())
    }

    fn stop(lp: &RawLoop, raw: &RawHook) {
        lp.hook_stop(Phase::Prepare, raw);
    }
}

/// A watcher receiving [`Revents::PREPARE`] at the start of every
/// iteration, before the loop polls.
///
/// Prepare callbacks may start or stop other watchers; the changes are
/// taken into account by the poll that follows.
pub type Prepare = Watcher<PrepareKind>;

impl Watcher<PrepareKind> {
    pub fn new<F>(callback: F) -> Prepare
    where
        F: Fn(&Prepare, &Loop, Revents) -> CallbackResult + 'static,
    {
        Watcher::construct(RawHook::new(), callback)
    }
}
