//! Check watchers: run right after the loop collected events.

use super::{CallbackResult, Kind, Watcher, WatcherKind, sealed};
use crate::error::Result;
use crate::reactor::{Phase, RawHook, RawLoop};
use crate::{Loop, Revents};

/// Marker type of check watchers.
#[derive(Debug)]
pub enum CheckKind {}

impl sealed::Sealed for CheckKind {}

impl Kind for CheckKind {
    type Raw = RawHook;

    const KIND: WatcherKind = WatcherKind::Check;

    unsafe fn start(lp: &RawLoop, raw: &RawHook) -> Result<()> {
        unsafe { lp.hook_start(Phase::Check, raw) };
        Ok(())
    }

    fn stop(lp: &RawLoop, raw: &RawHook) {
        lp.hook_stop(Phase::Check, raw);
    }
}

/// A watcher receiving [`Revents::CHECK`] once per iteration, after the
/// events collected by the poll were queued.
pub type Check = Watcher<CheckKind>;

impl Watcher<CheckKind> {
    pub fn new<F>(callback: F) -> Check
    where
        F: Fn(&Check, &Loop, Revents) -> CallbackResult + 'static,
    {
        Watcher::construct(RawHook::new(), callback)
    }
}
