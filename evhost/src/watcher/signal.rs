//! Unix signals.

use super::{CallbackResult, Kind, Watcher, WatcherKind, sealed};
use crate::error::{Error, Result};
use crate::reactor::{NSIG, RawLoop, RawSignal};
use crate::{Loop, Revents};

/// Marker type of signal watchers.
#[derive(Debug)]
pub enum SignalKind {}

impl sealed::Sealed for SignalKind {}

impl Kind for SignalKind {
    type Raw = RawSignal;

    const KIND: WatcherKind = WatcherKind::Signal;

    unsafe fn start(lp: &RawLoop, raw: &RawSignal) -> Result<()> {
        unsafe { lp.signal_start(raw) }
    }

    fn stop(lp: &RawLoop, raw: &RawSignal) {
        lp.signal_stop(raw);
    }
}

/// A watcher firing when the process receives a signal.
///
/// Delivery is synchronous: the signal handler only records the signal and
/// wakes the loop, and the callback runs on the next iteration. Several
/// watchers may watch the same signal on one loop, but a signal can only be
/// watched by one loop at a time; starting a watcher on a second loop fails
/// with [`Error::SignalInUse`].
///
/// Once the last watcher of a signal stops, its disposition is reset to the
/// default.
pub type Signal = Watcher<SignalKind>;

impl Watcher<SignalKind> {
    /// Creates an inactive watcher for `signum`.
    pub fn new<F>(callback: F, signum: i32) -> Result<Signal>
    where
        F: Fn(&Signal, &Loop, Revents) -> CallbackResult + 'static,
    {
        if !(1..NSIG).contains(&signum) {
            return Err(Error::InvalidArgument(format!("invalid signal number {signum}")));
        }

        Ok(Watcher::construct(RawSignal::new(signum), callback))
    }

    pub fn signum(&self) -> i32 {
        self.raw().signum()
    }
}
