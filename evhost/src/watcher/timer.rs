//! Relative and repeating timers.

use super::{CallbackResult, Kind, Watcher, WatcherKind, sealed};
use crate::error::{Error, Result};
use crate::reactor::{RawLoop, RawTimer};
use crate::{Loop, Revents};

/// Marker type of timer watchers.
#[derive(Debug)]
pub enum TimerKind {}

impl sealed::Sealed for TimerKind {}

impl Kind for TimerKind {
    type Raw = RawTimer;

    const KIND: WatcherKind = WatcherKind::Timer;

    unsafe fn start(lp: &RawLoop, raw: &RawTimer) -> Result<()> {
        unsafe { lp.timer_start(raw) };
        Ok(())
    }

    fn stop(lp: &RawLoop, raw: &RawTimer) {
        lp.timer_stop(raw);
    }
}

/// A watcher firing `after` seconds after it is started, then every
/// `repeat` seconds if `repeat` is non-zero.
///
/// A one-shot timer becomes inactive once it fired; a repeating timer stays
/// active until stopped.
///
/// # Examples
///
/// ```rust,ignore
/// let timer = Timer::new(|_, lp, _| {
///     lp.stop();
///     Ok(())
/// }, 0.5, 0.0)?;
/// timer.start(&lp, false)?;
/// ```
pub type Timer = Watcher<TimerKind>;

fn check_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "timer {name} must be a finite, non-negative number of seconds, got {value}"
        )))
    }
}

impl Watcher<TimerKind> {
    /// Creates an inactive timer.
    ///
    /// Fails with [`Error::InvalidArgument`] if `after` or `repeat` is
    /// negative, infinite or NaN.
    pub fn new<F>(callback: F, after: f64, repeat: f64) -> Result<Timer>
    where
        F: Fn(&Timer, &Loop, Revents) -> CallbackResult + 'static,
    {
        check_interval("delay", after)?;
        check_interval("repeat", repeat)?;

        Ok(Watcher::construct(RawTimer::new(after, repeat), callback))
    }

    /// Restarts the timer from its repeat interval.
    ///
    /// - active and repeating: the next expiry moves to `repeat` seconds
    ///   from now,
    /// - active and one-shot: the timer is stopped,
    /// - inactive and repeating: the timer starts with `repeat` as delay,
    /// - inactive and one-shot: nothing happens.
    pub fn again(&self, lp: &Loop, daemon: bool) -> Result<()> {
        self.reconcile();
        if let Some(current) = self.loop_handle() {
            if !current.ptr_eq(lp) {
                return Err(Error::LifecycleMisuse(
                    "again on a timer that is active on another loop".into(),
                ));
            }
        }

        let raw_loop = lp.realize()?;
        unsafe { raw_loop.timer_again(self.raw()) };
        self.sync(lp, daemon);

        Ok(())
    }

    /// Seconds until the timer fires, measured from the loop's cached time.
    ///
    /// For an inactive timer this is its configured delay.
    pub fn remaining(&self, lp: &Loop) -> Result<f64> {
        Ok(lp.realize()?.timer_remaining(self.raw()))
    }

    /// Reconfigures an inactive timer.
    pub fn set(&self, after: f64, repeat: f64) -> Result<()> {
        check_interval("delay", after)?;
        check_interval("repeat", repeat)?;

        if self.is_active() {
            return Err(Error::LifecycleMisuse("cannot reconfigure an active timer".into()));
        }

        self.raw().set(after, repeat);
        Ok(())
    }

    pub fn after(&self) -> f64 {
        self.raw().after()
    }

    pub fn repeat(&self) -> f64 {
        self.raw().repeat()
    }
}
