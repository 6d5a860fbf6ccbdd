//! Raw watcher records.
//!
//! Every record starts with a [`RawWatcher`] header (`#[repr(C)]`, first
//! field), so a pointer to a record is also a pointer to its header. The
//! loop only ever stores pointers to records that are active or pending;
//! the owner of a record must keep it at a fixed address for that long.

use super::RawLoop;
use crate::Revents;

use std::cell::Cell;
use std::os::fd::RawFd;
use std::time::Instant;

/// Entry point the loop calls for every delivered event.
///
/// This is the boundary between the reactor and its users: the reactor
/// cannot deal with a callback unwinding through it, which is why the type
/// is `extern "C"` and a panic escaping it aborts the process.
pub type RawCallback = unsafe extern "C" fn(*const RawLoop, *const RawWatcher, u32);

/// State shared by all watcher records.
#[repr(C)]
pub struct RawWatcher {
    active: Cell<bool>,

    /// Event bits waiting to be delivered; zero when not pending.
    pending: Cell<u32>,

    cb: Cell<Option<RawCallback>>,
}

impl RawWatcher {
    const fn new() -> Self {
        Self {
            active: Cell::new(false),
            pending: Cell::new(0),
            cb: Cell::new(None),
        }
    }

    /// Installs the callback. Must happen before the record is started.
    pub(crate) fn init(&self, cb: RawCallback) {
        debug_assert!(!self.is_active(), "init on an active watcher");
        self.cb.set(Some(cb));
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.get() != 0
    }

    pub(crate) fn callback(&self) -> Option<RawCallback> {
        self.cb.get()
    }

    /// Accumulates `bits`; returns `true` if the watcher was not pending yet.
    pub(crate) fn add_pending(&self, bits: u32) -> bool {
        let previous = self.pending.get();
        self.pending.set(previous | bits);
        previous == 0
    }

    pub(crate) fn take_pending(&self) -> u32 {
        self.pending.replace(0)
    }
}

/// Access to the common header of a record.
pub trait AsRawWatcher {
    fn header(&self) -> &RawWatcher;
}

/// Relative/periodic timer record.
#[repr(C)]
pub struct RawTimer {
    pub(crate) w: RawWatcher,
    after: Cell<f64>,
    repeat: Cell<f64>,

    /// Absolute deadline while active.
    pub(crate) at: Cell<Option<Instant>>,
}

impl RawTimer {
    pub(crate) fn new(after: f64, repeat: f64) -> Self {
        Self {
            w: RawWatcher::new(),
            after: Cell::new(after),
            repeat: Cell::new(repeat),
            at: Cell::new(None),
        }
    }

    pub(crate) fn after(&self) -> f64 {
        self.after.get()
    }

    pub(crate) fn repeat(&self) -> f64 {
        self.repeat.get()
    }

    /// Reconfigures the timer. Only valid while inactive.
    pub(crate) fn set(&self, after: f64, repeat: f64) {
        debug_assert!(!self.w.is_active(), "set on an active timer");
        self.after.set(after);
        self.repeat.set(repeat);
    }
}

impl AsRawWatcher for RawTimer {
    fn header(&self) -> &RawWatcher {
        &self.w
    }
}

/// File-descriptor readiness record.
#[repr(C)]
pub struct RawIo {
    pub(crate) w: RawWatcher,
    fd: Cell<RawFd>,
    events: Cell<Revents>,
}

impl RawIo {
    pub(crate) fn new(fd: RawFd, events: Revents) -> Self {
        Self {
            w: RawWatcher::new(),
            fd: Cell::new(fd),
            events: Cell::new(events),
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd.get()
    }

    pub(crate) fn events(&self) -> Revents {
        self.events.get()
    }

    /// Reconfigures the watcher. Only valid while inactive.
    pub(crate) fn set(&self, fd: RawFd, events: Revents) {
        debug_assert!(!self.w.is_active(), "set on an active io watcher");
        self.fd.set(fd);
        self.events.set(events);
    }
}

impl AsRawWatcher for RawIo {
    fn header(&self) -> &RawWatcher {
        &self.w
    }
}

/// Unix signal record.
#[repr(C)]
pub struct RawSignal {
    pub(crate) w: RawWatcher,
    signum: Cell<i32>,
}

impl RawSignal {
    pub(crate) fn new(signum: i32) -> Self {
        Self {
            w: RawWatcher::new(),
            signum: Cell::new(signum),
        }
    }

    pub(crate) fn signum(&self) -> i32 {
        self.signum.get()
    }
}

impl AsRawWatcher for RawSignal {
    fn header(&self) -> &RawWatcher {
        &self.w
    }
}

/// Loop phase a hook record runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Before the loop blocks for events.
    Prepare,
    /// After the loop collected events.
    Check,
    /// When there is nothing else to do.
    Idle,
}

impl Phase {
    pub(crate) fn revents(self) -> Revents {
        match self {
            Phase::Prepare => Revents::PREPARE,
            Phase::Check => Revents::CHECK,
            Phase::Idle => Revents::IDLE,
        }
    }
}

/// Record of the loop-phase kinds (prepare, check, idle).
///
/// The three kinds carry no data of their own; which list the record joins
/// is decided by the [`Phase`] it is started with.
#[repr(C)]
pub struct RawHook {
    pub(crate) w: RawWatcher,
}

impl RawHook {
    pub(crate) fn new() -> Self {
        Self {
            w: RawWatcher::new(),
        }
    }
}

impl AsRawWatcher for RawHook {
    fn header(&self) -> &RawWatcher {
        &self.w
    }
}
