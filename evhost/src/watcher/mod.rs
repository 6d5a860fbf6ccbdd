//! Watchers.
//!
//! A [`Watcher`] owns one reactor record and the host callback that runs
//! when the record's event fires. All kinds share the lifecycle implemented
//! here; the kind modules only add their constructor and a few
//! kind-specific operations.
//!
//! ## Lifecycle
//!
//! ```text
//! Inactive --start(loop, daemon)--> Active(loop, daemon) --stop(loop)--> Inactive
//! ```
//!
//! While active, a watcher keeps itself and its loop alive: dropping every
//! handle to an active watcher does not stop it. A non-daemon watcher also
//! holds one keepalive reference on its loop, so [`Loop::run`] keeps going
//! until it is stopped; a daemon watcher does not.
//!
//! A watcher the reactor deactivates on its own (a one-shot timer that
//! expired, an io watcher whose descriptor was rejected) releases its loop
//! right after its callback returns.

mod dispatch;

pub mod check;
pub mod idle;
pub mod io;
pub mod prepare;
pub mod signal;
pub mod timer;

pub use check::{Check, CheckKind};
pub use idle::{Idle, IdleKind};
pub use io::{Io, IoKind};
pub use prepare::{Prepare, PrepareKind};
pub use signal::{Signal, SignalKind};
pub use timer::{Timer, TimerKind};

use crate::error::{Error, Result};
use crate::reactor::{AsRawWatcher, RawLoop, RawWatcher};
use crate::registry::{Marker, ObjectKind, Registry};
use crate::{CallbackError, Loop, Revents};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// What a watcher callback returns.
pub type CallbackResult = std::result::Result<(), CallbackError>;

/// Callback stored in a watcher of kind `K`.
///
/// It receives the watcher that fired, the loop delivering the event and
/// the received events.
pub type Callback<K> = Rc<dyn Fn(&Watcher<K>, &Loop, Revents) -> CallbackResult>;

/// The kind of a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatcherKind {
    Timer,
    Io,
    Signal,
    Idle,
    Check,
    Prepare,
}

impl WatcherKind {
    pub fn name(self) -> &'static str {
        match self {
            WatcherKind::Timer => "timer",
            WatcherKind::Io => "io",
            WatcherKind::Signal => "signal",
            WatcherKind::Idle => "idle",
            WatcherKind::Check => "check",
            WatcherKind::Prepare => "prepare",
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A watcher kind: the record type and how the reactor starts and stops it.
///
/// Implemented by the marker types of the kind modules only.
pub trait Kind: sealed::Sealed + Sized + 'static {
    #[doc(hidden)]
    type Raw: AsRawWatcher;

    const KIND: WatcherKind;

    /// Registers `raw` with the reactor.
    ///
    /// # Safety
    ///
    /// `raw` must stay at the same address until it is stopped.
    #[doc(hidden)]
    unsafe fn start(lp: &RawLoop, raw: &Self::Raw) -> Result<()>;

    #[doc(hidden)]
    fn stop(lp: &RawLoop, raw: &Self::Raw);
}

/// Handle to a watcher of kind `K`.
///
/// Handles are reference counted; cloning one yields another handle to the
/// same watcher.
pub struct Watcher<K: Kind> {
    inner: Rc<Inner<K>>,
}

struct Inner<K: Kind> {
    /// Reactor record. Never moves: it lives inside the `Rc` allocation.
    raw: K::Raw,

    callback: RefCell<Callback<K>>,

    /// Set while the watcher is started on a loop.
    state: RefCell<Option<Attachment<K>>>,
}

/// Relation between an active watcher and its loop.
struct Attachment<K: Kind> {
    lp: Loop,
    daemon: bool,

    /// Keeps the watcher alive while active.
    pin: Rc<Inner<K>>,
}

impl<K: Kind> Watcher<K> {
    /// Wraps `raw`, registers it and installs the dispatch entry point.
    pub(crate) fn construct<F>(raw: K::Raw, callback: F) -> Watcher<K>
    where
        F: Fn(&Watcher<K>, &Loop, Revents) -> CallbackResult + 'static,
    {
        let callback: Callback<K> = Rc::new(callback);
        let inner = Rc::new(Inner {
            raw,
            callback: RefCell::new(callback),
            state: RefCell::new(None),
        });

        inner.raw.header().init(dispatch::trampoline::<K>);
        Registry::global().register(
            inner.address(),
            Marker {
                kind: ObjectKind::Watcher(K::KIND),
                owner: Rc::as_ptr(&inner) as usize,
            },
        );

        trace!(kind = %K::KIND, "watcher created");
        Watcher { inner }
    }

    /// Recovers a handle from the owner address stored in the registry.
    ///
    /// # Safety
    ///
    /// `owner` must come from a live registry entry of kind `K`.
    pub(crate) unsafe fn from_owner(owner: usize) -> Watcher<K> {
        let ptr = owner as *const Inner<K>;
        unsafe {
            Rc::increment_strong_count(ptr);
            Watcher {
                inner: Rc::from_raw(ptr),
            }
        }
    }

    pub(crate) fn raw(&self) -> &K::Raw {
        &self.inner.raw
    }

    fn header(&self) -> &RawWatcher {
        self.inner.raw.header()
    }

    /// Starts the watcher on `lp`.
    ///
    /// A `daemon` watcher does not keep [`Loop::run`] from returning.
    /// Starting a watcher that is already active on `lp` only updates its
    /// daemon flag. Starting it while active on another loop is an error.
    pub fn start(&self, lp: &Loop, daemon: bool) -> Result<()> {
        self.reconcile();
        self.check_loop(lp, "start")?;

        let raw_loop = lp.realize()?;
        if self.header().is_active() {
            warn!(kind = %K::KIND, "start called on an active watcher");
        } else {
            unsafe { K::start(&raw_loop, self.raw())? };
        }

        self.attach(lp, daemon);
        Ok(())
    }

    /// Stops the watcher, dropping any events it has pending.
    ///
    /// Stopping an inactive watcher does nothing.
    pub fn stop(&self, lp: &Loop) -> Result<()> {
        self.reconcile();
        self.check_loop(lp, "stop")?;

        let attachment = self.inner.state.borrow_mut().take();
        if let Some(attachment) = attachment {
            if let Some(raw_loop) = attachment.lp.realized() {
                K::stop(&raw_loop, self.raw());
            }
            attachment.lp.release_for_watcher(attachment.daemon);

            debug!(kind = %K::KIND, daemon = attachment.daemon, "watcher stopped");
        }

        Ok(())
    }

    /// Whether the watcher is started.
    pub fn is_active(&self) -> bool {
        self.header().is_active()
    }

    /// Whether the watcher has events waiting to be delivered.
    pub fn is_pending(&self) -> bool {
        self.header().is_pending()
    }

    /// Drops the watcher's pending events without calling its callback and
    /// returns them. Returns an empty set if nothing was pending.
    pub fn clear_pending(&self, lp: &Loop) -> Result<Revents> {
        if self.attached_loop().is_none() {
            return Ok(Revents::empty());
        }
        self.check_loop(lp, "clear_pending")?;

        let revents = lp.realize()?.clear_pending(self.header());
        self.reconcile();

        Ok(revents)
    }

    /// Calls the callback with `revents` right away, whatever the state of
    /// the watcher.
    pub fn invoke(&self, lp: &Loop, revents: Revents) -> Result<()> {
        lp.realize()?.invoke(self.header(), revents);
        Ok(())
    }

    /// Replaces the callback. Takes effect for the next delivered event,
    /// including events already pending.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Watcher<K>, &Loop, Revents) -> CallbackResult + 'static,
    {
        *self.inner.callback.borrow_mut() = Rc::new(callback);
    }

    pub fn callback(&self) -> Callback<K> {
        self.inner.callback.borrow().clone()
    }

    /// Whether the watcher is started as a daemon. `false` when inactive.
    pub fn is_daemon(&self) -> bool {
        self.inner
            .state
            .borrow()
            .as_ref()
            .is_some_and(|attachment| attachment.daemon)
    }

    pub fn kind(&self) -> WatcherKind {
        K::KIND
    }

    /// The loop the watcher is started on.
    pub fn loop_handle(&self) -> Option<Loop> {
        self.attached_loop()
    }

    pub fn ptr_eq(&self, other: &Watcher<K>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn attached_loop(&self) -> Option<Loop> {
        self.inner
            .state
            .borrow()
            .as_ref()
            .map(|attachment| attachment.lp.clone())
    }

    fn check_loop(&self, lp: &Loop, operation: &str) -> Result<()> {
        match self.attached_loop() {
            Some(current) if !current.ptr_eq(lp) => Err(Error::LifecycleMisuse(format!(
                "{operation} on a {} watcher that is active on another loop",
                K::KIND
            ))),
            _ => Ok(()),
        }
    }

    /// Records that the watcher is active on `lp`, moving the keepalive
    /// reference if only the daemon flag changed.
    fn attach(&self, lp: &Loop, daemon: bool) {
        let mut state = self.inner.state.borrow_mut();

        match state.as_mut() {
            Some(attachment) => {
                if attachment.daemon != daemon {
                    lp.retain_for_watcher(daemon);
                    lp.release_for_watcher(attachment.daemon);
                    attachment.daemon = daemon;
                }
            }
            None => {
                lp.retain_for_watcher(daemon);
                *state = Some(Attachment {
                    lp: lp.clone(),
                    daemon,
                    pin: self.inner.clone(),
                });

                debug!(kind = %K::KIND, daemon, "watcher started");
            }
        }
    }

    /// Brings the attachment in line with the record after a native
    /// operation that may have started or stopped it.
    pub(crate) fn sync(&self, lp: &Loop, daemon: bool) {
        if self.header().is_active() {
            self.attach(lp, daemon);
        } else {
            self.reconcile();
        }
    }

    /// Releases the loop if the reactor deactivated the record on its own
    /// and it has nothing left to deliver.
    pub(crate) fn reconcile(&self) {
        let header = self.header();
        if header.is_active() || header.is_pending() {
            return;
        }

        let detached = self.inner.state.borrow_mut().take();
        if let Some(attachment) = detached {
            attachment.lp.release_for_watcher(attachment.daemon);
            trace!(kind = %K::KIND, "watcher went inactive");
        }
    }
}

impl<K: Kind> Inner<K> {
    fn address(&self) -> usize {
        self.raw.header() as *const RawWatcher as usize
    }
}

impl<K: Kind> Clone for Watcher<K> {
    fn clone(&self) -> Self {
        Watcher {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Kind> fmt::Debug for Watcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("kind", &K::KIND)
            .field("active", &self.is_active())
            .field("pending", &self.is_pending())
            .field("daemon", &self.is_daemon())
            .finish()
    }
}

impl<K: Kind> Drop for Inner<K> {
    fn drop(&mut self) {
        debug_assert!(!self.raw.header().is_active(), "active watcher freed");
        debug_assert!(!self.raw.header().is_pending(), "pending watcher freed");

        Registry::global().unregister(self.address());
    }
}
