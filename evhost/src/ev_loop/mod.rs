//! Loop handles.
//!
//! A [`Loop`] is the host-side handle of one reactor. It realizes the
//! reactor lazily for the default loop, counts the watchers started on it,
//! and forwards keepalive references to the reactor so that `run` only
//! blocks while non-daemon watchers are active.

mod builder;
mod context;

pub use builder::{BACKEND_ENV, LoopBuilder};

use crate::error::{Error, Result, fatal};
use crate::reactor::{RawLoop, ReactorConfig};
use crate::registry::{Marker, ObjectKind, Registry};
use crate::{Backend, CallbackFailure};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;
use tracing::{debug, error, trace, warn};

pub(crate) type ErrorHandler = Rc<dyn Fn(&CallbackFailure)>;

/// How long [`Loop::run`] keeps going.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Until no keepalive watcher is active or [`Loop::stop`] is called.
    #[default]
    Default,
    /// One iteration, blocking for events if there are none yet.
    Once,
    /// One iteration without blocking.
    NoWait,
}

/// State of the reactor behind a loop handle.
enum Handle {
    /// Default loop whose reactor has not been needed yet.
    Uninitialized,
    Realized(Rc<RawLoop>),
    /// Explicit loop after [`Loop::close`].
    Closed,
}

/// Handle to an event loop.
///
/// Cloning the handle is cheap; all clones refer to the same loop. The loop
/// holds no references to its watchers, while every active watcher holds a
/// reference to the loop it was started on.
#[derive(Clone)]
pub struct Loop {
    inner: Rc<LoopInner>,
}

struct LoopInner {
    handle: RefCell<Handle>,

    /// Watchers currently started on this loop, daemon or not.
    attached: Cell<usize>,

    error_handler: RefCell<Option<ErrorHandler>>,
}

impl Loop {
    /// Creates a loop with its own reactor, using the default configuration.
    pub fn new() -> Result<Loop> {
        LoopBuilder::new().build()
    }

    pub fn builder() -> LoopBuilder {
        LoopBuilder::new()
    }

    /// Returns the current thread's default loop.
    ///
    /// Its reactor is created on first use, configured from the environment
    /// (see [`LoopBuilder::from_env`]).
    pub fn default_loop() -> Loop {
        context::default_loop()
    }

    pub(crate) fn unrealized() -> Loop {
        Loop {
            inner: Rc::new(LoopInner {
                handle: RefCell::new(Handle::Uninitialized),
                attached: Cell::new(0),
                error_handler: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn with_reactor(config: ReactorConfig, handler: Option<ErrorHandler>) -> Result<Loop> {
        let raw = Rc::new(RawLoop::new(config).map_err(Error::Initialization)?);

        let lp = Loop {
            inner: Rc::new(LoopInner {
                handle: RefCell::new(Handle::Realized(raw.clone())),
                attached: Cell::new(0),
                error_handler: RefCell::new(handler),
            }),
        };
        lp.register(&raw);

        debug!(backend = ?config.backend, "loop created");
        Ok(lp)
    }

    fn register(&self, raw: &Rc<RawLoop>) {
        Registry::global().register(
            Rc::as_ptr(raw) as usize,
            Marker {
                kind: ObjectKind::Loop,
                owner: Rc::as_ptr(&self.inner) as usize,
            },
        );
    }

    /// Returns the reactor, creating the default one if needed.
    pub(crate) fn realize(&self) -> Result<Rc<RawLoop>> {
        let mut handle = self.inner.handle.borrow_mut();

        match &*handle {
            Handle::Realized(raw) => return Ok(raw.clone()),
            Handle::Closed => return Err(Error::LifecycleMisuse("loop is closed".into())),
            Handle::Uninitialized => {}
        }

        let builder = LoopBuilder::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring backend override for the default loop");
            LoopBuilder::new()
        });
        let (config, _) = builder.into_parts(true)?;

        let raw = Rc::new(RawLoop::new(config).map_err(Error::Initialization)?);
        *handle = Handle::Realized(raw.clone());
        drop(handle);

        self.register(&raw);
        debug!(backend = ?config.backend, "default loop realized");
        Ok(raw)
    }

    /// Returns the reactor if it exists, without creating it.
    pub(crate) fn realized(&self) -> Option<Rc<RawLoop>> {
        match &*self.inner.handle.borrow() {
            Handle::Realized(raw) => Some(raw.clone()),
            _ => None,
        }
    }

    /// Recovers the loop handle owning `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must point to a reactor that is currently delivering an event,
    /// or that was obtained from a live loop.
    pub(crate) unsafe fn from_raw(raw: *const RawLoop) -> Loop {
        match Registry::global().lookup(raw as usize) {
            Some(Marker {
                kind: ObjectKind::Loop,
                owner,
            }) => {
                let ptr = owner as *const LoopInner;
                // The registry entry is removed before the owner is freed.
                unsafe {
                    Rc::increment_strong_count(ptr);
                    Loop {
                        inner: Rc::from_raw(ptr),
                    }
                }
            }
            _ => fatal("event delivered by a reactor with no live loop"),
        }
    }

    /// Runs the loop.
    ///
    /// Blocks, delivering events, until no keepalive watcher remains, or
    /// [`stop`](Self::stop) is called from a callback. May be called again
    /// from inside a callback.
    pub fn run(&self, mode: RunMode) -> Result<()> {
        let raw = self.realize()?;

        trace!(?mode, keepalive = raw.refs(), "loop run");
        raw.run(mode)
    }

    /// Makes the running [`run`](Self::run) calls return once the events
    /// already collected in the current iteration are delivered.
    ///
    /// Does nothing on a loop whose reactor was never created.
    pub fn stop(&self) {
        if let Some(raw) = self.realized() {
            raw.request_break();
        }
    }

    /// Cached wall-clock time in seconds, updated once per iteration.
    pub fn now(&self) -> Result<f64> {
        Ok(self.realize()?.now())
    }

    /// Refreshes the cached time.
    pub fn update_now(&self) -> Result<()> {
        self.realize()?.update_now();
        Ok(())
    }

    /// Prepares the loop for use in a child process after `fork(2)`; the
    /// kernel state is recreated at the start of the next iteration.
    pub fn fork(&self) -> Result<()> {
        self.realize()?.fork();
        Ok(())
    }

    /// Number of completed poll iterations.
    pub fn iteration(&self) -> Result<u64> {
        Ok(self.realize()?.iteration())
    }

    /// Number of `run` calls currently in progress on this loop.
    pub fn depth(&self) -> Result<u32> {
        Ok(self.realize()?.depth())
    }

    pub fn backend(&self) -> Result<Backend> {
        Ok(self.realize()?.backend())
    }

    /// Whether this is the thread's default loop.
    pub fn is_default(&self) -> bool {
        match &*self.inner.handle.borrow() {
            Handle::Uninitialized => true,
            Handle::Realized(raw) => raw.is_default(),
            Handle::Closed => false,
        }
    }

    /// Whether the reactor behind this handle exists.
    pub fn is_realized(&self) -> bool {
        matches!(&*self.inner.handle.borrow(), Handle::Realized(_))
    }

    /// Number of active non-daemon watchers started on this loop.
    pub fn keepalive(&self) -> usize {
        self.realized().map_or(0, |raw| raw.refs())
    }

    /// Number of active watchers started on this loop, daemon or not.
    pub fn attached(&self) -> usize {
        self.inner.attached.get()
    }

    /// Number of live loops and watchers in the process.
    pub fn object_count() -> usize {
        Registry::global().len()
    }

    /// Destroys the reactor.
    ///
    /// Fails with [`Error::LoopBusy`] while watchers are started on the loop
    /// and with [`Error::LifecycleMisuse`] while it is running. Closing an
    /// explicit loop is final; closing the default loop resets it so that
    /// the next use creates a fresh reactor.
    pub fn close(&self) -> Result<()> {
        let attached = self.attached();
        if attached > 0 {
            return Err(Error::LoopBusy { attached });
        }

        let next = if self.is_default() {
            Handle::Uninitialized
        } else {
            Handle::Closed
        };

        let previous = {
            let mut handle = self.inner.handle.borrow_mut();
            if let Handle::Realized(raw) = &*handle {
                if raw.depth() > 0 {
                    return Err(Error::LifecycleMisuse("cannot close a running loop".into()));
                }
            }
            mem::replace(&mut *handle, next)
        };

        if let Handle::Realized(raw) = previous {
            Registry::global().unregister(Rc::as_ptr(&raw) as usize);
            debug!("loop closed");
        }

        Ok(())
    }

    /// Installs the handler receiving callback failures raised on this loop.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&CallbackFailure) + 'static,
    {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Reports a callback failure through the error handler, or logs and
    /// prints it if none is installed.
    pub(crate) fn report(&self, failure: CallbackFailure) {
        let handler = self.inner.error_handler.borrow().clone();

        match handler {
            Some(handler) => (*handler)(&failure),
            None => {
                error!(kind = %failure.kind(), revents = ?failure.revents(), "{failure}");
                eprintln!("{}", failure.traceback());
            }
        }
    }

    /// Accounts for a watcher becoming active on this loop.
    pub(crate) fn retain_for_watcher(&self, daemon: bool) {
        self.inner.attached.set(self.inner.attached.get() + 1);

        if !daemon {
            match self.realized() {
                Some(raw) => raw.add_ref(),
                None => fatal("watcher started on a loop without reactor"),
            }
        }
    }

    /// Accounts for a watcher leaving this loop.
    pub(crate) fn release_for_watcher(&self, daemon: bool) {
        let Some(attached) = self.inner.attached.get().checked_sub(1) else {
            fatal("attached watcher count underflow");
        };
        self.inner.attached.set(attached);

        if !daemon {
            let Some(raw) = self.realized() else {
                fatal("watcher released from a loop without reactor");
            };
            if !raw.remove_ref() {
                fatal("keepalive count underflow");
            }
        }
    }

    pub fn ptr_eq(&self, other: &Loop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Loop {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Loop {}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.handle.borrow() {
            Handle::Uninitialized => "uninitialized",
            Handle::Realized(_) => "realized",
            Handle::Closed => "closed",
        };

        f.debug_struct("Loop")
            .field("state", &state)
            .field("default", &self.is_default())
            .field("attached", &self.attached())
            .field("keepalive", &self.keepalive())
            .finish()
    }
}

impl Drop for LoopInner {
    fn drop(&mut self) {
        debug_assert_eq!(self.attached.get(), 0, "loop dropped with attached watchers");

        if let Handle::Realized(raw) = self.handle.get_mut() {
            Registry::global().unregister(Rc::as_ptr(raw) as usize);
        }
    }
}
