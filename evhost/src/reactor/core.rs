use super::event::Event;
use super::poller::Poller;
use super::poller::common::Interest;
use super::signal;
use super::timer::{TimerEntry, deadline_after};
use super::watcher::{Phase, RawHook, RawIo, RawSignal, RawTimer, RawWatcher};
use crate::error::Result;
use crate::{Backend, Revents, RunMode};

use std::cell::{Cell, RefCell};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Longest single wait. Bounds how stale the cached clock can get while
/// the loop blocks with no timer pending.
const MAX_BLOCK: Duration = Duration::from_secs(60);

/// Settings a reactor is created with.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ReactorConfig {
    pub(crate) backend: Backend,
    pub(crate) event_capacity: usize,
    pub(crate) is_default: bool,
}

/// Io watchers interested in one descriptor.
#[derive(Default)]
struct FdSlot {
    watchers: Vec<*const RawIo>,

    /// Interest currently installed in the poller.
    registered: Interest,
}

impl FdSlot {
    fn wanted(&self) -> Interest {
        self.watchers
            .iter()
            .map(|&io| Interest::from_revents(unsafe { &*io }.events()))
            .fold(Interest::NONE, Interest::union)
    }
}

/// The reactor.
///
/// A `RawLoop` multiplexes readiness of file descriptors, timer expiry,
/// signals and the prepare/check/idle phases, and delivers every event by
/// calling the [`RawCallback`](super::watcher::RawCallback) stored in the watcher
/// record. It knows nothing about the objects that own those records.
///
/// All watcher lists hold raw pointers. A record is in a list exactly while
/// it is active, and in the pending queue exactly while it is pending;
/// stopping a record removes it from both, so the loop never dereferences
/// a record its owner may already have freed.
pub struct RawLoop {
    /// Platform-specific poller (epoll, poll).
    poller: RefCell<Poller>,

    /// Buffer used to collect I/O events from the poller.
    events: RefCell<Vec<Event>>,

    config: ReactorConfig,

    /// Keepalive references; the loop keeps running while non-zero.
    refs: Cell<usize>,

    depth: Cell<u32>,
    iteration: Cell<u64>,
    break_requested: Cell<bool>,
    postfork: Cell<bool>,

    /// Cached monotonic time, used for timer arithmetic.
    mn_now: Cell<Instant>,

    /// Cached wall-clock time in seconds since the epoch.
    rt_now: Cell<f64>,

    /// Watchers with events waiting to be delivered, in arrival order.
    pending: RefCell<VecDeque<*const RawWatcher>>,

    /// Min-heap of active timers ordered by deadline.
    timers: RefCell<BinaryHeap<TimerEntry>>,
    timer_seq: Cell<u64>,

    fds: RefCell<HashMap<RawFd, FdSlot>>,

    /// Descriptors whose interest changed since the last poll.
    fd_changes: RefCell<Vec<RawFd>>,

    signals: RefCell<HashMap<i32, Vec<*const RawSignal>>>,

    prepares: RefCell<Vec<*const RawHook>>,
    checks: RefCell<Vec<*const RawHook>>,
    idles: RefCell<Vec<*const RawHook>>,
}

impl RawLoop {
    /// Creates a new reactor instance.
    pub(crate) fn new(config: ReactorConfig) -> io::Result<Self> {
        let poller = Poller::new(config.backend, config.event_capacity)?;
        let events = Vec::with_capacity(config.event_capacity);

        let reactor = Self {
            poller: RefCell::new(poller),
            events: RefCell::new(events),
            config,
            refs: Cell::new(0),
            depth: Cell::new(0),
            iteration: Cell::new(0),
            break_requested: Cell::new(false),
            postfork: Cell::new(false),
            mn_now: Cell::new(Instant::now()),
            rt_now: Cell::new(0.0),
            pending: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BinaryHeap::new()),
            timer_seq: Cell::new(0),
            fds: RefCell::new(HashMap::new()),
            fd_changes: RefCell::new(Vec::new()),
            signals: RefCell::new(HashMap::new()),
            prepares: RefCell::new(Vec::new()),
            checks: RefCell::new(Vec::new()),
            idles: RefCell::new(Vec::new()),
        };
        reactor.update_now();

        Ok(reactor)
    }

    fn id(&self) -> usize {
        self as *const RawLoop as usize
    }

    pub(crate) fn backend(&self) -> Backend {
        self.poller.borrow().backend()
    }

    pub(crate) fn is_default(&self) -> bool {
        self.config.is_default
    }

    pub(crate) fn iteration(&self) -> u64 {
        self.iteration.get()
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth.get()
    }

    pub(crate) fn now(&self) -> f64 {
        self.rt_now.get()
    }

    /// Refreshes the cached clocks.
    pub(crate) fn update_now(&self) {
        self.mn_now.set(Instant::now());

        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.rt_now.set(wall);
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.get()
    }

    pub(crate) fn add_ref(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    /// Drops one keepalive reference. Returns `false` on underflow, leaving
    /// the count untouched.
    pub(crate) fn remove_ref(&self) -> bool {
        match self.refs.get().checked_sub(1) {
            Some(refs) => {
                self.refs.set(refs);
                true
            }
            None => false,
        }
    }

    /// Makes the innermost and all enclosing `run` calls return once the
    /// current iteration has delivered its pending events.
    pub(crate) fn request_break(&self) {
        self.break_requested.set(true);
    }

    /// Recreates kernel state on the next iteration, as needed in a child
    /// process after `fork(2)`.
    pub(crate) fn fork(&self) {
        self.postfork.set(true);
    }

    /// Runs the loop.
    ///
    /// Each iteration:
    /// 1. recreates the poller if a fork was announced
    /// 2. delivers prepare events
    /// 3. applies descriptor interest changes and polls, bounded by the
    ///    next timer deadline
    /// 4. queues io, signal and timer events, idle events when nothing else
    ///    is pending, then check events, and delivers them
    ///
    /// `RunMode::Default` keeps iterating while keepalive references remain
    /// and no break was requested.
    pub(crate) fn run(&self, mode: RunMode) -> Result<()> {
        self.depth.set(self.depth.get() + 1);
        self.break_requested.set(false);

        let result = self.run_iterations(mode);

        self.depth.set(self.depth.get() - 1);
        result
    }

    fn run_iterations(&self, mode: RunMode) -> Result<()> {
        loop {
            if self.postfork.replace(false) {
                self.rebuild()?;
            }

            self.queue_hooks(Phase::Prepare);
            self.invoke_pending();

            if self.break_requested.get() {
                break;
            }

            self.reify_fds();

            let timeout = self.wait_timeout(mode);
            {
                let mut events = self.events.borrow_mut();
                self.poller.borrow_mut().poll(&mut events, timeout)?;
            }

            self.iteration.set(self.iteration.get() + 1);
            self.update_now();

            self.queue_io();
            self.queue_signals();
            self.queue_timers();

            if self.pending.borrow().is_empty() {
                self.queue_hooks(Phase::Idle);
            }

            self.queue_hooks(Phase::Check);
            self.invoke_pending();

            if self.refs.get() == 0 || self.break_requested.get() || mode != RunMode::Default {
                break;
            }
        }

        Ok(())
    }

    fn wait_timeout(&self, mode: RunMode) -> Option<Duration> {
        if mode == RunMode::NoWait
            || self.refs.get() == 0
            || !self.idles.borrow().is_empty()
            || !self.pending.borrow().is_empty()
        {
            return Some(Duration::ZERO);
        }

        let next = self
            .timers
            .borrow()
            .peek()
            .map(|t| t.deadline.saturating_duration_since(Instant::now()));

        Some(next.map_or(MAX_BLOCK, |d| d.min(MAX_BLOCK)))
    }

    /// Queues `revents` for `w`, merging with events already pending.
    pub(crate) fn feed(&self, w: &RawWatcher, revents: Revents) {
        if w.add_pending(revents.bits()) {
            self.pending.borrow_mut().push_back(w as *const RawWatcher);
        }
    }

    /// Drops the pending events of `w` and returns them.
    pub(crate) fn clear_pending(&self, w: &RawWatcher) -> Revents {
        let bits = w.take_pending();
        if bits != 0 {
            self.pending
                .borrow_mut()
                .retain(|&p| !ptr::eq(p, w as *const RawWatcher));
        }
        Revents::from_bits_retain(bits)
    }

    /// Calls the callback of `w` directly, whatever its state.
    pub(crate) fn invoke(&self, w: &RawWatcher, revents: Revents) {
        self.dispatch(w as *const RawWatcher, revents.bits());
    }

    fn invoke_pending(&self) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(w) = next else {
                break;
            };

            let revents = unsafe { &*w }.take_pending();
            if revents != 0 {
                self.dispatch(w, revents);
            }
        }
    }

    fn dispatch(&self, w: *const RawWatcher, revents: u32) {
        match unsafe { &*w }.callback() {
            Some(cb) => unsafe { cb(self as *const RawLoop, w, revents) },
            None => tracing::warn!("event delivered to a watcher without callback"),
        }
    }

    fn rebuild(&self) -> Result<()> {
        let poller = Poller::new(self.config.backend, self.config.event_capacity)?;
        let wake = poller.waker().write_fd();

        // Handlers must see the new wake fd before the old one is closed.
        for &signum in self.signals.borrow().keys() {
            signal::claim(signum, self.id(), wake)?;
        }
        *self.poller.borrow_mut() = poller;

        let mut changes = self.fd_changes.borrow_mut();
        for (&fd, slot) in self.fds.borrow_mut().iter_mut() {
            slot.registered = Interest::NONE;
            changes.push(fd);
        }

        tracing::debug!(backend = ?self.config.backend, "poller recreated after fork");
        Ok(())
    }

    /// Starts a timer.
    ///
    /// # Safety
    ///
    /// `timer` must stay alive at the same address until it is stopped,
    /// expires, or its pending events are delivered or cleared.
    pub(crate) unsafe fn timer_start(&self, timer: &RawTimer) {
        if timer.w.is_active() {
            return;
        }

        let deadline = deadline_after(self.mn_now.get(), timer.after());
        self.push_timer(deadline, timer);
        timer.w.set_active(true);
    }

    pub(crate) fn timer_stop(&self, timer: &RawTimer) {
        self.clear_pending(&timer.w);
        if !timer.w.is_active() {
            return;
        }

        self.timers
            .borrow_mut()
            .retain(|e| !ptr::eq(e.timer, timer as *const RawTimer));
        timer.at.set(None);
        timer.w.set_active(false);
    }

    /// Restarts a timer from its repeat interval.
    ///
    /// An active repeating timer gets its deadline moved to `now + repeat`;
    /// an active one-shot timer is stopped; an inactive repeating timer is
    /// started with `repeat` as its initial delay.
    ///
    /// # Safety
    ///
    /// Same contract as [`timer_start`](Self::timer_start).
    pub(crate) unsafe fn timer_again(&self, timer: &RawTimer) {
        self.clear_pending(&timer.w);

        let repeat = timer.repeat();
        if timer.w.is_active() {
            if repeat > 0.0 {
                self.timers
                    .borrow_mut()
                    .retain(|e| !ptr::eq(e.timer, timer as *const RawTimer));
                let deadline = deadline_after(self.mn_now.get(), repeat);
                self.push_timer(deadline, timer);
            } else {
                self.timer_stop(timer);
            }
        } else if repeat > 0.0 {
            timer.set(repeat, repeat);
            unsafe { self.timer_start(timer) };
        }
    }

    /// Seconds until `timer` fires, measured from the cached loop time.
    pub(crate) fn timer_remaining(&self, timer: &RawTimer) -> f64 {
        match timer.at.get() {
            Some(at) if timer.w.is_active() => {
                at.saturating_duration_since(self.mn_now.get()).as_secs_f64()
            }
            _ => timer.after(),
        }
    }

    fn push_timer(&self, deadline: Instant, timer: *const RawTimer) {
        let seq = self.timer_seq.get();
        self.timer_seq.set(seq + 1);

        unsafe { &*timer }.at.set(Some(deadline));
        self.timers.borrow_mut().push(TimerEntry {
            deadline,
            seq,
            timer,
        });
    }

    fn queue_timers(&self) {
        let now = self.mn_now.get();

        loop {
            let expired = {
                let mut timers = self.timers.borrow_mut();
                match timers.peek() {
                    Some(top) if top.deadline < now => timers.pop(),
                    _ => None,
                }
            };
            let Some(entry) = expired else {
                break;
            };

            let timer = unsafe { &*entry.timer };
            let repeat = timer.repeat();

            if repeat > 0.0 {
                let next = deadline_after(entry.deadline, repeat).max(now);
                self.push_timer(next, entry.timer);
            } else {
                timer.at.set(None);
                timer.w.set_active(false);
            }

            self.feed(&timer.w, Revents::TIMER);
        }
    }

    /// Starts an io watcher. Interest is installed in the poller lazily,
    /// right before the next poll.
    ///
    /// # Safety
    ///
    /// Same contract as [`timer_start`](Self::timer_start).
    pub(crate) unsafe fn io_start(&self, io: &RawIo) {
        if io.w.is_active() {
            return;
        }

        let fd = io.fd();
        self.fds
            .borrow_mut()
            .entry(fd)
            .or_default()
            .watchers
            .push(io as *const RawIo);
        self.fd_changes.borrow_mut().push(fd);
        io.w.set_active(true);
    }

    pub(crate) fn io_stop(&self, io: &RawIo) {
        self.clear_pending(&io.w);
        if !io.w.is_active() {
            return;
        }

        let fd = io.fd();
        if let Some(slot) = self.fds.borrow_mut().get_mut(&fd) {
            slot.watchers.retain(|&p| !ptr::eq(p, io as *const RawIo));
        }
        self.fd_changes.borrow_mut().push(fd);
        io.w.set_active(false);
    }

    /// Brings the poller's interest in line with the active io watchers.
    fn reify_fds(&self) {
        let mut changes = std::mem::take(&mut *self.fd_changes.borrow_mut());
        changes.sort_unstable();
        changes.dedup();

        for fd in changes {
            let (wanted, registered) = match self.fds.borrow().get(&fd) {
                Some(slot) => (slot.wanted(), slot.registered),
                None => continue,
            };

            if wanted == registered {
                if wanted.is_empty() {
                    self.fds.borrow_mut().remove(&fd);
                }
                continue;
            }

            let outcome = {
                let mut poller = self.poller.borrow_mut();
                if wanted.is_empty() {
                    poller.deregister(fd);
                    Ok(())
                } else if registered.is_empty() {
                    poller.register(fd, wanted)
                } else {
                    // The owner may have closed and reopened the descriptor,
                    // which silently drops it from an epoll set.
                    poller
                        .reregister(fd, wanted)
                        .or_else(|_| poller.register(fd, wanted))
                }
            };

            match outcome {
                Ok(()) if wanted.is_empty() => {
                    self.fds.borrow_mut().remove(&fd);
                }
                Ok(()) => {
                    if let Some(slot) = self.fds.borrow_mut().get_mut(&fd) {
                        slot.registered = wanted;
                    }
                }
                Err(e) => self.kill_fd(fd, &e),
            }
        }
    }

    /// Stops every watcher on a descriptor the poller refused, delivering
    /// `ERROR | READ | WRITE` to each of them.
    fn kill_fd(&self, fd: RawFd, reason: &io::Error) {
        tracing::warn!(fd, error = %reason, "descriptor rejected by the poller, stopping its watchers");

        let slot = self.fds.borrow_mut().remove(&fd);
        let Some(slot) = slot else {
            return;
        };

        if !slot.registered.is_empty() {
            self.poller.borrow_mut().deregister(fd);
        }

        for io in slot.watchers {
            let io = unsafe { &*io };
            io.w.set_active(false);
            self.feed(&io.w, Revents::ERROR | Revents::READ | Revents::WRITE);
        }
    }

    fn queue_io(&self) {
        let events = self.events.borrow();
        let mut invalid = Vec::new();

        {
            let fds = self.fds.borrow();
            for event in events.iter() {
                if event.invalid {
                    invalid.push(event.fd);
                    continue;
                }

                let Some(slot) = fds.get(&event.fd) else {
                    continue;
                };

                let ready = event.ready();
                for &io in &slot.watchers {
                    let io = unsafe { &*io };
                    let wanted = Interest::from_revents(io.events());

                    let mut got = Revents::empty();
                    if ready.read && wanted.read {
                        got |= Revents::READ;
                    }
                    if ready.write && wanted.write {
                        got |= Revents::WRITE;
                    }

                    if !got.is_empty() {
                        self.feed(&io.w, got);
                    }
                }
            }
        }

        for fd in invalid {
            self.kill_fd(fd, &io::Error::from_raw_os_error(libc::EBADF));
        }
    }

    /// Starts a signal watcher, claiming the signal for this loop if it is
    /// the first watcher for that number.
    ///
    /// # Safety
    ///
    /// Same contract as [`timer_start`](Self::timer_start).
    pub(crate) unsafe fn signal_start(&self, sig: &RawSignal) -> Result<()> {
        if sig.w.is_active() {
            return Ok(());
        }

        let signum = sig.signum();
        let mut signals = self.signals.borrow_mut();

        if !signals.contains_key(&signum) {
            let wake = self.poller.borrow().waker().write_fd();
            signal::claim(signum, self.id(), wake)?;
        }

        signals
            .entry(signum)
            .or_default()
            .push(sig as *const RawSignal);
        sig.w.set_active(true);
        Ok(())
    }

    pub(crate) fn signal_stop(&self, sig: &RawSignal) {
        self.clear_pending(&sig.w);
        if !sig.w.is_active() {
            return;
        }

        let signum = sig.signum();
        let mut signals = self.signals.borrow_mut();

        if let Some(list) = signals.get_mut(&signum) {
            list.retain(|&p| !ptr::eq(p, sig as *const RawSignal));
            if list.is_empty() {
                signals.remove(&signum);
                signal::release(signum, self.id());
            }
        }
        sig.w.set_active(false);
    }

    fn queue_signals(&self) {
        let signals = self.signals.borrow();

        for (&signum, list) in signals.iter() {
            if !signal::take_pending(signum) {
                continue;
            }

            for &sig in list {
                self.feed(&unsafe { &*sig }.w, Revents::SIGNAL);
            }
        }
    }

    fn hooks(&self, phase: Phase) -> &RefCell<Vec<*const RawHook>> {
        match phase {
            Phase::Prepare => &self.prepares,
            Phase::Check => &self.checks,
            Phase::Idle => &self.idles,
        }
    }

    /// Starts a prepare, check or idle record.
    ///
    /// # Safety
    ///
    /// Same contract as [`timer_start`](Self::timer_start).
    pub(crate) unsafe fn hook_start(&self, phase: Phase, hook: &RawHook) {
        if hook.w.is_active() {
            return;
        }

        self.hooks(phase).borrow_mut().push(hook as *const RawHook);
        hook.w.set_active(true);
    }

    pub(crate) fn hook_stop(&self, phase: Phase, hook: &RawHook) {
        self.clear_pending(&hook.w);
        if !hook.w.is_active() {
            return;
        }

        self.hooks(phase)
            .borrow_mut()
            .retain(|&p| !ptr::eq(p, hook as *const RawHook));
        hook.w.set_active(false);
    }

    fn queue_hooks(&self, phase: Phase) {
        let hooks = self.hooks(phase).borrow();
        for &hook in hooks.iter() {
            self.feed(&unsafe { &*hook }.w, phase.revents());
        }
    }
}

impl Drop for RawLoop {
    fn drop(&mut self) {
        let id = self.id();
        for &signum in self.signals.get_mut().keys() {
            signal::release(signum, id);
        }
    }
}
