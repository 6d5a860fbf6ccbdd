//! Process-wide signal plumbing.
//!
//! A signal can be watched by one loop at a time. The loop that claims it
//! installs [`on_signal`] as the handler and publishes the write end of its
//! waker. The handler only stores into atomics and writes to that
//! descriptor; the loop picks the flag up on its next iteration.

use super::poller::common::wake_fd;
use crate::error::{Error, Result};

use parking_lot::{Mutex, const_mutex};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// One past the highest signal number accepted.
pub(crate) const NSIG: i32 = 65;

static PENDING: [AtomicBool; NSIG as usize] = [const { AtomicBool::new(false) }; NSIG as usize];

static WAKE_FD: [AtomicI32; NSIG as usize] = [const { AtomicI32::new(-1) }; NSIG as usize];

/// Loop (by address) owning each signal number.
static OWNERS: Mutex<[Option<usize>; NSIG as usize]> = const_mutex([None; NSIG as usize]);

extern "C" fn on_signal(signum: libc::c_int) {
    if !(1..NSIG).contains(&signum) {
        return;
    }

    PENDING[signum as usize].store(true, Ordering::Release);

    let fd = WAKE_FD[signum as usize].load(Ordering::Acquire);
    if fd >= 0 {
        wake_fd(fd);
    }
}

/// Makes `owner` the loop receiving `signum`, waking it through `wake`.
///
/// Claiming a signal the same loop already owns only refreshes the wake
/// descriptor.
pub(crate) fn claim(signum: i32, owner: usize, wake: RawFd) -> Result<()> {
    let mut owners = OWNERS.lock();
    let slot = &mut owners[signum as usize];

    match *slot {
        Some(current) if current != owner => return Err(Error::SignalInUse(signum)),
        Some(_) => {
            WAKE_FD[signum as usize].store(wake, Ordering::Release);
            return Ok(());
        }
        None => {}
    }

    PENDING[signum as usize].store(false, Ordering::Release);
    WAKE_FD[signum as usize].store(wake, Ordering::Release);
    install(signum, on_signal as usize).map_err(|e| {
        WAKE_FD[signum as usize].store(-1, Ordering::Release);
        Error::Io(e)
    })?;

    *slot = Some(owner);
    tracing::debug!(signum, "signal handler installed");
    Ok(())
}

/// Gives `signum` back, restoring the default disposition.
pub(crate) fn release(signum: i32, owner: usize) {
    let mut owners = OWNERS.lock();
    let slot = &mut owners[signum as usize];

    if *slot != Some(owner) {
        return;
    }

    if let Err(e) = install(signum, libc::SIG_DFL) {
        tracing::warn!(signum, error = %e, "failed to restore default signal disposition");
    }

    WAKE_FD[signum as usize].store(-1, Ordering::Release);
    PENDING[signum as usize].store(false, Ordering::Release);
    *slot = None;
    tracing::debug!(signum, "signal handler removed");
}

/// Returns whether `signum` arrived since the last call, clearing the flag.
pub(crate) fn take_pending(signum: i32) -> bool {
    PENDING[signum as usize].swap(false, Ordering::AcqRel)
}

fn install(signum: i32, handler: libc::sighandler_t) -> io::Result<()> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler;
    action.sa_flags = libc::SA_RESTART;

    unsafe {
        libc::sigfillset(&mut action.sa_mask);
    }

    let rc = unsafe { libc::sigaction(signum, &action, std::ptr::null_mut()) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
