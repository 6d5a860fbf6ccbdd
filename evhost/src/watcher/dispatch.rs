//! The dispatch trampoline: the only way the reactor reaches host code.

use super::{Kind, Watcher};
use crate::error::fatal;
use crate::reactor::{RawLoop, RawWatcher};
use crate::registry::{Marker, ObjectKind, Registry};
use crate::{CallbackFailure, Loop, Revents};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, trace};

/// Delivers one event to the watcher owning `w`.
///
/// Callback errors and panics are caught here and handed to the loop's
/// error handler, so nothing unwinds into the reactor. A registry miss
/// means the reactor holds a record nobody owns anymore; the resulting
/// panic cannot cross this `extern "C"` boundary and aborts.
pub(super) unsafe extern "C" fn trampoline<K: Kind>(
    raw_loop: *const RawLoop,
    w: *const RawWatcher,
    revents: u32,
) {
    let watcher = match Registry::global().lookup(w as usize) {
        Some(Marker {
            kind: ObjectKind::Watcher(kind),
            owner,
        }) if kind == K::KIND => unsafe { Watcher::<K>::from_owner(owner) },
        _ => fatal("event delivered to an unregistered watcher"),
    };
    let lp = unsafe { Loop::from_raw(raw_loop) };
    let revents = Revents::from_bits_retain(revents);

    trace!(kind = %K::KIND, ?revents, "dispatch");

    // Read at delivery time so a replacement made while pending is honoured.
    let callback = watcher.callback();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*callback)(&watcher, &lp, revents)));

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(CallbackFailure::Returned {
            kind: K::KIND,
            revents,
            error,
        }),
        Err(payload) => Some(CallbackFailure::Panicked {
            kind: K::KIND,
            revents,
            message: panic_message(payload.as_ref()),
        }),
    };

    if let Some(failure) = failure {
        let reported = panic::catch_unwind(AssertUnwindSafe(|| lp.report(failure)));
        if let Err(payload) = reported {
            error!(
                kind = %K::KIND,
                message = %panic_message(payload.as_ref()),
                "error handler panicked"
            );
        }
    }

    watcher.reconcile();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload = panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");

        let payload = panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
