//! The event reactor.
//!
//! This module is the "native" side of the crate: a small libev-style
//! reactor responsible for
//! - driving I/O readiness through epoll or poll,
//! - managing timers,
//! - handing over unix signals,
//! - running the prepare, check and idle phases of every iteration.
//!
//! Every watcher kind is a raw record with an init/start/stop triple, and
//! every delivery goes through the [`RawCallback`](watcher::RawCallback)
//! stored in the record. The binding layer in [`crate::watcher`] is the
//! only user.

mod core;
mod event;
mod poller;
mod signal;
mod timer;
mod watcher;

pub(crate) use core::{RawLoop, ReactorConfig};
pub(crate) use signal::NSIG;
pub(crate) use watcher::{AsRawWatcher, Phase, RawHook, RawIo, RawSignal, RawTimer, RawWatcher};
