//! # evhost
//!
//! **evhost** binds a small libev-style event reactor to reference-counted
//! host objects. Host code creates loops and watchers as ordinary `Rc`-backed
//! handles, drops them whenever it likes, and gets its callbacks invoked
//! when the reactor's events fire, without ever dangling a native record.
//!
//! The crate provides:
//!
//! - A **loop handle** ([`Loop`]) with a lazily created per-thread default
//!   loop and keepalive counting, so that `run` returns once no
//!   non-daemon watcher is left
//! - Six **watcher kinds**: [`Timer`], [`Io`], [`Signal`], [`Idle`],
//!   [`Check`] and [`Prepare`]
//! - A **dispatch boundary** that catches callback errors and panics and
//!   reports them through the loop's error handler instead of unwinding
//!   into the reactor
//! - An epoll (Linux) and `poll(2)` **reactor** implementing libev's
//!   iteration order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evhost::{Loop, RunMode, Timer};
//!
//! fn main() -> evhost::Result<()> {
//!     let lp = Loop::default_loop();
//!
//!     // Fire once, 10ms from now.
//!     let timer = Timer::new(|_, _, revents| {
//!         println!("timer fired: {revents:?}");
//!         Ok(())
//!     }, 0.01, 0.0)?;
//!     timer.start(&lp, false)?;
//!
//!     // Returns once the timer fired and released the loop.
//!     lp.run(RunMode::Default)
//! }
//! ```
//!
//! ## Modules
//!
//! - [`watcher`]: Watcher lifecycle and the kind-specific constructors
//! - [`error`]: Error types and callback failure reports
//!
//! ## Configuration
//!
//! Explicit loops are configured with [`LoopBuilder`]. The default loop
//! reads the backend from the `EVHOST_BACKEND` environment variable
//! (`epoll` or `poll`) when it is first used.

mod ev_loop;
mod flags;
mod reactor;
mod registry;

pub mod error;
pub mod watcher;

pub use error::{CallbackError, CallbackFailure, Error, Result};
pub use ev_loop::{BACKEND_ENV, Loop, LoopBuilder, RunMode};
pub use flags::{Backend, Revents};
pub use watcher::{
    Callback, CallbackResult, Check, Idle, Io, Prepare, Signal, Timer, Watcher, WatcherKind,
};

/// Version of the crate, as `major.minor.patch`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
