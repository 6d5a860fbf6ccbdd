use super::Loop;

thread_local! {
    /// The default loop of the current thread.
    ///
    /// It starts out unrealized; its reactor is only created when a
    /// watcher is first started on it or an operation needs it.
    static DEFAULT_LOOP: Loop = Loop::unrealized();
}

/// Returns a handle to the current thread's default loop.
///
/// # Panics
///
/// Panics if called while the thread is being torn down.
pub(crate) fn default_loop() -> Loop {
    DEFAULT_LOOP.with(Loop::clone)
}
