use crate::{Revents, WatcherKind};

use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to host code.
#[derive(Debug, Error)]
pub enum Error {
    /// The reactor or its poller could not be created.
    #[error("failed to initialize event loop: {0}")]
    Initialization(#[source] io::Error),

    /// A watcher or loop was used in a way its current state forbids.
    #[error("lifecycle misuse: {0}")]
    LifecycleMisuse(String),

    /// `Loop::close` was called while watchers are still started on it.
    #[error("loop still has {attached} attached watcher(s)")]
    LoopBusy { attached: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another loop already watches this signal.
    #[error("signal {0} is already watched by another loop")]
    SignalInUse(i32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure raised by a host callback.
///
/// Callbacks return `Result<(), CallbackError>`. Any error that converts
/// into a `CallbackError` can be propagated with `?`.
#[derive(Debug)]
pub struct CallbackError {
    message: String,
    source: Option<Box<dyn StdError + 'static>>,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps another error, keeping it as the source.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CallbackError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref()
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<io::Error> for CallbackError {
    fn from(error: io::Error) -> Self {
        Self::from_error(error)
    }
}

impl From<Error> for CallbackError {
    fn from(error: Error) -> Self {
        Self::from_error(error)
    }
}

/// A callback failure caught at the dispatch boundary.
///
/// The failure never reaches the reactor: it is handed to the loop's error
/// handler and delivery continues with the next pending watcher.
#[derive(Debug, Error)]
pub enum CallbackFailure {
    /// The callback returned an error.
    #[error("{kind} callback failed (revents {revents:?}): {error}")]
    Returned {
        kind: WatcherKind,
        revents: Revents,
        #[source]
        error: CallbackError,
    },

    /// The callback panicked.
    #[error("{kind} callback panicked (revents {revents:?}): {message}")]
    Panicked {
        kind: WatcherKind,
        revents: Revents,
        message: String,
    },
}

impl CallbackFailure {
    pub fn kind(&self) -> WatcherKind {
        match self {
            CallbackFailure::Returned { kind, .. } | CallbackFailure::Panicked { kind, .. } => *kind,
        }
    }

    pub fn revents(&self) -> Revents {
        match self {
            CallbackFailure::Returned { revents, .. }
            | CallbackFailure::Panicked { revents, .. } => *revents,
        }
    }

    /// Multi-line report: the failure followed by its chain of causes.
    pub fn traceback(&self) -> String {
        let mut report = format!("evhost: {self}");

        // A wrapped error repeats its source's message; print it once.
        let mut last = match self {
            CallbackFailure::Returned { error, .. } => error.to_string(),
            CallbackFailure::Panicked { message, .. } => message.clone(),
        };

        let mut cause = StdError::source(self).and_then(|error| error.source());
        while let Some(err) = cause {
            let text = err.to_string();
            if text != last {
                report.push_str("\n  caused by: ");
                report.push_str(&text);
            }
            last = text;
            cause = err.source();
        }

        report
    }
}

/// Reports a broken internal invariant and aborts the current operation.
///
/// Used where continuing would risk touching freed watcher records. When
/// reached from the dispatch trampoline the panic cannot unwind into the
/// reactor and the process aborts.
#[track_caller]
pub(crate) fn fatal(invariant: &str) -> ! {
    tracing::error!(invariant, "internal invariant violated");
    panic!("evhost: internal invariant violated: {invariant}");
}
