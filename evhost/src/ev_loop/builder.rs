use super::{ErrorHandler, Loop};
use crate::error::{Error, Result};
use crate::reactor::ReactorConfig;
use crate::{Backend, CallbackFailure};

use std::rc::Rc;

/// Environment variable selecting the backend, read by
/// [`LoopBuilder::from_env`] and by the default loop.
pub const BACKEND_ENV: &str = "EVHOST_BACKEND";

/// Builder for configuring and creating a loop.
///
/// # Examples
///
/// ```rust,ignore
/// let lp = LoopBuilder::new()
///     .backend(Backend::POLL)
///     .event_capacity(256)
///     .build()?;
/// ```
pub struct LoopBuilder {
    /// Requested backend; `None` picks [`Backend::recommended`].
    backend: Option<Backend>,

    /// Number of readiness events collected per poll.
    event_capacity: usize,

    error_handler: Option<ErrorHandler>,
}

impl LoopBuilder {
    /// Creates a `LoopBuilder` with default configuration.
    pub fn new() -> Self {
        Self {
            backend: None,
            event_capacity: 64,
            error_handler: None,
        }
    }

    /// Creates a builder configured from the environment.
    ///
    /// `EVHOST_BACKEND` may name a backend (`epoll` or `poll`). An unset or
    /// empty variable leaves the default in place.
    pub fn from_env() -> Result<Self> {
        let builder = Self::new();

        match std::env::var(BACKEND_ENV) {
            Ok(name) if name.trim().is_empty() => Ok(builder),
            Ok(name) => match Backend::parse_name(&name) {
                Some(backend) => Ok(builder.backend(backend)),
                None => Err(Error::InvalidArgument(format!(
                    "{BACKEND_ENV}={name:?} does not name a backend"
                ))),
            },
            Err(_) => Ok(builder),
        }
    }

    /// Sets the polling backend.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets how many readiness events a single poll can return.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Installs the handler receiving callback failures.
    ///
    /// Without one, failures are logged and printed to stderr.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallbackFailure) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Builds the loop, creating its reactor immediately.
    pub fn build(self) -> Result<Loop> {
        let (config, handler) = self.into_parts(false)?;
        Loop::with_reactor(config, handler)
    }

    pub(crate) fn into_parts(self, is_default: bool) -> Result<(ReactorConfig, Option<ErrorHandler>)> {
        let backend = self.backend.unwrap_or_else(Backend::recommended);

        if backend.bits().count_ones() != 1 || !Backend::supported().contains(backend) {
            return Err(Error::InvalidArgument(format!(
                "backend {backend:?} is not supported here (supported: {:?})",
                Backend::supported()
            )));
        }

        let config = ReactorConfig {
            backend,
            event_capacity: self.event_capacity,
            is_default,
        };

        Ok((config, self.error_handler))
    }
}

impl Default for LoopBuilder {
    /// Creates a default `LoopBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
