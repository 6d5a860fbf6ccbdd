//! Bit masks shared with the reactor.
//!
//! The values are the ones libev uses, so masks can be exchanged with code
//! written against it unchanged.

use bitflags::bitflags;

bitflags! {
    /// Events delivered to a watcher callback.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Revents: u32 {
        /// The file descriptor is readable.
        const READ = 0x01;
        /// The file descriptor is writable.
        const WRITE = 0x02;
        /// A timer expired.
        const TIMER = 0x0000_0100;
        /// A watched signal was received.
        const SIGNAL = 0x0000_0400;
        /// The loop has nothing else to do.
        const IDLE = 0x0000_2000;
        /// The loop is about to block.
        const PREPARE = 0x0000_4000;
        /// The loop just collected events.
        const CHECK = 0x0000_8000;
        /// User-defined event, for manual delivery through `invoke`.
        const CUSTOM = 0x0100_0000;
        /// The watcher was stopped because of an error.
        const ERROR = 0x8000_0000;
    }
}

bitflags! {
    /// Polling mechanism a loop runs on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Backend: u32 {
        const POLL = 0x02;
        const EPOLL = 0x04;
    }
}

impl Backend {
    /// The backend used when none is requested.
    pub fn recommended() -> Backend {
        if cfg!(target_os = "linux") {
            Backend::EPOLL
        } else {
            Backend::POLL
        }
    }

    /// Every backend compiled into this build.
    pub fn supported() -> Backend {
        if cfg!(target_os = "linux") {
            Backend::EPOLL | Backend::POLL
        } else {
            Backend::POLL
        }
    }

    /// Parses a backend name as accepted by `EVHOST_BACKEND`.
    pub fn parse_name(name: &str) -> Option<Backend> {
        match name.trim().to_ascii_lowercase().as_str() {
            "epoll" => Some(Backend::EPOLL),
            "poll" => Some(Backend::POLL),
            _ => None,
        }
    }
}
