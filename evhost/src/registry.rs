//! Object identity registry.
//!
//! Maps the address of every live native record (watcher records and
//! reactors) to a marker naming its kind and the address of the object that
//! owns it. The dispatch trampoline uses it to get from the pointer the
//! reactor hands over back to the owning host object; construction uses it
//! to refuse an address that is still believed to be live.
//!
//! The table is process-wide and created once, as a `static`. Every access
//! goes through one mutex so that insert, remove and lookup stay atomic
//! even if loops run on several threads.

use crate::WatcherKind;
use crate::error::fatal;

use parking_lot::{Mutex, const_mutex};
use std::collections::BTreeMap;

/// What a registered address belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Loop,
    Watcher(WatcherKind),
}

/// Liveness marker stored for a registered address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Marker {
    pub(crate) kind: ObjectKind,

    /// Address of the host object embedding or owning the record.
    pub(crate) owner: usize,
}

pub(crate) struct Registry {
    entries: Mutex<BTreeMap<usize, Marker>>,
}

static REGISTRY: Registry = Registry::new();

impl Registry {
    const fn new() -> Self {
        Self {
            entries: const_mutex(BTreeMap::new()),
        }
    }

    /// The process-wide registry.
    pub(crate) fn global() -> &'static Registry {
        &REGISTRY
    }

    /// Records `address` as live.
    ///
    /// Registering an address twice means memory is being reused while the
    /// registry still believes it live, which is fatal.
    pub(crate) fn register(&self, address: usize, marker: Marker) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&address) {
            let existing = *existing;
            drop(entries);
            tracing::error!(address, ?existing, ?marker, "registry collision");
            fatal("native address registered twice");
        }

        entries.insert(address, marker);
    }

    /// Forgets `address`. The address must be registered.
    pub(crate) fn unregister(&self, address: usize) {
        let removed = self.entries.lock().remove(&address);
        if removed.is_none() {
            fatal("unregistering an address that is not registered");
        }
    }

    pub(crate) fn lookup(&self, address: usize) -> Option<Marker> {
        self.entries.lock().get(&address).copied()
    }

    /// Number of live registered objects.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(owner: usize) -> Marker {
        Marker {
            kind: ObjectKind::Watcher(WatcherKind::Timer),
            owner,
        }
    }

    #[test]
    fn register_lookup_unregister() {
        let registry = Registry::new();
        registry.register(0x1000, marker(0x2000));

        assert_eq!(registry.lookup(0x1000), Some(marker(0x2000)));
        assert_eq!(registry.len(), 1);

        registry.unregister(0x1000);
        assert_eq!(registry.lookup(0x1000), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn address_can_be_reused_after_unregister() {
        let registry = Registry::new();
        registry.register(0x1000, marker(1));
        registry.unregister(0x1000);
        registry.register(0x1000, marker(2));

        assert_eq!(registry.lookup(0x1000).map(|m| m.owner), Some(2));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn double_registration_is_fatal() {
        let registry = Registry::new();
        registry.register(0x1000, marker(1));
        registry.register(0x1000, marker(2));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn unregistering_unknown_address_is_fatal() {
        Registry::new().unregister(0xdead);
    }
}
