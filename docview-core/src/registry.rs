//! Reference-counted document handles shared between hosts.
//!
//! Both hosts point at the same locator. The first host to open a locator
//! inserts the resulting handle; later hosts lease it without reopening. The
//! handle is dropped once the last lease is released.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::DocumentHandle;

struct RegistryEntry {
    handle: Arc<dyn DocumentHandle>,
    leases: usize,
}

#[derive(Default)]
pub struct HandleRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl HandleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Leases an already opened handle for `locator`, if any host holds one.
    pub fn acquire(self: &Arc<Self>, locator: &str) -> Option<HandleLease> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(locator)?;
        entry.leases += 1;
        Some(HandleLease {
            locator: locator.to_owned(),
            handle: Arc::clone(&entry.handle),
            registry: Arc::clone(self),
        })
    }

    /// Registers a freshly opened handle. If another open for the same
    /// locator finished first, its handle wins and `handle` is dropped.
    pub fn insert(self: &Arc<Self>, locator: &str, handle: Arc<dyn DocumentHandle>) -> HandleLease {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(locator.to_owned())
            .or_insert_with(|| RegistryEntry { handle, leases: 0 });
        entry.leases += 1;
        HandleLease {
            locator: locator.to_owned(),
            handle: Arc::clone(&entry.handle),
            registry: Arc::clone(self),
        }
    }

    pub fn lease_count(&self, locator: &str) -> usize {
        self.entries
            .lock()
            .get(locator)
            .map(|entry| entry.leases)
            .unwrap_or(0)
    }

    fn release(&self, locator: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(locator) {
            entry.leases = entry.leases.saturating_sub(1);
            if entry.leases == 0 {
                entries.remove(locator);
                debug!(locator, "released last lease on document handle");
            }
        }
    }
}

/// A host's claim on a shared handle. Dropping it releases the claim.
pub struct HandleLease {
    locator: String,
    handle: Arc<dyn DocumentHandle>,
    registry: Arc<HandleRegistry>,
}

impl HandleLease {
    pub fn handle(&self) -> Arc<dyn DocumentHandle> {
        Arc::clone(&self.handle)
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }
}

impl Deref for HandleLease {
    type Target = dyn DocumentHandle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        self.registry.release(&self.locator);
    }
}

impl std::fmt::Debug for HandleLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleLease")
            .field("locator", &self.locator)
            .field("pages", &self.handle.page_count())
            .finish()
    }
}
