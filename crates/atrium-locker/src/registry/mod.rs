//! Registry of live lockers.
//!
//! Every successful construction registers its locker here, and the
//! registry is the unit of integrity sweeps and teardown. It is an explicit
//! object injected into the construction pipeline — never an implicit
//! singleton — so tests and embedders can run independent registries side
//! by side.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::globals::GlobalScope;
use crate::locker::{Locker, LockerId};
use crate::shadow::VerifyMode;

/// Tracing target for registry operations.
const REGISTRY_TARGET: &str = "atrium_locker::registry";

/// Tracks every active locker. Cheap-clone shared handle.
#[derive(Clone)]
pub struct LockerRegistry {
    inner: Rc<RegistryInner>,
}

struct RegistryInner {
    next_id: Cell<u64>,
    lockers: RefCell<BTreeMap<LockerId, Rc<Locker>>>,
}

impl LockerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                next_id: Cell::new(0),
                lockers: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Reserves the next locker identifier.
    pub(crate) fn next_id(&self) -> LockerId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        LockerId::new(id)
    }

    /// Enters a locker into the registry.
    pub(crate) fn register(&self, locker: Rc<Locker>) {
        debug!(
            target: REGISTRY_TARGET,
            locker = %locker.id(),
            namespace = locker.namespace(),
            "locker registered"
        );
        drop(self.inner.lockers.borrow_mut().insert(locker.id(), locker));
    }

    /// Looks up a live locker by id.
    #[must_use]
    pub fn get(&self, id: LockerId) -> Option<Rc<Locker>> {
        self.inner.lockers.borrow().get(&id).cloned()
    }

    /// Number of live lockers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lockers.borrow().len()
    }

    /// Returns `true` when no locker is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lockers.borrow().is_empty()
    }

    /// Re-verifies every live locker against the current ambient
    /// environment.
    ///
    /// Sweeps the full registry even after the first failure so every
    /// compromised locker is reported, then returns `false` if any failed.
    /// Reports by boolean: an integrity sweep must not crash the host.
    #[must_use]
    pub fn verify_all(&self, globals: &GlobalScope, mode: VerifyMode) -> bool {
        let lockers: Vec<Rc<Locker>> = self.inner.lockers.borrow().values().cloned().collect();
        let mut clean = true;
        for locker in lockers {
            if !locker.verify_shadows(globals, mode) {
                warn!(
                    target: REGISTRY_TARGET,
                    locker = %locker.id(),
                    namespace = locker.namespace(),
                    "shadow verification failed"
                );
                clean = false;
            }
        }
        clean
    }

    /// Removes a locker from the registry. Idempotent: destroying an
    /// unknown or already-destroyed id is a no-op returning `false`.
    pub fn destroy(&self, id: LockerId) -> bool {
        let removed = self.inner.lockers.borrow_mut().remove(&id);
        removed.map_or(false, |locker| {
            locker.mark_destroyed();
            info!(
                target: REGISTRY_TARGET,
                locker = %id,
                namespace = locker.namespace(),
                "locker destroyed"
            );
            true
        })
    }

    /// Removes every locker from the registry. Idempotent.
    pub fn destroy_all(&self) {
        let drained: Vec<Rc<Locker>> = {
            let mut lockers = self.inner.lockers.borrow_mut();
            let all = lockers.values().cloned().collect();
            lockers.clear();
            all
        };
        for locker in &drained {
            locker.mark_destroyed();
        }
        if !drained.is_empty() {
            info!(
                target: REGISTRY_TARGET,
                destroyed = drained.len(),
                "registry torn down"
            );
        }
    }
}

impl Default for LockerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockerRegistry")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
