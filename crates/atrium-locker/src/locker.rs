//! The realised isolated execution unit.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use atrium_script::Value;

use crate::environment::CapabilityEnvironment;
use crate::globals::GlobalScope;
use crate::key::CapabilityKey;
use crate::shadow::{self, ShadowSet, VerifyMode};

/// Identifier of a registered locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockerId(u64);

impl LockerId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locker-{}", self.0)
    }
}

/// Lifecycle state of a locker after construction.
///
/// Construction-time stages (preprocessing, shadow computation, binding)
/// exist only on the pipeline's call stack; a locker object comes into
/// being already bound, with its result fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockerState {
    /// Constructed and registered; not yet re-verified.
    Bound,
    /// The most recent integrity sweep passed.
    Verified,
    /// The most recent integrity sweep failed. Detection and remediation
    /// are deliberately decoupled: a failed locker stays alive until
    /// explicitly destroyed.
    Failed,
    /// Removed from the registry.
    Destroyed,
}

/// One isolated execution unit: a piece of source text realised for one
/// namespace.
///
/// Holds the shadow-set snapshot taken at construction, the capability
/// environment it executed against, and its execution result, which is
/// fixed and immutable for the locker's lifetime.
pub struct Locker {
    id: LockerId,
    namespace: String,
    key: CapabilityKey,
    shadows: ShadowSet,
    imports: BTreeSet<String>,
    environment: Rc<CapabilityEnvironment>,
    result: Value,
    state: Cell<LockerState>,
}

impl Locker {
    pub(crate) fn new(
        id: LockerId,
        key: CapabilityKey,
        shadows: ShadowSet,
        imports: BTreeSet<String>,
        environment: Rc<CapabilityEnvironment>,
        result: Value,
    ) -> Self {
        Self {
            id,
            namespace: key.namespace().to_owned(),
            key,
            shadows,
            imports,
            environment,
            result,
            state: Cell::new(LockerState::Bound),
        }
    }

    /// Returns the registry identifier.
    #[must_use]
    pub const fn id(&self) -> LockerId {
        self.id
    }

    /// Returns the namespace the locker executes for.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the capability key the locker was constructed under.
    #[must_use]
    pub const fn key(&self) -> &CapabilityKey {
        &self.key
    }

    /// Returns the shadow-set snapshot taken at construction time.
    #[must_use]
    pub const fn shadows(&self) -> &ShadowSet {
        &self.shadows
    }

    /// Returns the capability environment the locker executed against.
    #[must_use]
    pub fn environment(&self) -> &Rc<CapabilityEnvironment> {
        &self.environment
    }

    /// Returns the execution result, fixed at construction.
    #[must_use]
    pub const fn result(&self) -> &Value {
        &self.result
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LockerState {
        self.state.get()
    }

    /// Re-verifies the shadow snapshot against the current ambient
    /// environment.
    ///
    /// A `false` result marks the locker [`LockerState::Failed`] but does
    /// not destroy it; destruction is a separate, explicit operation. A
    /// destroyed locker always fails verification.
    #[must_use]
    pub fn verify_shadows(&self, globals: &GlobalScope, mode: VerifyMode) -> bool {
        if self.state.get() == LockerState::Destroyed {
            return false;
        }
        let clean = shadow::verify_shadows(&self.shadows, globals, &self.imports, mode);
        self.state.set(if clean {
            LockerState::Verified
        } else {
            LockerState::Failed
        });
        clean
    }

    pub(crate) fn mark_destroyed(&self) {
        self.state.set(LockerState::Destroyed);
    }
}

impl fmt::Debug for Locker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("state", &self.state.get())
            .field("shadowed", &self.shadows.len())
            .finish_non_exhaustive()
    }
}
