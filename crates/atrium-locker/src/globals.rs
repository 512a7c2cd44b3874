//! The shared ambient global scope.
//!
//! Trusted framework code executes against one shared global scope holding
//! the real document, window, and facade objects. Sandboxed code never
//! resolves names here — the execution facility has no ambient lookup path
//! — but the scope's name set is still the integrity signal the shadow
//! calculator snapshots: a name appearing or vanishing after a locker was
//! constructed means the ambient environment was mutated behind the
//! framework's back.

use std::collections::BTreeSet;

use atrium_script::{ObjectRef, ScriptEngine, Value};

/// Handle to the shared ambient global scope.
#[derive(Debug, Clone)]
pub struct GlobalScope {
    root: ObjectRef,
}

impl GlobalScope {
    /// Creates an empty global scope backed by a fresh object.
    #[must_use]
    pub fn new(engine: &ScriptEngine) -> Self {
        Self {
            root: engine.new_object(),
        }
    }

    /// Defines (or redefines) an ambient global name.
    pub fn define(&self, name: &str, value: Value) {
        // The root object carries no handler and is never sealed, so the
        // write cannot fault.
        drop(self.root.set(name, value));
    }

    /// Removes an ambient global name. Host-side API; used by maintenance
    /// and by tests exercising environment-mutation detection.
    ///
    /// An undefined-valued slot does not enumerate, so overwriting is
    /// equivalent to deletion for every observer of this scope.
    pub fn remove(&self, name: &str) {
        drop(self.root.set(name, Value::Undefined));
    }

    /// Looks up an ambient global by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.root.get(name) {
            Ok(Value::Undefined) | Err(_) => None,
            Ok(value) => Some(value),
        }
    }

    /// Enumerates every currently-reachable ambient name, in order.
    #[must_use]
    pub fn names(&self) -> BTreeSet<String> {
        self.root
            .property_names()
            .into_iter()
            .filter(|name| !matches!(self.root.get(name), Ok(Value::Undefined) | Err(_)))
            .collect()
    }
}
