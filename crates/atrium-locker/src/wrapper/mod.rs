//! Secure wrappers mediating object access across the isolation boundary.
//!
//! A secure wrapper is a proxy object standing in for exactly one real
//! framework object. All property traffic routes through an explicit
//! [`WrapperPolicy`], so the set of mediated operations is enumerable and
//! auditable rather than implied by interception: reads of sanctioned names
//! are forwarded (with object results recursively wrapped under the same
//! key), everything else reads as `undefined`, and writes are permitted
//! only to allow-listed names. Wrappers are cached per `(object, key)` —
//! from the caller's perspective wrapper identity *is* object identity —
//! and unwrapping back to the real object requires the master key.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use atrium_script::{ObjectId, ObjectRef, PropertyHandler, ScriptEngine, ScriptError, Value};

use crate::error::LockerError;
use crate::key::{CapabilityKey, KeyRegistry};
use crate::policy::PrivilegePolicy;

/// Tracing target for wrapper operations.
const WRAPPER_TARGET: &str = "atrium_locker::wrapper";

/// Declarative description of the operations a wrapper forwards.
///
/// The default policy forwards reads of every public name (names not
/// prefixed with `_`) and permits no writes. Callers widen it explicitly.
#[derive(Debug, Clone)]
pub struct WrapperPolicy {
    expose_public: bool,
    readable: std::collections::BTreeSet<String>,
    writable: std::collections::BTreeSet<String>,
}

impl WrapperPolicy {
    /// Creates the default read-only, public-names policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expose_public: true,
            readable: std::collections::BTreeSet::new(),
            writable: std::collections::BTreeSet::new(),
        }
    }

    /// Stops forwarding public names; only allow-listed reads remain.
    #[must_use]
    pub fn hide_public(mut self) -> Self {
        self.expose_public = false;
        self
    }

    /// Allow-lists a name for reading regardless of the public rule.
    #[must_use]
    pub fn allow_read(mut self, name: impl Into<String>) -> Self {
        drop(self.readable.insert(name.into()));
        self
    }

    /// Allow-lists a name for writing through to the real object.
    #[must_use]
    pub fn allow_write(mut self, name: impl Into<String>) -> Self {
        drop(self.writable.insert(name.into()));
        self
    }

    fn allows_read(&self, name: &str) -> bool {
        (self.expose_public && !name.starts_with('_')) || self.readable.contains(name)
    }

    fn allows_write(&self, name: &str) -> bool {
        self.writable.contains(name)
    }
}

impl Default for WrapperPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Mints, caches, and unwraps secure wrappers.
///
/// Cheap-clone shared handle; all clones observe the same wrapper caches.
#[derive(Clone)]
pub struct WrapperFactory {
    inner: Rc<FactoryInner>,
}

struct FactoryInner {
    engine: ScriptEngine,
    keys: KeyRegistry,
    policy: Rc<dyn PrivilegePolicy>,
    /// `(real object, key mint id) -> wrapper`, so repeated wrapping of the
    /// same object under the same key returns the identical proxy.
    wrappers: RefCell<HashMap<(ObjectId, u64), ObjectRef>>,
    /// `wrapper -> real object`, consulted by [`WrapperFactory::unwrap`].
    targets: RefCell<HashMap<ObjectId, ObjectRef>>,
}

impl WrapperFactory {
    /// Creates a factory sharing the given engine, key registry, and
    /// privilege policy.
    #[must_use]
    pub fn new(engine: ScriptEngine, keys: KeyRegistry, policy: Rc<dyn PrivilegePolicy>) -> Self {
        Self {
            inner: Rc::new(FactoryInner {
                engine,
                keys,
                policy,
                wrappers: RefCell::new(HashMap::new()),
                targets: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Wraps `value` for access by the namespace holding `key`.
    ///
    /// Non-reference values pass through unchanged; lists are wrapped
    /// element-wise into a fresh list. An object that is already a wrapper
    /// is returned as-is, and an *untagged* object requested by a
    /// privileged namespace is returned unwrapped — the sanctioned escape
    /// hatch for trusted first-party code.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::AlreadyTagged`] only in the pathological case
    /// of an id collision in the tag registry; minting itself cannot fail.
    pub fn wrap(&self, value: &Value, key: &CapabilityKey) -> Result<Value, LockerError> {
        wrap_value(&self.inner, value, key, &WrapperPolicy::default())
    }

    /// Wraps `value` under an explicit mediation policy.
    ///
    /// The policy applies only when a new wrapper is minted; a cached
    /// wrapper keeps the policy it was created with.
    ///
    /// # Errors
    ///
    /// As for [`WrapperFactory::wrap`].
    pub fn wrap_with_policy(
        &self,
        value: &Value,
        key: &CapabilityKey,
        policy: &WrapperPolicy,
    ) -> Result<Value, LockerError> {
        wrap_value(&self.inner, value, key, policy)
    }

    /// Unwraps a value back to the real object(s) behind it.
    ///
    /// Collections unwrap element-wise; non-wrapped values pass through
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::AccessDenied`] unless `presented` is the
    /// master key. No namespace key — not even the wrapper's own — opens a
    /// wrapper.
    pub fn unwrap(&self, value: &Value, presented: &CapabilityKey) -> Result<Value, LockerError> {
        if *presented != self.inner.keys.master_key() {
            return Err(LockerError::access_denied("unwrap"));
        }
        Ok(self.inner.unwrap_value(value))
    }

    /// Applies the key of `source` to every object in `targets`.
    ///
    /// This is the only sanctioned mechanism for widening the set of
    /// objects a namespace is trusted to touch: an explicit, auditable
    /// grant. Values without identity (ints, strings, booleans) carry no
    /// key and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::UntaggedObject`] when `source` carries no key
    /// (targets are left untouched), or [`LockerError::AlreadyTagged`] when
    /// a target is already owned by a different namespace.
    pub fn trust(&self, source: &Value, targets: &[Value]) -> Result<(), LockerError> {
        let key = source
            .as_object()
            .and_then(|obj| self.inner.keys.key_of(obj.id()))
            .ok_or(LockerError::UntaggedObject)?;
        for target in targets {
            if let Some(obj) = target.as_object() {
                self.inner.keys.tag_with(obj.id(), &key, Some(&key))?;
            }
        }
        Ok(())
    }

    /// Returns `true` when `value` is a wrapper minted by this factory.
    #[must_use]
    pub fn is_wrapper(&self, value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| self.inner.targets.borrow().contains_key(&obj.id()))
    }
}

impl fmt::Debug for WrapperFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperFactory")
            .field("wrappers", &self.inner.wrappers.borrow().len())
            .finish()
    }
}

/// Recursively wraps a value for the namespace holding `key`. Free-standing
/// because the wrapper handler re-enters it through a weak factory handle.
fn wrap_value(
    inner: &Rc<FactoryInner>,
    value: &Value,
    key: &CapabilityKey,
    policy: &WrapperPolicy,
) -> Result<Value, LockerError> {
    match value {
        Value::Object(obj) => wrap_object(inner, obj, key, policy),
        Value::List(items) => {
            let mut wrapped = Vec::with_capacity(items.borrow().len());
            for item in items.borrow().iter() {
                wrapped.push(wrap_value(inner, item, key, policy)?);
            }
            Ok(Value::list(wrapped))
        }
        other => Ok(other.clone()),
    }
}

fn wrap_object(
    inner: &Rc<FactoryInner>,
    obj: &ObjectRef,
    key: &CapabilityKey,
    policy: &WrapperPolicy,
) -> Result<Value, LockerError> {
    // Wrappers are already mediated; never wrap a wrapper.
    if inner.targets.borrow().contains_key(&obj.id()) {
        return Ok(Value::Object(obj.clone()));
    }

    let tag = inner.keys.key_of(obj.id());
    if tag.is_none() && inner.policy.is_privileged(key.namespace()) {
        debug!(
            target: WRAPPER_TARGET,
            namespace = key.namespace(),
            object = %obj.id(),
            "privileged namespace receives the real object"
        );
        return Ok(Value::Object(obj.clone()));
    }

    if let Some(wrapper) = inner.wrappers.borrow().get(&(obj.id(), key.id())) {
        return Ok(Value::Object(wrapper.clone()));
    }

    let handler = WrapperHandler {
        target: obj.clone(),
        key: key.clone(),
        policy: policy.clone(),
        factory: Rc::downgrade(inner),
    };
    let wrapper = inner.engine.new_object_with_handler(Rc::new(handler));
    inner.keys.tag(wrapper.id(), key)?;
    drop(
        inner
            .wrappers
            .borrow_mut()
            .insert((obj.id(), key.id()), wrapper.clone()),
    );
    drop(inner.targets.borrow_mut().insert(wrapper.id(), obj.clone()));

    debug!(
        target: WRAPPER_TARGET,
        namespace = key.namespace(),
        object = %obj.id(),
        wrapper = %wrapper.id(),
        "minted secure wrapper"
    );
    Ok(Value::Object(wrapper))
}

impl FactoryInner {
    fn unwrap_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(obj) => self
                .targets
                .borrow()
                .get(&obj.id())
                .map_or_else(|| value.clone(), |target| Value::Object(target.clone())),
            Value::List(items) => {
                let unwrapped = items.borrow().iter().map(|v| self.unwrap_value(v)).collect();
                Value::list(unwrapped)
            }
            other => other.clone(),
        }
    }
}

/// Property mediation installed on every secure wrapper.
struct WrapperHandler {
    target: ObjectRef,
    key: CapabilityKey,
    policy: WrapperPolicy,
    factory: Weak<FactoryInner>,
}

impl PropertyHandler for WrapperHandler {
    fn get(&self, name: &str) -> Result<Value, ScriptError> {
        if !self.policy.allows_read(name) {
            // Unsanctioned names are indistinguishable from absent ones.
            return Ok(Value::Undefined);
        }
        let value = self.target.get(name)?;
        match value {
            Value::Object(_) | Value::List(_) => {
                let factory = self
                    .factory
                    .upgrade()
                    .ok_or_else(|| ScriptError::runtime("isolation layer is shut down"))?;
                wrap_value(&factory, &value, &self.key, &self.policy)
                    .map_err(|err| ScriptError::runtime(err.to_string()))
            }
            other => Ok(other),
        }
    }

    fn set(&self, name: &str, value: Value) -> Result<(), ScriptError> {
        if !self.policy.allows_write(name) {
            return Err(ScriptError::runtime(format!(
                "property '{name}' is not writable across the isolation boundary"
            )));
        }
        self.target.set(name, value)
    }

    fn names(&self) -> Vec<String> {
        self.target
            .property_names()
            .into_iter()
            .filter(|name| self.policy.allows_read(name))
            .collect()
    }
}
