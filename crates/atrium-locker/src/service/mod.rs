//! The boundary facade of the isolation layer.
//!
//! [`LockerService`] owns every collaborator — execution engine, key
//! registry, wrapper factory, environment cache, locker registry, shared
//! global scope, privilege policy — and exposes the operations the
//! surrounding framework calls: construct a locker for a namespace, wrap
//! and unwrap values crossing the trust boundary, grant trust, and sweep or
//! tear down the registry. The service is an explicit object; embedders and
//! tests instantiate as many independent services as they need.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use atrium_script::{ScriptEngine, Value};

use crate::config::LockerConfig;
use crate::def::ComponentDef;
use crate::environment::{EnvironmentCache, EnvironmentSources};
use crate::error::LockerError;
use crate::globals::GlobalScope;
use crate::key::{CapabilityKey, KeyRegistry};
use crate::locker::{Locker, LockerId};
use crate::pipeline;
use crate::policy::{PrivilegePolicy, PrivilegedNamespaces};
use crate::registry::LockerRegistry;
use crate::shadow::VerifyMode;
use crate::wrapper::WrapperFactory;

/// Shared state behind a [`LockerService`], reachable by the pipeline and
/// by the safe-evaluation closures through a weak handle.
pub(crate) struct ServiceInner {
    pub(crate) engine: ScriptEngine,
    pub(crate) keys: KeyRegistry,
    pub(crate) factory: WrapperFactory,
    pub(crate) environments: EnvironmentCache,
    pub(crate) registry: LockerRegistry,
    pub(crate) globals: GlobalScope,
    pub(crate) verify_mode: VerifyMode,
}

impl ServiceInner {
    pub(crate) fn environment_sources(&self) -> EnvironmentSources {
        EnvironmentSources {
            engine: self.engine.clone(),
            keys: self.keys.clone(),
            factory: self.factory.clone(),
            globals: self.globals.clone(),
        }
    }
}

/// The isolation layer's entry point for the surrounding framework.
///
/// # Example
///
/// ```
/// use atrium_locker::{LockerConfig, LockerService};
/// use atrium_script::Value;
///
/// # fn main() -> Result<(), atrium_locker::LockerError> {
/// let service = LockerService::new(LockerConfig::default());
/// let key = service.issue_key("ns1");
/// let locker = service.create("return 1 + 1;", &key, &Default::default())?;
/// assert_eq!(locker.result(), &Value::Int(2));
/// assert!(service.verify_all());
/// # Ok(())
/// # }
/// ```
pub struct LockerService {
    inner: Rc<ServiceInner>,
}

impl LockerService {
    /// Creates a service from declarative configuration.
    #[must_use]
    pub fn new(config: LockerConfig) -> Self {
        let policy = Rc::new(PrivilegedNamespaces::new(config.privileged_namespaces));
        Self::with_policy(config.verify_mode, policy)
    }

    /// Creates a service with a host-supplied privilege policy.
    #[must_use]
    pub fn with_policy(verify_mode: VerifyMode, policy: Rc<dyn PrivilegePolicy>) -> Self {
        let engine = ScriptEngine::new();
        let keys = KeyRegistry::new();
        let factory = WrapperFactory::new(engine.clone(), keys.clone(), policy);
        let globals = GlobalScope::new(&engine);
        install_default_globals(&engine, &globals);
        Self {
            inner: Rc::new(ServiceInner {
                engine,
                keys,
                factory,
                environments: EnvironmentCache::new(),
                registry: LockerRegistry::new(),
                globals,
                verify_mode,
            }),
        }
    }

    /// Resolves a namespace from a component definition, obtains its key,
    /// and runs the full construction pipeline with no imports.
    ///
    /// # Errors
    ///
    /// As for [`LockerService::create`].
    pub fn create_for_namespace(
        &self,
        def: &ComponentDef,
        source: &str,
    ) -> Result<Rc<Locker>, LockerError> {
        let key = self.inner.keys.issue_key(def.namespace());
        self.create(source, &key, &BTreeSet::new())
    }

    /// Runs the full construction pipeline for `source` under `key`.
    ///
    /// Names in `imports` are excluded from the shadow set: the caller
    /// vouches for the namespace's access to those ambient names.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::SecurityViolation`] on forbidden syntax,
    /// [`LockerError::Construction`] when the execution facility rejects
    /// the synthesized unit, and [`LockerError::Execution`] — the sandboxed
    /// code's own fault, unchanged — when the unit faults while running. No
    /// partial locker is registered on any failure.
    pub fn create(
        &self,
        source: &str,
        key: &CapabilityKey,
        imports: &BTreeSet<String>,
    ) -> Result<Rc<Locker>, LockerError> {
        pipeline::construct(&self.inner, source, key, imports)
    }

    /// Re-verifies every registered locker; `false` if any failed.
    #[must_use]
    pub fn verify_all(&self) -> bool {
        self.inner
            .registry
            .verify_all(&self.inner.globals, self.inner.verify_mode)
    }

    /// Destroys one locker. Idempotent; `false` when the id was not live.
    pub fn destroy(&self, id: LockerId) -> bool {
        self.inner.registry.destroy(id)
    }

    /// Destroys every registered locker. Idempotent.
    pub fn destroy_all(&self) {
        self.inner.registry.destroy_all();
    }

    /// Wraps a component object for the namespace holding `key`.
    ///
    /// With no key, a tagged object is wrapped under the key it already
    /// carries and an untagged object passes through unchanged — untagged
    /// objects are unrestricted pre-existing framework objects.
    ///
    /// # Errors
    ///
    /// As for [`WrapperFactory::wrap`].
    pub fn wrap_component(
        &self,
        value: &Value,
        key: Option<&CapabilityKey>,
    ) -> Result<Value, LockerError> {
        match key {
            Some(explicit) => self.inner.factory.wrap(value, explicit),
            None => {
                let carried = value
                    .as_object()
                    .and_then(|obj| self.inner.keys.key_of(obj.id()));
                match carried {
                    Some(owner) => self.inner.factory.wrap(value, &owner),
                    None => Ok(value.clone()),
                }
            }
        }
    }

    /// Unwraps a value back to the real object(s). Host-only: requires the
    /// master key.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::AccessDenied`] for any non-master key.
    pub fn unwrap(&self, value: &Value, presented: &CapabilityKey) -> Result<Value, LockerError> {
        self.inner.factory.unwrap(value, presented)
    }

    /// Applies the key of `source` to every object in `targets`.
    ///
    /// # Errors
    ///
    /// As for [`WrapperFactory::trust`].
    pub fn trust(&self, source: &Value, targets: &[Value]) -> Result<(), LockerError> {
        self.inner.factory.trust(source, targets)
    }

    /// Returns the capability key for a namespace, minting it on first use.
    #[must_use]
    pub fn issue_key(&self, namespace: &str) -> CapabilityKey {
        self.inner.keys.issue_key(namespace)
    }

    /// Returns the host-only master key.
    #[must_use]
    pub fn master_key(&self) -> CapabilityKey {
        self.inner.keys.master_key()
    }

    /// Returns the key registry.
    #[must_use]
    pub fn keys(&self) -> &KeyRegistry {
        &self.inner.keys
    }

    /// Returns the locker registry.
    #[must_use]
    pub fn registry(&self) -> &LockerRegistry {
        &self.inner.registry
    }

    /// Returns the shared ambient global scope.
    #[must_use]
    pub fn globals(&self) -> &GlobalScope {
        &self.inner.globals
    }

    /// Returns the execution engine.
    #[must_use]
    pub fn engine(&self) -> &ScriptEngine {
        &self.inner.engine
    }

    /// Returns the configured verification mode.
    #[must_use]
    pub fn verify_mode(&self) -> VerifyMode {
        self.inner.verify_mode
    }
}

impl Default for LockerService {
    fn default() -> Self {
        Self::new(LockerConfig::default())
    }
}

impl fmt::Debug for LockerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockerService")
            .field("lockers", &self.inner.registry.len())
            .field("verify_mode", &self.inner.verify_mode)
            .finish()
    }
}

/// Installs the framework's shared globals: the facade, the document and
/// window substitutes' real counterparts, the host console, and the error
/// constructor.
fn install_default_globals(engine: &ScriptEngine, globals: &GlobalScope) {
    let document = engine.new_object();
    seed(&document, "title", Value::from("Atrium Application"));
    seed(&document, "url", Value::from("about:blank"));
    seed(&document, "_viewport", Value::from("host-internal"));
    let body = engine.new_object();
    seed(&body, "tagName", Value::from("BODY"));
    seed(&document, "body", Value::Object(body));

    let window = engine.new_object();
    seed(&window, "name", Value::from("atrium-host"));
    seed(&window, "document", Value::Object(document.clone()));

    let facade = engine.new_object();
    seed(&facade, "version", Value::from("0.1.0"));

    let console = engine.new_object();
    seed(
        &console,
        "log",
        Value::Native(atrium_script::NativeFunction::new("log", |args| {
            let message = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            tracing::info!(target: "atrium_locker::console", %message, "host console output");
            Ok(Value::Undefined)
        })),
    );

    globals.define("document", Value::Object(document));
    globals.define("window", Value::Object(window));
    globals.define("atrium", Value::Object(facade));
    globals.define("console", Value::Object(console));
    globals.define(
        "Error",
        Value::Native(crate::environment::error_constructor(engine)),
    );
}

/// Seeds a property on a freshly created, unsealed, unmediated object;
/// such writes cannot fault.
fn seed(object: &atrium_script::ObjectRef, name: &str, value: Value) {
    drop(object.set(name, value));
}
