//! Per-namespace capability environments.
//!
//! A capability environment is the complete set of substitutes a namespace
//! is allowed to see in place of the shared mutable globals: secure
//! wrappers for the framework facade and the document and window objects,
//! a namespace-scoped console, and an error constructor. Environments are
//! created lazily on the first locker construction for a namespace and
//! reused for every construction after that; they are never evicted.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};

use atrium_script::{NativeFunction, ScriptEngine, Value};

use crate::error::LockerError;
use crate::globals::GlobalScope;
use crate::key::{CapabilityKey, KeyRegistry};
use crate::wrapper::WrapperFactory;

/// Tracing target for environment lifecycle events.
const ENVIRONMENT_TARGET: &str = "atrium_locker::environment";

/// Tracing target for sandboxed console output.
const CONSOLE_TARGET: &str = "atrium_locker::console";

/// Shared globals replaced by secure wrappers in every environment, as
/// `(ambient name, injected name)` pairs.
///
/// The injected names carry the framework's `$` prefix so that the ambient
/// names themselves stay unresolvable inside sandboxed code: a locker reads
/// `$document` and gets its substitute, while a read of `document` — the
/// shared global's real name — yields `undefined`.
pub const SHARED_BINDINGS: [(&str, &str); 3] = [
    ("atrium", "$atrium"),
    ("document", "$document"),
    ("window", "$window"),
];

/// The realised substitute set for one namespace.
///
/// Immutable after creation: the binding map is fixed, and the objects in
/// it are sealed or mediated. Lifetime is process-wide.
pub struct CapabilityEnvironment {
    namespace: String,
    bindings: BTreeMap<String, Value>,
}

impl CapabilityEnvironment {
    /// Returns the namespace this environment was built for.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Looks up a binding by injected name.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Enumerates the injected names in deterministic order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for CapabilityEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityEnvironment")
            .field("namespace", &self.namespace)
            .field("bindings", &self.names())
            .finish()
    }
}

/// Collaborators the cache draws on when building an environment.
#[derive(Clone)]
pub(crate) struct EnvironmentSources {
    pub(crate) engine: ScriptEngine,
    pub(crate) keys: KeyRegistry,
    pub(crate) factory: WrapperFactory,
    pub(crate) globals: GlobalScope,
}

/// Process-wide cache of capability environments, keyed by namespace.
#[derive(Clone)]
pub struct EnvironmentCache {
    environments: Rc<RefCell<HashMap<String, Rc<CapabilityEnvironment>>>>,
}

impl EnvironmentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            environments: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Number of environments created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.environments.borrow().len()
    }

    /// Returns `true` when no environment has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.environments.borrow().is_empty()
    }

    /// Returns the environment for `namespace`, building it on first use.
    ///
    /// The environment is constructed completely in local state before it
    /// is published to the cache, so a reentrant request for the same
    /// namespace during construction observes either nothing (and builds
    /// its own, with the first insertion winning) or the finished
    /// environment — never a half-built one. At most one environment is
    /// ever observable per namespace.
    ///
    /// # Errors
    ///
    /// Propagates wrapper-minting failures from the factory.
    pub(crate) fn get_or_create(
        &self,
        namespace: &str,
        key: &CapabilityKey,
        sources: &EnvironmentSources,
    ) -> Result<Rc<CapabilityEnvironment>, LockerError> {
        if let Some(existing) = self.environments.borrow().get(namespace) {
            return Ok(existing.clone());
        }

        let built = Rc::new(build_environment(namespace, key, sources)?);

        let mut map = self.environments.borrow_mut();
        if let Some(raced) = map.get(namespace) {
            // A nested construction for the same namespace completed while
            // we were building; keep the published one.
            return Ok(raced.clone());
        }
        drop(map.insert(namespace.to_owned(), built.clone()));
        info!(
            target: ENVIRONMENT_TARGET,
            namespace,
            bindings = built.bindings.len(),
            "capability environment created"
        );
        Ok(built)
    }
}

impl Default for EnvironmentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvironmentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentCache")
            .field("namespaces", &self.len())
            .finish()
    }
}

fn build_environment(
    namespace: &str,
    key: &CapabilityKey,
    sources: &EnvironmentSources,
) -> Result<CapabilityEnvironment, LockerError> {
    let mut bindings = BTreeMap::new();

    for (ambient, injected) in SHARED_BINDINGS {
        let substitute = match sources.globals.get(ambient) {
            Some(real) => sources.factory.wrap(&real, key)?,
            None => Value::Undefined,
        };
        drop(bindings.insert(injected.to_owned(), substitute));
    }

    let console = build_console(namespace, key, sources)?;
    drop(bindings.insert("console".to_owned(), console));
    drop(bindings.insert(
        "Error".to_owned(),
        Value::Native(error_constructor(&sources.engine)),
    ));

    debug!(target: ENVIRONMENT_TARGET, namespace, "environment bindings assembled");
    Ok(CapabilityEnvironment {
        namespace: namespace.to_owned(),
        bindings,
    })
}

/// Builds the namespace-scoped console whose output lands in the host's
/// structured log stream.
fn build_console(
    namespace: &str,
    key: &CapabilityKey,
    sources: &EnvironmentSources,
) -> Result<Value, LockerError> {
    let console = sources.engine.new_object();

    let ns_log = namespace.to_owned();
    let log = NativeFunction::new("log", move |args| {
        let message = render_arguments(args);
        tracing::info!(target: CONSOLE_TARGET, namespace = %ns_log, %message, "sandboxed console output");
        Ok(Value::Undefined)
    });
    let ns_warn = namespace.to_owned();
    let warn = NativeFunction::new("warn", move |args| {
        let message = render_arguments(args);
        tracing::warn!(target: CONSOLE_TARGET, namespace = %ns_warn, %message, "sandboxed console warning");
        Ok(Value::Undefined)
    });

    console
        .set("log", Value::Native(log))
        .and_then(|()| console.set("warn", Value::Native(warn)))
        .map_err(LockerError::Execution)?;
    console.seal();
    sources.keys.tag(console.id(), key)?;
    Ok(Value::Object(console))
}

/// Builds the injected error constructor. Also used by the service when
/// seeding the ambient `Error` global.
pub(crate) fn error_constructor(engine: &ScriptEngine) -> NativeFunction {
    let handle = engine.clone();
    NativeFunction::new("Error", move |args| {
        let error = handle.new_object();
        let message = args.first().cloned().unwrap_or(Value::Undefined);
        error.set("name", Value::from("Error"))?;
        error.set("message", message)?;
        Ok(Value::Object(error))
    })
}

fn render_arguments(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
