//! The locker construction pipeline.
//!
//! Turns `(source text, capability key)` into a registered, integrity-
//! checked locker in five stages: preprocess, compute shadows, bind,
//! execute, register. Every stage keeps its state on the call stack — the
//! pipeline holds no global cursor — so the safe dynamic-evaluation path
//! can re-enter it to arbitrary depth while an outer construction is still
//! in flight. All failures are terminal for the call: no partial locker is
//! ever registered.

use std::collections::BTreeSet;
use std::rc::Rc;

use strum::Display;
use tracing::{debug, info};

use atrium_script::{NativeFunction, ScriptError, Value};

use crate::environment::CapabilityEnvironment;
use crate::error::LockerError;
use crate::key::CapabilityKey;
use crate::locker::Locker;
use crate::preprocess::{self, SAFE_EVAL_BINDING, SAFE_FUNCTION_BINDING};
use crate::service::ServiceInner;
use crate::shadow;

/// Tracing target for pipeline stage transitions.
const PIPELINE_TARGET: &str = "atrium_locker::pipeline";

/// Names bound as the synthesized unit's parameters, in binding order.
///
/// These are the only names a sandboxed unit can resolve: the facade,
/// document, and window substitutes from its capability environment (under
/// their `$`-prefixed injected names — the ambient names stay
/// unresolvable), the namespace console, the error constructor, and the
/// two safe dynamic-evaluation entry points.
pub const INJECTED_BINDINGS: [&str; 7] = [
    "$atrium",
    "$document",
    "$window",
    "console",
    "Error",
    SAFE_EVAL_BINDING,
    SAFE_FUNCTION_BINDING,
];

/// Stages of one construction, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
enum ConstructionStage {
    Preprocess,
    ComputeShadows,
    Bind,
    Execute,
    Register,
}

/// Runs the full pipeline for one piece of source text.
pub(crate) fn construct(
    service: &Rc<ServiceInner>,
    source: &str,
    key: &CapabilityKey,
    imports: &BTreeSet<String>,
) -> Result<Rc<Locker>, LockerError> {
    let namespace = key.namespace().to_owned();

    stage(&namespace, ConstructionStage::Preprocess);
    let processed = preprocess::preprocess(source)?;

    stage(&namespace, ConstructionStage::ComputeShadows);
    let shadows = shadow::compute_shadows(&service.globals, imports);

    stage(&namespace, ConstructionStage::Bind);
    let environment =
        service
            .environments
            .get_or_create(&namespace, key, &service.environment_sources())?;
    let params: Vec<String> = INJECTED_BINDINGS.iter().map(|&name| name.to_owned()).collect();
    let unit = service
        .engine
        .compile(&processed, &params)
        .map_err(|err| LockerError::Construction {
            message: "execution facility rejected the synthesized unit".into(),
            source: Some(err),
        })?;
    let args = binding_values(service, &environment, key, imports);

    stage(&namespace, ConstructionStage::Execute);
    // Application-level faults propagate to the caller unchanged; the
    // isolation layer transforms only boundary violations.
    let result = unit.invoke(&args).map_err(LockerError::Execution)?;

    stage(&namespace, ConstructionStage::Register);
    let locker = Rc::new(Locker::new(
        service.registry.next_id(),
        key.clone(),
        shadows,
        imports.clone(),
        environment,
        result,
    ));
    service.registry.register(locker.clone());
    info!(
        target: PIPELINE_TARGET,
        locker = %locker.id(),
        namespace = %locker.namespace(),
        shadowed = locker.shadows().len(),
        "locker constructed"
    );
    Ok(locker)
}

fn stage(namespace: &str, current: ConstructionStage) {
    debug!(target: PIPELINE_TARGET, namespace, stage = %current, "pipeline stage");
}

/// Assembles the argument vector matching [`INJECTED_BINDINGS`].
fn binding_values(
    service: &Rc<ServiceInner>,
    environment: &Rc<CapabilityEnvironment>,
    key: &CapabilityKey,
    imports: &BTreeSet<String>,
) -> Vec<Value> {
    INJECTED_BINDINGS
        .iter()
        .map(|&name| match name {
            SAFE_EVAL_BINDING => Value::Native(safe_eval(service, key, imports)),
            SAFE_FUNCTION_BINDING => Value::Native(safe_function(service, key, imports)),
            _ => environment.binding(name).cloned().unwrap_or(Value::Undefined),
        })
        .collect()
}

/// The locally-bound safe evaluator: re-applies preprocessing and routes
/// execution back through this pipeline under the same capability key,
/// immediately.
fn safe_eval(
    service: &Rc<ServiceInner>,
    key: &CapabilityKey,
    imports: &BTreeSet<String>,
) -> NativeFunction {
    let weak = Rc::downgrade(service);
    let eval_key = key.clone();
    let eval_imports = imports.clone();
    NativeFunction::new(SAFE_EVAL_BINDING, move |args| {
        let source = dynamic_source(args)?;
        let strong = weak
            .upgrade()
            .ok_or_else(|| ScriptError::runtime("isolation service is shut down"))?;
        let locker = construct(&strong, &source, &eval_key, &eval_imports).map_err(boundary_fault)?;
        Ok(locker.result().clone())
    })
}

/// The locally-bound safe function constructor: like [`safe_eval`] but the
/// nested construction is deferred to the returned callable's call site.
fn safe_function(
    service: &Rc<ServiceInner>,
    key: &CapabilityKey,
    imports: &BTreeSet<String>,
) -> NativeFunction {
    let weak = Rc::downgrade(service);
    let ctor_key = key.clone();
    let ctor_imports = imports.clone();
    NativeFunction::new(SAFE_FUNCTION_BINDING, move |args| {
        let source = dynamic_source(args)?;
        let call_weak = weak.clone();
        let call_key = ctor_key.clone();
        let call_imports = ctor_imports.clone();
        Ok(Value::Native(NativeFunction::new(
            "sandboxed function",
            move |_call_args| {
                let strong = call_weak
                    .upgrade()
                    .ok_or_else(|| ScriptError::runtime("isolation service is shut down"))?;
                let locker =
                    construct(&strong, &source, &call_key, &call_imports).map_err(boundary_fault)?;
                Ok(locker.result().clone())
            },
        )))
    })
}

/// Extracts the source-text argument of a dynamic-evaluation call.
fn dynamic_source(args: &[Value]) -> Result<String, ScriptError> {
    args.first()
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| ScriptError::runtime("dynamic evaluation requires source text"))
}

/// Surfaces a nested construction failure to the calling script.
///
/// Application-level faults inside the nested unit pass through unchanged;
/// boundary violations surface as runtime faults carrying the violation
/// message.
fn boundary_fault(err: LockerError) -> ScriptError {
    match err {
        LockerError::Execution(inner) => inner,
        other => ScriptError::runtime(other.to_string()),
    }
}
