//! Unit tests for the locker registry.

use std::collections::BTreeSet;
use std::rc::Rc;

use atrium_script::{ScriptEngine, Value};
use rstest::{fixture, rstest};

use crate::environment::{EnvironmentCache, EnvironmentSources};
use crate::key::KeyRegistry;
use crate::locker::LockerState;
use crate::policy::NoPrivileges;
use crate::shadow::{self, VerifyMode};
use crate::wrapper::WrapperFactory;

use super::*;

struct Fixture {
    registry: LockerRegistry,
    globals: GlobalScope,
    sources: EnvironmentSources,
}

#[fixture]
fn fx() -> Fixture {
    let engine = ScriptEngine::new();
    let keys = KeyRegistry::new();
    let factory = WrapperFactory::new(engine.clone(), keys.clone(), Rc::new(NoPrivileges));
    let globals = GlobalScope::new(&engine);
    globals.define("document", Value::Object(engine.new_object()));
    let sources = EnvironmentSources {
        engine,
        keys,
        factory,
        globals: globals.clone(),
    };
    Fixture {
        registry: LockerRegistry::new(),
        globals,
        sources,
    }
}

fn make_locker(fx: &Fixture, namespace: &str) -> Rc<Locker> {
    let key = fx.sources.keys.issue_key(namespace);
    let imports = BTreeSet::new();
    let shadows = shadow::compute_shadows(&fx.globals, &imports);
    let environment = EnvironmentCache::new()
        .get_or_create(namespace, &key, &fx.sources)
        .expect("environment");
    let locker = Rc::new(Locker::new(
        fx.registry.next_id(),
        key,
        shadows,
        imports,
        environment,
        Value::Int(2),
    ));
    fx.registry.register(locker.clone());
    locker
}

// ---------------------------------------------------------------------------
// Registration and lookup
// ---------------------------------------------------------------------------

#[rstest]
fn new_registry_is_empty(fx: Fixture) {
    assert!(fx.registry.is_empty());
    assert_eq!(fx.registry.len(), 0);
}

#[rstest]
fn register_and_get(fx: Fixture) {
    let locker = make_locker(&fx, "ns1");
    assert_eq!(fx.registry.len(), 1);
    let found = fx.registry.get(locker.id()).expect("get");
    assert!(Rc::ptr_eq(&found, &locker));
    assert_eq!(found.state(), LockerState::Bound);
}

#[rstest]
fn ids_are_unique_and_ordered(fx: Fixture) {
    let first = make_locker(&fx, "ns1");
    let second = make_locker(&fx, "ns2");
    assert!(first.id() < second.id());
}

// ---------------------------------------------------------------------------
// Verification sweeps
// ---------------------------------------------------------------------------

#[rstest]
fn verify_all_passes_on_an_unchanged_environment(fx: Fixture) {
    let locker = make_locker(&fx, "ns1");
    assert!(fx.registry.verify_all(&fx.globals, VerifyMode::Full));
    assert_eq!(locker.state(), LockerState::Verified);
}

#[rstest]
fn verify_all_fails_after_ambient_mutation(fx: Fixture) {
    let healthy_before = make_locker(&fx, "ns1");
    assert!(fx.registry.verify_all(&fx.globals, VerifyMode::Full));

    fx.globals.define("injected", Value::Int(1));
    assert!(!fx.registry.verify_all(&fx.globals, VerifyMode::Full));
    assert_eq!(healthy_before.state(), LockerState::Failed);
}

#[rstest]
fn failed_verification_does_not_destroy(fx: Fixture) {
    let locker = make_locker(&fx, "ns1");
    fx.globals.define("injected", Value::Int(1));
    assert!(!fx.registry.verify_all(&fx.globals, VerifyMode::Full));
    // Detection and remediation are decoupled: the locker is still live.
    assert_eq!(fx.registry.len(), 1);
    assert!(fx.registry.get(locker.id()).is_some());
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[rstest]
fn destroy_removes_and_is_idempotent(fx: Fixture) {
    let locker = make_locker(&fx, "ns1");
    assert!(fx.registry.destroy(locker.id()));
    assert_eq!(locker.state(), LockerState::Destroyed);
    assert!(fx.registry.is_empty());
    assert!(!fx.registry.destroy(locker.id()), "second destroy is a no-op");
}

#[rstest]
fn destroyed_locker_fails_verification(fx: Fixture) {
    let locker = make_locker(&fx, "ns1");
    assert!(fx.registry.destroy(locker.id()));
    assert!(!locker.verify_shadows(&fx.globals, VerifyMode::Full));
    assert_eq!(locker.state(), LockerState::Destroyed);
}

#[rstest]
fn destroy_all_clears_the_registry(fx: Fixture) {
    let first = make_locker(&fx, "ns1");
    let second = make_locker(&fx, "ns2");
    fx.registry.destroy_all();
    assert!(fx.registry.is_empty());
    assert_eq!(first.state(), LockerState::Destroyed);
    assert_eq!(second.state(), LockerState::Destroyed);
    // Idempotent on an empty registry.
    fx.registry.destroy_all();
    assert!(fx.registry.verify_all(&fx.globals, VerifyMode::Full));
}
