//! Behaviour-driven tests for locker construction.

use std::collections::BTreeSet;
use std::rc::Rc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use atrium_script::Value;

use crate::error::LockerError;
use crate::locker::Locker;
use crate::service::LockerService;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    service: Option<LockerService>,
    outcome: Option<Result<Rc<Locker>, LockerError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

fn service(world: &TestWorld) -> &LockerService {
    world.service.as_ref().expect("no service configured")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a locker service with default configuration")]
fn given_default_service(world: &mut TestWorld) {
    world.service = Some(LockerService::default());
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("namespace {namespace} submits the source {source}")]
fn when_namespace_submits(world: &mut TestWorld, namespace: String, source: String) {
    let ns = namespace.trim_matches('"');
    let src = source.trim_matches('"');
    let key = service(world).issue_key(ns);
    let outcome = service(world).create(src, &key, &BTreeSet::new());
    world.outcome = Some(outcome);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("construction succeeds with result {value}")]
fn then_result_is(world: &mut TestWorld, value: String) {
    let expected: i64 = value.trim_matches('"').parse().expect("integer result");
    let locker = world
        .outcome
        .as_ref()
        .expect("no construction attempted")
        .as_ref()
        .expect("expected success but construction failed");
    assert_eq!(locker.result(), &Value::Int(expected));
}

#[then("construction fails with a security violation")]
fn then_security_violation(world: &mut TestWorld) {
    let err = world
        .outcome
        .as_ref()
        .expect("no construction attempted")
        .as_ref()
        .expect_err("expected failure but construction succeeded");
    assert!(
        matches!(err, LockerError::SecurityViolation { .. }),
        "expected SecurityViolation, got: {err}"
    );
}

#[then("every registered locker passes verification")]
fn then_registry_verifies(world: &mut TestWorld) {
    assert!(service(world).verify_all());
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/locker_construction.feature")]
fn locker_construction_behaviour(world: TestWorld) {
    let _ = world;
}
