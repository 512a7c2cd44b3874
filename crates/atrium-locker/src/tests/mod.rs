//! Crate-level integration and behaviour tests.
//!
//! These exercise the full construction pipeline end to end: preprocessing,
//! shadow snapshots, environment creation, secure wrapping, execution, and
//! registry sweeps, all through the public [`LockerService`] surface.

use std::collections::BTreeSet;

use atrium_script::Value;
use rstest::{fixture, rstest};

use crate::error::LockerError;
use crate::service::LockerService;

mod behaviour;

#[fixture]
fn service() -> LockerService {
    LockerService::default()
}

fn no_imports() -> BTreeSet<String> {
    BTreeSet::new()
}

fn imports(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|&n| n.to_owned()).collect()
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[rstest]
fn first_namespace_executes_and_verifies(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create("return 1 + 1;", &key, &no_imports())
        .expect("construct");
    assert_eq!(locker.result(), &Value::Int(2));
    assert!(service.verify_all());
}

#[rstest]
fn second_namespace_receives_the_wrapper_not_the_real_document(service: LockerService) {
    let key = service.issue_key("ns2");
    let locker = service
        .create("return $document;", &key, &no_imports())
        .expect("construct");

    let real = service.globals().get("document").expect("real document");
    let received = locker.result().clone();
    assert_ne!(received, real, "the real object never crosses the boundary");

    let received_id = received.as_object().expect("object").id();
    assert_eq!(
        service.keys().key_of(received_id),
        Some(service.issue_key("ns2"))
    );

    // Only the host's master key opens the wrapper back up.
    let unwrapped = service
        .unwrap(&received, &service.master_key())
        .expect("unwrap");
    assert_eq!(unwrapped, real);
    let err = service.unwrap(&received, &key).expect_err("namespace key");
    assert!(matches!(err, LockerError::AccessDenied { .. }));
}

#[rstest]
fn ambient_global_names_are_unresolvable(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create("return document;", &key, &imports(&["console"]))
        .expect("construct");
    assert_eq!(locker.result(), &Value::Undefined);

    let window = service
        .create("return window;", &key, &imports(&["console"]))
        .expect("construct");
    assert_eq!(window.result(), &Value::Undefined);
}

#[rstest]
fn wrapped_document_exposes_its_sanctioned_surface(service: LockerService) {
    let key = service.issue_key("ns1");
    let title = service
        .create("return $document.title;", &key, &no_imports())
        .expect("construct");
    assert_eq!(title.result(), &Value::from("Atrium Application"));

    let hidden = service
        .create("return $document._viewport;", &key, &no_imports())
        .expect("construct");
    assert_eq!(hidden.result(), &Value::Undefined, "private names stay hidden");
}

#[rstest]
fn nested_objects_keep_wrapper_identity_coherent(service: LockerService) {
    let key = service.issue_key("ns1");
    // window.document and the document substitute must be the same proxy:
    // wrapper identity equals real-object identity from the guest's view.
    let locker = service
        .create("return $window.document == $document;", &key, &no_imports())
        .expect("construct");
    assert_eq!(locker.result(), &Value::Bool(true));
}

#[rstest]
fn guest_writes_through_the_wrapper_are_denied(service: LockerService) {
    let key = service.issue_key("ns1");
    let err = service
        .create("$document.title = \"defaced\";", &key, &no_imports())
        .expect_err("write denied");
    assert!(matches!(err, LockerError::Execution(_)));
    assert!(service.registry().is_empty(), "failed construction registers nothing");

    let real = service.globals().get("document").expect("real document");
    assert_eq!(
        real.as_object().expect("object").get("title").expect("read"),
        Value::from("Atrium Application")
    );
}

#[rstest]
fn console_and_error_bindings_work_inside_the_sandbox(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create(
            "console.log(\"hello from\", \"ns1\"); let e = Error(\"nope\"); return e.message;",
            &key,
            &no_imports(),
        )
        .expect("construct");
    assert_eq!(locker.result(), &Value::from("nope"));
}

// ---------------------------------------------------------------------------
// Recursive safe evaluation
// ---------------------------------------------------------------------------

#[rstest]
fn eval_reenters_the_pipeline_under_the_same_key(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create("return eval(\"return 20 + 22;\");", &key, &no_imports())
        .expect("construct");
    assert_eq!(locker.result(), &Value::Int(42));
    assert_eq!(service.registry().len(), 2, "the nested locker is registered too");
    assert!(service.verify_all());
}

#[rstest]
fn nested_eval_is_preprocessed_again(service: LockerService) {
    let key = service.issue_key("ns1");
    // The inner source smuggles a forbidden token; the recursive
    // preprocessing pass must reject it and surface a fault to the guest.
    let err = service
        .create(
            "return eval(\"return obj.__proto__;\");",
            &key,
            &no_imports(),
        )
        .expect_err("nested violation");
    let LockerError::Execution(inner) = err else {
        panic!("expected the guest-side fault, got: {err}");
    };
    assert!(inner.to_string().contains("__proto__"));
}

#[rstest]
fn safe_function_defers_construction_to_the_call_site(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create("let f = Function(\"return 7;\"); return f() + f();", &key, &no_imports())
        .expect("construct");
    assert_eq!(locker.result(), &Value::Int(14));
    // Outer locker plus one nested construction per call.
    assert_eq!(service.registry().len(), 3);
}

#[rstest]
fn deeply_nested_eval_is_supported(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create(
            "return eval(\"return eval(\\\"return 5;\\\") + 1;\") + 1;",
            &key,
            &no_imports(),
        )
        .expect("construct");
    assert_eq!(locker.result(), &Value::Int(7));
    assert_eq!(service.registry().len(), 3);
}

// ---------------------------------------------------------------------------
// Integrity sweeps
// ---------------------------------------------------------------------------

#[rstest]
fn ambient_mutation_is_detected_by_reverification(service: LockerService) {
    let key = service.issue_key("ns1");
    let locker = service
        .create("return 1;", &key, &no_imports())
        .expect("construct");
    assert!(service.verify_all());

    service.globals().define("smuggled", Value::Int(1));
    assert!(!service.verify_all());
    // Detection does not destroy; remediation is explicit.
    assert_eq!(service.registry().len(), 1);
    assert!(service.destroy(locker.id()));
    assert!(service.verify_all(), "an empty registry verifies clean");
}

// ---------------------------------------------------------------------------
// Trust grants through the service surface
// ---------------------------------------------------------------------------

#[rstest]
fn trust_widens_a_namespaces_reach_explicitly(service: LockerService) {
    let key = service.issue_key("ns1");
    let source = Value::Object(service.engine().new_object());
    service
        .keys()
        .tag(source.as_object().expect("object").id(), &key)
        .expect("tag");
    let b = Value::Object(service.engine().new_object());
    let c = Value::Object(service.engine().new_object());

    service.trust(&source, &[b.clone(), c.clone()]).expect("trust");
    assert_eq!(
        service.keys().key_of(b.as_object().expect("object").id()),
        Some(key.clone())
    );
    assert_eq!(
        service.keys().key_of(c.as_object().expect("object").id()),
        Some(key)
    );

    let untagged = Value::Object(service.engine().new_object());
    let err = service.trust(&untagged, &[b]).expect_err("untagged source");
    assert!(matches!(err, LockerError::UntaggedObject));
}
