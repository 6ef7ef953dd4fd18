//! Instrumenting Class Loader Tests
//!
//! Tests validate:
//! - Acquisition and delegation to the parent loader
//! - Instrumentation decisions from annotations
//! - Class identity per loader, including under concurrent loading
//! - Failure modes for missing and malformed classes
//!
//! # Running Tests
//! ```bash
//! cargo test --test instrumenting_loader
//! ```

mod common;

use common::{instrumented, Harness, Transcript};
use std::sync::Arc;
use std::thread;
use umbra_bytecode::{access, ClassBuilder, Instruction};
use umbra_core::loader::{ClassLoader, DO_NOT_INSTRUMENT};
use umbra_core::{LoadError, Value, VmError};

// ===== Acquisition =====

#[test]
fn test_delegated_prefix_loads_from_parent() {
    let harness = Harness::new(
        vec![instrumented("shared.Util").default_constructor()],
        Transcript::new(),
    );
    let util = harness.vm.load_class("shared.Util").unwrap();
    assert_eq!(util.loader_id(), harness.loader.parent().id());
    // annotations do not matter for classes the parent defines
    assert!(!util.is_instrumented());
}

#[test]
fn test_reserved_prefix_loads_from_parent() {
    let harness = Harness::new(
        vec![instrumented("umbra.internal.Marker").default_constructor()],
        Transcript::new(),
    );
    let marker = harness.vm.load_class("umbra.internal.Marker").unwrap();
    assert_eq!(marker.loader_id(), harness.loader.parent().id());
}

#[test]
fn test_acquired_class_extends_delegated_class() {
    let harness = Harness::new(
        vec![
            ClassBuilder::new("shared.Base").default_constructor(),
            instrumented("t.Sub").extends("shared.Base").default_constructor(),
        ],
        Transcript::new(),
    );
    let sub = harness.vm.load_class("t.Sub").unwrap();
    assert_eq!(sub.loader_id(), harness.loader.id());
    assert!(sub.is_instrumented());
    assert_eq!(sub.super_class().unwrap().loader_id(), harness.loader.parent().id());
}

#[test]
fn test_do_not_instrument_annotation() {
    let transcript = Transcript::new();
    let harness = Harness::new(
        vec![instrumented("t.Opted").annotate(DO_NOT_INSTRUMENT).default_constructor()],
        transcript.clone(),
    );
    let opted = harness.vm.load_class("t.Opted").unwrap();
    assert_eq!(opted.loader_id(), harness.loader.id());
    assert!(!opted.is_instrumented());

    harness.vm.new_instance("t.Opted", "()V", vec![]).unwrap();
    assert!(transcript.events().is_empty());
}

#[test]
fn test_references_resolve_through_defining_loader() {
    let factory =
        instrumented("t.Factory").method("make", "()X", access::PUBLIC | access::STATIC, |code| {
            code.new_object("t.Product")
                .emit(Instruction::Dup)
                .invoke_special("t.Product", "<init>", "()V")
                .emit(Instruction::Return);
        });
    let product = instrumented("t.Product").default_constructor();
    let harness = Harness::new(vec![factory, product], Transcript::calling_through());

    let made = harness.vm.invoke_static("t.Factory", "make", "()X", vec![]).unwrap();
    let class = made.as_object().unwrap().class().clone();
    assert_eq!(class.name(), "t.Product");
    assert_eq!(class.loader_id(), harness.loader.id());
    assert!(Arc::ptr_eq(&class, &harness.loader.find_loaded("t.Product").unwrap()));
}

// ===== Identity =====

#[test]
fn test_class_identity_is_stable() {
    let harness = Harness::new(
        vec![instrumented("t.Widget").default_constructor()],
        Transcript::new(),
    );
    let first = harness.vm.load_class("t.Widget").unwrap();
    let second = harness.vm.load_class("t.Widget").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let object = harness.vm.new_instance("t.Widget", "()V", vec![]).unwrap();
    assert!(Arc::ptr_eq(object.as_object().unwrap().class(), &first));
    assert_eq!(harness.loader.stats().transforms(), 1);
}

#[test]
fn test_concurrent_loads_define_once() {
    let harness = Harness::new(
        vec![
            instrumented("t.Base").default_constructor(),
            instrumented("t.Widget").extends("t.Base").default_constructor(),
        ],
        Transcript::new(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let loader = harness.loader.clone();
            thread::spawn(move || loader.load_class("t.Widget").unwrap())
        })
        .collect();
    let classes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for class in &classes[1..] {
        assert!(Arc::ptr_eq(class, &classes[0]));
    }
    assert_eq!(harness.loader.stats().transforms(), 2);
}

// ===== Failures =====

#[test]
fn test_missing_class_is_not_found() {
    let harness = Harness::new(vec![], Transcript::new());
    match harness.vm.load_class("t.Missing") {
        Err(VmError::ClassLoad(LoadError::ClassNotFound(name))) => assert_eq!(name, "t.Missing"),
        other => panic!("expected ClassNotFound, got {:?}", other.map(|c| c.name().to_string())),
    }
}

#[test]
fn test_missing_superclass_is_not_found() {
    let harness = Harness::new(
        vec![instrumented("t.Orphan").extends("t.Gone").default_constructor()],
        Transcript::new(),
    );
    assert!(matches!(
        harness.vm.load_class("t.Orphan"),
        Err(VmError::ClassLoad(LoadError::ClassNotFound(name))) if name == "t.Gone"
    ));
    assert!(harness.loader.find_loaded("t.Orphan").is_none());
}

#[test]
fn test_malformed_bytes() {
    let harness = Harness::new(vec![], Transcript::new());
    harness.resources.insert("t.Broken", b"UMBC but not really".to_vec());
    assert!(matches!(
        harness.vm.load_class("t.Broken"),
        Err(VmError::ClassLoad(LoadError::Malformed { .. }))
    ));
}

#[test]
fn test_loaded_objects_work_without_dispatch() {
    // an uninstrumented acquired class runs like any other
    let counter = ClassBuilder::new("t.Plain")
        .default_constructor()
        .method("answer", "()I", access::PUBLIC, |code| {
            code.const_i32(42).emit(Instruction::Return);
        });
    let harness = Harness::new(vec![counter], Transcript::new());
    let object = harness.vm.new_instance("t.Plain", "()V", vec![]).unwrap();
    assert_eq!(
        harness.vm.invoke_virtual(&object, "answer", "()I", vec![]).unwrap(),
        Value::Int(42)
    );
}
