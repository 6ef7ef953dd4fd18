//! Static Initializer Tests
//!
//! Instrumented classes announce initialization to the dispatch handler,
//! which may run, defer or replace the original static initializer.
//!
//! # Running Tests
//! ```bash
//! cargo test --test static_initializer
//! ```

mod common;

use common::{instrumented, Harness, Transcript};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use umbra_bytecode::{access, ClassBuilder, Instruction};
use umbra_core::{ShadowClass, ShadowWrangler, Value};

fn with_limit(builder: ClassBuilder, class_name: &'static str, limit: i32) -> ClassBuilder {
    builder
        .field("LIMIT", "I", access::PUBLIC | access::STATIC)
        .method("<clinit>", "()V", access::STATIC, move |code| {
            code.const_i32(limit)
                .put_static(class_name, "LIMIT")
                .emit(Instruction::ReturnVoid);
        })
}

fn config_class() -> ClassBuilder {
    with_limit(instrumented("t.Config"), "t.Config", 10)
}

#[test]
fn test_handler_runs_original_initializer() {
    let transcript = Transcript::new();
    let harness = Harness::new(vec![config_class()], transcript.clone());

    assert_eq!(harness.vm.get_static("t.Config", "LIMIT").unwrap(), Value::Int(10));
    assert_eq!(transcript.events(), vec!["classInitializing: Config"]);

    // initialization happens once
    harness.vm.get_static("t.Config", "LIMIT").unwrap();
    assert_eq!(transcript.events().len(), 1);
}

#[test]
fn test_superclass_initializes_first() {
    let transcript = Transcript::new();
    let harness = Harness::new(
        vec![
            with_limit(instrumented("t.Parent"), "t.Parent", 1),
            with_limit(instrumented("t.Child").extends("t.Parent"), "t.Child", 2),
        ],
        transcript.clone(),
    );

    let child = harness.vm.load_class("t.Child").unwrap();
    harness.vm.initialize_class(&child).unwrap();
    assert_eq!(
        transcript.events(),
        vec!["classInitializing: Parent", "classInitializing: Child"]
    );
}

#[test]
fn test_shadow_override_defers_original() {
    let wrangler = Arc::new(ShadowWrangler::default());
    let overrides = Arc::new(AtomicUsize::new(0));
    let seen = overrides.clone();
    wrangler.bind(
        "t.Config",
        ShadowClass::new("ShadowConfig").static_initializer(move |_vm, _class| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    let harness = Harness::new(vec![config_class()], wrangler.clone());

    assert_eq!(harness.vm.get_static("t.Config", "LIMIT").unwrap(), Value::Int(0));
    assert_eq!(overrides.load(Ordering::SeqCst), 1);

    let class = harness.vm.load_class("t.Config").unwrap();
    harness.vm.perform_static_initialization(&class).unwrap();
    assert_eq!(harness.vm.get_static("t.Config", "LIMIT").unwrap(), Value::Int(10));
}

#[test]
fn test_unbound_class_initializes_normally() {
    let wrangler = Arc::new(ShadowWrangler::default());
    let harness = Harness::new(vec![config_class()], wrangler);
    assert_eq!(harness.vm.get_static("t.Config", "LIMIT").unwrap(), Value::Int(10));
}

#[test]
fn test_perform_static_initialization_reruns_original() {
    let harness = Harness::new(vec![config_class()], Transcript::new());
    harness.vm.set_static("t.Config", "LIMIT", Value::Int(99)).unwrap();

    let class = harness.vm.load_class("t.Config").unwrap();
    harness.vm.perform_static_initialization(&class).unwrap();
    assert_eq!(harness.vm.get_static("t.Config", "LIMIT").unwrap(), Value::Int(10));
}

#[test]
fn test_uninstrumented_class_initializes_without_handler() {
    let transcript = Transcript::new();
    let harness = Harness::new(
        vec![with_limit(ClassBuilder::new("t.Static"), "t.Static", 5)],
        transcript.clone(),
    );
    assert_eq!(harness.vm.get_static("t.Static", "LIMIT").unwrap(), Value::Int(5));
    assert!(transcript.events().is_empty());
}
