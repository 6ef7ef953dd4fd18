//! Shadow Dispatch Tests
//!
//! Runs platform classes through a fully wired [`UmbraContext`] with the
//! default `ShadowWrangler` handler:
//! - Calling through to original bodies when nothing is bound
//! - Substitutes replacing single methods and overloads
//! - Strict i18n refusals
//! - Failure propagation and handler reset
//!
//! # Running Tests
//! ```bash
//! cargo test --test real_apis
//! ```

use std::sync::Arc;
use umbra_bytecode::{access, ClassBuilder, Instruction};
use umbra_core::loader::MemoryResources;
use umbra_core::{
    DispatchHandler, PolicyConfig, ShadowClass, UmbraConfig, UmbraContext, Value, VmError,
};

const TEXT_VIEW: &str = "platform.TextView";

fn text_view() -> Vec<u8> {
    ClassBuilder::new(TEXT_VIEW)
        .field("text", "T", access::PUBLIC)
        .default_constructor()
        .method("setText", "(T)V", access::PUBLIC, |code| {
            code.load_local(0)
                .load_local(1)
                .put_field(TEXT_VIEW, "text")
                .emit(Instruction::ReturnVoid);
        })
        .method("setText", "(I)V", access::PUBLIC, |code| {
            code.load_local(0)
                .load_local(1)
                .emit(Instruction::ToString)
                .put_field(TEXT_VIEW, "text")
                .emit(Instruction::ReturnVoid);
        })
        .method("getText", "()T", access::PUBLIC, |code| {
            code.load_local(0)
                .get_field(TEXT_VIEW, "text")
                .emit(Instruction::Return);
        })
        .method("format", "(T)T", access::PUBLIC, |code| {
            code.load_local(1).emit(Instruction::Supper).emit(Instruction::Return);
        })
        .native_method("measure", "()I", access::PUBLIC)
        .build_bytes()
        .unwrap()
}

fn context_with(call_through: bool) -> UmbraContext {
    let config = UmbraConfig {
        cache_enabled: false,
        call_through_by_default: call_through,
        policy: PolicyConfig {
            instrumented_prefixes: vec!["platform.".to_string()],
            ..PolicyConfig::default()
        },
        ..UmbraConfig::default()
    };
    let resources = MemoryResources::new().with_class(TEXT_VIEW, text_view());
    UmbraContext::with_resources(config, Arc::new(resources)).unwrap()
}

fn context() -> UmbraContext {
    context_with(true)
}

fn new_view(context: &UmbraContext) -> Value {
    context.vm().new_instance(TEXT_VIEW, "()V", vec![]).unwrap()
}

fn set_text(context: &UmbraContext, view: &Value, text: &str) {
    context
        .vm()
        .invoke_virtual(view, "setText", "(T)V", vec![Value::string(text)])
        .unwrap();
}

fn get_text(context: &UmbraContext, view: &Value) -> Value {
    context.vm().invoke_virtual(view, "getText", "()T", vec![]).unwrap()
}

// ===== Calling through =====

#[test]
fn test_unbound_calls_run_original_bodies() {
    let context = context();
    let view = new_view(&context);
    set_text(&context, &view, "hello");
    assert_eq!(get_text(&context, &view), Value::string("hello"));

    let class = context.vm().load_class(TEXT_VIEW).unwrap();
    assert!(class.is_instrumented());
}

#[test]
fn test_unbound_calls_return_null_without_call_through() {
    let context = context_with(false);
    let view = new_view(&context);
    set_text(&context, &view, "hello");
    assert_eq!(get_text(&context, &view), Value::Null);
}

#[test]
fn test_unbound_native_method_returns_zero() {
    let context = context();
    let view = new_view(&context);
    let measure = || context.vm().invoke_virtual(&view, "measure", "()I", vec![]);
    assert_eq!(measure().unwrap(), Value::Int(0));

    // direct mode has no body to run for a native method
    context.wrangler().set_call_directly(true);
    assert_eq!(measure().unwrap(), Value::Int(0));
}

// ===== Substitutes =====

#[test]
fn test_shadow_replaces_bound_method_only() {
    let context = context();
    context.wrangler().bind(
        TEXT_VIEW,
        ShadowClass::new("ShadowTextView")
            .method("getText", |_vm, _call| Ok(Value::string("shadowed"))),
    );
    let view = new_view(&context);
    set_text(&context, &view, "hello");

    assert_eq!(get_text(&context, &view), Value::string("shadowed"));
    assert_eq!(context.vm().get_field(&view, "text").unwrap(), Value::string("hello"));
}

#[test]
fn test_shadow_can_call_original_body() {
    let context = context();
    context.wrangler().bind(
        TEXT_VIEW,
        ShadowClass::new("ShadowTextView").method_with_params("setText", &["string"], |vm, call| {
            let mut upper = call.clone();
            upper.args = vec![Value::string(call.arg(0).as_str()?.to_uppercase())];
            vm.call_direct(&upper)
        }),
    );
    let view = new_view(&context);
    set_text(&context, &view, "hello");
    assert_eq!(get_text(&context, &view), Value::string("HELLO"));

    // the int overload is not covered by the parameter-restricted shadow
    context
        .vm()
        .invoke_virtual(&view, "setText", "(I)V", vec![Value::Int(12)])
        .unwrap();
    assert_eq!(get_text(&context, &view), Value::string("12"));
}

#[test]
fn test_shadow_failure_propagates_unchanged() {
    let context = context();
    context.wrangler().bind(
        TEXT_VIEW,
        ShadowClass::new("ShadowTextView")
            .method("getText", |_vm, _call| Err(VmError::Thrown(Value::string("boom")))),
    );
    let view = new_view(&context);
    let result = context.vm().invoke_virtual(&view, "getText", "()T", vec![]);
    assert!(matches!(result, Err(VmError::Thrown(ref v)) if *v == Value::string("boom")));
}

#[test]
fn test_direct_mode_overrides_bindings() {
    let context = context();
    context.wrangler().bind(
        TEXT_VIEW,
        ShadowClass::new("ShadowTextView")
            .method("getText", |_vm, _call| Ok(Value::string("shadowed"))),
    );
    let view = new_view(&context);
    set_text(&context, &view, "hello");

    context.wrangler().set_call_directly(true);
    assert_eq!(get_text(&context, &view), Value::string("hello"));
    context.wrangler().set_call_directly(false);
    assert_eq!(get_text(&context, &view), Value::string("shadowed"));
}

#[test]
fn test_shadow_supplies_native_method() {
    let context = context();
    context.wrangler().bind(
        TEXT_VIEW,
        ShadowClass::new("ShadowTextView").method("measure", |_vm, _call| Ok(Value::Int(640))),
    );
    let view = new_view(&context);
    context.wrangler().set_call_directly(true);
    assert_eq!(
        context.vm().invoke_virtual(&view, "measure", "()I", vec![]).unwrap(),
        Value::Int(640)
    );
}

// ===== Strict i18n =====

#[test]
fn test_strict_mode_refuses_unsafe_substitute() {
    let context = context();
    context.wrangler().bind(
        TEXT_VIEW,
        ShadowClass::new("ShadowTextView").i18n_unsafe_method("format", |_vm, call| {
            Ok(Value::string(format!("<{}>", call.arg(0))))
        }),
    );
    let view = new_view(&context);
    let format = |context: &UmbraContext| {
        context
            .vm()
            .invoke_virtual(&view, "format", "(T)T", vec![Value::string("abc")])
    };

    assert_eq!(format(&context).unwrap(), Value::string("<abc>"));

    context.set_strict_i18n(true);
    match format(&context) {
        Err(VmError::StrictModeViolation { class, method }) => {
            assert_eq!(class, TEXT_VIEW);
            assert_eq!(method, "format");
        }
        other => panic!("expected a strict mode violation, got {:?}", other),
    }

    // reset restores the configured (lenient) state and drops the binding
    context.reset();
    assert_eq!(format(&context).unwrap(), Value::string("ABC"));
}

#[test]
fn test_strict_mode_from_configuration() {
    let config = UmbraConfig {
        cache_enabled: false,
        strict_i18n: true,
        ..UmbraConfig::default()
    };
    let context = UmbraContext::with_resources(config, Arc::new(MemoryResources::new())).unwrap();
    assert!(context.wrangler().is_strict_i18n());
    context.wrangler().set_strict_i18n(false);
    context.reset();
    assert!(context.wrangler().is_strict_i18n());
}
