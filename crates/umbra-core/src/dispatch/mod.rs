//! Dispatch handler contract
//!
//! Instrumented entry methods consult a [`DispatchHandler`] on every call.
//! The handler is injected into each class the instrumenting loader defines,
//! so independent contexts can run side by side with different handlers.

mod shadow;
mod wrangler;

pub use shadow::{ShadowClass, ShadowFn, ShadowInitFn};
pub use wrangler::{ShadowWrangler, WranglerOptions};

use crate::class::RuntimeClass;
use crate::value::Value;
use crate::vm::Vm;
use crate::VmResult;
use std::fmt;
use std::sync::Arc;

/// Harness plumbing failures
///
/// These are distinct from failures raised by substitute logic, which
/// propagate as [`crate::VmError::Thrown`] unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No direct method matches the call record
    #[error("No direct method for {class}.{method}({params})")]
    DirectMethodNotFound {
        /// Declaring class
        class: String,
        /// Original method name
        method: String,
        /// Comma-separated parameter type names
        params: String,
    },

    /// An instance call record carried no receiver
    #[error("Call record for {class}.{method} has no receiver")]
    MissingReceiver {
        /// Declaring class
        class: String,
        /// Original method name
        method: String,
    },

    /// Instrumented code ran in a class defined without a handler
    #[error("No dispatch handler installed for {0}")]
    NoHandler(String),

    /// Intrinsic operands did not form a valid call record
    #[error("Invalid call record: {0}")]
    InvalidCallRecord(String),
}

/// An intercepted call
#[derive(Clone)]
pub struct CallRecord {
    /// Class declaring the intercepted method
    pub class: Arc<RuntimeClass>,
    /// Original method name (the renamed body name for constructors)
    pub method_name: String,
    /// Receiver, `Null` for static methods
    pub receiver: Value,
    /// Declared parameter type names, in order
    pub param_types: Vec<String>,
    /// Actual arguments, in order
    pub args: Vec<Value>,
}

impl CallRecord {
    /// Check if the record describes a constructor call
    pub fn is_constructor(&self) -> bool {
        self.method_name == crate::instrument::CONSTRUCTOR_BODY_NAME
    }

    /// Index of the method holding the original body in the declaring class
    pub fn direct_method_index(&self) -> Option<usize> {
        let name = if self.is_constructor() {
            self.method_name.clone()
        } else {
            crate::instrument::direct_method_name(self.class.name(), &self.method_name)
        };
        self.class
            .methods()
            .iter()
            .position(|m| m.name == name && m.param_type_names() == self.param_types)
    }

    /// Check if the intercepted method was declared native and has no body
    /// to call through to
    pub fn targets_native(&self) -> bool {
        self.direct_method_index()
            .and_then(|index| self.class.method(index))
            .map_or(false, |m| m.is_native())
    }

    /// Argument at `index`, `Null` when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.class.simple_name(), self.method_name)?;
        for (i, (ty, arg)) in self.param_types.iter().zip(&self.args).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", ty, arg)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRecord")
            .field("class", &self.class.name())
            .field("method_name", &self.method_name)
            .field("receiver", &self.receiver)
            .field("param_types", &self.param_types)
            .field("args", &self.args)
            .finish()
    }
}

/// Runtime routing decisions for instrumented code
pub trait DispatchHandler: Send + Sync {
    /// Clear per-run state between independent test executions
    fn reset(&self);

    /// Called from the synthesized static initializer of `class`
    fn class_initializing(&self, vm: &Vm, class: &Arc<RuntimeClass>) -> VmResult<()>;

    /// Intercept a call; the returned value is unboxed by the entry method
    fn method_invoked(&self, vm: &Vm, call: &CallRecord) -> VmResult<Value>;

    /// Global check consulted before every interception
    fn should_call_directly(&self, receiver: &Value) -> bool;

    /// Toggle strict locale-safety checking
    fn set_strict_i18n(&self, strict: bool);
}
