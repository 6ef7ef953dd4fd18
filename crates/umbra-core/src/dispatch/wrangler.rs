//! Default dispatch handler backed by a shadow registry

use super::{CallRecord, DispatchHandler, ShadowClass};
use crate::class::RuntimeClass;
use crate::value::Value;
use crate::vm::Vm;
use crate::{VmError, VmResult};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configured behavior of a [`ShadowWrangler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WranglerOptions {
    /// Strictness restored on every reset
    pub strict_i18n: bool,
    /// Run the original body when no substitute matches
    pub call_through_by_default: bool,
}

/// Routes intercepted calls to bound [`ShadowClass`]es
///
/// Bindings map a target class name to one substitute; binding again
/// replaces the previous substitute. While direct mode is on every call
/// runs its original body, bound or not.
pub struct ShadowWrangler {
    bindings: RwLock<FxHashMap<String, Arc<ShadowClass>>>,
    options: WranglerOptions,
    strict: AtomicBool,
    call_directly: AtomicBool,
}

impl ShadowWrangler {
    /// Create a wrangler with no bindings
    pub fn new(options: WranglerOptions) -> Self {
        Self {
            bindings: RwLock::new(FxHashMap::default()),
            options,
            strict: AtomicBool::new(options.strict_i18n),
            call_directly: AtomicBool::new(false),
        }
    }

    /// Configured options
    pub fn options(&self) -> WranglerOptions {
        self.options
    }

    /// Bind a substitute to a target class, returning the one it replaces
    pub fn bind(&self, target: &str, shadow: ShadowClass) -> Option<Arc<ShadowClass>> {
        tracing::trace!(target_class = %target, shadow = %shadow.name(), "bind");
        self.bindings.write().insert(target.to_string(), Arc::new(shadow))
    }

    /// Remove the binding of a target class
    pub fn unbind(&self, target: &str) -> Option<Arc<ShadowClass>> {
        self.bindings.write().remove(target)
    }

    /// Current binding of a target class
    pub fn binding(&self, target: &str) -> Option<Arc<ShadowClass>> {
        self.bindings.read().get(target).cloned()
    }

    /// Number of bound targets
    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Turn global direct mode on or off
    pub fn set_call_directly(&self, enabled: bool) {
        self.call_directly.store(enabled, Ordering::SeqCst);
    }

    /// Check if strict i18n checking is on
    pub fn is_strict_i18n(&self) -> bool {
        self.strict.load(Ordering::SeqCst)
    }
}

impl Default for ShadowWrangler {
    fn default() -> Self {
        Self::new(WranglerOptions::default())
    }
}

impl DispatchHandler for ShadowWrangler {
    fn reset(&self) {
        self.bindings.write().clear();
        self.strict.store(self.options.strict_i18n, Ordering::SeqCst);
        self.call_directly.store(false, Ordering::SeqCst);
    }

    fn class_initializing(&self, vm: &Vm, class: &Arc<RuntimeClass>) -> VmResult<()> {
        let shadow_init = self
            .binding(class.name())
            .and_then(|shadow| shadow.static_initializer_override());
        match shadow_init {
            Some(init) => {
                tracing::trace!(class = %class.name(), "static initializer deferred to shadow");
                init(vm, class)
            }
            None => vm.perform_static_initialization(class),
        }
    }

    fn method_invoked(&self, vm: &Vm, call: &CallRecord) -> VmResult<Value> {
        let substitute = self
            .binding(call.class.name())
            .and_then(|shadow| shadow.find(call));

        match substitute {
            Some((body, i18n_unsafe)) => {
                if i18n_unsafe && self.is_strict_i18n() {
                    return Err(VmError::StrictModeViolation {
                        class: call.class.name().to_string(),
                        method: call.method_name.clone(),
                    });
                }
                tracing::trace!(call = %call, "dispatching to shadow");
                body(vm, call)
            }
            None if call.targets_native() => {
                tracing::trace!(call = %call, "no shadow for native method");
                Ok(Value::Null)
            }
            None if self.options.call_through_by_default => {
                tracing::trace!(call = %call, "no shadow, calling through");
                vm.call_direct(call)
            }
            None => {
                tracing::trace!(call = %call, "no shadow");
                Ok(Value::Null)
            }
        }
    }

    fn should_call_directly(&self, _receiver: &Value) -> bool {
        self.call_directly.load(Ordering::SeqCst)
    }

    fn set_strict_i18n(&self, strict: bool) {
        self.strict.store(strict, Ordering::SeqCst);
    }
}
