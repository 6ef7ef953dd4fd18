//! Virtual machine
//!
//! The [`Vm`] executes methods of classes produced by a [`ClassLoader`].
//! Calls recurse on the native stack, one [`frame::Frame`] per activation,
//! bounded by [`VmOptions::max_call_depth`].
//!
//! Besides ordinary execution the VM exposes the hooks the dispatch layer
//! needs: [`Vm::call_direct`] runs the original body behind an intercepted
//! call, [`Vm::directly_on`] forces the direct path for one call on a
//! receiver, and [`Vm::perform_static_initialization`] runs a deferred
//! static initializer.

mod frame;
mod interpreter;

use crate::class::RuntimeClass;
use crate::dispatch::{CallRecord, DispatchError};
use crate::instrument::{MARKER_FIELD_NAME, STATIC_INITIALIZER_BODY_NAME};
use crate::loader::ClassLoader;
use crate::object::Object;
use crate::value::Value;
use crate::{VmError, VmResult};
use std::cell::Cell;
use std::sync::Arc;
use umbra_bytecode::{CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};

/// Default call depth limit
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// VM configuration
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Maximum nesting of method activations
    pub max_call_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Umbra virtual machine
pub struct Vm {
    loader: Arc<dyn ClassLoader>,
    options: VmOptions,
    depth: Cell<usize>,
}

impl Vm {
    /// Create a VM resolving entry classes through `loader`
    pub fn new(loader: Arc<dyn ClassLoader>, options: VmOptions) -> Self {
        Self {
            loader,
            options,
            depth: Cell::new(0),
        }
    }

    /// Entry loader
    pub fn loader(&self) -> &Arc<dyn ClassLoader> {
        &self.loader
    }

    /// Active options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Current activation depth
    pub fn call_depth(&self) -> usize {
        self.depth.get()
    }

    // ===== Classes =====

    /// Load a class through the entry loader
    pub fn load_class(&self, name: &str) -> VmResult<Arc<RuntimeClass>> {
        Ok(self.loader.load_class(name)?)
    }

    /// Run static initialization of `class` (superclasses first) if it has
    /// not started yet
    ///
    /// Re-entrant requests while initialization is in progress return
    /// immediately; a failed initializer leaves the class uninitialized.
    pub fn initialize_class(&self, class: &Arc<RuntimeClass>) -> VmResult<()> {
        if !class.begin_initialization() {
            return Ok(());
        }
        let result = self.run_initialization(class);
        class.finish_initialization(result.is_ok());
        result
    }

    fn run_initialization(&self, class: &Arc<RuntimeClass>) -> VmResult<()> {
        if let Some(super_class) = class.super_class() {
            self.initialize_class(super_class)?;
        }
        match class.declared_method(STATIC_INITIALIZER_NAME, "()V") {
            Some(index) => self.execute(class, index, Vec::new()).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Run the original static initializer of `class`
    ///
    /// For instrumented classes this is the renamed body the synthesized
    /// initializer deferred to the dispatch handler; it runs every time it
    /// is requested. Uninstrumented classes go through the ordinary
    /// once-only initialization.
    pub fn perform_static_initialization(&self, class: &Arc<RuntimeClass>) -> VmResult<()> {
        if !class.is_instrumented() {
            return self.initialize_class(class);
        }
        let Some(index) = class.declared_method(STATIC_INITIALIZER_BODY_NAME, "()V") else {
            return Ok(());
        };
        tracing::trace!(class = %class.name(), "performing static initialization");
        self.execute(class, index, Vec::new()).map(|_| ())
    }

    // ===== Objects =====

    /// Allocate an instance of `class_name` and run the constructor with
    /// the given descriptor
    pub fn new_instance(
        &self,
        class_name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> VmResult<Value> {
        let class = self.load_class(class_name)?;
        self.initialize_class(&class)?;
        let index = class
            .declared_method(CONSTRUCTOR_NAME, descriptor)
            .ok_or_else(|| no_such_method(class_name, "<init>", descriptor))?;
        let object = Value::Object(Arc::new(Object::new(Arc::clone(&class))));
        self.execute(&class, index, with_receiver(&object, args))?;
        Ok(object)
    }

    /// Read an instance field by name, resolved from the receiver's class
    pub fn get_field(&self, receiver: &Value, name: &str) -> VmResult<Value> {
        let object = receiver.as_object()?;
        let slot = object
            .class()
            .resolve_field(name)
            .ok_or_else(|| VmError::NoSuchField(format!("{}.{}", object.class().name(), name)))?;
        object.get_field(slot)
    }

    /// Write an instance field by name, resolved from the receiver's class
    pub fn set_field(&self, receiver: &Value, name: &str, value: Value) -> VmResult<()> {
        let object = receiver.as_object()?;
        let slot = object
            .class()
            .resolve_field(name)
            .ok_or_else(|| VmError::NoSuchField(format!("{}.{}", object.class().name(), name)))?;
        object.set_field(slot, value)
    }

    /// Read a static field, initializing the class first
    pub fn get_static(&self, class_name: &str, name: &str) -> VmResult<Value> {
        let (owner, slot) = self.static_slot(class_name, name)?;
        owner
            .get_static(slot)
            .ok_or_else(|| VmError::NoSuchField(format!("{}.{}", class_name, name)))
    }

    /// Write a static field, initializing the class first
    pub fn set_static(&self, class_name: &str, name: &str, value: Value) -> VmResult<()> {
        let (owner, slot) = self.static_slot(class_name, name)?;
        if owner.set_static(slot, value) {
            Ok(())
        } else {
            Err(VmError::NoSuchField(format!("{}.{}", class_name, name)))
        }
    }

    fn static_slot(&self, class_name: &str, name: &str) -> VmResult<(Arc<RuntimeClass>, usize)> {
        let class = self.load_class(class_name)?;
        self.initialize_class(&class)?;
        class
            .resolve_static(name)
            .ok_or_else(|| VmError::NoSuchField(format!("{}.{}", class_name, name)))
    }

    // ===== Calls =====

    /// Invoke a method resolved from the receiver's class upward
    pub fn invoke_virtual(
        &self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> VmResult<Value> {
        let object = receiver.as_object()?;
        let (owner, index) = object
            .class()
            .resolve_method(name, descriptor)
            .ok_or_else(|| no_such_method(object.class().name(), name, descriptor))?;
        self.execute(&owner, index, with_receiver(receiver, args))
    }

    /// Invoke a method resolved from `class` upward on an explicit receiver
    pub fn invoke_special(
        &self,
        class: &Arc<RuntimeClass>,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> VmResult<Value> {
        receiver.as_object()?;
        let (owner, index) = class
            .resolve_method(name, descriptor)
            .ok_or_else(|| no_such_method(class.name(), name, descriptor))?;
        self.execute(&owner, index, with_receiver(receiver, args))
    }

    /// Invoke a static method, initializing the class first
    pub fn invoke_static(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> VmResult<Value> {
        let class = self.load_class(class_name)?;
        self.initialize_class(&class)?;
        let (owner, index) = class
            .resolve_method(name, descriptor)
            .ok_or_else(|| no_such_method(class_name, name, descriptor))?;
        self.execute(&owner, index, args)
    }

    // ===== Dispatch hooks =====

    /// Run the original body behind an intercepted call
    ///
    /// Constructor records already name the renamed constructor body;
    /// other methods map to their direct method. The overload is chosen by
    /// parameter type names.
    pub fn call_direct(&self, call: &CallRecord) -> VmResult<Value> {
        let index = call
            .direct_method_index()
            .ok_or_else(|| DispatchError::DirectMethodNotFound {
                class: call.class.name().to_string(),
                method: call.method_name.clone(),
                params: call.param_types.join(", "),
            })?;

        let is_static = call.class.method(index).map_or(false, |m| m.is_static());
        let args = if is_static {
            call.args.clone()
        } else {
            if call.receiver.is_null() {
                return Err(DispatchError::MissingReceiver {
                    class: call.class.name().to_string(),
                    method: call.method_name.clone(),
                }
                .into());
            }
            with_receiver(&call.receiver, call.args.clone())
        };
        self.execute(&call.class, index, args)
    }

    /// Invoke a method on `receiver`, taking the direct path for this one
    /// call
    ///
    /// Sets the receiver's marker field for the declaring class; the entry
    /// method clears it before branching to its direct method.
    pub fn directly_on(
        &self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> VmResult<Value> {
        let object = receiver.as_object()?;
        let (owner, index) = object
            .class()
            .resolve_method(name, descriptor)
            .ok_or_else(|| no_such_method(object.class().name(), name, descriptor))?;
        if owner.is_instrumented() {
            if let Some(slot) = owner.declared_field_slot(MARKER_FIELD_NAME) {
                object.set_field(slot, receiver.clone())?;
            }
        }
        self.execute(&owner, index, with_receiver(receiver, args))
    }
}

fn no_such_method(class: &str, name: &str, descriptor: &str) -> VmError {
    VmError::NoSuchMethod(format!("{}.{}{}", class, name, descriptor))
}

fn with_receiver(receiver: &Value, args: Vec<Value>) -> Vec<Value> {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(receiver.clone());
    all.extend(args);
    all
}
