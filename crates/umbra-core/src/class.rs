//! Runtime classes
//!
//! A [`RuntimeClass`] is a class file after definition by a loader: method
//! bodies are pre-decoded into instructions, instance fields are laid out
//! into slots (superclass slots first, own slots appended) and static fields
//! get their own storage. Instrumented classes also carry the dispatch
//! handler their loader injected at definition time.

use crate::dispatch::DispatchHandler;
use crate::loader::{ClassLoader, LoaderId};
use crate::value::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use umbra_bytecode::{
    decode_code, ClassFile, ConstantPool, DecodeError, DescriptorError, Instruction,
    MethodDescriptor, TypeDesc,
};

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique class identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u64);

/// Class initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Static initializer has not run
    Uninitialized,
    /// Static initializer is running
    Initializing,
    /// Static initializer finished
    Initialized,
}

/// Errors raised while preparing a class file for execution
#[derive(Debug, thiserror::Error)]
pub enum DefineError {
    /// Method code failed to decode
    #[error("Undecodable code in {method}: {source}")]
    Code {
        /// Method name
        method: String,
        /// Underlying error
        source: DecodeError,
    },

    /// Method or field descriptor failed to parse
    #[error("Bad descriptor on {member}: {source}")]
    Descriptor {
        /// Member name
        member: String,
        /// Underlying error
        source: DescriptorError,
    },
}

/// A method ready for execution
#[derive(Debug, Clone)]
pub struct RuntimeMethod {
    /// Method name
    pub name: String,
    /// Raw descriptor
    pub descriptor: String,
    /// Parsed descriptor
    pub signature: MethodDescriptor,
    /// Access flags
    pub access: u16,
    /// Local slot count
    pub max_locals: u16,
    /// Decoded body
    pub code: Vec<Instruction>,
}

impl RuntimeMethod {
    /// Check if the method is static
    pub fn is_static(&self) -> bool {
        self.access & umbra_bytecode::access::STATIC != 0
    }

    /// Check if the method is native
    pub fn is_native(&self) -> bool {
        self.access & umbra_bytecode::access::NATIVE != 0
    }

    /// Check if the method is abstract
    pub fn is_abstract(&self) -> bool {
        self.access & umbra_bytecode::access::ABSTRACT != 0
    }

    /// Human-readable parameter type names
    pub fn param_type_names(&self) -> Vec<String> {
        self.signature.param_type_names()
    }
}

/// A defined class
pub struct RuntimeClass {
    id: ClassId,
    name: String,
    loader: Weak<dyn ClassLoader>,
    loader_id: LoaderId,
    super_class: Option<Arc<RuntimeClass>>,
    constants: ConstantPool,
    annotations: Vec<String>,
    methods: Vec<RuntimeMethod>,
    method_index: FxHashMap<(String, String), usize>,
    field_slots: FxHashMap<String, usize>,
    field_defaults: Vec<Value>,
    static_slots: FxHashMap<String, usize>,
    statics: Mutex<Vec<Value>>,
    init_state: Mutex<InitState>,
    instrumented: bool,
    handler: Option<Arc<dyn DispatchHandler>>,
}

impl RuntimeClass {
    /// Prepare a verified class file for execution
    ///
    /// `super_class` must already be defined. `handler` is only kept for
    /// instrumented classes.
    pub fn define(
        file: ClassFile,
        super_class: Option<Arc<RuntimeClass>>,
        loader: Weak<dyn ClassLoader>,
        loader_id: LoaderId,
        instrumented: bool,
        handler: Option<Arc<dyn DispatchHandler>>,
    ) -> Result<Arc<Self>, DefineError> {
        let mut methods = Vec::with_capacity(file.methods.len());
        let mut method_index = FxHashMap::default();
        for method in file.methods {
            let signature = MethodDescriptor::parse(&method.descriptor).map_err(|source| {
                DefineError::Descriptor {
                    member: format!("{}.{}", file.name, method.name),
                    source,
                }
            })?;
            let code = decode_code(&method.code).map_err(|source| DefineError::Code {
                method: format!("{}.{}", file.name, method.name),
                source,
            })?;
            method_index.insert((method.name.clone(), method.descriptor.clone()), methods.len());
            methods.push(RuntimeMethod {
                name: method.name,
                descriptor: method.descriptor,
                signature,
                access: method.access,
                max_locals: method.max_locals,
                code,
            });
        }

        let mut field_defaults = super_class
            .as_ref()
            .map(|s| s.field_defaults.clone())
            .unwrap_or_default();
        let mut field_slots = FxHashMap::default();
        let mut static_slots = FxHashMap::default();
        let mut statics = Vec::new();
        for field in &file.fields {
            let ty = TypeDesc::parse(&field.descriptor).map_err(|source| DefineError::Descriptor {
                member: format!("{}.{}", file.name, field.name),
                source,
            })?;
            if field.is_static() {
                static_slots.insert(field.name.clone(), statics.len());
                statics.push(Value::zero_for(&ty));
            } else {
                field_slots.insert(field.name.clone(), field_defaults.len());
                field_defaults.push(Value::zero_for(&ty));
            }
        }

        Ok(Arc::new(Self {
            id: ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed)),
            name: file.name,
            loader,
            loader_id,
            super_class,
            constants: file.constants,
            annotations: file.annotations,
            methods,
            method_index,
            field_slots,
            field_defaults,
            static_slots,
            statics: Mutex::new(statics),
            init_state: Mutex::new(InitState::Uninitialized),
            instrumented,
            handler: if instrumented { handler } else { None },
        }))
    }

    // ===== Identity =====

    /// Process-unique id
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last dot-separated segment of the name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Defining loader, if it is still alive
    pub fn loader(&self) -> Option<Arc<dyn ClassLoader>> {
        self.loader.upgrade()
    }

    /// Id of the defining loader
    pub fn loader_id(&self) -> LoaderId {
        self.loader_id
    }

    /// Superclass
    pub fn super_class(&self) -> Option<&Arc<RuntimeClass>> {
        self.super_class.as_ref()
    }

    /// Constant pool of the defining class file
    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    /// Check if the class carries the named annotation
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    /// Check if the class was rewritten by the transformer
    pub fn is_instrumented(&self) -> bool {
        self.instrumented
    }

    /// Dispatch handler injected at definition time
    pub fn handler(&self) -> Option<&Arc<dyn DispatchHandler>> {
        self.handler.as_ref()
    }

    /// Check if `self` is `other` or one of its subclasses
    pub fn is_subclass_of(&self, other: &RuntimeClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, other) {
                return true;
            }
            current = class.super_class.as_deref();
        }
        false
    }

    // ===== Methods =====

    /// Methods declared by this class, in definition order
    pub fn methods(&self) -> &[RuntimeMethod] {
        &self.methods
    }

    /// Method by index
    pub fn method(&self, index: usize) -> Option<&RuntimeMethod> {
        self.methods.get(index)
    }

    /// Index of a method declared by this class
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.method_index
            .get(&(name.to_string(), descriptor.to_string()))
            .copied()
    }

    /// Resolve a method from this class upward
    pub fn resolve_method(
        self: &Arc<Self>,
        name: &str,
        descriptor: &str,
    ) -> Option<(Arc<RuntimeClass>, usize)> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(index) = class.declared_method(name, descriptor) {
                return Some((Arc::clone(class), index));
            }
            current = class.super_class.as_ref();
        }
        None
    }

    // ===== Fields =====

    /// Default value of every instance slot
    pub fn field_defaults(&self) -> &[Value] {
        &self.field_defaults
    }

    /// Number of instance slots, inherited ones included
    pub fn instance_slot_count(&self) -> usize {
        self.field_defaults.len()
    }

    /// Slot of an instance field declared by this class
    pub fn declared_field_slot(&self, name: &str) -> Option<usize> {
        self.field_slots.get(name).copied()
    }

    /// Resolve an instance field slot from this class upward
    pub fn resolve_field(&self, name: &str) -> Option<usize> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(slot) = class.declared_field_slot(name) {
                return Some(slot);
            }
            current = class.super_class.as_deref();
        }
        None
    }

    /// Resolve a static field from this class upward
    pub fn resolve_static(self: &Arc<Self>, name: &str) -> Option<(Arc<RuntimeClass>, usize)> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(&slot) = class.static_slots.get(name) {
                return Some((Arc::clone(class), slot));
            }
            current = class.super_class.as_ref();
        }
        None
    }

    /// Read a static slot of this class
    pub fn get_static(&self, slot: usize) -> Option<Value> {
        self.statics.lock().get(slot).cloned()
    }

    /// Write a static slot of this class
    pub fn set_static(&self, slot: usize, value: Value) -> bool {
        match self.statics.lock().get_mut(slot) {
            Some(field) => {
                *field = value;
                true
            }
            None => false,
        }
    }

    // ===== Initialization =====

    /// Current initialization state
    pub fn init_state(&self) -> InitState {
        *self.init_state.lock()
    }

    /// Move to `Initializing` if uninitialized
    ///
    /// Returns false when initialization already started or finished.
    pub fn begin_initialization(&self) -> bool {
        let mut state = self.init_state.lock();
        if *state == InitState::Uninitialized {
            *state = InitState::Initializing;
            true
        } else {
            false
        }
    }

    /// Record the outcome of initialization
    pub fn finish_initialization(&self, success: bool) {
        *self.init_state.lock() = if success {
            InitState::Initialized
        } else {
            InitState::Uninitialized
        };
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("loader", &self.loader_id)
            .field("instrumented", &self.instrumented)
            .finish()
    }
}
