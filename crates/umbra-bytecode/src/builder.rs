//! Assembler for class files
//!
//! [`CodeBuilder`] emits instructions against a constant pool and resolves
//! forward and backward labels when finished. [`ClassBuilder`] assembles a
//! whole [`ClassFile`] and computes `max_locals` for each method body.

use crate::class::{access, ClassFile, FieldDef, MethodDef};
use crate::code::{encode_code, Instruction, Label};
use crate::constants::ConstantPool;
use crate::descriptor::{DescriptorError, MethodDescriptor};
use thiserror::Error;

/// Assembly errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A jump names a label that was never marked
    #[error("Label {0} was never marked")]
    UnboundLabel(usize),

    /// A method descriptor failed to parse
    #[error(transparent)]
    InvalidDescriptor(#[from] DescriptorError),
}

/// Instruction emitter with label resolution
///
/// Jumps emitted through a builder name labels created by
/// [`CodeBuilder::new_label`]; [`CodeBuilder::finish`] rewrites them to
/// instruction indices.
pub struct CodeBuilder<'p> {
    pool: &'p mut ConstantPool,
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
}

impl<'p> CodeBuilder<'p> {
    /// Create a builder that interns operands into `pool`
    pub fn new(pool: &'p mut ConstantPool) -> Self {
        Self {
            pool,
            instructions: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// The pool operands are interned into
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut *self.pool
    }

    /// Number of instructions emitted so far
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if nothing was emitted yet
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    // ===== Labels =====

    /// Allocate an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the next emitted instruction
    pub fn mark(&mut self, label: Label) {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.instructions.len());
        }
    }

    // ===== Emission =====

    /// Emit a raw instruction
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    /// Load a local slot
    pub fn load_local(&mut self, index: u16) -> &mut Self {
        self.emit(Instruction::LoadLocal(index))
    }

    /// Store into a local slot
    pub fn store_local(&mut self, index: u16) -> &mut Self {
        self.emit(Instruction::StoreLocal(index))
    }

    /// Push an integer constant
    pub fn const_i32(&mut self, value: i32) -> &mut Self {
        self.emit(Instruction::ConstI32(value))
    }

    /// Push a string constant
    pub fn const_str(&mut self, value: &str) -> &mut Self {
        let index = self.pool.add_string(value);
        self.emit(Instruction::ConstStr(index))
    }

    /// Push a class token
    pub fn const_class(&mut self, class: &str) -> &mut Self {
        let index = self.pool.add_class(class);
        self.emit(Instruction::ConstClass(index))
    }

    /// Allocate an instance
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let index = self.pool.add_class(class);
        self.emit(Instruction::New(index))
    }

    /// Instance-of test
    pub fn instance_of(&mut self, class: &str) -> &mut Self {
        let index = self.pool.add_class(class);
        self.emit(Instruction::InstanceOf(index))
    }

    /// Load an instance field
    pub fn get_field(&mut self, class: &str, name: &str) -> &mut Self {
        let index = self.pool.add_field(class, name);
        self.emit(Instruction::GetField(index))
    }

    /// Store an instance field
    pub fn put_field(&mut self, class: &str, name: &str) -> &mut Self {
        let index = self.pool.add_field(class, name);
        self.emit(Instruction::PutField(index))
    }

    /// Load a static field
    pub fn get_static(&mut self, class: &str, name: &str) -> &mut Self {
        let index = self.pool.add_field(class, name);
        self.emit(Instruction::GetStatic(index))
    }

    /// Store a static field
    pub fn put_static(&mut self, class: &str, name: &str) -> &mut Self {
        let index = self.pool.add_field(class, name);
        self.emit(Instruction::PutStatic(index))
    }

    /// Virtual call
    pub fn invoke_virtual(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.add_method(class, name, descriptor);
        self.emit(Instruction::InvokeVirtual(index))
    }

    /// Non-virtual call
    pub fn invoke_special(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.add_method(class, name, descriptor);
        self.emit(Instruction::InvokeSpecial(index))
    }

    /// Static call
    pub fn invoke_static(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.add_method(class, name, descriptor);
        self.emit(Instruction::InvokeStatic(index))
    }

    /// Resolve labels and return the instruction list
    pub fn finish(self) -> Result<Vec<Instruction>, BuildError> {
        let labels = self.labels;
        let mut unbound = None;
        let instructions = self
            .instructions
            .into_iter()
            .map(|instruction| {
                instruction.map_target(|Label(id)| match labels.get(id).copied().flatten() {
                    Some(index) => Label(index),
                    None => {
                        unbound.get_or_insert(id);
                        Label(id)
                    }
                })
            })
            .collect();
        match unbound {
            Some(id) => Err(BuildError::UnboundLabel(id)),
            None => Ok(instructions),
        }
    }
}

/// Fluent class file assembler
///
/// The first error raised while adding a method is reported by
/// [`ClassBuilder::build`].
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassFile,
    error: Option<BuildError>,
}

impl ClassBuilder {
    /// Start a public root class
    pub fn new(name: &str) -> Self {
        Self {
            class: ClassFile::new(name, None),
            error: None,
        }
    }

    /// Set the superclass
    pub fn extends(mut self, super_name: &str) -> Self {
        self.class.super_name = Some(super_name.to_string());
        self
    }

    /// Replace the class access flags
    pub fn access(mut self, flags: u16) -> Self {
        self.class.access = flags;
        self
    }

    /// Attach an annotation
    pub fn annotate(mut self, annotation: &str) -> Self {
        self.class.annotations.push(annotation.to_string());
        self
    }

    /// Declare a field
    pub fn field(mut self, name: &str, descriptor: &str, flags: u16) -> Self {
        self.class.fields.push(FieldDef::new(name, descriptor, flags));
        self
    }

    /// Declare a method with a body
    pub fn method(
        mut self,
        name: &str,
        descriptor: &str,
        flags: u16,
        body: impl FnOnce(&mut CodeBuilder<'_>),
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.assemble(name, descriptor, flags, body) {
            Ok(method) => self.class.methods.push(method),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Declare the public no-argument constructor a compiler would
    /// generate: superclass construction only
    pub fn default_constructor(self) -> Self {
        let super_name = self.class.super_name.clone();
        self.method(crate::CONSTRUCTOR_NAME, "()V", access::PUBLIC, |code| {
            if let Some(super_name) = super_name.as_deref() {
                code.load_local(0)
                    .invoke_special(super_name, crate::CONSTRUCTOR_NAME, "()V");
            }
            code.emit(Instruction::ReturnVoid);
        })
    }

    /// Declare a method whose body lives outside the class file
    pub fn native_method(mut self, name: &str, descriptor: &str, flags: u16) -> Self {
        if let Err(e) = MethodDescriptor::parse(descriptor) {
            self.error.get_or_insert(e.into());
            return self;
        }
        self.class.methods.push(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: flags | access::NATIVE,
            exceptions: Vec::new(),
            max_locals: 0,
            code: Vec::new(),
        });
        self
    }

    /// Add declared exceptions to the most recently added method
    pub fn throws(mut self, exceptions: &[&str]) -> Self {
        if let Some(method) = self.class.methods.last_mut() {
            method
                .exceptions
                .extend(exceptions.iter().map(|e| e.to_string()));
        }
        self
    }

    fn assemble(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: u16,
        body: impl FnOnce(&mut CodeBuilder<'_>),
    ) -> Result<MethodDef, BuildError> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        let mut code = CodeBuilder::new(&mut self.class.constants);
        body(&mut code);
        let instructions = code.finish()?;

        let params = parsed.arg_count() + usize::from(flags & access::STATIC == 0);
        let max_locals = instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::LoadLocal(n) | Instruction::StoreLocal(n) => Some(*n as usize + 1),
                _ => None,
            })
            .fold(params, usize::max);

        Ok(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: flags,
            exceptions: Vec::new(),
            max_locals: max_locals as u16,
            code: encode_code(&instructions),
        })
    }

    /// Finish the class
    pub fn build(self) -> Result<ClassFile, BuildError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.class),
        }
    }

    /// Finish the class and encode it
    pub fn build_bytes(self) -> Result<Vec<u8>, BuildError> {
        self.build().map(|class| class.encode())
    }
}
