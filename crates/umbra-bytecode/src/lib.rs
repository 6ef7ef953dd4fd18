//! Umbra Class File Definitions
//!
//! This crate provides the class file format read and written by the Umbra
//! instrumenting class loader:
//! - Instruction set and opcode encoding
//! - Type and method descriptors
//! - Constant pool and class file encoding with checksums
//! - A label-based instruction IR used by the method transformer
//! - Structural verification, an assembler and a disassembler

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod class;
pub mod code;
pub mod constants;
pub mod descriptor;
pub mod disasm;
pub mod encoder;
pub mod opcode;
pub mod verify;

pub use builder::{BuildError, ClassBuilder, CodeBuilder};
pub use class::{access, ClassFile, ClassFileError, FieldDef, MethodDef};
pub use code::{decode_code, encode_code, Instruction, Label};
pub use constants::{ConstantPool, FieldRef, MethodRef};
pub use descriptor::{DescriptorError, MethodDescriptor, TypeDesc};
pub use disasm::disassemble;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use opcode::Opcode;
pub use verify::{verify_class, VerifyError};

/// Name of the constructor method
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of the static initializer method
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";
