//! Class file format

use crate::constants::ConstantPool;
use crate::descriptor::{DescriptorError, MethodDescriptor};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Magic number for Umbra class files: "UMBC"
pub const MAGIC: [u8; 4] = *b"UMBC";

/// Current class file version
pub const VERSION: u32 = 1;

/// Size of the fixed header preceding the checksummed payload
pub const HEADER_SIZE: usize = 16;

/// Class file encoding/decoding errors
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected UMBC, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },

    /// Bytes left over after the last method
    #[error("Trailing data after class body at offset {0}")]
    TrailingData(usize),
}

/// Access flags for classes, fields and methods
pub mod access {
    /// Visible everywhere
    pub const PUBLIC: u16 = 0x0001;
    /// Visible only inside the declaring class
    pub const PRIVATE: u16 = 0x0002;
    /// Visible to subclasses
    pub const PROTECTED: u16 = 0x0004;
    /// Belongs to the class rather than an instance
    pub const STATIC: u16 = 0x0008;
    /// Cannot be overridden or reassigned
    pub const FINAL: u16 = 0x0010;
    /// Body supplied outside the class file
    pub const NATIVE: u16 = 0x0100;
    /// No body
    pub const ABSTRACT: u16 = 0x0400;
    /// Generated rather than written by hand
    pub const SYNTHETIC: u16 = 0x1000;

    /// Mask of the visibility bits
    pub const VISIBILITY: u16 = PUBLIC | PRIVATE | PROTECTED;
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Type descriptor
    pub descriptor: String,
    /// Access flags
    pub access: u16,
}

impl FieldDef {
    /// Create a field declaration
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access: u16) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
        }
    }

    /// Check if the field is static
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }
}

/// Method declaration and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub access: u16,
    /// Declared exception class names
    pub exceptions: Vec<String>,
    /// Number of local slots (receiver and arguments included)
    pub max_locals: u16,
    /// Encoded instructions (empty for native and abstract methods)
    pub code: Vec<u8>,
}

impl MethodDef {
    /// Check if the method is static
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// Check if the method is native
    pub fn is_native(&self) -> bool {
        self.access & access::NATIVE != 0
    }

    /// Check if the method is abstract
    pub fn is_abstract(&self) -> bool {
        self.access & access::ABSTRACT != 0
    }

    /// Parse the descriptor
    pub fn parsed_descriptor(&self) -> Result<MethodDescriptor, DescriptorError> {
        MethodDescriptor::parse(&self.descriptor)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u16(self.access);
        writer.emit_u32(self.exceptions.len() as u32);
        for exception in &self.exceptions {
            writer.emit_string(exception);
        }
        writer.emit_u16(self.max_locals);
        writer.emit_blob(&self.code);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let access = reader.read_u16()?;
        let exception_count = reader.read_u32()? as usize;
        let mut exceptions = Vec::with_capacity(exception_count.min(64));
        for _ in 0..exception_count {
            exceptions.push(reader.read_string()?);
        }
        let max_locals = reader.read_u16()?;
        let code = reader.read_blob()?;
        Ok(Self {
            name,
            descriptor,
            access,
            exceptions,
            max_locals,
            code,
        })
    }
}

/// A decoded class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Header flags
    pub flags: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Fully qualified class name (dot separated)
    pub name: String,
    /// Superclass name, `None` for root classes
    pub super_name: Option<String>,
    /// Class access flags
    pub access: u16,
    /// Annotation class names attached to the class
    pub annotations: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
}

impl ClassFile {
    /// Create an empty public class
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            flags: 0,
            constants: ConstantPool::new(),
            name: name.into(),
            super_name,
            access: access::PUBLIC,
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Last dot-separated segment of the class name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Check if the class carries the named annotation
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Find a method by name only (first match)
    pub fn find_method_named(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Find a field by name
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    // ===== Serialization =====

    /// Encode the class to binary format (.umbc)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Constant pool
    /// - Name, optional superclass, access flags, annotations
    /// - Field table
    /// - Method table (code as length-prefixed blobs)
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        self.constants.encode(&mut writer);

        writer.emit_string(&self.name);
        match &self.super_name {
            Some(super_name) => {
                writer.emit_u8(1);
                writer.emit_string(super_name);
            }
            None => writer.emit_u8(0),
        }
        writer.emit_u16(self.access);
        writer.emit_u32(self.annotations.len() as u32);
        for annotation in &self.annotations {
            writer.emit_string(annotation);
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_string(&field.name);
            writer.emit_string(&field.descriptor);
            writer.emit_u16(field.access);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a class from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = BytecodeReader::new(data);

        let magic = reader.read_bytes(4)?;
        let magic = [magic[0], magic[1], magic[2], magic[3]];
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ClassFileError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ClassFileError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let name = reader.read_string()?;
        let super_name = match reader.read_u8()? {
            0 => None,
            _ => Some(reader.read_string()?),
        };
        let access = reader.read_u16()?;
        let annotation_count = reader.read_u32()? as usize;
        let mut annotations = Vec::with_capacity(annotation_count.min(64));
        for _ in 0..annotation_count {
            annotations.push(reader.read_string()?);
        }

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(1024));
        for _ in 0..field_count {
            fields.push(FieldDef {
                name: reader.read_string()?,
                descriptor: reader.read_string()?,
                access: reader.read_u16()?,
            });
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(1024));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        if reader.has_more() {
            return Err(ClassFileError::TrailingData(reader.position()));
        }

        Ok(Self {
            flags,
            constants,
            name,
            super_name,
            access,
            annotations,
            fields,
            methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassFile {
        let mut class = ClassFile::new("platform.widget.View", Some("platform.Object".to_string()));
        class.annotations.push("umbra.Instrument".to_string());
        class.constants.add_string("hello");
        class.fields.push(FieldDef::new("width", "I", access::PRIVATE));
        class.methods.push(MethodDef {
            name: "draw".to_string(),
            descriptor: "(T)V".to_string(),
            access: access::PUBLIC,
            exceptions: vec!["platform.IoError".to_string()],
            max_locals: 2,
            code: vec![0xA4],
        });
        class
    }

    #[test]
    fn test_encode_decode() {
        let class = sample();
        let decoded = ClassFile::decode(&class.encode()).unwrap();
        assert_eq!(decoded, class);
        assert_eq!(decoded.simple_name(), "View");
        assert!(decoded.has_annotation("umbra.Instrument"));
        assert!(decoded.find_method("draw", "(T)V").is_some());
        assert!(decoded.find_method("draw", "()V").is_none());
    }

    #[test]
    fn test_root_class_has_no_super() {
        let class = ClassFile::new("Root", None);
        let decoded = ClassFile::decode(&class.encode()).unwrap();
        assert_eq!(decoded.super_name, None);
        assert_eq!(decoded.simple_name(), "Root");
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ClassFile::decode(&bytes),
            Err(ClassFileError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            ClassFile::decode(&bytes),
            Err(ClassFileError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            ClassFile::decode(b"UMB"),
            Err(ClassFileError::DecodeError(DecodeError::UnexpectedEnd(0)))
        ));
    }

    #[test]
    fn test_method_flags() {
        let method = MethodDef {
            name: "n".to_string(),
            descriptor: "()V".to_string(),
            access: access::STATIC | access::NATIVE,
            exceptions: Vec::new(),
            max_locals: 0,
            code: Vec::new(),
        };
        assert!(method.is_static());
        assert!(method.is_native());
        assert!(!method.is_abstract());
    }
}
