//! Constant pool
//!
//! Every symbolic operand in a method body is an index into one of the four
//! pool tables. The `add_*` methods deduplicate, so adding the same entry
//! twice yields the same index.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// Symbolic reference to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Owner class name
    pub class: String,
    /// Field name
    pub name: String,
}

/// Symbolic reference to a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Owner class name
    pub class: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
}

/// Constant pool of a class file
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    strings: Vec<String>,
    classes: Vec<String>,
    fields: Vec<FieldRef>,
    methods: Vec<MethodRef>,

    string_index: FxHashMap<String, u32>,
    class_index: FxHashMap<String, u32>,
    field_index: FxHashMap<FieldRef, u32>,
    method_index: FxHashMap<MethodRef, u32>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.strings == other.strings
            && self.classes == other.classes
            && self.fields == other.fields
            && self.methods == other.methods
    }
}

impl Eq for ConstantPool {}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Insertion =====

    /// Add a string constant, returning its index
    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        index
    }

    /// Add a class reference, returning its index
    pub fn add_class(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.class_index.get(name) {
            return index;
        }
        let index = self.classes.len() as u32;
        self.classes.push(name.to_string());
        self.class_index.insert(name.to_string(), index);
        index
    }

    /// Add a field reference, returning its index
    pub fn add_field(&mut self, class: &str, name: &str) -> u32 {
        let field = FieldRef {
            class: class.to_string(),
            name: name.to_string(),
        };
        if let Some(&index) = self.field_index.get(&field) {
            return index;
        }
        let index = self.fields.len() as u32;
        self.fields.push(field.clone());
        self.field_index.insert(field, index);
        index
    }

    /// Add a method reference, returning its index
    pub fn add_method(&mut self, class: &str, name: &str, descriptor: &str) -> u32 {
        let method = MethodRef {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        if let Some(&index) = self.method_index.get(&method) {
            return index;
        }
        let index = self.methods.len() as u32;
        self.methods.push(method.clone());
        self.method_index.insert(method, index);
        index
    }

    // ===== Lookup =====

    /// Get a string constant
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Get a class reference
    pub fn class(&self, index: u32) -> Option<&str> {
        self.classes.get(index as usize).map(String::as_str)
    }

    /// Get a field reference
    pub fn field(&self, index: u32) -> Option<&FieldRef> {
        self.fields.get(index as usize)
    }

    /// Get a method reference
    pub fn method(&self, index: u32) -> Option<&MethodRef> {
        self.methods.get(index as usize)
    }

    /// Number of string constants
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Number of class references
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of field references
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of method references
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    // ===== Serialization =====

    /// Encode the pool
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }

        writer.emit_u32(self.classes.len() as u32);
        for c in &self.classes {
            writer.emit_string(c);
        }

        writer.emit_u32(self.fields.len() as u32);
        for f in &self.fields {
            writer.emit_string(&f.class);
            writer.emit_string(&f.name);
        }

        writer.emit_u32(self.methods.len() as u32);
        for m in &self.methods {
            writer.emit_string(&m.class);
            writer.emit_string(&m.name);
            writer.emit_string(&m.descriptor);
        }
    }

    /// Decode a pool
    ///
    /// Entries are re-added one by one, so a pool with duplicate entries
    /// decodes with its original indices preserved.
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let mut pool = Self::new();

        let count = reader.read_u32()?;
        for _ in 0..count {
            let s = reader.read_string()?;
            pool.string_index.entry(s.clone()).or_insert(pool.strings.len() as u32);
            pool.strings.push(s);
        }

        let count = reader.read_u32()?;
        for _ in 0..count {
            let c = reader.read_string()?;
            pool.class_index.entry(c.clone()).or_insert(pool.classes.len() as u32);
            pool.classes.push(c);
        }

        let count = reader.read_u32()?;
        for _ in 0..count {
            let field = FieldRef {
                class: reader.read_string()?,
                name: reader.read_string()?,
            };
            pool.field_index.entry(field.clone()).or_insert(pool.fields.len() as u32);
            pool.fields.push(field);
        }

        let count = reader.read_u32()?;
        for _ in 0..count {
            let method = MethodRef {
                class: reader.read_string()?,
                name: reader.read_string()?,
                descriptor: reader.read_string()?,
            };
            pool.method_index.entry(method.clone()).or_insert(pool.methods.len() as u32);
            pool.methods.push(method);
        }

        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup() {
        let mut pool = ConstantPool::new();
        let a = pool.add_string("hello");
        let b = pool.add_string("world");
        assert_eq!(pool.add_string("hello"), a);
        assert_ne!(a, b);

        let m1 = pool.add_method("a.B", "run", "()V");
        let m2 = pool.add_method("a.B", "run", "(I)V");
        assert_eq!(pool.add_method("a.B", "run", "()V"), m1);
        assert_ne!(m1, m2);
        assert_eq!(pool.method_count(), 2);
    }

    #[test]
    fn test_encode_decode() {
        let mut pool = ConstantPool::new();
        pool.add_string("value");
        pool.add_class("platform.View");
        pool.add_field("platform.View", "width");
        pool.add_method("platform.View", "draw", "(I)V");

        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();
        let decoded = ConstantPool::decode(&mut BytecodeReader::new(&bytes)).unwrap();

        assert_eq!(decoded, pool);
        assert_eq!(decoded.class(0), Some("platform.View"));
        assert_eq!(decoded.field(0).unwrap().name, "width");
        assert_eq!(decoded.method(0).unwrap().descriptor, "(I)V");
    }

    #[test]
    fn test_decoded_pool_keeps_deduplicating() {
        let mut pool = ConstantPool::new();
        let idx = pool.add_class("a.B");

        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();
        let mut decoded = ConstantPool::decode(&mut BytecodeReader::new(&bytes)).unwrap();

        assert_eq!(decoded.add_class("a.B"), idx);
        assert_eq!(decoded.class_count(), 1);
    }

    #[test]
    fn test_missing_entries() {
        let pool = ConstantPool::new();
        assert_eq!(pool.string(0), None);
        assert!(pool.method(3).is_none());
    }
}
