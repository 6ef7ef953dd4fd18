//! Value representation
//!
//! Primitives are stored inline; strings are shared immutable buffers;
//! objects, arrays and class tokens are reference counted and compare by
//! identity.
//!
//! There is no separate boxed form: a primitive placed into a `Value` array
//! is already "boxed", and [`Value::unbox`] is the inverse used by the
//! `UNBOX` instruction.

use crate::class::RuntimeClass;
use crate::object::{Array, Object};
use crate::{VmError, VmResult};
use std::fmt;
use std::sync::Arc;
use umbra_bytecode::TypeDesc;

/// A runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// Null reference (also the "no value" sentinel returned by handlers)
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit float
    Double(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Object instance
    Object(Arc<Object>),
    /// Array of values
    Array(Arc<Array>),
    /// Class token
    Class(Arc<RuntimeClass>),
}

impl Value {
    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Value::Null
    }

    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Create an array value from elements
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Arc::new(Array::from_vec(elements)))
    }

    /// Check if value is null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by conditional jumps
    ///
    /// `false`, `null` and numeric zero are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Long(l) => *l != 0,
            Value::Double(d) => *d != 0.0,
            _ => true,
        }
    }

    /// Get the boolean payload
    pub fn as_bool(&self) -> VmResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(type_error("boolean", other)),
        }
    }

    /// Get the integer payload
    pub fn as_i32(&self) -> VmResult<i32> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(type_error("int", other)),
        }
    }

    /// Get a long payload, widening ints
    pub fn as_i64(&self) -> VmResult<i64> {
        match self {
            Value::Int(i) => Ok(*i as i64),
            Value::Long(l) => Ok(*l),
            other => Err(type_error("long", other)),
        }
    }

    /// Get a double payload, widening integers
    pub fn as_f64(&self) -> VmResult<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Long(l) => Ok(*l as f64),
            Value::Double(d) => Ok(*d),
            other => Err(type_error("double", other)),
        }
    }

    /// Get the string payload
    pub fn as_str(&self) -> VmResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(type_error("string", other)),
        }
    }

    /// Get the object payload
    pub fn as_object(&self) -> VmResult<&Arc<Object>> {
        match self {
            Value::Object(o) => Ok(o),
            Value::Null => Err(VmError::NullPointer),
            other => Err(type_error("object", other)),
        }
    }

    /// Get the array payload
    pub fn as_array(&self) -> VmResult<&Arc<Array>> {
        match self {
            Value::Array(a) => Ok(a),
            Value::Null => Err(VmError::NullPointer),
            other => Err(type_error("array", other)),
        }
    }

    /// Get the class token payload
    pub fn as_class(&self) -> VmResult<&Arc<RuntimeClass>> {
        match self {
            Value::Class(c) => Ok(c),
            Value::Null => Err(VmError::NullPointer),
            other => Err(type_error("class", other)),
        }
    }

    /// Name of the runtime type, as used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Long(_) => "long".to_string(),
            Value::Double(_) => "double".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Object(o) => o.class().name().to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Class(_) => "class".to_string(),
        }
    }

    /// Default value of a declared type
    ///
    /// Primitives default to their zero value; references default to null.
    pub fn zero_for(ty: &TypeDesc) -> Self {
        match ty {
            TypeDesc::Boolean => Value::Bool(false),
            TypeDesc::Int => Value::Int(0),
            TypeDesc::Long => Value::Long(0),
            TypeDesc::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    /// Convert to a primitive type
    ///
    /// Null becomes the type's zero value, ints widen to long and double,
    /// and anything else is a type error.
    pub fn unbox(self, ty: &TypeDesc) -> VmResult<Value> {
        match (ty, self) {
            (_, Value::Null) => Ok(Value::zero_for(ty)),
            (TypeDesc::Boolean, v @ Value::Bool(_)) => Ok(v),
            (TypeDesc::Int, v @ Value::Int(_)) => Ok(v),
            (TypeDesc::Long, Value::Int(i)) => Ok(Value::Long(i as i64)),
            (TypeDesc::Long, v @ Value::Long(_)) => Ok(v),
            (TypeDesc::Double, Value::Int(i)) => Ok(Value::Double(i as f64)),
            (TypeDesc::Double, Value::Long(l)) => Ok(Value::Double(l as f64)),
            (TypeDesc::Double, v @ Value::Double(_)) => Ok(v),
            (ty, other) => Err(type_error(&ty.class_name(), &other)),
        }
    }

    /// String conversion used by `TO_STRING` and `SCONCAT`
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

fn type_error(expected: &str, found: &Value) -> VmError {
    VmError::TypeError(format!("expected {}, found {}", expected, found.type_name()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Int(a), Value::Long(b)) | (Value::Long(b), Value::Int(a)) => *a as i64 == *b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Double(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(o) => write!(f, "{}@{:x}", o.class().name(), o.identity()),
            Value::Array(a) => write!(f, "array[{}]", a.len()),
            Value::Class(c) => write!(f, "class {}", c.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Long(l) => write!(f, "{}L", l),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbox_null_yields_zero() {
        assert_eq!(Value::Null.unbox(&TypeDesc::Int).unwrap(), Value::Int(0));
        assert_eq!(Value::Null.unbox(&TypeDesc::Boolean).unwrap(), Value::Bool(false));
        assert_eq!(Value::Null.unbox(&TypeDesc::Long).unwrap(), Value::Long(0));
        assert_eq!(Value::Null.unbox(&TypeDesc::Double).unwrap(), Value::Double(0.0));
    }

    #[test]
    fn test_unbox_widening() {
        assert!(matches!(Value::Int(7).unbox(&TypeDesc::Long), Ok(Value::Long(7))));
        assert!(matches!(Value::Int(2).unbox(&TypeDesc::Double), Ok(Value::Double(d)) if d == 2.0));
    }

    #[test]
    fn test_unbox_type_error() {
        assert!(matches!(
            Value::from("x").unbox(&TypeDesc::Int),
            Err(VmError::TypeError(_))
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::from("abc"), Value::string("abc"));
        assert_eq!(Value::Int(5), Value::Long(5));
        assert_ne!(Value::Null, Value::Bool(false));
        let a = Value::array(vec![]);
        let b = Value::array(vec![]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(123).to_string(), "123");
        assert_eq!(Value::from("value1").to_display_string(), "value1");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
