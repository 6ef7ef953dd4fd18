//! Type and method descriptors
//!
//! Grammar:
//! ```text
//! type   := 'V' | 'Z' | 'I' | 'J' | 'D' | 'T' | 'X' | 'L' name ';' | '[' type
//! method := '(' type* ')' type
//! ```

use std::fmt;
use thiserror::Error;

/// Descriptor parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Unexpected character in descriptor
    #[error("Unexpected '{found}' at position {position} in descriptor '{descriptor}'")]
    Unexpected {
        /// Descriptor being parsed
        descriptor: String,
        /// Offending character
        found: char,
        /// Position of the character
        position: usize,
    },

    /// Descriptor ended early
    #[error("Truncated descriptor '{0}'")]
    Truncated(String),

    /// Trailing characters after a complete descriptor
    #[error("Trailing characters in descriptor '{0}'")]
    Trailing(String),

    /// `void` used where a value type is required
    #[error("'void' is not a valid parameter or array element type in '{0}'")]
    MisplacedVoid(String),
}

/// A value type (or `void` for method returns)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// No value (method returns only)
    Void,
    /// Boolean primitive
    Boolean,
    /// 32-bit integer primitive
    Int,
    /// 64-bit integer primitive
    Long,
    /// 64-bit float primitive
    Double,
    /// Built-in string reference
    String,
    /// Any reference
    Any,
    /// Reference to an instance of the named class
    Object(String),
    /// Array of the element type
    Array(Box<TypeDesc>),
}

impl TypeDesc {
    /// Parse a single type descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let bytes = descriptor.as_bytes();
        let mut pos = 0;
        let ty = parse_type(descriptor, bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(DescriptorError::Trailing(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Human-readable type name, as reported in call records
    pub fn class_name(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Int => "int".to_string(),
            Self::Long => "long".to_string(),
            Self::Double => "double".to_string(),
            Self::String => "string".to_string(),
            Self::Any => "any".to_string(),
            Self::Object(name) => name.clone(),
            Self::Array(elem) => format!("{}[]", elem.class_name()),
        }
    }

    /// Inverse of [`TypeDesc::class_name`]
    pub fn from_class_name(name: &str) -> Self {
        if let Some(elem) = name.strip_suffix("[]") {
            return Self::Array(Box::new(Self::from_class_name(elem)));
        }
        match name {
            "void" => Self::Void,
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "long" => Self::Long,
            "double" => Self::Double,
            "string" => Self::String,
            "any" => Self::Any,
            other => Self::Object(other.to_string()),
        }
    }

    /// Check if this is a primitive value type
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Boolean | Self::Int | Self::Long | Self::Double)
    }

    /// Check if this is `void`
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Operand tag used by the UNBOX instruction
    pub fn primitive_tag(&self) -> Option<u8> {
        match self {
            Self::Boolean => Some(1),
            Self::Int => Some(2),
            Self::Long => Some(3),
            Self::Double => Some(4),
            _ => None,
        }
    }

    /// Inverse of [`TypeDesc::primitive_tag`]
    pub fn from_primitive_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Boolean),
            2 => Some(Self::Int),
            3 => Some(Self::Long),
            4 => Some(Self::Double),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("V"),
            Self::Boolean => f.write_str("Z"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Double => f.write_str("D"),
            Self::String => f.write_str("T"),
            Self::Any => f.write_str("X"),
            Self::Object(name) => write!(f, "L{};", name),
            Self::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

fn parse_type(
    descriptor: &str,
    bytes: &[u8],
    pos: &mut usize,
) -> Result<TypeDesc, DescriptorError> {
    let c = *bytes
        .get(*pos)
        .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
    *pos += 1;
    let ty = match c {
        b'V' => TypeDesc::Void,
        b'Z' => TypeDesc::Boolean,
        b'I' => TypeDesc::Int,
        b'J' => TypeDesc::Long,
        b'D' => TypeDesc::Double,
        b'T' => TypeDesc::String,
        b'X' => TypeDesc::Any,
        b'L' => {
            let start = *pos;
            let len = bytes[start..]
                .iter()
                .position(|&b| b == b';')
                .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
            if len == 0 {
                return Err(DescriptorError::Unexpected {
                    descriptor: descriptor.to_string(),
                    found: ';',
                    position: start,
                });
            }
            *pos = start + len + 1;
            TypeDesc::Object(descriptor[start..start + len].to_string())
        }
        b'[' => {
            let elem = parse_type(descriptor, bytes, pos)?;
            if elem.is_void() {
                return Err(DescriptorError::MisplacedVoid(descriptor.to_string()));
            }
            TypeDesc::Array(Box::new(elem))
        }
        other => {
            return Err(DescriptorError::Unexpected {
                descriptor: descriptor.to_string(),
                found: other as char,
                position: *pos - 1,
            })
        }
    };
    Ok(ty)
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<TypeDesc>,
    /// Return type
    pub ret: TypeDesc,
}

impl MethodDescriptor {
    /// Create a descriptor from parts
    pub fn new(params: Vec<TypeDesc>, ret: TypeDesc) -> Self {
        Self { params, ret }
    }

    /// Parse a method descriptor such as `(TI)T`
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let bytes = descriptor.as_bytes();
        match bytes.first() {
            Some(b'(') => {}
            Some(&other) => {
                return Err(DescriptorError::Unexpected {
                    descriptor: descriptor.to_string(),
                    found: other as char,
                    position: 0,
                })
            }
            None => return Err(DescriptorError::Truncated(descriptor.to_string())),
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let param = parse_type(descriptor, bytes, &mut pos)?;
                    if param.is_void() {
                        return Err(DescriptorError::MisplacedVoid(descriptor.to_string()));
                    }
                    params.push(param);
                }
                None => return Err(DescriptorError::Truncated(descriptor.to_string())),
            }
        }

        let ret = parse_type(descriptor, bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(DescriptorError::Trailing(descriptor.to_string()));
        }
        Ok(Self { params, ret })
    }

    /// Number of argument values (excluding the receiver)
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }

    /// Human-readable parameter type names
    pub fn param_type_names(&self) -> Vec<String> {
        self.params.iter().map(TypeDesc::class_name).collect()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.ret)
    }
}
