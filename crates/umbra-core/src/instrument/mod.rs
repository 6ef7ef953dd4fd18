//! Method transformer
//!
//! Rewrites a class so every call into it can be routed at runtime:
//! - ordinary methods are renamed to a class-specific direct name and a
//!   dispatch stub takes over the original name and descriptor; the stub of
//!   a native method always dispatches
//! - constructors keep their superclass construction, then dispatch to the
//!   rest of their body, renamed to [`CONSTRUCTOR_BODY_NAME`]
//! - the static initializer is renamed to [`STATIC_INITIALIZER_BODY_NAME`]
//!   and replaced by a notification to the dispatch handler
//! - a marker field ([`MARKER_FIELD_NAME`]) is added for direct re-entry
//!
//! Output depends only on the input bytes.

mod constructor;
mod generator;

use sha2::{Digest, Sha256};
use umbra_bytecode::{
    access, BuildError, ClassFile, ClassFileError, DecodeError, DescriptorError, FieldDef,
    MethodDef, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME,
};

/// Prefix of every direct method name
pub const DIRECT_METHOD_PREFIX: &str = "__umbra__";

/// Name of the renamed constructor body
pub const CONSTRUCTOR_BODY_NAME: &str = "__constructor__";

/// Name of the renamed static initializer
pub const STATIC_INITIALIZER_BODY_NAME: &str = "__staticInitializer__";

/// Name of the per-instance marker field
pub const MARKER_FIELD_NAME: &str = "__umbra_data__";

/// Descriptor of the marker field
pub const MARKER_FIELD_DESCRIPTOR: &str = "X";

/// Name of the direct method holding the original body of
/// `class_name.method_name`
///
/// `__umbra__<simple name>_<first two SHA-256 bytes of the full name>_<method>`
pub fn direct_method_name(class_name: &str, method_name: &str) -> String {
    let simple_name = class_name.rsplit('.').next().unwrap_or(class_name);
    let digest = Sha256::digest(class_name.as_bytes());
    format!(
        "{}{}_{}_{}",
        DIRECT_METHOD_PREFIX,
        simple_name,
        hex::encode(&digest[..2]),
        method_name
    )
}

/// Transformation errors
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Class bytes failed to decode
    #[error("Malformed class bytes: {0}")]
    Decode(#[from] ClassFileError),

    /// A method body failed to decode
    #[error("Undecodable code in {method}: {source}")]
    Code {
        /// Qualified method name
        method: String,
        /// Underlying error
        source: DecodeError,
    },

    /// A method descriptor failed to parse
    #[error("Bad descriptor on {member}: {source}")]
    Descriptor {
        /// Qualified member name
        member: String,
        /// Underlying error
        source: DescriptorError,
    },

    /// Generated code referenced an unbound label
    #[error("Code generation failed: {0}")]
    Build(#[from] BuildError),

    /// A structural assumption about the input did not hold
    #[error("Transformation invariant violated in {class}.{method}: {reason}")]
    InvariantViolation {
        /// Class name
        class: String,
        /// Method name
        method: String,
        /// What was wrong
        reason: String,
    },
}

impl TransformError {
    pub(crate) fn violation(class: &str, method: &str, reason: impl Into<String>) -> Self {
        TransformError::InvariantViolation {
            class: class.to_string(),
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Rewrites classes for dispatch
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassTransformer;

impl ClassTransformer {
    /// Create a transformer
    pub fn new() -> Self {
        Self
    }

    /// Transform encoded class bytes
    pub fn transform_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        let class = ClassFile::decode(bytes)?;
        Ok(self.transform(class)?.encode())
    }

    /// Transform a decoded class
    pub fn transform(&self, mut class: ClassFile) -> Result<ClassFile, TransformError> {
        let class_name = class.name.clone();
        let super_name = class.super_name.clone();
        let originals = std::mem::take(&mut class.methods);

        let mut renamed = Vec::with_capacity(originals.len());
        let mut generated = Vec::with_capacity(originals.len() + 1);
        let mut has_default_constructor = false;

        for method in originals {
            match method.name.as_str() {
                CONSTRUCTOR_NAME => {
                    has_default_constructor |= method.descriptor == "()V";
                    let (body, entry) = constructor::split_constructor(
                        &mut class.constants,
                        &class_name,
                        super_name.as_deref(),
                        method,
                    )?;
                    renamed.push(body);
                    generated.push(entry);
                }
                STATIC_INITIALIZER_NAME => {
                    let stub =
                        generator::class_initializing_stub(&mut class.constants, &class_name)?;
                    generated.push(stub);
                    renamed.push(MethodDef {
                        name: STATIC_INITIALIZER_BODY_NAME.to_string(),
                        ..method
                    });
                }
                _ => {
                    let entry =
                        generator::entry_method(&mut class.constants, &class_name, &method)?;
                    generated.push(entry);
                    renamed.push(MethodDef {
                        name: direct_method_name(&class_name, &method.name),
                        ..method
                    });
                }
            }
        }

        if !has_default_constructor {
            generated.push(generator::default_constructor(
                &mut class.constants,
                super_name.as_deref(),
            )?);
        }

        if class.find_field(MARKER_FIELD_NAME).is_none() {
            class.fields.push(FieldDef::new(
                MARKER_FIELD_NAME,
                MARKER_FIELD_DESCRIPTOR,
                access::PUBLIC,
            ));
        }

        renamed.extend(generated);
        class.methods = renamed;
        Ok(class)
    }
}
