//! Class file verification
//!
//! Structural checks run on every class before it is defined: well-formed
//! descriptors, decodable code, in-range pool and local references, a
//! consistent operand stack depth at every instruction, and no execution
//! path that falls off the end of a method.

use crate::class::{ClassFile, MethodDef};
use crate::code::{decode_code, Instruction};
use crate::constants::ConstantPool;
use crate::descriptor::{MethodDescriptor, TypeDesc};
use crate::encoder::DecodeError;

/// Verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Malformed descriptor
    #[error("Invalid descriptor '{descriptor}' on {member}")]
    InvalidDescriptor {
        /// Qualified member name
        member: String,
        /// Offending descriptor
        descriptor: String,
    },

    /// Code could not be decoded
    #[error("Undecodable code in {method}: {source}")]
    Decode {
        /// Qualified method name
        method: String,
        /// Underlying error
        source: DecodeError,
    },

    /// Concrete method without a body
    #[error("Method {0} has no code")]
    MissingCode(String),

    /// Native or abstract method with a body
    #[error("Native or abstract method {0} has code")]
    UnexpectedCode(String),

    /// Too few locals for the receiver and arguments
    #[error("Method {method} declares {declared} locals but needs at least {required}")]
    TooFewLocals {
        /// Qualified method name
        method: String,
        /// Declared local count
        declared: u16,
        /// Receiver plus argument count
        required: usize,
    },

    /// Invalid constant pool reference
    #[error("Invalid {kind} reference {index} at instruction {at} in {method}")]
    InvalidConstantRef {
        /// Qualified method name
        method: String,
        /// Pool table name
        kind: &'static str,
        /// Pool index
        index: u32,
        /// Instruction index
        at: usize,
    },

    /// Invalid local variable reference
    #[error("Invalid local {index} (max {max}) at instruction {at} in {method}")]
    InvalidLocalRef {
        /// Qualified method name
        method: String,
        /// Local index
        index: u16,
        /// Declared local count
        max: u16,
        /// Instruction index
        at: usize,
    },

    /// Stack underflow
    #[error("Stack underflow at instruction {at} in {method}")]
    StackUnderflow {
        /// Qualified method name
        method: String,
        /// Instruction index
        at: usize,
    },

    /// Paths reach an instruction with different stack depths
    #[error("Inconsistent stack depth at instruction {at} in {method} ({first} vs {second})")]
    StackMismatch {
        /// Qualified method name
        method: String,
        /// Instruction index
        at: usize,
        /// Depth recorded first
        first: usize,
        /// Conflicting depth
        second: usize,
    },

    /// Return kind does not match the descriptor
    #[error("Return at instruction {at} does not match the return type of {method}")]
    ReturnMismatch {
        /// Qualified method name
        method: String,
        /// Instruction index
        at: usize,
    },

    /// Execution falls off end
    #[error("Execution falls off end of {0}")]
    FallOffEnd(String),
}

/// Verify every member of a class
pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    for field in &class.fields {
        if TypeDesc::parse(&field.descriptor).map_or(true, |t| t.is_void()) {
            return Err(VerifyError::InvalidDescriptor {
                member: format!("{}.{}", class.name, field.name),
                descriptor: field.descriptor.clone(),
            });
        }
    }

    for method in &class.methods {
        verify_method(class, method)?;
    }

    Ok(())
}

fn verify_method(class: &ClassFile, method: &MethodDef) -> Result<(), VerifyError> {
    let qualified = format!("{}.{}{}", class.name, method.name, method.descriptor);

    let descriptor = MethodDescriptor::parse(&method.descriptor).map_err(|_| {
        VerifyError::InvalidDescriptor {
            member: qualified.clone(),
            descriptor: method.descriptor.clone(),
        }
    })?;

    if method.is_native() || method.is_abstract() {
        if !method.code.is_empty() {
            return Err(VerifyError::UnexpectedCode(qualified));
        }
        return Ok(());
    }
    if method.code.is_empty() {
        return Err(VerifyError::MissingCode(qualified));
    }

    let required = descriptor.arg_count() + usize::from(!method.is_static());
    if (method.max_locals as usize) < required {
        return Err(VerifyError::TooFewLocals {
            method: qualified,
            declared: method.max_locals,
            required,
        });
    }

    let code = decode_code(&method.code).map_err(|source| VerifyError::Decode {
        method: qualified.clone(),
        source,
    })?;

    for (at, instruction) in code.iter().enumerate() {
        check_operands(&qualified, &class.constants, method.max_locals, at, instruction)?;
    }

    check_stack(&qualified, &class.constants, &descriptor, &code)
}

fn check_operands(
    method: &str,
    pool: &ConstantPool,
    max_locals: u16,
    at: usize,
    instruction: &Instruction,
) -> Result<(), VerifyError> {
    let bad_ref = |kind: &'static str, index: u32| VerifyError::InvalidConstantRef {
        method: method.to_string(),
        kind,
        index,
        at,
    };

    match *instruction {
        Instruction::ConstStr(i) if pool.string(i).is_none() => Err(bad_ref("string", i)),
        Instruction::ConstClass(i) | Instruction::New(i) | Instruction::InstanceOf(i)
            if pool.class(i).is_none() =>
        {
            Err(bad_ref("class", i))
        }
        Instruction::GetField(i)
        | Instruction::PutField(i)
        | Instruction::GetStatic(i)
        | Instruction::PutStatic(i)
            if pool.field(i).is_none() =>
        {
            Err(bad_ref("field", i))
        }
        Instruction::InvokeVirtual(i)
        | Instruction::InvokeSpecial(i)
        | Instruction::InvokeStatic(i) => {
            let method_ref = pool.method(i).ok_or_else(|| bad_ref("method", i))?;
            MethodDescriptor::parse(&method_ref.descriptor).map_err(|_| {
                VerifyError::InvalidDescriptor {
                    member: format!("{}.{}", method_ref.class, method_ref.name),
                    descriptor: method_ref.descriptor.clone(),
                }
            })?;
            Ok(())
        }
        Instruction::LoadLocal(index) | Instruction::StoreLocal(index) if index >= max_locals => {
            Err(VerifyError::InvalidLocalRef {
                method: method.to_string(),
                index,
                max: max_locals,
                at,
            })
        }
        _ => Ok(()),
    }
}

fn check_stack(
    method: &str,
    pool: &ConstantPool,
    descriptor: &MethodDescriptor,
    code: &[Instruction],
) -> Result<(), VerifyError> {
    let mut depths: Vec<Option<usize>> = vec![None; code.len()];
    let mut worklist = vec![(0usize, 0usize)];

    while let Some((at, depth)) = worklist.pop() {
        let Some(instruction) = code.get(at) else {
            return Err(VerifyError::FallOffEnd(method.to_string()));
        };
        match depths[at] {
            Some(first) if first == depth => continue,
            Some(first) => {
                return Err(VerifyError::StackMismatch {
                    method: method.to_string(),
                    at,
                    first,
                    second: depth,
                })
            }
            None => depths[at] = Some(depth),
        }

        // Operand references were checked already
        let (pops, pushes) = instruction.stack_effect(pool).unwrap_or((0, 0));
        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                method: method.to_string(),
                at,
            });
        }
        let next_depth = depth - pops + pushes;

        match instruction {
            Instruction::Return if descriptor.ret.is_void() => {
                return Err(VerifyError::ReturnMismatch {
                    method: method.to_string(),
                    at,
                })
            }
            Instruction::ReturnVoid if !descriptor.ret.is_void() => {
                return Err(VerifyError::ReturnMismatch {
                    method: method.to_string(),
                    at,
                })
            }
            _ => {}
        }

        if let Some(target) = instruction.jump_target() {
            worklist.push((target.0, next_depth));
        }
        if !instruction.opcode().is_terminator() {
            worklist.push((at + 1, next_depth));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::access;
    use crate::code::{encode_code, Label};

    fn class_with(
        descriptor: &str,
        access: u16,
        max_locals: u16,
        code: &[Instruction],
    ) -> ClassFile {
        let mut class = ClassFile::new("t.Sample", None);
        class.methods.push(MethodDef {
            name: "m".to_string(),
            descriptor: descriptor.to_string(),
            access,
            exceptions: Vec::new(),
            max_locals,
            code: encode_code(code),
        });
        class
    }

    #[test]
    fn test_valid_method() {
        let class = class_with(
            "(I)I",
            access::PUBLIC | access::STATIC,
            1,
            &[
                Instruction::LoadLocal(0),
                Instruction::JmpIfFalse(Label(4)),
                Instruction::ConstI32(1),
                Instruction::Return,
                Instruction::ConstI32(2),
                Instruction::Return,
            ],
        );
        assert!(verify_class(&class).is_ok());
    }

    #[test]
    fn test_stack_underflow() {
        let class = class_with(
            "()V",
            access::STATIC,
            0,
            &[Instruction::Pop, Instruction::ReturnVoid],
        );
        assert!(matches!(
            verify_class(&class),
            Err(VerifyError::StackUnderflow { at: 0, .. })
        ));
    }

    #[test]
    fn test_fall_off_end() {
        let class = class_with("()V", access::STATIC, 0, &[Instruction::Nop]);
        assert!(matches!(verify_class(&class), Err(VerifyError::FallOffEnd(_))));
    }

    #[test]
    fn test_stack_mismatch_at_merge() {
        let class = class_with(
            "(Z)V",
            access::STATIC,
            1,
            &[
                Instruction::LoadLocal(0),
                Instruction::JmpIfTrue(Label(3)),
                Instruction::ConstNull,
                Instruction::ReturnVoid,
            ],
        );
        assert!(matches!(
            verify_class(&class),
            Err(VerifyError::StackMismatch { at: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_local() {
        let class = class_with(
            "()V",
            access::STATIC,
            0,
            &[Instruction::LoadLocal(0), Instruction::Pop, Instruction::ReturnVoid],
        );
        assert!(matches!(
            verify_class(&class),
            Err(VerifyError::InvalidLocalRef { index: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_pool_reference() {
        let class = class_with(
            "()V",
            access::STATIC,
            0,
            &[Instruction::InvokeStatic(7), Instruction::ReturnVoid],
        );
        assert!(matches!(
            verify_class(&class),
            Err(VerifyError::InvalidConstantRef { kind: "method", index: 7, .. })
        ));
    }

    #[test]
    fn test_return_mismatch() {
        let class = class_with("()I", access::STATIC, 0, &[Instruction::ReturnVoid]);
        assert!(matches!(verify_class(&class), Err(VerifyError::ReturnMismatch { .. })));
    }

    #[test]
    fn test_native_method_must_be_empty() {
        let mut class = class_with("()V", access::NATIVE, 1, &[]);
        assert!(verify_class(&class).is_ok());
        class.methods[0].code = encode_code(&[Instruction::ReturnVoid]);
        assert!(matches!(verify_class(&class), Err(VerifyError::UnexpectedCode(_))));
    }

    #[test]
    fn test_too_few_locals() {
        let class = class_with("(II)V", access::PUBLIC, 2, &[Instruction::ReturnVoid]);
        assert!(matches!(
            verify_class(&class),
            Err(VerifyError::TooFewLocals { required: 3, .. })
        ));
    }
}
