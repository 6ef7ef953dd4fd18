//! Constructor splitting
//!
//! A constructor is cut at its superclass constructor call. The synthesized
//! `<init>` keeps everything up to and including that call, then dispatches.
//! The renamed body is what follows the call, so it can run on an already
//! constructed instance without evaluating the super arguments again.

use super::generator::{emit_dispatch_stub, StubTarget};
use super::{TransformError, CONSTRUCTOR_BODY_NAME};
use umbra_bytecode::{
    access, decode_code, encode_code, CodeBuilder, ConstantPool, Instruction, Label, MethodDef,
    MethodDescriptor, CONSTRUCTOR_NAME,
};

/// Position of the superclass constructor call within a constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SuperCall {
    /// Index of the `INVOKE_SPECIAL <init>`
    pub call: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Pushed by an unshared `LOAD_LOCAL 0`
    Receiver,
    Other,
}

/// Find the superclass (or delegating) constructor call by simulating the
/// operand stack over the straight-line prefix
pub(super) fn locate_super_call(
    pool: &ConstantPool,
    class_name: &str,
    super_name: &str,
    code: &[Instruction],
) -> Result<SuperCall, String> {
    let mut stack: Vec<Slot> = Vec::new();

    for (index, instruction) in code.iter().enumerate() {
        if instruction.jump_target().is_some() || instruction.opcode().is_terminator() {
            return Err(format!(
                "{} at {} precedes the superclass constructor call",
                instruction.opcode().name(),
                index
            ));
        }

        match *instruction {
            Instruction::InvokeSpecial(idx) => {
                let method = pool
                    .method(idx)
                    .ok_or_else(|| format!("invalid method constant {} at {}", idx, index))?;
                let owner_matches = method.class == super_name || method.class == class_name;
                if method.name == CONSTRUCTOR_NAME && owner_matches {
                    let arg_count = MethodDescriptor::parse(&method.descriptor)
                        .map_err(|e| e.to_string())?
                        .arg_count();
                    if stack.len() < arg_count + 1 {
                        return Err(format!("stack underflow at {}", index));
                    }
                    let receiver_at = stack.len() - arg_count - 1;
                    if stack[receiver_at] != Slot::Receiver {
                        return Err(format!(
                            "receiver of the call at {} is not LOAD_LOCAL 0",
                            index
                        ));
                    }
                    if receiver_at != 0 {
                        return Err(format!(
                            "values left on the stack across the call at {}",
                            index
                        ));
                    }
                    return Ok(SuperCall { call: index });
                }
            }
            Instruction::LoadLocal(0) => {
                stack.push(Slot::Receiver);
                continue;
            }
            // the body runs in a fresh frame and would never see the write
            Instruction::StoreLocal(local) => {
                return Err(format!(
                    "STORE_LOCAL {} at {} precedes the superclass constructor call",
                    local, index
                ));
            }
            Instruction::Dup => {
                stack.pop().ok_or_else(|| format!("stack underflow at {}", index))?;
                stack.extend([Slot::Other, Slot::Other]);
                continue;
            }
            Instruction::Swap => {
                let len = stack.len();
                if len < 2 {
                    return Err(format!("stack underflow at {}", index));
                }
                stack.swap(len - 1, len - 2);
                continue;
            }
            _ => {}
        }

        let (pops, pushes) = instruction
            .stack_effect(pool)
            .ok_or_else(|| format!("invalid constant reference at {}", index))?;
        if stack.len() < pops {
            return Err(format!("stack underflow at {}", index));
        }
        stack.truncate(stack.len() - pops);
        stack.extend(std::iter::repeat(Slot::Other).take(pushes));
    }

    Err("no superclass constructor call".to_string())
}

/// The instructions after the superclass call, with jumps rebased
///
/// A jump back into the prefix has no counterpart in the body and is
/// rejected.
pub(super) fn strip_super_call(
    code: &[Instruction],
    site: SuperCall,
) -> Result<Vec<Instruction>, String> {
    let start = site.call + 1;
    let mut body = Vec::with_capacity(code.len() - start);
    for (index, instruction) in code.iter().enumerate().skip(start) {
        if let Some(Label(target)) = instruction.jump_target() {
            if target < start {
                return Err(format!("jump at {} targets the constructor prefix", index));
            }
        }
        body.push(instruction.map_target(|Label(old)| Label(old - start)));
    }
    Ok(body)
}

/// Split a constructor into its renamed body and the synthesized `<init>`
pub(super) fn split_constructor(
    pool: &mut ConstantPool,
    class_name: &str,
    super_name: Option<&str>,
    constructor: MethodDef,
) -> Result<(MethodDef, MethodDef), TransformError> {
    let qualified = format!("{}.{}", class_name, constructor.name);
    let signature = constructor
        .parsed_descriptor()
        .map_err(|source| TransformError::Descriptor {
            member: qualified.clone(),
            source,
        })?;
    let code = decode_code(&constructor.code).map_err(|source| TransformError::Code {
        method: qualified,
        source,
    })?;
    let violation =
        |reason: String| TransformError::violation(class_name, CONSTRUCTOR_NAME, reason);

    let (prefix, body) = match super_name {
        Some(super_name) => {
            let site = locate_super_call(pool, class_name, super_name, &code).map_err(violation)?;
            let body = strip_super_call(&code, site).map_err(violation)?;
            (code[..=site.call].to_vec(), body)
        }
        None => (Vec::new(), code),
    };

    let target = StubTarget {
        class_name,
        record_name: CONSTRUCTOR_BODY_NAME,
        direct_name: CONSTRUCTOR_BODY_NAME,
        descriptor: &constructor.descriptor,
        signature: &signature,
        is_static: false,
        always_dispatch: false,
    };
    let mut entry_code = CodeBuilder::new(pool);
    for instruction in &prefix {
        entry_code.emit(*instruction);
    }
    emit_dispatch_stub(&mut entry_code, &target);
    let entry_instructions = entry_code.finish()?;

    let entry = MethodDef {
        name: CONSTRUCTOR_NAME.to_string(),
        descriptor: constructor.descriptor.clone(),
        access: (constructor.access & !access::VISIBILITY) | access::PUBLIC,
        exceptions: constructor.exceptions.clone(),
        max_locals: constructor.max_locals.max(target.locals()),
        code: encode_code(&entry_instructions),
    };
    let body = MethodDef {
        name: CONSTRUCTOR_BODY_NAME.to_string(),
        code: encode_code(&body),
        ..constructor
    };
    Ok((body, entry))
}
