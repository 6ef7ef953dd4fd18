//! Instruction-level view of method bodies
//!
//! Raw code is a byte stream in which jumps carry signed offsets relative to
//! the start of the following instruction. [`decode_code`] turns that stream
//! into a list of [`Instruction`]s whose jumps name a [`Label`] (the index of
//! the target instruction), which is what the transformer edits. Encoding
//! goes the other way and recomputes every offset.

use crate::constants::ConstantPool;
use crate::descriptor::{MethodDescriptor, TypeDesc};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::opcode::Opcode;

/// Jump target: index of an instruction in the decoded list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub usize);

/// A decoded instruction with typed operands
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum Instruction {
    Nop,
    Pop,
    Dup,
    Swap,
    ConstNull,
    ConstTrue,
    ConstFalse,
    ConstI32(i32),
    ConstF64(f64),
    /// String pool index
    ConstStr(u32),
    ConstI64(i64),
    /// Class pool index
    ConstClass(u32),

    LoadLocal(u16),
    StoreLocal(u16),

    Iadd,
    Isub,
    Imul,
    Idiv,
    Imod,
    Ineg,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fneg,
    Ieq,
    Ine,
    Ilt,
    Ile,
    Igt,
    Ige,
    Eq,
    Ne,
    Not,

    Sconcat,
    Slen,
    Supper,
    ToString,

    Jmp(Label),
    JmpIfFalse(Label),
    JmpIfTrue(Label),
    JmpIfNull(Label),
    JmpIfNotNull(Label),

    /// Method pool index
    InvokeVirtual(u32),
    /// Method pool index
    InvokeSpecial(u32),
    /// Method pool index
    InvokeStatic(u32),
    Return,
    ReturnVoid,

    /// Class pool index
    New(u32),
    /// Field pool index
    GetField(u32),
    /// Field pool index
    PutField(u32),
    /// Field pool index
    GetStatic(u32),
    /// Field pool index
    PutStatic(u32),
    /// Class pool index
    InstanceOf(u32),
    GetClass,

    NewArray,
    ArrayLoad,
    ArrayStore,
    ArrayLen,

    Throw,

    ShouldCallDirectly,
    MethodInvoked,
    ClassInitializing,
    /// Primitive type tag (see [`TypeDesc::primitive_tag`])
    Unbox(u8),
}

impl Instruction {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        use Instruction as I;
        match self {
            I::Nop => Opcode::Nop,
            I::Pop => Opcode::Pop,
            I::Dup => Opcode::Dup,
            I::Swap => Opcode::Swap,
            I::ConstNull => Opcode::ConstNull,
            I::ConstTrue => Opcode::ConstTrue,
            I::ConstFalse => Opcode::ConstFalse,
            I::ConstI32(_) => Opcode::ConstI32,
            I::ConstF64(_) => Opcode::ConstF64,
            I::ConstStr(_) => Opcode::ConstStr,
            I::ConstI64(_) => Opcode::ConstI64,
            I::ConstClass(_) => Opcode::ConstClass,
            I::LoadLocal(_) => Opcode::LoadLocal,
            I::StoreLocal(_) => Opcode::StoreLocal,
            I::Iadd => Opcode::Iadd,
            I::Isub => Opcode::Isub,
            I::Imul => Opcode::Imul,
            I::Idiv => Opcode::Idiv,
            I::Imod => Opcode::Imod,
            I::Ineg => Opcode::Ineg,
            I::Fadd => Opcode::Fadd,
            I::Fsub => Opcode::Fsub,
            I::Fmul => Opcode::Fmul,
            I::Fdiv => Opcode::Fdiv,
            I::Fneg => Opcode::Fneg,
            I::Ieq => Opcode::Ieq,
            I::Ine => Opcode::Ine,
            I::Ilt => Opcode::Ilt,
            I::Ile => Opcode::Ile,
            I::Igt => Opcode::Igt,
            I::Ige => Opcode::Ige,
            I::Eq => Opcode::Eq,
            I::Ne => Opcode::Ne,
            I::Not => Opcode::Not,
            I::Sconcat => Opcode::Sconcat,
            I::Slen => Opcode::Slen,
            I::Supper => Opcode::Supper,
            I::ToString => Opcode::ToString,
            I::Jmp(_) => Opcode::Jmp,
            I::JmpIfFalse(_) => Opcode::JmpIfFalse,
            I::JmpIfTrue(_) => Opcode::JmpIfTrue,
            I::JmpIfNull(_) => Opcode::JmpIfNull,
            I::JmpIfNotNull(_) => Opcode::JmpIfNotNull,
            I::InvokeVirtual(_) => Opcode::InvokeVirtual,
            I::InvokeSpecial(_) => Opcode::InvokeSpecial,
            I::InvokeStatic(_) => Opcode::InvokeStatic,
            I::Return => Opcode::Return,
            I::ReturnVoid => Opcode::ReturnVoid,
            I::New(_) => Opcode::New,
            I::GetField(_) => Opcode::GetField,
            I::PutField(_) => Opcode::PutField,
            I::GetStatic(_) => Opcode::GetStatic,
            I::PutStatic(_) => Opcode::PutStatic,
            I::InstanceOf(_) => Opcode::InstanceOf,
            I::GetClass => Opcode::GetClass,
            I::NewArray => Opcode::NewArray,
            I::ArrayLoad => Opcode::ArrayLoad,
            I::ArrayStore => Opcode::ArrayStore,
            I::ArrayLen => Opcode::ArrayLen,
            I::Throw => Opcode::Throw,
            I::ShouldCallDirectly => Opcode::ShouldCallDirectly,
            I::MethodInvoked => Opcode::MethodInvoked,
            I::ClassInitializing => Opcode::ClassInitializing,
            I::Unbox(_) => Opcode::Unbox,
        }
    }

    /// Encoded size in bytes (opcode plus operands)
    pub fn encoded_size(&self) -> usize {
        1 + self.opcode().operand_size()
    }

    /// Target of a jump instruction
    pub fn jump_target(&self) -> Option<Label> {
        match *self {
            Self::Jmp(l)
            | Self::JmpIfFalse(l)
            | Self::JmpIfTrue(l)
            | Self::JmpIfNull(l)
            | Self::JmpIfNotNull(l) => Some(l),
            _ => None,
        }
    }

    /// Rewrite the jump target through `f`, leaving other instructions untouched
    pub fn map_target(self, f: impl FnOnce(Label) -> Label) -> Self {
        match self {
            Self::Jmp(l) => Self::Jmp(f(l)),
            Self::JmpIfFalse(l) => Self::JmpIfFalse(f(l)),
            Self::JmpIfTrue(l) => Self::JmpIfTrue(f(l)),
            Self::JmpIfNull(l) => Self::JmpIfNull(f(l)),
            Self::JmpIfNotNull(l) => Self::JmpIfNotNull(f(l)),
            other => other,
        }
    }

    /// Number of values popped and pushed
    ///
    /// Call instructions need the pool to count arguments; `None` means the
    /// method reference or its descriptor is invalid.
    pub fn stack_effect(&self, pool: &ConstantPool) -> Option<(usize, usize)> {
        use Instruction as I;
        let effect = match self {
            I::Nop => (0, 0),
            I::Pop => (1, 0),
            I::Dup => (1, 2),
            I::Swap => (2, 2),
            I::ConstNull
            | I::ConstTrue
            | I::ConstFalse
            | I::ConstI32(_)
            | I::ConstF64(_)
            | I::ConstStr(_)
            | I::ConstI64(_)
            | I::ConstClass(_)
            | I::LoadLocal(_) => (0, 1),
            I::StoreLocal(_) => (1, 0),
            I::Iadd
            | I::Isub
            | I::Imul
            | I::Idiv
            | I::Imod
            | I::Fadd
            | I::Fsub
            | I::Fmul
            | I::Fdiv
            | I::Ieq
            | I::Ine
            | I::Ilt
            | I::Ile
            | I::Igt
            | I::Ige
            | I::Eq
            | I::Ne
            | I::Sconcat => (2, 1),
            I::Ineg | I::Fneg | I::Not | I::Slen | I::Supper | I::ToString => (1, 1),
            I::Jmp(_) => (0, 0),
            I::JmpIfFalse(_) | I::JmpIfTrue(_) | I::JmpIfNull(_) | I::JmpIfNotNull(_) => (1, 0),
            I::InvokeVirtual(idx) | I::InvokeSpecial(idx) | I::InvokeStatic(idx) => {
                let method = pool.method(*idx)?;
                let desc = MethodDescriptor::parse(&method.descriptor).ok()?;
                let receiver = usize::from(!matches!(self, I::InvokeStatic(_)));
                (desc.arg_count() + receiver, usize::from(!desc.ret.is_void()))
            }
            I::Return => (1, 0),
            I::ReturnVoid => (0, 0),
            I::New(_) | I::GetStatic(_) => (0, 1),
            I::GetField(_) | I::InstanceOf(_) | I::GetClass => (1, 1),
            I::PutField(_) => (2, 0),
            I::PutStatic(_) => (1, 0),
            I::NewArray | I::ArrayLen => (1, 1),
            I::ArrayLoad => (2, 1),
            I::ArrayStore => (3, 0),
            I::Throw => (1, 0),
            I::ShouldCallDirectly => (1, 1),
            I::MethodInvoked => (5, 1),
            I::ClassInitializing => (1, 0),
            I::Unbox(_) => (1, 1),
        };
        Some(effect)
    }
}

/// Decode a raw method body into instructions
pub fn decode_code(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    // First pass: instruction boundaries
    let mut offsets = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let opcode = Opcode::from_u8(code[pos]).ok_or(DecodeError::InvalidOpcode(code[pos], pos))?;
        offsets.push(pos);
        pos += 1 + opcode.operand_size();
    }
    if pos != code.len() {
        return Err(DecodeError::UnexpectedEnd(code.len()));
    }

    let index_of = |offset: usize, target: i64| -> Result<Label, DecodeError> {
        usize::try_from(target)
            .ok()
            .and_then(|t| offsets.binary_search(&t).ok())
            .map(Label)
            .ok_or(DecodeError::InvalidJumpTarget { offset, target })
    };

    let mut reader = BytecodeReader::new(code);
    let mut instructions = Vec::with_capacity(offsets.len());
    while reader.has_more() {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;
        let instruction = match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Pop => Instruction::Pop,
            Opcode::Dup => Instruction::Dup,
            Opcode::Swap => Instruction::Swap,
            Opcode::ConstNull => Instruction::ConstNull,
            Opcode::ConstTrue => Instruction::ConstTrue,
            Opcode::ConstFalse => Instruction::ConstFalse,
            Opcode::ConstI32 => Instruction::ConstI32(reader.read_i32()?),
            Opcode::ConstF64 => Instruction::ConstF64(reader.read_f64()?),
            Opcode::ConstStr => Instruction::ConstStr(reader.read_u32()?),
            Opcode::ConstI64 => Instruction::ConstI64(reader.read_i64()?),
            Opcode::ConstClass => Instruction::ConstClass(reader.read_u32()?),
            Opcode::LoadLocal => Instruction::LoadLocal(reader.read_u16()?),
            Opcode::StoreLocal => Instruction::StoreLocal(reader.read_u16()?),
            Opcode::Iadd => Instruction::Iadd,
            Opcode::Isub => Instruction::Isub,
            Opcode::Imul => Instruction::Imul,
            Opcode::Idiv => Instruction::Idiv,
            Opcode::Imod => Instruction::Imod,
            Opcode::Ineg => Instruction::Ineg,
            Opcode::Fadd => Instruction::Fadd,
            Opcode::Fsub => Instruction::Fsub,
            Opcode::Fmul => Instruction::Fmul,
            Opcode::Fdiv => Instruction::Fdiv,
            Opcode::Fneg => Instruction::Fneg,
            Opcode::Ieq => Instruction::Ieq,
            Opcode::Ine => Instruction::Ine,
            Opcode::Ilt => Instruction::Ilt,
            Opcode::Ile => Instruction::Ile,
            Opcode::Igt => Instruction::Igt,
            Opcode::Ige => Instruction::Ige,
            Opcode::Eq => Instruction::Eq,
            Opcode::Ne => Instruction::Ne,
            Opcode::Not => Instruction::Not,
            Opcode::Sconcat => Instruction::Sconcat,
            Opcode::Slen => Instruction::Slen,
            Opcode::Supper => Instruction::Supper,
            Opcode::ToString => Instruction::ToString,
            Opcode::Jmp
            | Opcode::JmpIfFalse
            | Opcode::JmpIfTrue
            | Opcode::JmpIfNull
            | Opcode::JmpIfNotNull => {
                let relative = reader.read_i32()?;
                let target = reader.position() as i64 + relative as i64;
                let label = index_of(offset, target)?;
                match opcode {
                    Opcode::Jmp => Instruction::Jmp(label),
                    Opcode::JmpIfFalse => Instruction::JmpIfFalse(label),
                    Opcode::JmpIfTrue => Instruction::JmpIfTrue(label),
                    Opcode::JmpIfNull => Instruction::JmpIfNull(label),
                    _ => Instruction::JmpIfNotNull(label),
                }
            }
            Opcode::InvokeVirtual => Instruction::InvokeVirtual(reader.read_u32()?),
            Opcode::InvokeSpecial => Instruction::InvokeSpecial(reader.read_u32()?),
            Opcode::InvokeStatic => Instruction::InvokeStatic(reader.read_u32()?),
            Opcode::Return => Instruction::Return,
            Opcode::ReturnVoid => Instruction::ReturnVoid,
            Opcode::New => Instruction::New(reader.read_u32()?),
            Opcode::GetField => Instruction::GetField(reader.read_u32()?),
            Opcode::PutField => Instruction::PutField(reader.read_u32()?),
            Opcode::GetStatic => Instruction::GetStatic(reader.read_u32()?),
            Opcode::PutStatic => Instruction::PutStatic(reader.read_u32()?),
            Opcode::InstanceOf => Instruction::InstanceOf(reader.read_u32()?),
            Opcode::GetClass => Instruction::GetClass,
            Opcode::NewArray => Instruction::NewArray,
            Opcode::ArrayLoad => Instruction::ArrayLoad,
            Opcode::ArrayStore => Instruction::ArrayStore,
            Opcode::ArrayLen => Instruction::ArrayLen,
            Opcode::Throw => Instruction::Throw,
            Opcode::ShouldCallDirectly => Instruction::ShouldCallDirectly,
            Opcode::MethodInvoked => Instruction::MethodInvoked,
            Opcode::ClassInitializing => Instruction::ClassInitializing,
            Opcode::Unbox => {
                let tag_offset = reader.position();
                let tag = reader.read_u8()?;
                if TypeDesc::from_primitive_tag(tag).is_none() {
                    return Err(DecodeError::InvalidTypeTag(tag, tag_offset));
                }
                Instruction::Unbox(tag)
            }
        };
        instructions.push(instruction);
    }

    Ok(instructions)
}

/// Encode instructions into a raw method body
///
/// A label past the last instruction encodes as a jump to the end of the
/// code, which [`decode_code`] rejects.
pub fn encode_code(instructions: &[Instruction]) -> Vec<u8> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut pos = 0;
    for instruction in instructions {
        offsets.push(pos);
        pos += instruction.encoded_size();
    }
    let end = pos;

    let mut writer = BytecodeWriter::with_capacity(end);
    for instruction in instructions {
        writer.emit_u8(instruction.opcode().to_u8());
        match *instruction {
            Instruction::ConstI32(v) => writer.emit_i32(v),
            Instruction::ConstF64(v) => writer.emit_f64(v),
            Instruction::ConstI64(v) => writer.emit_i64(v),
            Instruction::LoadLocal(i) | Instruction::StoreLocal(i) => writer.emit_u16(i),
            Instruction::Unbox(tag) => writer.emit_u8(tag),
            Instruction::ConstStr(i)
            | Instruction::ConstClass(i)
            | Instruction::InvokeVirtual(i)
            | Instruction::InvokeSpecial(i)
            | Instruction::InvokeStatic(i)
            | Instruction::New(i)
            | Instruction::GetField(i)
            | Instruction::PutField(i)
            | Instruction::GetStatic(i)
            | Instruction::PutStatic(i)
            | Instruction::InstanceOf(i) => writer.emit_u32(i),
            ref jump => {
                if let Some(Label(target)) = jump.jump_target() {
                    let next = writer.offset() + 4;
                    let target = offsets.get(target).copied().unwrap_or(end);
                    writer.emit_i32(target as i32 - next as i32);
                }
            }
        }
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encode_with_jumps() {
        let code = vec![
            Instruction::LoadLocal(0),
            Instruction::JmpIfFalse(Label(4)),
            Instruction::ConstI32(1),
            Instruction::Return,
            Instruction::ConstI32(2),
            Instruction::Return,
        ];
        let bytes = encode_code(&code);
        assert_eq!(decode_code(&bytes).unwrap(), code);
    }

    #[test]
    fn test_backward_jump() {
        let code = vec![
            Instruction::Nop,
            Instruction::LoadLocal(0),
            Instruction::JmpIfTrue(Label(0)),
            Instruction::ReturnVoid,
        ];
        let bytes = encode_code(&code);
        // JmpIfTrue at byte 4, next instruction at byte 9, target at byte 0
        assert_eq!(&bytes[5..9], &(-9i32).to_le_bytes());
        assert_eq!(decode_code(&bytes).unwrap(), code);
    }

    #[test]
    fn test_jump_into_operand_rejected() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(Opcode::ConstI32.to_u8());
        writer.emit_i32(0);
        writer.emit_u8(Opcode::Jmp.to_u8());
        writer.emit_i32(-8);
        let bytes = writer.into_bytes();
        assert!(matches!(
            decode_code(&bytes),
            Err(DecodeError::InvalidJumpTarget { offset: 5, target: 2 })
        ));
    }

    #[test]
    fn test_jump_past_end_rejected() {
        let bytes = encode_code(&[Instruction::Jmp(Label(1))]);
        assert!(matches!(
            decode_code(&bytes),
            Err(DecodeError::InvalidJumpTarget { .. })
        ));
    }

    #[test]
    fn test_truncated_operand() {
        let bytes = [Opcode::ConstI32.to_u8(), 1, 2];
        assert_eq!(decode_code(&bytes), Err(DecodeError::UnexpectedEnd(3)));
    }

    #[test]
    fn test_invalid_unbox_tag() {
        let bytes = [Opcode::Unbox.to_u8(), 9];
        assert_eq!(decode_code(&bytes), Err(DecodeError::InvalidTypeTag(9, 1)));
    }

    #[test]
    fn test_call_stack_effect() {
        let mut pool = ConstantPool::new();
        let virt = pool.add_method("a.B", "m", "(TI)J");
        let stat = pool.add_method("a.B", "s", "(T)V");
        assert_eq!(Instruction::InvokeVirtual(virt).stack_effect(&pool), Some((3, 1)));
        assert_eq!(Instruction::InvokeStatic(stat).stack_effect(&pool), Some((1, 0)));
        assert_eq!(Instruction::InvokeStatic(99).stack_effect(&pool), None);
    }

    #[test]
    fn test_map_target() {
        let shifted = Instruction::Jmp(Label(3)).map_target(|Label(i)| Label(i + 2));
        assert_eq!(shifted, Instruction::Jmp(Label(5)));
        assert_eq!(Instruction::Pop.map_target(|_| Label(0)), Instruction::Pop);
    }
}
