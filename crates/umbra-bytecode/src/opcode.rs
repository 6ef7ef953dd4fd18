//! Bytecode opcodes for the Umbra class format
//!
//! This module defines the complete instruction set executed by the Umbra
//! interpreter, including the dispatch intrinsics emitted by the method
//! transformer.

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte instructions. Some opcodes take additional operands
/// that follow the opcode byte in the bytecode stream.
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Local variables
/// - 0x20-0x2F: Integer arithmetic
/// - 0x30-0x3F: Float arithmetic
/// - 0x50-0x5F: Integer comparison
/// - 0x70-0x7F: Generic comparison & logical
/// - 0x80-0x8F: String operations
/// - 0x90-0x9F: Control flow
/// - 0xA0-0xAF: Method invocation
/// - 0xB0-0xBF: Object operations
/// - 0xC0-0xCF: Array operations
/// - 0xE0-0xEF: Error handling
/// - 0xF0-0xFF: Dispatch intrinsics (only emitted by the transformer)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Swap top two stack values
    Swap = 0x03,
    /// Push null constant
    ConstNull = 0x04,
    /// Push true constant
    ConstTrue = 0x05,
    /// Push false constant
    ConstFalse = 0x06,
    /// Push 32-bit integer constant (operand: i32)
    ConstI32 = 0x07,
    /// Push 64-bit float constant (operand: f64)
    ConstF64 = 0x08,
    /// Push string constant from pool (operand: u32 index)
    ConstStr = 0x09,
    /// Push 64-bit integer constant (operand: i64)
    ConstI64 = 0x0A,
    /// Push class token for a class reference (operand: u32 class index)
    ConstClass = 0x0B,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load local variable onto stack (operand: u16 index)
    LoadLocal = 0x10,
    /// Store top of stack to local variable (operand: u16 index)
    StoreLocal = 0x11,

    // ===== Integer Arithmetic (0x20-0x2F) =====
    /// Integer addition: pop b, pop a, push a + b
    Iadd = 0x20,
    /// Integer subtraction: pop b, pop a, push a - b
    Isub = 0x21,
    /// Integer multiplication: pop b, pop a, push a * b
    Imul = 0x22,
    /// Integer division: pop b, pop a, push a / b
    Idiv = 0x23,
    /// Integer modulo: pop b, pop a, push a % b
    Imod = 0x24,
    /// Integer negation: pop a, push -a
    Ineg = 0x25,

    // ===== Float Arithmetic (0x30-0x3F) =====
    /// Float addition: pop b, pop a, push a + b
    Fadd = 0x30,
    /// Float subtraction: pop b, pop a, push a - b
    Fsub = 0x31,
    /// Float multiplication: pop b, pop a, push a * b
    Fmul = 0x32,
    /// Float division: pop b, pop a, push a / b
    Fdiv = 0x33,
    /// Float negation: pop a, push -a
    Fneg = 0x34,

    // ===== Integer Comparison (0x50-0x5F) =====
    /// Integer equality: pop b, pop a, push a == b
    Ieq = 0x50,
    /// Integer inequality: pop b, pop a, push a != b
    Ine = 0x51,
    /// Integer less than: pop b, pop a, push a < b
    Ilt = 0x52,
    /// Integer less or equal: pop b, pop a, push a <= b
    Ile = 0x53,
    /// Integer greater than: pop b, pop a, push a > b
    Igt = 0x54,
    /// Integer greater or equal: pop b, pop a, push a >= b
    Ige = 0x55,

    // ===== Generic Comparison & Logical (0x70-0x7F) =====
    /// Generic equality: pop b, pop a, push a == b (identity for references)
    Eq = 0x70,
    /// Generic inequality: pop b, pop a, push a != b
    Ne = 0x71,
    /// Logical NOT: pop a, push !a
    Not = 0x74,

    // ===== String Operations (0x80-0x8F) =====
    /// String concatenation: pop b, pop a, push str(a) + str(b)
    Sconcat = 0x80,
    /// String length: pop a, push a.length
    Slen = 0x81,
    /// Uppercase conversion: pop a, push upper(a)
    Supper = 0x82,
    /// Convert value to string: pop a, push str(a)
    ToString = 0x88,

    // ===== Control Flow (0x90-0x9F) =====
    /// Unconditional jump (operand: i32 offset)
    Jmp = 0x90,
    /// Jump if false: pop a, if !a jump (operand: i32 offset)
    JmpIfFalse = 0x91,
    /// Jump if true: pop a, if a jump (operand: i32 offset)
    JmpIfTrue = 0x92,
    /// Jump if null: pop a, if a == null jump (operand: i32 offset)
    JmpIfNull = 0x93,
    /// Jump if not null: pop a, if a != null jump (operand: i32 offset)
    JmpIfNotNull = 0x94,

    // ===== Method Invocation (0xA0-0xAF) =====
    /// Virtual call on receiver (operand: u32 method ref)
    InvokeVirtual = 0xA0,
    /// Non-virtual call: constructors, super calls, direct methods (operand: u32 method ref)
    InvokeSpecial = 0xA1,
    /// Static call (operand: u32 method ref)
    InvokeStatic = 0xA2,
    /// Return from method (pop return value)
    Return = 0xA3,
    /// Return from void method
    ReturnVoid = 0xA4,

    // ===== Object Operations (0xB0-0xBF) =====
    /// Allocate an instance (operand: u32 class index)
    New = 0xB0,
    /// Load instance field (operand: u32 field ref)
    GetField = 0xB1,
    /// Store instance field (operand: u32 field ref)
    PutField = 0xB2,
    /// Load static field (operand: u32 field ref)
    GetStatic = 0xB3,
    /// Store static field (operand: u32 field ref)
    PutStatic = 0xB4,
    /// Instance-of test: pop a, push a instanceof C (operand: u32 class index)
    InstanceOf = 0xB5,
    /// Pop object, push its class token
    GetClass = 0xB6,

    // ===== Array Operations (0xC0-0xCF) =====
    /// Pop length, push new array filled with null
    NewArray = 0xC0,
    /// Pop index, pop array, push array[index]
    ArrayLoad = 0xC1,
    /// Pop value, pop index, pop array, store array[index] = value
    ArrayStore = 0xC2,
    /// Pop array, push its length
    ArrayLen = 0xC3,

    // ===== Error Handling (0xE0-0xEF) =====
    /// Pop a value and raise it as a failure
    Throw = 0xE0,

    // ===== Dispatch Intrinsics (0xF0-0xFF) =====
    /// Pop receiver-or-null, push the handler's "call directly" decision
    ShouldCallDirectly = 0xF0,
    /// Pop args, param types, receiver, method name, class; push handler result
    MethodInvoked = 0xF1,
    /// Pop class token and notify the handler that the class is initializing
    ClassInitializing = 0xF2,
    /// Convert top of stack to a primitive type (operand: u8 type tag)
    Unbox = 0xF3,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            // Stack manipulation & constants
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),
            0x03 => Some(Self::Swap),
            0x04 => Some(Self::ConstNull),
            0x05 => Some(Self::ConstTrue),
            0x06 => Some(Self::ConstFalse),
            0x07 => Some(Self::ConstI32),
            0x08 => Some(Self::ConstF64),
            0x09 => Some(Self::ConstStr),
            0x0A => Some(Self::ConstI64),
            0x0B => Some(Self::ConstClass),

            // Local variables
            0x10 => Some(Self::LoadLocal),
            0x11 => Some(Self::StoreLocal),

            // Integer arithmetic
            0x20 => Some(Self::Iadd),
            0x21 => Some(Self::Isub),
            0x22 => Some(Self::Imul),
            0x23 => Some(Self::Idiv),
            0x24 => Some(Self::Imod),
            0x25 => Some(Self::Ineg),

            // Float arithmetic
            0x30 => Some(Self::Fadd),
            0x31 => Some(Self::Fsub),
            0x32 => Some(Self::Fmul),
            0x33 => Some(Self::Fdiv),
            0x34 => Some(Self::Fneg),

            // Integer comparison
            0x50 => Some(Self::Ieq),
            0x51 => Some(Self::Ine),
            0x52 => Some(Self::Ilt),
            0x53 => Some(Self::Ile),
            0x54 => Some(Self::Igt),
            0x55 => Some(Self::Ige),

            // Generic comparison & logical
            0x70 => Some(Self::Eq),
            0x71 => Some(Self::Ne),
            0x74 => Some(Self::Not),

            // Strings
            0x80 => Some(Self::Sconcat),
            0x81 => Some(Self::Slen),
            0x82 => Some(Self::Supper),
            0x88 => Some(Self::ToString),

            // Control flow
            0x90 => Some(Self::Jmp),
            0x91 => Some(Self::JmpIfFalse),
            0x92 => Some(Self::JmpIfTrue),
            0x93 => Some(Self::JmpIfNull),
            0x94 => Some(Self::JmpIfNotNull),

            // Invocation
            0xA0 => Some(Self::InvokeVirtual),
            0xA1 => Some(Self::InvokeSpecial),
            0xA2 => Some(Self::InvokeStatic),
            0xA3 => Some(Self::Return),
            0xA4 => Some(Self::ReturnVoid),

            // Objects
            0xB0 => Some(Self::New),
            0xB1 => Some(Self::GetField),
            0xB2 => Some(Self::PutField),
            0xB3 => Some(Self::GetStatic),
            0xB4 => Some(Self::PutStatic),
            0xB5 => Some(Self::InstanceOf),
            0xB6 => Some(Self::GetClass),

            // Arrays
            0xC0 => Some(Self::NewArray),
            0xC1 => Some(Self::ArrayLoad),
            0xC2 => Some(Self::ArrayStore),
            0xC3 => Some(Self::ArrayLen),

            // Errors
            0xE0 => Some(Self::Throw),

            // Dispatch intrinsics
            0xF0 => Some(Self::ShouldCallDirectly),
            0xF1 => Some(Self::MethodInvoked),
            0xF2 => Some(Self::ClassInitializing),
            0xF3 => Some(Self::Unbox),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::Swap => "SWAP",
            Self::ConstNull => "CONST_NULL",
            Self::ConstTrue => "CONST_TRUE",
            Self::ConstFalse => "CONST_FALSE",
            Self::ConstI32 => "CONST_I32",
            Self::ConstF64 => "CONST_F64",
            Self::ConstStr => "CONST_STR",
            Self::ConstI64 => "CONST_I64",
            Self::ConstClass => "CONST_CLASS",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::StoreLocal => "STORE_LOCAL",
            Self::Iadd => "IADD",
            Self::Isub => "ISUB",
            Self::Imul => "IMUL",
            Self::Idiv => "IDIV",
            Self::Imod => "IMOD",
            Self::Ineg => "INEG",
            Self::Fadd => "FADD",
            Self::Fsub => "FSUB",
            Self::Fmul => "FMUL",
            Self::Fdiv => "FDIV",
            Self::Fneg => "FNEG",
            Self::Ieq => "IEQ",
            Self::Ine => "INE",
            Self::Ilt => "ILT",
            Self::Ile => "ILE",
            Self::Igt => "IGT",
            Self::Ige => "IGE",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Not => "NOT",
            Self::Sconcat => "SCONCAT",
            Self::Slen => "SLEN",
            Self::Supper => "SUPPER",
            Self::ToString => "TO_STRING",
            Self::Jmp => "JMP",
            Self::JmpIfFalse => "JMP_IF_FALSE",
            Self::JmpIfTrue => "JMP_IF_TRUE",
            Self::JmpIfNull => "JMP_IF_NULL",
            Self::JmpIfNotNull => "JMP_IF_NOT_NULL",
            Self::InvokeVirtual => "INVOKE_VIRTUAL",
            Self::InvokeSpecial => "INVOKE_SPECIAL",
            Self::InvokeStatic => "INVOKE_STATIC",
            Self::Return => "RETURN",
            Self::ReturnVoid => "RETURN_VOID",
            Self::New => "NEW",
            Self::GetField => "GET_FIELD",
            Self::PutField => "PUT_FIELD",
            Self::GetStatic => "GET_STATIC",
            Self::PutStatic => "PUT_STATIC",
            Self::InstanceOf => "INSTANCE_OF",
            Self::GetClass => "GET_CLASS",
            Self::NewArray => "NEW_ARRAY",
            Self::ArrayLoad => "ARRAY_LOAD",
            Self::ArrayStore => "ARRAY_STORE",
            Self::ArrayLen => "ARRAY_LEN",
            Self::Throw => "THROW",
            Self::ShouldCallDirectly => "SHOULD_CALL_DIRECTLY",
            Self::MethodInvoked => "METHOD_INVOKED",
            Self::ClassInitializing => "CLASS_INITIALIZING",
            Self::Unbox => "UNBOX",
        }
    }

    /// Size in bytes of the operands following this opcode
    pub fn operand_size(self) -> usize {
        match self {
            Self::Unbox => 1,
            Self::LoadLocal | Self::StoreLocal => 2,
            Self::ConstI32
            | Self::ConstStr
            | Self::ConstClass
            | Self::Jmp
            | Self::JmpIfFalse
            | Self::JmpIfTrue
            | Self::JmpIfNull
            | Self::JmpIfNotNull
            | Self::InvokeVirtual
            | Self::InvokeSpecial
            | Self::InvokeStatic
            | Self::New
            | Self::GetField
            | Self::PutField
            | Self::GetStatic
            | Self::PutStatic
            | Self::InstanceOf => 4,
            Self::ConstF64 | Self::ConstI64 => 8,
            _ => 0,
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jmp | Self::JmpIfFalse | Self::JmpIfTrue | Self::JmpIfNull | Self::JmpIfNotNull
        )
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual | Self::InvokeSpecial | Self::InvokeStatic
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::ReturnVoid)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Self::Jmp | Self::Throw)
    }

    /// Check if this opcode is a dispatch intrinsic
    pub fn is_intrinsic(self) -> bool {
        matches!(
            self,
            Self::ShouldCallDirectly | Self::MethodInvoked | Self::ClassInitializing | Self::Unbox
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0u8..=255 {
            if let Some(opcode) = Opcode::from_u8(byte) {
                assert_eq!(opcode.to_u8(), byte, "opcode {} does not roundtrip", opcode.name());
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x0F), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::InvokeSpecial.name(), "INVOKE_SPECIAL");
        assert_eq!(Opcode::MethodInvoked.name(), "METHOD_INVOKED");
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::Jmp.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(!Opcode::JmpIfFalse.is_terminator());
        assert!(!Opcode::InvokeStatic.is_terminator());
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(Opcode::Nop.operand_size(), 0);
        assert_eq!(Opcode::LoadLocal.operand_size(), 2);
        assert_eq!(Opcode::InvokeVirtual.operand_size(), 4);
        assert_eq!(Opcode::ConstI64.operand_size(), 8);
        assert_eq!(Opcode::Unbox.operand_size(), 1);
    }
}
