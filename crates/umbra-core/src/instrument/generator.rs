//! Synthesized method bodies

use super::{TransformError, MARKER_FIELD_NAME};
use umbra_bytecode::{
    access, encode_code, CodeBuilder, ConstantPool, Instruction, MethodDef, MethodDescriptor,
    CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME,
};

/// What a dispatch stub routes
pub(super) struct StubTarget<'a> {
    /// Declaring class
    pub class_name: &'a str,
    /// Name reported in the call record
    pub record_name: &'a str,
    /// Method holding the original body
    pub direct_name: &'a str,
    /// Shared descriptor of entry and direct method
    pub descriptor: &'a str,
    pub signature: &'a MethodDescriptor,
    pub is_static: bool,
    /// No original body to fall back on; every call goes to the handler
    pub always_dispatch: bool,
}

impl StubTarget<'_> {
    fn first_arg_local(&self) -> u16 {
        u16::from(!self.is_static)
    }

    fn load_receiver_or_null(&self, code: &mut CodeBuilder<'_>) {
        if self.is_static {
            code.emit(Instruction::ConstNull);
        } else {
            code.load_local(0);
        }
    }

    /// Local slots used by the stub: receiver plus one per parameter
    pub fn locals(&self) -> u16 {
        self.first_arg_local() + self.signature.arg_count() as u16
    }
}

/// Emit the dispatch stub
///
/// ```text
///     [instance] LOAD_LOCAL 0; GET_FIELD marker; INSTANCE_OF C; JMP_IF_TRUE clear
///     this|null; SHOULD_CALL_DIRECTLY; JMP_IF_FALSE handler
/// direct:
///     this? args...; INVOKE_SPECIAL|INVOKE_STATIC direct; RETURN
/// clear:
///     [instance] LOAD_LOCAL 0; CONST_NULL; PUT_FIELD marker; JMP direct
/// handler:
///     class, name, this|null, type names[], args[]; METHOD_INVOKED; UNBOX?; RETURN
/// ```
///
/// Stubs for native methods consist of the handler block alone.
pub(super) fn emit_dispatch_stub(code: &mut CodeBuilder<'_>, target: &StubTarget<'_>) {
    let direct = code.new_label();
    let clear = code.new_label();
    let handler = code.new_label();
    let arg_count = target.signature.arg_count();
    let first_arg = target.first_arg_local();

    if !target.always_dispatch {
        if !target.is_static {
            code.load_local(0)
                .get_field(target.class_name, MARKER_FIELD_NAME)
                .instance_of(target.class_name)
                .emit(Instruction::JmpIfTrue(clear));
        }
        target.load_receiver_or_null(code);
        code.emit(Instruction::ShouldCallDirectly)
            .emit(Instruction::JmpIfFalse(handler));

        code.mark(direct);
        if !target.is_static {
            code.load_local(0);
        }
        for i in 0..arg_count {
            code.load_local(first_arg + i as u16);
        }
        if target.is_static {
            code.invoke_static(target.class_name, target.direct_name, target.descriptor);
        } else {
            code.invoke_special(target.class_name, target.direct_name, target.descriptor);
        }
        emit_return(code, target.signature);

        if !target.is_static {
            code.mark(clear);
            code.load_local(0)
                .emit(Instruction::ConstNull)
                .put_field(target.class_name, MARKER_FIELD_NAME)
                .emit(Instruction::Jmp(direct));
        }
    }

    code.mark(handler);
    code.const_class(target.class_name).const_str(target.record_name);
    target.load_receiver_or_null(code);

    code.const_i32(arg_count as i32).emit(Instruction::NewArray);
    for (i, name) in target.signature.param_type_names().iter().enumerate() {
        code.emit(Instruction::Dup)
            .const_i32(i as i32)
            .const_str(name)
            .emit(Instruction::ArrayStore);
    }

    code.const_i32(arg_count as i32).emit(Instruction::NewArray);
    for i in 0..arg_count {
        code.emit(Instruction::Dup)
            .const_i32(i as i32)
            .load_local(first_arg + i as u16)
            .emit(Instruction::ArrayStore);
    }

    code.emit(Instruction::MethodInvoked);
    if target.signature.ret.is_void() {
        code.emit(Instruction::Pop).emit(Instruction::ReturnVoid);
    } else {
        if let Some(tag) = target.signature.ret.primitive_tag() {
            code.emit(Instruction::Unbox(tag));
        }
        code.emit(Instruction::Return);
    }
}

fn emit_return(code: &mut CodeBuilder<'_>, signature: &MethodDescriptor) {
    if signature.ret.is_void() {
        code.emit(Instruction::ReturnVoid);
    } else {
        code.emit(Instruction::Return);
    }
}

/// Entry method replacing an ordinary method under its original name
pub(super) fn entry_method(
    pool: &mut ConstantPool,
    class_name: &str,
    original: &MethodDef,
) -> Result<MethodDef, TransformError> {
    let signature = original
        .parsed_descriptor()
        .map_err(|source| TransformError::Descriptor {
            member: format!("{}.{}", class_name, original.name),
            source,
        })?;
    let direct_name = super::direct_method_name(class_name, &original.name);
    let target = StubTarget {
        class_name,
        record_name: &original.name,
        direct_name: &direct_name,
        descriptor: &original.descriptor,
        signature: &signature,
        is_static: original.is_static(),
        always_dispatch: original.is_native(),
    };

    let mut code = CodeBuilder::new(pool);
    emit_dispatch_stub(&mut code, &target);
    let instructions = code.finish()?;

    Ok(MethodDef {
        name: original.name.clone(),
        descriptor: original.descriptor.clone(),
        access: original.access & !(access::NATIVE | access::ABSTRACT),
        exceptions: original.exceptions.clone(),
        max_locals: target.locals(),
        code: encode_code(&instructions),
    })
}

/// Static initializer that only notifies the dispatch handler
pub(super) fn class_initializing_stub(
    pool: &mut ConstantPool,
    class_name: &str,
) -> Result<MethodDef, TransformError> {
    let mut code = CodeBuilder::new(pool);
    code.const_class(class_name)
        .emit(Instruction::ClassInitializing)
        .emit(Instruction::ReturnVoid);
    let instructions = code.finish()?;

    Ok(MethodDef {
        name: STATIC_INITIALIZER_NAME.to_string(),
        descriptor: "()V".to_string(),
        access: access::STATIC,
        exceptions: Vec::new(),
        max_locals: 0,
        code: encode_code(&instructions),
    })
}

/// Public no-argument constructor performing superclass construction only
pub(super) fn default_constructor(
    pool: &mut ConstantPool,
    super_name: Option<&str>,
) -> Result<MethodDef, TransformError> {
    let mut code = CodeBuilder::new(pool);
    if let Some(super_name) = super_name {
        code.load_local(0)
            .invoke_special(super_name, CONSTRUCTOR_NAME, "()V");
    }
    code.emit(Instruction::ReturnVoid);
    let instructions = code.finish()?;

    Ok(MethodDef {
        name: CONSTRUCTOR_NAME.to_string(),
        descriptor: "()V".to_string(),
        access: access::PUBLIC,
        exceptions: Vec::new(),
        max_locals: 1,
        code: encode_code(&instructions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_bytecode::decode_code;

    fn method(name: &str, descriptor: &str, flags: u16) -> MethodDef {
        MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: flags,
            exceptions: vec!["t.Failure".to_string()],
            max_locals: 4,
            code: Vec::new(),
        }
    }

    #[test]
    fn test_entry_method_strips_native() {
        let mut pool = ConstantPool::new();
        let native = method("poke", "(TI)T", access::PUBLIC | access::NATIVE);
        let entry = entry_method(&mut pool, "t.Widget", &native).unwrap();
        assert_eq!(entry.name, "poke");
        assert_eq!(entry.access, access::PUBLIC);
        assert_eq!(entry.exceptions, vec!["t.Failure".to_string()]);
        assert_eq!(entry.max_locals, 3);
    }

    #[test]
    fn test_native_entry_always_dispatches() {
        let mut pool = ConstantPool::new();
        let native = method("poke", "()I", access::PUBLIC | access::NATIVE);
        let entry = entry_method(&mut pool, "t.Widget", &native).unwrap();
        let code = decode_code(&entry.code).unwrap();
        assert!(!code.iter().any(|i| matches!(
            i,
            Instruction::ShouldCallDirectly
                | Instruction::InvokeSpecial(_)
                | Instruction::GetField(_)
        )));
        assert!(code.contains(&Instruction::MethodInvoked));
    }

    #[test]
    fn test_static_entry_has_no_marker_check() {
        let mut pool = ConstantPool::new();
        let entry =
            entry_method(&mut pool, "t.Widget", &method("count", "()I", access::STATIC)).unwrap();
        let code = decode_code(&entry.code).unwrap();
        assert_eq!(code[0], Instruction::ConstNull);
        assert_eq!(code[1], Instruction::ShouldCallDirectly);
        assert!(!code
            .iter()
            .any(|i| matches!(i, Instruction::GetField(_) | Instruction::PutField(_))));
        // int return is unboxed before returning
        assert_eq!(code[code.len() - 2], Instruction::Unbox(2));
        assert_eq!(entry.max_locals, 0);
    }

    #[test]
    fn test_void_entry_discards_handler_result() {
        let mut pool = ConstantPool::new();
        let entry =
            entry_method(&mut pool, "t.Widget", &method("tick", "(J)V", access::PUBLIC)).unwrap();
        let code = decode_code(&entry.code).unwrap();
        assert_eq!(
            &code[code.len() - 3..],
            &[Instruction::MethodInvoked, Instruction::Pop, Instruction::ReturnVoid]
        );
    }

    #[test]
    fn test_class_initializing_stub() {
        let mut pool = ConstantPool::new();
        let clinit = class_initializing_stub(&mut pool, "t.Widget").unwrap();
        let code = decode_code(&clinit.code).unwrap();
        assert_eq!(code.len(), 3);
        assert_eq!(code[1], Instruction::ClassInitializing);
        assert_eq!(pool.class(0), Some("t.Widget"));
    }
}
