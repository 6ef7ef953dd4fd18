//! Human-readable class listings

use crate::class::{access, ClassFile, MethodDef};
use crate::code::{decode_code, Instruction};
use crate::constants::ConstantPool;
use std::fmt::Write;

/// Render a class as text, one instruction per line
///
/// Undecodable method bodies are listed with the decode error in place of
/// their instructions.
pub fn disassemble(class: &ClassFile) -> String {
    let mut out = String::new();

    let _ = write!(out, "class {}", class.name);
    if let Some(super_name) = &class.super_name {
        let _ = write!(out, " extends {}", super_name);
    }
    let _ = writeln!(out, " [{}]", access_names(class.access));
    for annotation in &class.annotations {
        let _ = writeln!(out, "  @{}", annotation);
    }

    for field in &class.fields {
        let _ = writeln!(
            out,
            "  field {}: {} [{}]",
            field.name,
            field.descriptor,
            access_names(field.access)
        );
    }

    for method in &class.methods {
        write_method(&mut out, &class.constants, method);
    }

    out
}

fn write_method(out: &mut String, pool: &ConstantPool, method: &MethodDef) {
    let _ = write!(
        out,
        "  method {}{} [{}]",
        method.name,
        method.descriptor,
        access_names(method.access)
    );
    if !method.exceptions.is_empty() {
        let _ = write!(out, " throws {}", method.exceptions.join(", "));
    }
    let _ = writeln!(out);

    if method.code.is_empty() {
        return;
    }
    match decode_code(&method.code) {
        Ok(code) => {
            for (index, instruction) in code.iter().enumerate() {
                let _ = writeln!(out, "    {:04}: {}", index, render(pool, instruction));
            }
        }
        Err(e) => {
            let _ = writeln!(out, "    <{}>", e);
        }
    }
}

fn render(pool: &ConstantPool, instruction: &Instruction) -> String {
    let name = instruction.opcode().name();
    let missing = || "?".to_string();
    match *instruction {
        Instruction::ConstI32(v) => format!("{} {}", name, v),
        Instruction::ConstI64(v) => format!("{} {}", name, v),
        Instruction::ConstF64(v) => format!("{} {}", name, v),
        Instruction::ConstStr(i) => format!(
            "{} {:?}",
            name,
            pool.string(i).map(str::to_string).unwrap_or_else(missing)
        ),
        Instruction::ConstClass(i) | Instruction::New(i) | Instruction::InstanceOf(i) => format!(
            "{} {}",
            name,
            pool.class(i).map(str::to_string).unwrap_or_else(missing)
        ),
        Instruction::LoadLocal(i) | Instruction::StoreLocal(i) => format!("{} {}", name, i),
        Instruction::GetField(i)
        | Instruction::PutField(i)
        | Instruction::GetStatic(i)
        | Instruction::PutStatic(i) => format!(
            "{} {}",
            name,
            pool.field(i)
                .map(|f| format!("{}.{}", f.class, f.name))
                .unwrap_or_else(missing)
        ),
        Instruction::InvokeVirtual(i)
        | Instruction::InvokeSpecial(i)
        | Instruction::InvokeStatic(i) => {
            format!(
                "{} {}",
                name,
                pool.method(i)
                    .map(|m| format!("{}.{}{}", m.class, m.name, m.descriptor))
                    .unwrap_or_else(missing)
            )
        }
        Instruction::Unbox(tag) => format!("{} {}", name, tag),
        ref other => match other.jump_target() {
            Some(target) => format!("{} -> {:04}", name, target.0),
            None => name.to_string(),
        },
    }
}

fn access_names(flags: u16) -> String {
    const NAMES: [(u16, &str); 8] = [
        (access::PUBLIC, "public"),
        (access::PRIVATE, "private"),
        (access::PROTECTED, "protected"),
        (access::STATIC, "static"),
        (access::FINAL, "final"),
        (access::NATIVE, "native"),
        (access::ABSTRACT, "abstract"),
        (access::SYNTHETIC, "synthetic"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}
