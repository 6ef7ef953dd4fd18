//! Instruction interpreter

use super::frame::Frame;
use super::Vm;
use crate::class::RuntimeClass;
use crate::dispatch::{CallRecord, DispatchError, DispatchHandler};
use crate::object::{Array, Object};
use crate::value::Value;
use crate::{VmError, VmResult};
use std::sync::Arc;
use umbra_bytecode::{Instruction, MethodDescriptor, TypeDesc, CONSTRUCTOR_NAME};

/// Decrements the call depth when an activation ends
struct DepthGuard<'a> {
    vm: &'a Vm,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.vm.depth.set(self.vm.depth.get().saturating_sub(1));
    }
}

/// Outcome of one instruction
enum Step {
    Continue,
    Return(Value),
}

impl Vm {
    /// Execute method `index` of `class` with the receiver (if any) and
    /// arguments in `args`
    pub(crate) fn execute(
        &self,
        class: &Arc<RuntimeClass>,
        index: usize,
        args: Vec<Value>,
    ) -> VmResult<Value> {
        let method = class
            .method(index)
            .ok_or_else(|| VmError::NoSuchMethod(format!("{}#{}", class.name(), index)))?;
        if method.is_native() {
            return Err(VmError::UnsatisfiedLink(format!(
                "{}.{}{}",
                class.name(),
                method.name,
                method.descriptor
            )));
        }
        if method.is_abstract() {
            return Err(VmError::AbstractMethod(format!(
                "{}.{}{}",
                class.name(),
                method.name,
                method.descriptor
            )));
        }
        let expected = method.signature.arg_count() + usize::from(!method.is_static());
        if args.len() != expected {
            return Err(VmError::TypeError(format!(
                "{}.{} expects {} arguments, got {}",
                class.name(),
                method.name,
                expected,
                args.len()
            )));
        }

        if self.depth.get() >= self.options.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        self.depth.set(self.depth.get() + 1);
        let _guard = DepthGuard { vm: self };

        let mut frame = Frame::new(Arc::clone(class), usize::from(method.max_locals), args);
        loop {
            let instruction = *method.code.get(frame.ip).ok_or_else(|| {
                VmError::TypeError(format!(
                    "{}.{} ran past the end of its code",
                    class.name(),
                    method.name
                ))
            })?;
            frame.ip += 1;
            if let Step::Return(value) = self.step(&mut frame, instruction)? {
                return Ok(value);
            }
        }
    }

    fn step(&self, frame: &mut Frame, instruction: Instruction) -> VmResult<Step> {
        use Instruction as I;
        match instruction {
            // ===== Stack =====
            I::Nop => {}
            I::Pop => {
                frame.pop()?;
            }
            I::Dup => {
                let top = frame.peek()?.clone();
                frame.push(top);
            }
            I::Swap => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(b);
                frame.push(a);
            }

            // ===== Constants =====
            I::ConstNull => frame.push(Value::Null),
            I::ConstTrue => frame.push(Value::Bool(true)),
            I::ConstFalse => frame.push(Value::Bool(false)),
            I::ConstI32(v) => frame.push(Value::Int(v)),
            I::ConstI64(v) => frame.push(Value::Long(v)),
            I::ConstF64(v) => frame.push(Value::Double(v)),
            I::ConstStr(idx) => {
                let s = frame
                    .class
                    .constants()
                    .string(idx)
                    .ok_or_else(|| bad_constant("string", idx))?;
                let value = Value::string(s);
                frame.push(value);
            }
            I::ConstClass(idx) => {
                let class = self.op_resolve_class_ref(frame, idx)?;
                frame.push(Value::Class(class));
            }

            // ===== Locals =====
            I::LoadLocal(index) => {
                let value = frame.local(index)?;
                frame.push(value);
            }
            I::StoreLocal(index) => {
                let value = frame.pop()?;
                frame.set_local(index, value)?;
            }

            // ===== Arithmetic =====
            I::Iadd => self.op_integer(frame, i32::wrapping_add, i64::wrapping_add)?,
            I::Isub => self.op_integer(frame, i32::wrapping_sub, i64::wrapping_sub)?,
            I::Imul => self.op_integer(frame, i32::wrapping_mul, i64::wrapping_mul)?,
            I::Idiv => self.op_integer_checked(frame, i32::wrapping_div, i64::wrapping_div)?,
            I::Imod => self.op_integer_checked(frame, i32::wrapping_rem, i64::wrapping_rem)?,
            I::Ineg => {
                let value = match frame.pop()? {
                    Value::Long(l) => Value::Long(l.wrapping_neg()),
                    other => Value::Int(other.as_i32()?.wrapping_neg()),
                };
                frame.push(value);
            }
            I::Fadd => self.op_float(frame, |a, b| a + b)?,
            I::Fsub => self.op_float(frame, |a, b| a - b)?,
            I::Fmul => self.op_float(frame, |a, b| a * b)?,
            I::Fdiv => self.op_float(frame, |a, b| a / b)?,
            I::Fneg => {
                let value = frame.pop()?.as_f64()?;
                frame.push(Value::Double(-value));
            }

            // ===== Comparison =====
            I::Ieq => self.op_compare(frame, |a, b| a == b)?,
            I::Ine => self.op_compare(frame, |a, b| a != b)?,
            I::Ilt => self.op_compare(frame, |a, b| a < b)?,
            I::Ile => self.op_compare(frame, |a, b| a <= b)?,
            I::Igt => self.op_compare(frame, |a, b| a > b)?,
            I::Ige => self.op_compare(frame, |a, b| a >= b)?,
            I::Eq | I::Ne => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(Value::Bool((a == b) == matches!(instruction, I::Eq)));
            }
            I::Not => {
                let value = frame.pop()?.as_bool()?;
                frame.push(Value::Bool(!value));
            }

            // ===== Strings =====
            I::Sconcat => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(Value::string(format!("{}{}", a, b)));
            }
            I::Slen => {
                let len = frame.pop()?.as_str()?.chars().count();
                frame.push(Value::Int(len as i32));
            }
            I::Supper => {
                let upper = frame.pop()?.as_str()?.to_uppercase();
                frame.push(Value::string(upper));
            }
            I::ToString => {
                let value = frame.pop()?;
                frame.push(Value::string(value.to_display_string()));
            }

            // ===== Control flow =====
            I::Jmp(target) => frame.ip = target.0,
            I::JmpIfFalse(target) => {
                if !frame.pop()?.as_bool()? {
                    frame.ip = target.0;
                }
            }
            I::JmpIfTrue(target) => {
                if frame.pop()?.as_bool()? {
                    frame.ip = target.0;
                }
            }
            I::JmpIfNull(target) => {
                if frame.pop()?.is_null() {
                    frame.ip = target.0;
                }
            }
            I::JmpIfNotNull(target) => {
                if !frame.pop()?.is_null() {
                    frame.ip = target.0;
                }
            }
            I::Return => return Ok(Step::Return(frame.pop()?)),
            I::ReturnVoid => return Ok(Step::Return(Value::Null)),
            I::Throw => return Err(VmError::Thrown(frame.pop()?)),

            // ===== Calls =====
            I::InvokeVirtual(idx) => self.op_invoke_virtual(frame, idx)?,
            I::InvokeSpecial(idx) => self.op_invoke_special(frame, idx)?,
            I::InvokeStatic(idx) => self.op_invoke_static(frame, idx)?,

            // ===== Objects =====
            I::New(idx) => {
                let class = self.op_resolve_class_ref(frame, idx)?;
                self.initialize_class(&class)?;
                frame.push(Value::Object(Arc::new(Object::new(class))));
            }
            I::GetField(idx) => {
                let slot = self.op_field_slot(frame, idx)?;
                let value = frame.pop()?.as_object()?.get_field(slot)?;
                frame.push(value);
            }
            I::PutField(idx) => {
                let slot = self.op_field_slot(frame, idx)?;
                let value = frame.pop()?;
                frame.pop()?.as_object()?.set_field(slot, value)?;
            }
            I::GetStatic(idx) => {
                let (owner, slot) = self.op_static_slot(frame, idx)?;
                let value = owner.get_static(slot).ok_or_else(|| {
                    VmError::NoSuchField(format!("{} static slot {}", owner.name(), slot))
                })?;
                frame.push(value);
            }
            I::PutStatic(idx) => {
                let (owner, slot) = self.op_static_slot(frame, idx)?;
                let value = frame.pop()?;
                if !owner.set_static(slot, value) {
                    return Err(VmError::NoSuchField(format!(
                        "{} static slot {}",
                        owner.name(),
                        slot
                    )));
                }
            }
            I::InstanceOf(idx) => self.op_instance_of(frame, idx)?,
            I::GetClass => {
                let class = Arc::clone(frame.pop()?.as_object()?.class());
                frame.push(Value::Class(class));
            }

            // ===== Arrays =====
            I::NewArray => {
                let len = frame.pop()?.as_i32()?;
                let len = usize::try_from(len).map_err(|_| {
                    VmError::Thrown(Value::string(format!("NegativeArraySize: {}", len)))
                })?;
                frame.push(Value::Array(Arc::new(Array::new(len))));
            }
            I::ArrayLoad => {
                let index = frame.pop()?.as_i32()?;
                let value = frame.pop()?.as_array()?.get(index)?;
                frame.push(value);
            }
            I::ArrayStore => {
                let value = frame.pop()?;
                let index = frame.pop()?.as_i32()?;
                frame.pop()?.as_array()?.set(index, value)?;
            }
            I::ArrayLen => {
                let len = frame.pop()?.as_array()?.len();
                frame.push(Value::Int(len as i32));
            }

            // ===== Dispatch intrinsics =====
            I::ShouldCallDirectly => {
                let receiver = frame.pop()?;
                let direct = self.op_handler(frame)?.should_call_directly(&receiver);
                frame.push(Value::Bool(direct));
            }
            I::MethodInvoked => self.op_method_invoked(frame)?,
            I::ClassInitializing => {
                let class = Arc::clone(frame.pop()?.as_class()?);
                let handler = Arc::clone(self.op_handler(frame)?);
                handler.class_initializing(self, &class)?;
            }
            I::Unbox(tag) => {
                let ty = TypeDesc::from_primitive_tag(tag)
                    .ok_or_else(|| VmError::TypeError(format!("invalid primitive tag {}", tag)))?;
                let value = frame.pop()?.unbox(&ty)?;
                frame.push(value);
            }
        }
        Ok(Step::Continue)
    }

    // ===== Arithmetic helpers =====

    /// IADD/ISUB/IMUL - int op int stays int, anything involving a long is long
    fn op_integer(
        &self,
        frame: &mut Frame,
        int_op: fn(i32, i32) -> i32,
        long_op: fn(i64, i64) -> i64,
    ) -> VmResult<()> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(*x, *y)),
            _ => Value::Long(long_op(a.as_i64()?, b.as_i64()?)),
        };
        frame.push(result);
        Ok(())
    }

    /// IDIV/IMOD - like [`Self::op_integer`], failing on a zero divisor
    fn op_integer_checked(
        &self,
        frame: &mut Frame,
        int_op: fn(i32, i32) -> i32,
        long_op: fn(i64, i64) -> i64,
    ) -> VmResult<()> {
        if frame.peek()?.as_i64()? == 0 {
            return Err(VmError::Thrown(Value::string("ArithmeticException: / by zero")));
        }
        self.op_integer(frame, int_op, long_op)
    }

    fn op_float(&self, frame: &mut Frame, op: fn(f64, f64) -> f64) -> VmResult<()> {
        let b = frame.pop()?.as_f64()?;
        let a = frame.pop()?.as_f64()?;
        frame.push(Value::Double(op(a, b)));
        Ok(())
    }

    fn op_compare(&self, frame: &mut Frame, op: fn(i64, i64) -> bool) -> VmResult<()> {
        let b = frame.pop()?.as_i64()?;
        let a = frame.pop()?.as_i64()?;
        frame.push(Value::Bool(op(a, b)));
        Ok(())
    }

    // ===== Resolution =====

    /// Resolve a class name through the defining loader of the current class
    fn resolve_class(
        &self,
        current: &Arc<RuntimeClass>,
        name: &str,
    ) -> VmResult<Arc<RuntimeClass>> {
        if current.name() == name {
            return Ok(Arc::clone(current));
        }
        match current.loader() {
            Some(loader) => Ok(loader.load_class(name)?),
            None => Ok(self.loader.load_class(name)?),
        }
    }

    fn op_resolve_class_ref(&self, frame: &Frame, idx: u32) -> VmResult<Arc<RuntimeClass>> {
        let name = frame
            .class
            .constants()
            .class(idx)
            .ok_or_else(|| bad_constant("class", idx))?;
        self.resolve_class(&frame.class, name)
    }

    fn op_field_slot(&self, frame: &Frame, idx: u32) -> VmResult<usize> {
        let field = frame
            .class
            .constants()
            .field(idx)
            .ok_or_else(|| bad_constant("field", idx))?;
        let owner = self.resolve_class(&frame.class, &field.class)?;
        owner
            .resolve_field(&field.name)
            .ok_or_else(|| VmError::NoSuchField(format!("{}.{}", field.class, field.name)))
    }

    fn op_static_slot(&self, frame: &Frame, idx: u32) -> VmResult<(Arc<RuntimeClass>, usize)> {
        let field = frame
            .class
            .constants()
            .field(idx)
            .ok_or_else(|| bad_constant("field", idx))?;
        let class = self.resolve_class(&frame.class, &field.class)?;
        self.initialize_class(&class)?;
        class
            .resolve_static(&field.name)
            .ok_or_else(|| VmError::NoSuchField(format!("{}.{}", field.class, field.name)))
    }

    /// INSTANCE_OF - null and non-objects are never instances
    fn op_instance_of(&self, frame: &mut Frame, idx: u32) -> VmResult<()> {
        let value = frame.pop()?;
        let result = match &value {
            Value::Object(object) => {
                let target = self.op_resolve_class_ref(frame, idx)?;
                object.class().is_subclass_of(&target)
            }
            _ => false,
        };
        frame.push(Value::Bool(result));
        Ok(())
    }

    // ===== Calls =====

    /// Pop call operands: the receiver (unless static) followed by the
    /// declared arguments, in order
    fn pop_call_args(
        &self,
        frame: &mut Frame,
        descriptor: &str,
        has_receiver: bool,
    ) -> VmResult<Vec<Value>> {
        let signature = MethodDescriptor::parse(descriptor)
            .map_err(|e| VmError::TypeError(format!("bad call descriptor: {}", e)))?;
        frame.pop_n(signature.arg_count() + usize::from(has_receiver))
    }

    fn push_result(frame: &mut Frame, descriptor: &str, result: Value) {
        if !descriptor.ends_with(")V") {
            frame.push(result);
        }
    }

    /// INVOKE_VIRTUAL - resolved from the receiver's class upward
    fn op_invoke_virtual(&self, frame: &mut Frame, idx: u32) -> VmResult<()> {
        let method = frame
            .class
            .constants()
            .method(idx)
            .ok_or_else(|| bad_constant("method", idx))?
            .clone();
        let args = self.pop_call_args(frame, &method.descriptor, true)?;
        let receiver_class = Arc::clone(args[0].as_object()?.class());
        let (owner, index) = receiver_class
            .resolve_method(&method.name, &method.descriptor)
            .ok_or_else(|| {
                VmError::NoSuchMethod(format!(
                    "{}.{}{}",
                    receiver_class.name(),
                    method.name,
                    method.descriptor
                ))
            })?;
        let result = self.execute(&owner, index, args)?;
        Self::push_result(frame, &method.descriptor, result);
        Ok(())
    }

    /// INVOKE_SPECIAL - resolved from the named class; constructors are
    /// looked up on that class only
    fn op_invoke_special(&self, frame: &mut Frame, idx: u32) -> VmResult<()> {
        let method = frame
            .class
            .constants()
            .method(idx)
            .ok_or_else(|| bad_constant("method", idx))?
            .clone();
        let args = self.pop_call_args(frame, &method.descriptor, true)?;
        args[0].as_object()?;
        let class = self.resolve_class(&frame.class, &method.class)?;
        let target = if method.name == CONSTRUCTOR_NAME {
            class
                .declared_method(&method.name, &method.descriptor)
                .map(|index| (Arc::clone(&class), index))
        } else {
            class.resolve_method(&method.name, &method.descriptor)
        };
        let (owner, index) = target.ok_or_else(|| {
            VmError::NoSuchMethod(format!("{}.{}{}", method.class, method.name, method.descriptor))
        })?;
        let result = self.execute(&owner, index, args)?;
        Self::push_result(frame, &method.descriptor, result);
        Ok(())
    }

    /// INVOKE_STATIC - initializes the named class, then resolves upward
    fn op_invoke_static(&self, frame: &mut Frame, idx: u32) -> VmResult<()> {
        let method = frame
            .class
            .constants()
            .method(idx)
            .ok_or_else(|| bad_constant("method", idx))?
            .clone();
        let args = self.pop_call_args(frame, &method.descriptor, false)?;
        let class = self.resolve_class(&frame.class, &method.class)?;
        self.initialize_class(&class)?;
        let (owner, index) = class
            .resolve_method(&method.name, &method.descriptor)
            .ok_or_else(|| {
                VmError::NoSuchMethod(format!(
                    "{}.{}{}",
                    method.class, method.name, method.descriptor
                ))
            })?;
        let result = self.execute(&owner, index, args)?;
        Self::push_result(frame, &method.descriptor, result);
        Ok(())
    }

    // ===== Dispatch =====

    fn op_handler<'f>(&self, frame: &'f Frame) -> VmResult<&'f Arc<dyn DispatchHandler>> {
        frame
            .class
            .handler()
            .ok_or_else(|| DispatchError::NoHandler(frame.class.name().to_string()).into())
    }

    /// METHOD_INVOKED - pops class, name, receiver, type names and
    /// arguments (pushed in that order) and pushes the handler's result
    fn op_method_invoked(&self, frame: &mut Frame) -> VmResult<()> {
        let args = frame.pop()?;
        let types = frame.pop()?;
        let receiver = frame.pop()?;
        let name = frame.pop()?;
        let class = frame.pop()?;

        let invalid = |what: &str| DispatchError::InvalidCallRecord(what.to_string());
        let class = Arc::clone(class.as_class().map_err(|_| invalid("class token"))?);
        let method_name = name.as_str().map_err(|_| invalid("method name"))?.to_string();
        let param_types = types
            .as_array()
            .map_err(|_| invalid("parameter types"))?
            .to_vec()
            .iter()
            .map(|t| t.as_str().map(str::to_string))
            .collect::<VmResult<Vec<_>>>()
            .map_err(|_| invalid("parameter type name"))?;
        let args = args.as_array().map_err(|_| invalid("arguments"))?.to_vec();

        let call = CallRecord {
            class,
            method_name,
            receiver,
            param_types,
            args,
        };
        let handler = Arc::clone(self.op_handler(frame)?);
        let result = handler.method_invoked(self, &call)?;
        frame.push(result);
        Ok(())
    }
}

fn bad_constant(kind: &str, index: u32) -> VmError {
    VmError::TypeError(format!("invalid {} constant {}", kind, index))
}
