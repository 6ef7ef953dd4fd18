//! Activation records

use crate::class::RuntimeClass;
use crate::value::Value;
use crate::{VmError, VmResult};
use std::sync::Arc;

/// One method activation: locals plus its own operand stack
pub(crate) struct Frame {
    /// Class declaring the executing method
    pub class: Arc<RuntimeClass>,
    /// Next instruction
    pub ip: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    /// Create a frame with the arguments in the leading local slots
    pub fn new(class: Arc<RuntimeClass>, max_locals: usize, args: Vec<Value>) -> Self {
        let mut locals = args;
        if locals.len() < max_locals {
            locals.resize(max_locals, Value::Null);
        }
        Self {
            class,
            ip: 0,
            locals,
            stack: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop `count` values, returned in push order
    pub fn pop_n(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    #[inline]
    pub fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    pub fn local(&self, index: u16) -> VmResult<Value> {
        self.locals
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| VmError::TypeError(format!("local {} out of range", index)))
    }

    pub fn set_local(&mut self, index: u16, value: Value) -> VmResult<()> {
        match self.locals.get_mut(usize::from(index)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::TypeError(format!("local {} out of range", index))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{BootstrapClassLoader, ClassLoader, LoaderId};
    use std::sync::Weak;
    use umbra_bytecode::ClassFile;

    fn empty_class() -> Arc<RuntimeClass> {
        let loader: Weak<dyn ClassLoader> = Weak::<BootstrapClassLoader>::new();
        let file = ClassFile::new("t.Empty", None);
        RuntimeClass::define(file, None, loader, LoaderId::next(), false, None).unwrap()
    }

    #[test]
    fn test_pop_n_keeps_order() {
        let mut frame = Frame::new(empty_class(), 0, Vec::new());
        frame.push(Value::Int(1));
        frame.push(Value::Int(2));
        frame.push(Value::Int(3));
        assert_eq!(frame.pop_n(2).unwrap(), vec![Value::Int(2), Value::Int(3)]);
        assert!(matches!(frame.pop_n(2), Err(VmError::StackUnderflow)));
        assert_eq!(frame.pop().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_locals_padded() {
        let mut frame = Frame::new(empty_class(), 3, vec![Value::Int(7)]);
        assert_eq!(frame.local(0).unwrap(), Value::Int(7));
        assert_eq!(frame.local(2).unwrap(), Value::Null);
        frame.set_local(1, Value::Bool(true)).unwrap();
        assert_eq!(frame.local(1).unwrap(), Value::Bool(true));
        assert!(frame.local(3).is_err());
    }
}
