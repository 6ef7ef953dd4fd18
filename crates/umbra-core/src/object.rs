//! Object model
//!
//! An [`Object`] holds its class and one slot per instance field in the
//! class's layout. Slots are guarded by a mutex so values can be shared
//! across threads; locks are only held for the duration of a single read
//! or write.

use crate::class::RuntimeClass;
use crate::value::Value;
use crate::{VmError, VmResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Object instance
pub struct Object {
    class: Arc<RuntimeClass>,
    fields: Mutex<Vec<Value>>,
}

impl Object {
    /// Allocate an instance with every field at its default value
    pub fn new(class: Arc<RuntimeClass>) -> Self {
        let fields = class.field_defaults().to_vec();
        Self {
            class,
            fields: Mutex::new(fields),
        }
    }

    /// Class of this instance
    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.class
    }

    /// Address-based identity
    pub fn identity(&self) -> usize {
        self as *const Self as usize
    }

    /// Read a field slot
    pub fn get_field(&self, slot: usize) -> VmResult<Value> {
        self.fields
            .lock()
            .get(slot)
            .cloned()
            .ok_or_else(|| self.bad_slot(slot))
    }

    /// Write a field slot
    pub fn set_field(&self, slot: usize, value: Value) -> VmResult<()> {
        let mut fields = self.fields.lock();
        match fields.get_mut(slot) {
            Some(field) => {
                *field = value;
                Ok(())
            }
            None => Err(self.bad_slot(slot)),
        }
    }

    /// Number of field slots
    pub fn field_count(&self) -> usize {
        self.fields.lock().len()
    }

    fn bad_slot(&self, slot: usize) -> VmError {
        VmError::NoSuchField(format!("slot {} of {}", slot, self.class.name()))
    }
}

/// Fixed-length array of values
pub struct Array {
    elements: Mutex<Vec<Value>>,
}

impl Array {
    /// Create an array of `len` nulls
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![Value::Null; len])
    }

    /// Create an array from elements
    pub fn from_vec(elements: Vec<Value>) -> Self {
        Self {
            elements: Mutex::new(elements),
        }
    }

    /// Array length
    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    /// Check if the array is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an element
    pub fn get(&self, index: i32) -> VmResult<Value> {
        let elements = self.elements.lock();
        usize::try_from(index)
            .ok()
            .and_then(|i| elements.get(i).cloned())
            .ok_or_else(|| out_of_bounds(index, elements.len()))
    }

    /// Write an element
    pub fn set(&self, index: i32, value: Value) -> VmResult<()> {
        let mut elements = self.elements.lock();
        let len = elements.len();
        match usize::try_from(index).ok().and_then(|i| elements.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(out_of_bounds(index, len)),
        }
    }

    /// Copy out all elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.elements.lock().clone()
    }
}

fn out_of_bounds(index: i32, len: usize) -> VmError {
    VmError::Thrown(Value::string(format!(
        "IndexOutOfBounds: index {} for length {}",
        index, len
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_access() {
        let array = Array::new(2);
        assert_eq!(array.len(), 2);
        array.set(1, Value::Int(9)).unwrap();
        assert_eq!(array.get(1).unwrap(), Value::Int(9));
        assert_eq!(array.get(0).unwrap(), Value::Null);
    }

    #[test]
    fn test_array_out_of_bounds() {
        let array = Array::from_vec(vec![Value::Bool(true)]);
        assert!(matches!(array.get(1), Err(VmError::Thrown(_))));
        assert!(matches!(array.set(-1, Value::Null), Err(VmError::Thrown(_))));
    }

    #[test]
    fn test_empty_array() {
        assert!(Array::new(0).is_empty());
        assert!(Array::new(0).to_vec().is_empty());
    }
}
