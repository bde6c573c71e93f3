//! Per-frame operand stack.

use core_types::Value;

use crate::VmError;

/// The operand stack of one frame.
///
/// Underflow is an interpreter fault, never a language-level error.
#[derive(Debug, Default)]
pub struct ValueStack {
    items: Vec<Value>,
}

impl ValueStack {
    /// Create a stack with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Push a value.
    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    /// Pop the top value.
    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.items.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop the top `n` values, returned bottom-first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let at = self
            .items
            .len()
            .checked_sub(n)
            .ok_or(VmError::StackUnderflow)?;
        Ok(self.items.split_off(at))
    }

    /// The value `n` slots below the top (`0` is the top).
    pub fn peek(&self, n: usize) -> Result<&Value, VmError> {
        self.items
            .len()
            .checked_sub(n + 1)
            .and_then(|i| self.items.get(i))
            .ok_or(VmError::StackUnderflow)
    }

    /// Number of values on the stack.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop values above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.items.truncate(depth);
    }

    /// Drop every value.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
