//! Stack operations for the VM.
//!
//! Consolidates the pop patterns used by the dispatch loop so underflow
//! handling lives in one place.

use formula_vm_runtime::{ErrorKind, ScriptError, ScriptResult, Value};

/// Typed pop helpers over the operand stack.
pub trait StackOps {
    /// Pop any value; underflow is a runtime error.
    fn pop_value(&mut self) -> ScriptResult<Value>;

    /// Pop two operands as `(a, b)` where `b` was on top.
    fn pop_pair(&mut self) -> ScriptResult<(Value, Value)>;
}

impl StackOps for Vec<Value> {
    #[inline]
    fn pop_value(&mut self) -> ScriptResult<Value> {
        self.pop()
            .ok_or_else(|| ScriptError::new(ErrorKind::RuntimeError, "stack underflow"))
    }

    #[inline]
    fn pop_pair(&mut self) -> ScriptResult<(Value, Value)> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        Ok((a, b))
    }
}
