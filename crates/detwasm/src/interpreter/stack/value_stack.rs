use alloc::vec::Vec;
use detwasm_types::{ValType, WasmValue};

use super::underflow;
use crate::runtime::{BinaryFn, RawValue, UnaryFn};
use crate::Result;

pub(crate) const STACK_SIZE: usize = 256;

/// Operands of all active frames, untyped.
#[derive(Debug)]
pub(crate) struct ValueStack(Vec<RawValue>);

impl Default for ValueStack {
    fn default() -> Self {
        Self(Vec::with_capacity(STACK_SIZE))
    }
}

impl ValueStack {
    #[inline(always)]
    pub(crate) fn height(&self) -> u32 {
        self.0.len() as u32
    }

    #[inline(always)]
    pub(crate) fn push(&mut self, value: impl Into<RawValue>) {
        self.0.push(value.into());
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Result<RawValue> {
        self.0.pop().ok_or_else(|| underflow("value"))
    }

    #[inline]
    pub(crate) fn last(&self) -> Result<RawValue> {
        self.0.last().copied().ok_or_else(|| underflow("value"))
    }

    #[inline]
    fn last_mut(&mut self) -> Result<&mut RawValue> {
        self.0.last_mut().ok_or_else(|| underflow("value"))
    }

    #[inline]
    pub(crate) fn select(&mut self) -> Result<()> {
        let cond = i32::from(self.pop()?);
        let val2 = self.pop()?;
        if cond == 0 {
            *self.last_mut()? = val2;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn calculate(&mut self, func: BinaryFn) -> Result<()> {
        let v2 = self.pop()?;
        let v1 = self.last_mut()?;
        *v1 = func(*v1, v2)?;
        Ok(())
    }

    #[inline]
    pub(crate) fn replace_top(&mut self, func: UnaryFn) -> Result<()> {
        let v1 = self.last_mut()?;
        *v1 = func(*v1)?;
        Ok(())
    }

    /// Remove the top `n` values, in stack order.
    #[inline]
    pub(crate) fn pop_n(&mut self, n: usize) -> Result<Vec<RawValue>> {
        let start = self.0.len().checked_sub(n).ok_or_else(|| underflow("value"))?;
        Ok(self.0.split_off(start))
    }

    /// Remove the top values, attaching the given types.
    pub(crate) fn pop_params(&mut self, types: &[ValType]) -> Result<Vec<WasmValue>> {
        let values = self.pop_n(types.len())?;
        Ok(values.into_iter().zip(types.iter()).map(|(value, ty)| value.attach_type(*ty)).collect())
    }

    pub(crate) fn extend_from_wasmvalues(&mut self, values: &[WasmValue]) {
        self.0.extend(values.iter().map(|value| RawValue::from(*value)));
    }

    /// Drop everything above `stack_ptr` except the top `keep` values.
    #[inline]
    pub(crate) fn truncate_keep(&mut self, stack_ptr: u32, keep: u32) {
        let (stack_ptr, keep) = (stack_ptr as usize, keep as usize);
        let len = self.0.len();
        if len <= stack_ptr + keep {
            return;
        }

        self.0.copy_within(len - keep.., stack_ptr);
        self.0.truncate(stack_ptr + keep);
    }

    pub(crate) fn into_inner(self) -> Vec<RawValue> {
        self.0
    }
}
