use alloc::{boxed::Box, vec::Vec};
use detwasm_types::{FuncType, Instruction, LocalAddr};

use super::{BlockStack, BlockType, ValueStack};
use crate::runtime::RawValue;
use crate::{Error, Result};

/// Suspended frames of the active invocation. Its depth is bounded by the call guard.
#[derive(Debug)]
pub(crate) struct CallStack<'a> {
    stack: Vec<CallFrame<'a>>,
}

impl Default for CallStack<'_> {
    fn default() -> Self {
        Self { stack: Vec::with_capacity(32) }
    }
}

impl<'a> CallStack<'a> {
    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.stack.len()
    }

    #[inline(always)]
    pub(crate) fn pop(&mut self) -> Option<CallFrame<'a>> {
        self.stack.pop()
    }

    #[inline(always)]
    pub(crate) fn push(&mut self, call_frame: CallFrame<'a>) {
        self.stack.push(call_frame);
    }
}

#[derive(Debug)]
pub(crate) struct CallFrame<'a> {
    pub(crate) instr_ptr: usize,
    pub(crate) block_ptr: u32,
    pub(crate) stack_ptr: u32,
    pub(crate) instructions: &'a [Instruction],
    pub(crate) ty: &'a FuncType,
    pub(crate) locals: Box<[RawValue]>,
}

impl<'a> CallFrame<'a> {
    #[inline]
    pub(crate) fn new(
        instructions: &'a [Instruction],
        ty: &'a FuncType,
        locals: Box<[RawValue]>,
        block_ptr: u32,
        stack_ptr: u32,
    ) -> Self {
        Self { instr_ptr: 0, block_ptr, stack_ptr, instructions, ty, locals }
    }

    #[inline(always)]
    pub(crate) fn incr_instr_ptr(&mut self) {
        self.instr_ptr += 1;
    }

    #[inline(always)]
    pub(crate) fn fetch_instr(&self) -> Result<&'a Instruction> {
        match self.instructions.get(self.instr_ptr) {
            Some(instr) => Ok(instr),
            None => {
                crate::cold();
                Err(Error::Other(alloc::format!("instruction pointer {} out of bounds", self.instr_ptr)))
            }
        }
    }

    #[inline(always)]
    pub(crate) fn local(&self, local_index: LocalAddr) -> Result<RawValue> {
        self.locals.get(local_index as usize).copied().ok_or_else(|| local_not_found(local_index))
    }

    #[inline(always)]
    pub(crate) fn set_local(&mut self, local_index: LocalAddr, value: RawValue) -> Result<()> {
        let local = self.locals.get_mut(local_index as usize).ok_or_else(|| local_not_found(local_index))?;
        *local = value;
        Ok(())
    }

    /// The number of values this frame returns.
    #[inline(always)]
    pub(crate) fn results(&self) -> u32 {
        self.ty.results.len() as u32
    }

    /// Break to a block at the given index (relative to the current frame)
    /// Returns `None` if there is no block at the given index (e.g. if we need to return, this is handled by the caller)
    #[inline(always)]
    pub(crate) fn break_to(
        &mut self,
        break_to_relative: u32,
        values: &mut ValueStack,
        blocks: &mut BlockStack,
    ) -> Option<()> {
        let break_to = *blocks.get_relative_to(break_to_relative, self.block_ptr)?;

        // instr_ptr points to the label instruction, but the next step
        // will increment it by 1 since we're changing the "current" instr_ptr
        match break_to.ty {
            BlockType::Loop => {
                // jump back to the start of the loop, keeping its parameters
                self.instr_ptr = break_to.instr_ptr;
                values.truncate_keep(break_to.stack_ptr, break_to.params);

                // trim the label stack to the loop (but not including the loop)
                blocks.truncate(blocks.len() as u32 - break_to_relative);
            }

            BlockType::Block | BlockType::If | BlockType::Else => {
                // jump to the end of the block, keeping its results
                values.truncate_keep(break_to.stack_ptr, break_to.results);
                self.instr_ptr = break_to.instr_ptr + break_to.end_instr_offset as usize;

                // trim the label stack, including the block
                blocks.truncate(blocks.len() as u32 - (break_to_relative + 1));
            }
        }

        Some(())
    }
}

#[cold]
fn local_not_found(local_index: LocalAddr) -> Error {
    Error::Other(alloc::format!("local {local_index} not found"))
}
