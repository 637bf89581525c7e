use alloc::{format, vec::Vec};
use core::{marker::PhantomData, ops::ControlFlow};
use detwasm_types::{BlockArgs, DetWasmModule, FuncAddr, FuncType, Instruction, TableAddr, TypeAddr, WasmFunction, WasmValue};

use super::stack::{BlockFrame, BlockType, CallFrame, Stack};
use crate::runtime::{load_op, numeric_op, store_op, NumericOp, RawValue};
use crate::{cold, unlikely, Caller, Error, FloatPolicy, Result, Trap};

/// Runs one invocation to completion.
///
/// Every frame on the call stack, the current one included, holds one unit of call depth.
pub(super) struct Executor<'a, 'c, H, F> {
    module: &'a DetWasmModule,
    imported: u32,
    caller: &'c mut Caller<'a, H>,
    cf: CallFrame<'a>,
    stack: Stack<'a>,
    _policy: PhantomData<F>,
}

impl<'a, 'c, H, F: FloatPolicy> Executor<'a, 'c, H, F> {
    pub(super) fn new(caller: &'c mut Caller<'a, H>, func: FuncAddr, args: &[WasmValue]) -> Result<Self> {
        let module = caller.module;
        let imported = module.imported_func_count();
        let (wasm_func, ty) = resolve_wasm_func(module, imported, func)?;

        let mut locals = Vec::with_capacity(ty.params.len() + wasm_func.locals.len());
        locals.extend(args.iter().map(|arg| RawValue::from(*arg)));
        locals.resize(ty.params.len() + wasm_func.locals.len(), RawValue::default());

        let cf = CallFrame::new(&wasm_func.instructions, ty, locals.into_boxed_slice(), 0, 0);
        Ok(Self { module, imported, caller, cf, stack: Stack::default(), _policy: PhantomData })
    }

    /// Execute until the entry frame returns, yielding its results.
    pub(super) fn run(mut self) -> Result<Vec<RawValue>> {
        self.caller.guard.enter()?;

        loop {
            match self.exec_next() {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => return Ok(self.stack.values.into_inner()),
                Err(err) => {
                    self.unwind();
                    return Err(err);
                }
            }
        }
    }

    /// Return the call depth held by every frame that is still active.
    #[cold]
    fn unwind(&mut self) {
        for _ in 0..self.stack.call_stack.len() + 1 {
            self.caller.guard.exit();
        }
    }

    #[inline(always)]
    fn exec_next(&mut self) -> Result<ControlFlow<()>> {
        use Instruction::*;
        match self.cf.fetch_instr()? {
            Nop | BrLabel(_) => {}
            Unreachable => return self.exec_unreachable(),

            Drop => {
                self.stack.values.pop()?;
            }
            Select => self.stack.values.select()?,

            Call(func) => return self.exec_call(*func),
            CallIndirect(ty, table) => return self.exec_call_indirect(*ty, *table),

            Block(args, end) => self.enter_block(self.cf.instr_ptr, *end, BlockType::Block, *args)?,
            Loop(args, end) => self.enter_block(self.cf.instr_ptr, *end, BlockType::Loop, *args)?,
            If(args, else_offset, end) => self.exec_if(*args, *else_offset, *end)?,
            Else(end_offset) => self.exec_else(*end_offset)?,
            EndBlockFrame => self.exec_end_block()?,
            Br(to) => return self.exec_br(*to),
            BrIf(to) => return self.exec_br_if(*to),
            BrTable(default, len) => return self.exec_br_table(*default, *len),
            Return => return self.exec_return(),

            LocalGet(local_index) => {
                let value = self.cf.local(*local_index)?;
                self.stack.values.push(value);
            }
            LocalSet(local_index) => {
                let value = self.stack.values.pop()?;
                self.cf.set_local(*local_index, value)?;
            }
            LocalTee(local_index) => {
                let value = self.stack.values.last()?;
                self.cf.set_local(*local_index, value)?;
            }
            GlobalGet(global_index) => {
                let value = self.caller.store.global(*global_index)?;
                self.stack.values.push(value);
            }
            GlobalSet(global_index) => {
                let value = self.stack.values.pop()?;
                self.caller.store.set_global(*global_index, value)?;
            }

            I32Const(val) => self.stack.values.push(*val),
            I64Const(val) => self.stack.values.push(*val),
            F32Const(bits) => self.stack.values.push(*bits),
            F64Const(bits) => self.stack.values.push(*bits),

            MemorySize(_) => {
                let pages = self.caller.store.memory()?.page_count();
                self.stack.values.push(pages);
            }
            MemoryGrow(_) => self.exec_memory_grow()?,
            MemoryCopy(_, _) => self.exec_memory_copy()?,
            MemoryFill(_) => self.exec_memory_fill()?,

            instr => self.exec_numeric_or_access(instr)?,
        };

        self.cf.incr_instr_ptr();
        Ok(ControlFlow::Continue(()))
    }

    #[cold]
    fn exec_unreachable(&self) -> Result<ControlFlow<()>> {
        Err(Error::Trap(Trap::Unreachable))
    }

    fn exec_numeric_or_access(&mut self, instr: &Instruction) -> Result<()> {
        if let Some(op) = numeric_op::<F>(instr) {
            return match op {
                NumericOp::Unary(func) => self.stack.values.replace_top(func),
                NumericOp::Binary(func) => self.stack.values.calculate(func),
            };
        }

        if let Some(op) = load_op(instr) {
            let base = self.stack.values.pop()?;
            let value = op.load(self.caller.store.memory()?, base)?;
            self.stack.values.push(value);
            return Ok(());
        }

        if let Some(op) = store_op(instr) {
            let value = self.stack.values.pop()?;
            let base = self.stack.values.pop()?;
            return op.store(self.caller.store.memory_mut()?, base, value);
        }

        cold();
        Err(Error::UnsupportedFeature(format!("instruction {instr:?}")))
    }

    fn exec_call(&mut self, func: FuncAddr) -> Result<ControlFlow<()>> {
        if func < self.imported {
            return self.exec_call_host(func);
        }

        let (wasm_func, ty) = resolve_wasm_func(self.module, self.imported, func)?;
        let mut locals = self.stack.values.pop_n(ty.params.len())?;
        locals.resize(ty.params.len() + wasm_func.locals.len(), RawValue::default());

        self.caller.guard.enter()?;
        let new_call_frame = CallFrame::new(
            &wasm_func.instructions,
            ty,
            locals.into_boxed_slice(),
            self.stack.blocks.len() as u32,
            self.stack.values.height(),
        );

        self.cf.incr_instr_ptr(); // skip the call instruction
        self.stack.call_stack.push(core::mem::replace(&mut self.cf, new_call_frame));
        Ok(ControlFlow::Continue(()))
    }

    fn exec_call_host(&mut self, func: FuncAddr) -> Result<ControlFlow<()>> {
        let ty = self.module.func_type_of(func).ok_or_else(|| func_not_found(func))?;
        let params = self.stack.values.pop_params(&ty.params)?;
        let results = self.caller.call_host(func, &params)?;
        self.stack.values.extend_from_wasmvalues(&results);
        self.cf.incr_instr_ptr();
        Ok(ControlFlow::Continue(()))
    }

    fn exec_call_indirect(&mut self, type_addr: TypeAddr, table_addr: TableAddr) -> Result<ControlFlow<()>> {
        let table_idx = u32::from(self.stack.values.pop()?);
        let func = self.caller.store.table_func(table_addr, table_idx)?;

        let expected = self
            .module
            .func_types
            .get(type_addr as usize)
            .ok_or_else(|| Error::Other(format!("type {type_addr} not found")))?;
        let actual = self.module.func_type_of(func).ok_or_else(|| func_not_found(func))?;

        if unlikely(actual != expected) {
            return Err(Trap::IndirectCallTypeMismatch { expected: expected.clone(), actual: actual.clone() }.into());
        }

        self.exec_call(func)
    }

    fn block_arity(&self, args: BlockArgs) -> Result<(u32, u32)> {
        Ok(match args {
            BlockArgs::Empty => (0, 0),
            BlockArgs::Type(_) => (0, 1),
            BlockArgs::FuncType(ty) => {
                let ty =
                    self.module.func_types.get(ty as usize).ok_or_else(|| Error::Other(format!("type {ty} not found")))?;
                (ty.params.len() as u32, ty.results.len() as u32)
            }
        })
    }

    fn enter_block(&mut self, instr_ptr: usize, end_instr_offset: u32, ty: BlockType, args: BlockArgs) -> Result<()> {
        let (params, results) = self.block_arity(args)?;
        let stack_ptr =
            self.stack.values.height().checked_sub(params).ok_or_else(|| super::stack::underflow("value"))?;

        self.stack.blocks.push(BlockFrame { instr_ptr, end_instr_offset, stack_ptr, results, params, ty });
        Ok(())
    }

    fn exec_if(&mut self, args: BlockArgs, else_offset: u32, end_offset: u32) -> Result<()> {
        // truthy value is on the top of the stack, so enter the then block
        if i32::from(self.stack.values.pop()?) != 0 {
            return self.enter_block(self.cf.instr_ptr, end_offset, BlockType::If, args);
        }

        // falsy value is on the top of the stack
        if else_offset == 0 {
            self.cf.instr_ptr += end_offset as usize;
            return Ok(());
        }

        let else_ptr = self.cf.instr_ptr + else_offset as usize;
        self.cf.instr_ptr = else_ptr;
        self.enter_block(else_ptr, end_offset - else_offset, BlockType::Else, args)
    }

    fn exec_else(&mut self, end_offset: u32) -> Result<()> {
        self.exec_end_block()?;
        self.cf.instr_ptr += end_offset as usize;
        Ok(())
    }

    fn exec_end_block(&mut self) -> Result<()> {
        let block = self.stack.blocks.pop()?;
        self.stack.values.truncate_keep(block.stack_ptr, block.results);
        Ok(())
    }

    fn exec_br(&mut self, to: u32) -> Result<ControlFlow<()>> {
        if self.cf.break_to(to, &mut self.stack.values, &mut self.stack.blocks).is_none() {
            return self.exec_return();
        }

        self.cf.incr_instr_ptr();
        Ok(ControlFlow::Continue(()))
    }

    fn exec_br_if(&mut self, to: u32) -> Result<ControlFlow<()>> {
        if i32::from(self.stack.values.pop()?) != 0 {
            return self.exec_br(to);
        }

        self.cf.incr_instr_ptr();
        Ok(ControlFlow::Continue(()))
    }

    fn exec_br_table(&mut self, default: u32, len: u32) -> Result<ControlFlow<()>> {
        let start = self.cf.instr_ptr + 1;
        let end = start + len as usize;
        let Some(labels) = self.cf.instructions.get(start..end) else {
            cold();
            return Err(Error::Other(format!("br_table out of bounds: {} > {}", end, self.cf.instructions.len())));
        };

        let idx = u32::from(self.stack.values.pop()?) as usize;
        let to = match labels.get(idx) {
            None => default,
            Some(Instruction::BrLabel(to)) => *to,
            Some(_) => return Err(Error::Other("br_table with invalid label".into())),
        };

        self.exec_br(to)
    }

    fn exec_return(&mut self) -> Result<ControlFlow<()>> {
        self.stack.values.truncate_keep(self.cf.stack_ptr, self.cf.results());
        self.stack.blocks.truncate(self.cf.block_ptr);
        self.caller.guard.exit();

        match self.stack.call_stack.pop() {
            None => Ok(ControlFlow::Break(())),
            Some(cf) => {
                self.cf = cf;
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    fn exec_memory_grow(&mut self) -> Result<()> {
        let pages_delta = u32::from(self.stack.values.pop()?);
        let result = match self.caller.store.memory_mut()?.grow(pages_delta) {
            Some(prev_size) => prev_size as i32,
            None => -1,
        };
        self.stack.values.push(result);
        Ok(())
    }

    fn exec_memory_copy(&mut self) -> Result<()> {
        let size = u32::from(self.stack.values.pop()?);
        let src = u32::from(self.stack.values.pop()?);
        let dst = u32::from(self.stack.values.pop()?);
        self.caller.store.memory_mut()?.copy_within(dst as u64, src as u64, size as usize)
    }

    fn exec_memory_fill(&mut self) -> Result<()> {
        let size = u32::from(self.stack.values.pop()?);
        let val = u32::from(self.stack.values.pop()?);
        let dst = u32::from(self.stack.values.pop()?);
        self.caller.store.memory_mut()?.fill(dst as u64, size as usize, val as u8)
    }
}

/// Find the body and type of a function defined by the module.
fn resolve_wasm_func(module: &DetWasmModule, imported: u32, func: FuncAddr) -> Result<(&WasmFunction, &FuncType)> {
    let wasm_func = func
        .checked_sub(imported)
        .and_then(|local| module.funcs.get(local as usize))
        .ok_or_else(|| func_not_found(func))?;
    let ty = module.func_types.get(wasm_func.ty as usize).ok_or_else(|| func_not_found(func))?;
    Ok((wasm_func, ty))
}

#[cold]
fn func_not_found(func: FuncAddr) -> Error {
    Error::Other(format!("function {func} not found"))
}
