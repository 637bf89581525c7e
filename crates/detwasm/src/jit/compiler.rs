use alloc::{boxed::Box, format, vec::Vec};
use core::marker::PhantomData;
use detwasm_types::{BlockArgs, DetWasmModule, FuncAddr, Instruction, WasmFunction};

use super::{CompiledFunc, Flow, JitCtx, Op};
use crate::runtime::{load_op, store_op, NumericOp, RawValue};
use crate::{cold, unlikely, Error, FloatPolicy, Result, Trap};

/// Run a sequence of operations until one of them leaves it.
#[inline]
pub(super) fn run_seq<H, F>(ops: &[Op<H, F>], ctx: &mut JitCtx<'_, '_, H, F>) -> Result<Flow> {
    for op in ops {
        match op(ctx)? {
            Flow::Next => {}
            flow => return Ok(flow),
        }
    }
    Ok(Flow::Next)
}

/// A branch to the block being left ends here, deeper branches keep unwinding.
#[inline(always)]
fn leave_block(flow: Flow) -> Flow {
    match flow {
        Flow::Branch(0) => Flow::Next,
        Flow::Branch(depth) => Flow::Branch(depth - 1),
        flow => flow,
    }
}

#[inline(always)]
fn op<H, F>(f: impl Fn(&mut JitCtx<'_, '_, H, F>) -> Result<Flow> + 'static) -> Op<H, F> {
    Box::new(f)
}

/// Call a function defined by the module with its frame at slot `args` of the current frame.
#[inline]
fn call_wasm<H: 'static, F: FloatPolicy>(ctx: &mut JitCtx<'_, '_, H, F>, func: FuncAddr, args: usize) -> Result<()> {
    ctx.caller.guard.enter()?;
    let code = ctx.code;
    let fp = ctx.fp + args;
    let result = code.execute(ctx, func, fp);
    ctx.caller.guard.exit();
    result
}

#[derive(Debug, Clone, Copy)]
struct Label {
    /// Operand height below the block's parameters.
    base: u32,
    /// Number of values carried by a branch to this label.
    arity: u32,
}

enum Step<H, F> {
    Op(Op<H, F>),
    /// The rest of the sequence is unreachable.
    Terminal(Op<H, F>),
    None,
}

/// Translates one function body into closures.
///
/// The operand height is tracked at compile time, so every operand gets a fixed slot at
/// `locals + height` in the function's frame.
pub(super) struct FuncCompiler<'m, H, F> {
    module: &'m DetWasmModule,
    imported: u32,
    instructions: &'m [Instruction],
    pos: usize,
    params: u32,
    locals: u32,
    results: u32,
    height: u32,
    max_height: u32,
    labels: Vec<Label>,
    _marker: PhantomData<fn() -> (H, F)>,
}

impl<'m, H: 'static, F: FloatPolicy> FuncCompiler<'m, H, F> {
    pub(super) fn new(module: &'m DetWasmModule, imported: u32, func: &'m WasmFunction) -> Result<Self> {
        let ty =
            module.func_types.get(func.ty as usize).ok_or_else(|| Error::Other(format!("type {} not found", func.ty)))?;
        let params = ty.params.len() as u32;

        Ok(Self {
            module,
            imported,
            instructions: &func.instructions,
            pos: 0,
            params,
            locals: params + func.locals.len() as u32,
            results: ty.results.len() as u32,
            height: 0,
            max_height: 0,
            labels: Vec::new(),
            _marker: PhantomData,
        })
    }

    pub(super) fn compile(mut self) -> Result<CompiledFunc<H, F>> {
        let body = self.compile_seq(self.instructions.len())?;
        Ok(CompiledFunc {
            params: self.params as usize,
            locals: self.locals as usize,
            frame_size: (self.locals + self.max_height) as usize,
            body: body.into_boxed_slice(),
        })
    }

    fn compile_seq(&mut self, end: usize) -> Result<Vec<Op<H, F>>> {
        let instructions = self.instructions;
        let mut ops = Vec::new();

        while self.pos < end {
            let index = self.pos;
            self.pos += 1;
            match self.compile_instr(index, &instructions[index])? {
                Step::Op(op) => ops.push(op),
                Step::Terminal(op) => {
                    ops.push(op);
                    self.pos = end;
                }
                Step::None => {}
            }
        }

        Ok(ops)
    }

    #[inline]
    fn slot(&self, height: u32) -> usize {
        (self.locals + height) as usize
    }

    fn set_height(&mut self, height: u32) {
        self.height = height;
        self.max_height = self.max_height.max(height);
    }

    /// Push `n` values, returning the slot of the first.
    fn push_n(&mut self, n: usize) -> usize {
        let slot = self.slot(self.height);
        self.set_height(self.height + n as u32);
        slot
    }

    fn push(&mut self) -> usize {
        self.push_n(1)
    }

    /// Pop `n` values, returning the slot of the first.
    fn pop_n(&mut self, n: usize) -> Result<usize> {
        let Some(height) = self.height.checked_sub(n as u32) else {
            cold();
            return Err(Error::Other(format!("operand stack underflow at instruction {}", self.pos - 1)));
        };
        self.height = height;
        Ok(self.slot(height))
    }

    fn pop(&mut self) -> Result<usize> {
        self.pop_n(1)
    }

    /// The slot of the top operand.
    fn top(&self) -> Result<usize> {
        match self.height.checked_sub(1) {
            Some(height) => Ok(self.slot(height)),
            None => Err(Error::Other(format!("operand stack underflow at instruction {}", self.pos - 1))),
        }
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

    /// Open a label for a block whose parameters are on top of the operand stack.
    fn open_label(&mut self, args: BlockArgs, is_loop: bool) -> Result<(Label, u32)> {
        let (params, results) = self.block_arity(args)?;
        let base = self.height.checked_sub(params).ok_or_else(|| Error::Other("block parameters missing".into()))?;
        let label = Label { base, arity: if is_loop { params } else { results } };
        self.labels.push(label);
        Ok((label, results))
    }

    fn close_label(&mut self, label: Label, results: u32, end: usize) {
        self.labels.pop();
        self.pos = end + 1;
        self.set_height(label.base + results);
    }

    /// Move the results of the function to the frame pointer and leave it.
    fn return_op(&self) -> Result<Op<H, F>> {
        let len = self.results as usize;
        let src = self.slot(self.height.checked_sub(self.results).ok_or_else(|| Error::Other("missing results".into()))?);
        Ok(op(move |ctx| {
            ctx.move_slots(src, 0, len);
            Ok(Flow::Return)
        }))
    }

    /// Move the values carried by a branch into place and start unwinding.
    fn branch_op(&self, depth: u32) -> Result<Op<H, F>> {
        let Some(index) = self.labels.len().checked_sub(depth as usize + 1) else {
            // the outermost label is the function body itself
            return self.return_op();
        };

        let label = self.labels[index];
        let len = label.arity as usize;
        let src = self.slot(self.height.checked_sub(label.arity).ok_or_else(|| Error::Other("missing branch values".into()))?);
        let dst = self.slot(label.base);
        Ok(op(move |ctx| {
            ctx.move_slots(src, dst, len);
            Ok(Flow::Branch(depth))
        }))
    }

    fn compile_instr(&mut self, index: usize, instr: &Instruction) -> Result<Step<H, F>> {
        use Instruction::*;
        let step = match *instr {
            Nop => Step::None,
            Unreachable => Step::Terminal(op(|_| Err(Trap::Unreachable.into()))),

            Block(args, end) => {
                let end = index + end as usize;
                let (label, results) = self.open_label(args, false)?;
                let body = self.compile_seq(end)?.into_boxed_slice();
                self.close_label(label, results, end);
                Step::Op(op(move |ctx| Ok(leave_block(run_seq(&body, ctx)?))))
            }

            Loop(args, end) => {
                let end = index + end as usize;
                let (label, results) = self.open_label(args, true)?;
                let body = self.compile_seq(end)?.into_boxed_slice();
                self.close_label(label, results, end);
                Step::Op(op(move |ctx| loop {
                    match run_seq(&body, ctx)? {
                        Flow::Branch(0) => continue,
                        flow => return Ok(leave_block(flow)),
                    }
                }))
            }

            If(args, else_offset, end) => {
                let cond = self.pop()?;
                let end = index + end as usize;
                let (label, results) = self.open_label(args, false)?;
                let params_height = self.height;

                let then_end = if else_offset == 0 { end } else { index + else_offset as usize };
                let then_body = self.compile_seq(then_end)?.into_boxed_slice();
                let else_body = if else_offset == 0 {
                    Box::default()
                } else {
                    self.pos = then_end + 1;
                    self.height = params_height;
                    self.compile_seq(end)?.into_boxed_slice()
                };

                self.close_label(label, results, end);
                Step::Op(op(move |ctx| {
                    let body = if i32::from(ctx.get(cond)) != 0 { &then_body } else { &else_body };
                    Ok(leave_block(run_seq(body, ctx)?))
                }))
            }

            Br(depth) => Step::Terminal(self.branch_op(depth)?),
            BrIf(depth) => {
                let cond = self.pop()?;
                let branch = self.branch_op(depth)?;
                Step::Op(op(move |ctx| if i32::from(ctx.get(cond)) != 0 { branch(ctx) } else { Ok(Flow::Next) }))
            }
            BrTable(default, len) => {
                let selector = self.pop()?;
                let start = index + 1;
                let labels = self
                    .instructions
                    .get(start..start + len as usize)
                    .ok_or_else(|| Error::Other(format!("br_table at {index} out of bounds")))?;

                let targets = labels
                    .iter()
                    .map(|label| match label {
                        BrLabel(depth) => self.branch_op(*depth),
                        _ => Err(Error::Other("br_table with invalid label".into())),
                    })
                    .collect::<Result<Box<[_]>>>()?;
                let default = self.branch_op(default)?;
                self.pos = start + len as usize;

                Step::Terminal(op(move |ctx| {
                    let selected = u32::from(ctx.get(selector)) as usize;
                    match targets.get(selected) {
                        Some(target) => target(ctx),
                        None => default(ctx),
                    }
                }))
            }
            Return => Step::Terminal(self.return_op()?),

            Call(func) => {
                let ty = self.module.func_type_of(func).ok_or_else(|| Error::Other(format!("function {func} not found")))?;
                let args = self.pop_n(ty.params.len())?;
                self.push_n(ty.results.len());

                if func < self.imported {
                    Step::Op(op(move |ctx| {
                        let code = ctx.code;
                        code.call_host(ctx, func, args)?;
                        Ok(Flow::Next)
                    }))
                } else {
                    Step::Op(op(move |ctx| {
                        call_wasm(ctx, func, args)?;
                        Ok(Flow::Next)
                    }))
                }
            }
            CallIndirect(type_addr, table) => {
                let expected = self
                    .module
                    .func_types
                    .get(type_addr as usize)
                    .cloned()
                    .ok_or_else(|| Error::Other(format!("type {type_addr} not found")))?;
                let selector = self.pop()?;
                let args = self.pop_n(expected.params.len())?;
                self.push_n(expected.results.len());

                Step::Op(op(move |ctx| {
                    let func = ctx.caller.store.table_func(table, u32::from(ctx.get(selector)))?;
                    let code = ctx.code;
                    let actual = code.func_type(func)?;
                    if unlikely(*actual != expected) {
                        return Err(
                            Trap::IndirectCallTypeMismatch { expected: expected.clone(), actual: actual.clone() }.into()
                        );
                    }

                    match code.is_host(func) {
                        true => code.call_host(ctx, func, args)?,
                        false => call_wasm(ctx, func, args)?,
                    }
                    Ok(Flow::Next)
                }))
            }

            Drop => {
                self.pop()?;
                Step::None
            }
            Select => {
                let cond = self.pop()?;
                let other = self.pop()?;
                let dst = self.top()?;
                Step::Op(op(move |ctx| {
                    if i32::from(ctx.get(cond)) == 0 {
                        ctx.set(dst, ctx.get(other));
                    }
                    Ok(Flow::Next)
                }))
            }

            LocalGet(local) => {
                let dst = self.push();
                let local = local as usize;
                Step::Op(op(move |ctx| {
                    ctx.set(dst, ctx.get(local));
                    Ok(Flow::Next)
                }))
            }
            LocalSet(local) => {
                let src = self.pop()?;
                let local = local as usize;
                Step::Op(op(move |ctx| {
                    ctx.set(local, ctx.get(src));
                    Ok(Flow::Next)
                }))
            }
            LocalTee(local) => {
                let src = self.top()?;
                let local = local as usize;
                Step::Op(op(move |ctx| {
                    ctx.set(local, ctx.get(src));
                    Ok(Flow::Next)
                }))
            }
            GlobalGet(global) => {
                let dst = self.push();
                Step::Op(op(move |ctx| {
                    let value = ctx.caller.store.global(global)?;
                    ctx.set(dst, value);
                    Ok(Flow::Next)
                }))
            }
            GlobalSet(global) => {
                let src = self.pop()?;
                Step::Op(op(move |ctx| {
                    let value = ctx.get(src);
                    ctx.caller.store.set_global(global, value)?;
                    Ok(Flow::Next)
                }))
            }

            I32Const(val) => self.constant(RawValue::from(val)),
            I64Const(val) => self.constant(RawValue::from(val)),
            F32Const(bits) => self.constant(RawValue::from(bits)),
            F64Const(bits) => self.constant(RawValue::from(bits)),

            MemorySize(_) => {
                let dst = self.push();
                Step::Op(op(move |ctx| {
                    let pages = ctx.caller.store.memory()?.page_count();
                    ctx.set(dst, RawValue::from(pages));
                    Ok(Flow::Next)
                }))
            }
            MemoryGrow(_) => {
                let slot = self.top()?;
                Step::Op(op(move |ctx| {
                    let delta = u32::from(ctx.get(slot));
                    let result = match ctx.caller.store.memory_mut()?.grow(delta) {
                        Some(prev_size) => prev_size as i32,
                        None => -1,
                    };
                    ctx.set(slot, RawValue::from(result));
                    Ok(Flow::Next)
                }))
            }
            MemoryCopy(_, _) => {
                let dst = self.pop_n(3)?;
                Step::Op(op(move |ctx| {
                    let (to, from, size) = (u32::from(ctx.get(dst)), u32::from(ctx.get(dst + 1)), u32::from(ctx.get(dst + 2)));
                    ctx.caller.store.memory_mut()?.copy_within(to as u64, from as u64, size as usize)?;
                    Ok(Flow::Next)
                }))
            }
            MemoryFill(_) => {
                let dst = self.pop_n(3)?;
                Step::Op(op(move |ctx| {
                    let (to, val, size) = (u32::from(ctx.get(dst)), u32::from(ctx.get(dst + 1)), u32::from(ctx.get(dst + 2)));
                    ctx.caller.store.memory_mut()?.fill(to as u64, size as usize, val as u8)?;
                    Ok(Flow::Next)
                }))
            }

            Else(_) | EndBlockFrame | BrLabel(_) => {
                cold();
                return Err(Error::Other(format!("unexpected {instr:?} at instruction {index}")));
            }

            _ => self.compile_numeric_or_access(instr)?,
        };

        Ok(step)
    }

    fn constant(&mut self, value: RawValue) -> Step<H, F> {
        let dst = self.push();
        Step::Op(op(move |ctx| {
            ctx.set(dst, value);
            Ok(Flow::Next)
        }))
    }

    fn compile_numeric_or_access(&mut self, instr: &Instruction) -> Result<Step<H, F>> {
        if let Some(load) = load_op(instr) {
            let slot = self.top()?;
            return Ok(Step::Op(op(move |ctx| {
                let value = load.load(ctx.caller.store.memory()?, ctx.get(slot))?;
                ctx.set(slot, value);
                Ok(Flow::Next)
            })));
        }

        if let Some(store) = store_op(instr) {
            let base = self.pop_n(2)?;
            return Ok(Step::Op(op(move |ctx| {
                let (addr, value) = (ctx.get(base), ctx.get(base + 1));
                store.store(ctx.caller.store.memory_mut()?, addr, value)?;
                Ok(Flow::Next)
            })));
        }

        Ok(match NumericOp::resolve::<F>(instr)? {
            NumericOp::Unary(func) => {
                let slot = self.top()?;
                Step::Op(op(move |ctx| {
                    let value = func(ctx.get(slot))?;
                    ctx.set(slot, value);
                    Ok(Flow::Next)
                }))
            }
            NumericOp::Binary(func) => {
                let rhs = self.pop()?;
                let lhs = self.top()?;
                Step::Op(op(move |ctx| {
                    let value = func(ctx.get(lhs), ctx.get(rhs))?;
                    ctx.set(lhs, value);
                    Ok(Flow::Next)
                }))
            }
        })
    }
}
