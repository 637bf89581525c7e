//! The JIT translates every function into a tree of closures before the first call.
//!
//! Operands never live on a runtime stack. The compiler knows the operand height at every
//! instruction, so each closure reads and writes fixed slots relative to the frame pointer
//! of its activation:
//!
//! ```text
//! fp                 fp + locals                       fp + frame_size
//! | params | locals  | operand slots (max height) ... |
//! ```
//!
//! A call places the callee's frame at the caller's first argument slot, so arguments are
//! already in the callee's parameter slots and results are left where the caller expects
//! them. Control flow is the nesting of the closures: a branch moves its values into place
//! at compile-time known slots and unwinds through the enclosing block closures with
//! [`Flow::Branch`].

mod compiler;

use alloc::{boxed::Box, format, vec::Vec};
use core::fmt::Debug;
use detwasm_types::{DetWasmModule, FuncAddr, FuncType, WasmValue};

use crate::runtime::RawValue;
use crate::{log, Caller, Error, FloatPolicy, Invoke, Result};

/// What a compiled operation tells its enclosing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Continue with the next operation.
    Next,
    /// Leave `n` more enclosing blocks; the branch values are already in place.
    Branch(u32),
    /// Leave the function; the results are at the frame pointer.
    Return,
}

/// A compiled operation.
pub(crate) type Op<H, F> = Box<dyn Fn(&mut JitCtx<'_, '_, H, F>) -> Result<Flow>>;

/// The state a compiled function runs against.
pub(crate) struct JitCtx<'c, 'a, H, F> {
    pub(crate) caller: &'c mut Caller<'a, H>,
    pub(crate) code: &'c JitModule<H, F>,
    pub(crate) slots: &'c mut Vec<RawValue>,
    pub(crate) fp: usize,
}

impl<H, F> JitCtx<'_, '_, H, F> {
    #[inline(always)]
    pub(crate) fn get(&self, slot: usize) -> RawValue {
        self.slots[self.fp + slot]
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, slot: usize, value: RawValue) {
        self.slots[self.fp + slot] = value;
    }

    /// Move `len` values between slots of the current frame.
    #[inline(always)]
    pub(crate) fn move_slots(&mut self, src: usize, dst: usize, len: usize) {
        if len != 0 && src != dst {
            let src = self.fp + src;
            self.slots.copy_within(src..src + len, self.fp + dst);
        }
    }
}

/// A compiled function.
pub(crate) struct CompiledFunc<H, F> {
    /// Number of parameters.
    pub(crate) params: usize,
    /// Number of parameters and declared locals.
    pub(crate) locals: usize,
    /// Locals plus the maximum operand height.
    pub(crate) frame_size: usize,
    pub(crate) body: Box<[Op<H, F>]>,
}

impl<H, F> Debug for CompiledFunc<H, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompiledFunc")
            .field("params", &self.params)
            .field("locals", &self.locals)
            .field("frame_size", &self.frame_size)
            .field("ops", &self.body.len())
            .finish()
    }
}

/// The prepared form of a module for the [`Jit`](crate::Jit).
pub struct JitModule<H, F> {
    funcs: Box<[CompiledFunc<H, F>]>,
    /// Types of the whole function index space.
    func_types: Box<[FuncType]>,
    imported: u32,
}

impl<H, F> Debug for JitModule<H, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JitModule").field("funcs", &self.funcs).field("imported", &self.imported).finish()
    }
}

impl<H: 'static, F: FloatPolicy> JitModule<H, F> {
    /// Compile every function defined by `module`.
    pub fn compile(module: &DetWasmModule) -> Result<Self> {
        let imported = module.imported_func_count();
        let func_count = imported as usize + module.funcs.len();
        let func_types = (0..func_count as u32)
            .map(|func| module.func_type_of(func).cloned().ok_or_else(|| func_not_found(func)))
            .collect::<Result<Box<[_]>>>()?;

        let funcs = module
            .funcs
            .iter()
            .map(|func| compiler::FuncCompiler::<H, F>::new(module, imported, func)?.compile())
            .collect::<Result<Box<[_]>>>()?;

        log::debug!(
            "compiled {} functions with {} top-level ops for the {} float policy",
            funcs.len(),
            funcs.iter().map(|f: &CompiledFunc<H, F>| f.body.len()).sum::<usize>(),
            F::NAME
        );
        Ok(Self { funcs, func_types, imported })
    }

    #[inline]
    pub(crate) fn func_type(&self, func: FuncAddr) -> Result<&FuncType> {
        self.func_types.get(func as usize).ok_or_else(|| func_not_found(func))
    }

    #[inline]
    pub(crate) fn is_host(&self, func: FuncAddr) -> bool {
        func < self.imported
    }

    /// Run a function defined by the module with its frame at `fp`.
    ///
    /// The arguments must already be in place. The caller is responsible for the call depth.
    pub(crate) fn execute(&self, ctx: &mut JitCtx<'_, '_, H, F>, func: FuncAddr, fp: usize) -> Result<()> {
        let compiled = func
            .checked_sub(self.imported)
            .and_then(|local| self.funcs.get(local as usize))
            .ok_or_else(|| func_not_found(func))?;

        let needed = fp + compiled.frame_size;
        if ctx.slots.len() < needed {
            ctx.slots.resize(needed, RawValue::default());
        }
        ctx.slots[fp + compiled.params..fp + compiled.locals].fill(RawValue::default());

        let saved_fp = core::mem::replace(&mut ctx.fp, fp);
        let result = compiler::run_seq(&compiled.body, ctx);
        ctx.fp = saved_fp;
        result.map(|_| ())
    }

    /// Call a host function with its arguments at slot `args` of the current frame.
    pub(crate) fn call_host(&self, ctx: &mut JitCtx<'_, '_, H, F>, func: FuncAddr, args: usize) -> Result<()> {
        let ty = self.func_type(func)?;
        let base = ctx.fp + args;
        let params =
            ty.params.iter().enumerate().map(|(i, ty)| ctx.slots[base + i].attach_type(*ty)).collect::<Vec<_>>();

        let results = ctx.caller.call_host(func, &params)?;
        for (i, result) in results.iter().enumerate() {
            ctx.slots[base + i] = RawValue::from(*result);
        }
        Ok(())
    }
}

impl<H: 'static, F: FloatPolicy> Invoke<H> for JitModule<H, F> {
    fn invoke(&self, caller: &mut Caller<'_, H>, func: FuncAddr, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        if self.is_host(func) {
            return caller.call_host(func, args);
        }

        let ty = self.func_type(func)?;
        let mut slots = Vec::with_capacity(256);
        slots.extend(args.iter().map(|arg| RawValue::from(*arg)));

        caller.guard.enter()?;
        let mut ctx = JitCtx { caller, code: self, slots: &mut slots, fp: 0 };
        let result = self.execute(&mut ctx, func, 0);
        ctx.caller.guard.exit();
        result?;

        let results = slots.get(..ty.results.len()).ok_or_else(|| Error::Other(format!("function {func} lost its results")))?;
        Ok(results.iter().zip(ty.results.iter()).map(|(value, ty)| value.attach_type(*ty)).collect())
    }
}

#[cold]
fn func_not_found(func: FuncAddr) -> Error {
    Error::Other(format!("function {func} not found"))
}
