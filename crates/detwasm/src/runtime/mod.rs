//! Execution strategies and the pieces they share.

mod access;
mod numeric;
mod value;

pub(crate) use access::{load_op, store_op};
pub(crate) use numeric::{numeric_op, BinaryFn, NumericOp, UnaryFn};
pub use value::RawValue;

use alloc::vec::Vec;
use detwasm_types::{DetWasmModule, FuncAddr, WasmValue};

use crate::{Caller, FloatPolicy, Result};

/// Runs a prepared module.
///
/// The runtime of a strategy is created once per module by
/// [`ExecutionStrategy::prepare`] and then invoked for every call. Host functions that call
/// back into the module go through the same runtime, which is why [`Caller`] carries it.
pub trait Invoke<H> {
    /// Invoke a function of the module's function index space.
    ///
    /// The arguments have already been checked against the function type. The invocation
    /// takes one unit of call depth for itself and returns it before returning.
    fn invoke(&self, caller: &mut Caller<'_, H>, func: FuncAddr, args: &[WasmValue]) -> Result<Vec<WasmValue>>;
}

/// How function bodies get executed.
///
/// Implemented by [`Interpreter`] and [`Jit`]. The strategy is a type parameter of
/// [`Backend`](crate::Backend), so dispatch between the two is resolved at compile time.
pub trait ExecutionStrategy: core::fmt::Debug + 'static {
    /// A short name, used in logs and benchmark ids.
    const NAME: &'static str;

    /// The prepared form of a module.
    type Runtime<H: 'static, F: FloatPolicy>: Invoke<H>;

    /// Translate a validated module.
    fn prepare<H: 'static, F: FloatPolicy>(module: &DetWasmModule) -> Result<Self::Runtime<H, F>>;
}

/// Walks the lowered instruction stream with explicit stacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

/// Compiles every function into a closure tree before the first call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jit;

impl ExecutionStrategy for Interpreter {
    const NAME: &'static str = "interpreter";
    type Runtime<H: 'static, F: FloatPolicy> = crate::interpreter::InterpreterRuntime<F>;

    fn prepare<H: 'static, F: FloatPolicy>(_module: &DetWasmModule) -> Result<Self::Runtime<H, F>> {
        Ok(crate::interpreter::InterpreterRuntime::default())
    }
}

impl ExecutionStrategy for Jit {
    const NAME: &'static str = "jit";
    type Runtime<H: 'static, F: FloatPolicy> = crate::jit::JitModule<H, F>;

    fn prepare<H: 'static, F: FloatPolicy>(module: &DetWasmModule) -> Result<Self::Runtime<H, F>> {
        crate::jit::JitModule::compile(module)
    }
}
