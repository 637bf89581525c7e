//! The interpreter walks a function's lowered instructions with explicit value, block and
//! call stacks.

mod executor;
pub(crate) mod stack;

use alloc::{format, vec::Vec};
use core::marker::PhantomData;
use detwasm_types::{FuncAddr, WasmValue};

use crate::{Caller, Error, FloatPolicy, Invoke, Result};

/// The prepared form of a module for the [`Interpreter`](crate::Interpreter).
///
/// The interpreter runs the module's instructions as they are, so there is nothing to
/// prepare beyond fixing the float policy.
#[derive(Debug, Default)]
pub struct InterpreterRuntime<F> {
    _policy: PhantomData<F>,
}

impl<H, F: FloatPolicy> Invoke<H> for InterpreterRuntime<F> {
    fn invoke(&self, caller: &mut Caller<'_, H>, func: FuncAddr, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        let module = caller.module;
        if func < module.imported_func_count() {
            return caller.call_host(func, args);
        }

        let ty = module.func_type_of(func).ok_or_else(|| Error::Other(format!("function {func} not found")))?;
        let values = executor::Executor::<H, F>::new(caller, func, args)?.run()?;
        if values.len() != ty.results.len() {
            return Err(Error::Other(format!("expected {} results, got {}", ty.results.len(), values.len())));
        }

        Ok(values.into_iter().zip(ty.results.iter()).map(|(value, ty)| value.attach_type(*ty)).collect())
    }
}
