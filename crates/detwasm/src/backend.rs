use alloc::{boxed::Box, format, string::String, vec::Vec};
use core::fmt::Debug;
use detwasm_types::{FuncAddr, WasmValue};

use crate::imports::check_arguments;
use crate::store::Store;
use crate::{
    log, CallGuard, Caller, Error, ExecutionStrategy, FloatPolicy, FromWasmValueTuple, HostFunction, Imports,
    Interpreter, IntoWasmValueTuple, Invoke, MemoryAllocator, Module, Options, Result, SoftFloat, Trap,
};

/// A module bound to an execution strategy and a float policy.
///
/// `H` is the host context handed to every host function, `E` decides how function bodies
/// run and `F` how floating-point operations are computed. All combinations produce the same
/// results.
///
/// A backend goes through three steps before it can run code: construction binds the module,
/// [`Backend::set_memory_allocator`] (and optionally [`Backend::set_imports`]) supplies the
/// environment, and [`Backend::initialize`] builds the instance state. `initialize` can be
/// called again at any time to start over with fresh state.
///
/// See <https://webassembly.github.io/spec/core/exec/modules.html#instantiation>
pub struct Backend<H: 'static = (), E: ExecutionStrategy = Interpreter, F: FloatPolicy = SoftFloat> {
    module: Module,
    options: Options,
    imports: Imports<H>,
    host_funcs: Box<[HostFunction<H>]>,
    runtime: Option<E::Runtime<H, F>>,
    store: Store,
    guard: CallGuard,
    initialized: bool,
}

impl<H: 'static, E: ExecutionStrategy, F: FloatPolicy> Debug for Backend<H, E, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Backend")
            .field("strategy", &E::NAME)
            .field("float_policy", &F::NAME)
            .field("options", &self.options)
            .field("imports", &self.imports)
            .field("guard", &self.guard)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl<H: 'static, E: ExecutionStrategy, F: FloatPolicy> Backend<H, E, F> {
    #[cfg(feature = "parser")]
    /// Parse and validate a module binary. Requires the `parser` feature.
    pub fn new(wasm: &[u8]) -> Result<Self> {
        Self::with_options(wasm, Options::default())
    }

    #[cfg(feature = "parser")]
    /// Parse and validate a module binary, with options used by the next
    /// [`Backend::initialize`]. Requires the `parser` feature.
    pub fn with_options(wasm: &[u8], options: Options) -> Result<Self> {
        Ok(Self::from_module(Module::parse_bytes(wasm)?, options))
    }

    /// Bind an already parsed module.
    pub fn from_module(module: impl Into<Module>, options: Options) -> Self {
        Self {
            module: module.into(),
            options,
            imports: Imports::new(),
            host_funcs: Box::default(),
            runtime: None,
            store: Store::default(),
            guard: CallGuard::new(options.max_call_depth),
            initialized: false,
        }
    }

    /// Supply the linear memory. The instance has to be initialized again afterwards.
    pub fn set_memory_allocator(&mut self, allocator: impl MemoryAllocator + 'static) {
        self.store.memory = Some(Box::new(allocator));
        self.initialized = false;
    }

    /// Supply the host functions the module imports. They are resolved by the next
    /// [`Backend::initialize`].
    pub fn set_imports(&mut self, imports: Imports<H>) {
        self.imports = imports;
        self.host_funcs = Box::default();
        self.initialized = false;
    }

    /// Build fresh instance state and run the start function.
    ///
    /// `options` replace the current options when given. Options that fail
    /// [`Options::validate`] are rejected before anything else happens. After that the call
    /// depth is reset even if initialization fails; any other failure leaves the backend
    /// uninitialized.
    pub fn initialize(&mut self, host: &mut H, options: Option<Options>) -> Result<()> {
        self.initialized = false;
        let options = options.unwrap_or(self.options);
        options.validate()?;
        self.options = options;
        self.guard.reset(self.options.max_call_depth);

        if self.store.memory.is_none() {
            return Err(Error::AllocatorNotSet);
        }

        self.host_funcs = self.imports.resolve(self.module.inner())?;
        if self.runtime.is_none() {
            self.runtime = Some(E::prepare::<H, F>(self.module.inner())?);
            log::debug!("prepared module for the {} strategy", E::NAME);
        }

        self.store.instantiate(self.module.inner(), &self.options)?;
        self.initialized = true;
        log::info!(
            "initialized {}/{} backend with a call depth of {}",
            E::NAME,
            F::NAME,
            self.options.max_call_depth
        );

        if let Some(start) = self.module.start_func() {
            log::debug!("running start function {start}");
            if let Err(err) = self.invoke_addr(host, start, &[]) {
                self.initialized = false;
                return Err(err);
            }
        }

        Ok(())
    }

    /// Call an exported function for its side effects.
    ///
    /// `namespace` only shows up in errors; exports live in a single namespace.
    pub fn call(&mut self, host: &mut H, namespace: &str, name: &str, args: &[WasmValue]) -> Result<()> {
        let (func, _) = self.resolve_export(namespace, name, args)?;
        self.invoke_addr(host, func, args)?;
        Ok(())
    }

    /// Call an exported function that returns at most one value.
    ///
    /// Functions with multiple results are rejected before they run, use [`Backend::invoke`].
    pub fn call_with_return(
        &mut self,
        host: &mut H,
        namespace: &str,
        name: &str,
        args: &[WasmValue],
    ) -> Result<Option<WasmValue>> {
        let (func, results) = self.resolve_export(namespace, name, args)?;
        if results > 1 {
            return Err(Error::UnsupportedFeature(format!("{name} returns {results} values, use invoke")));
        }

        Ok(self.invoke_addr(host, func, args)?.into_iter().next())
    }

    /// Call an exported function, returning all of its results.
    pub fn invoke(&mut self, host: &mut H, name: &str, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        let (func, _) = self.resolve_export("env", name, args)?;
        self.invoke_addr(host, func, args)
    }

    /// Call an exported function with typed parameters and results.
    pub fn call_typed<P: IntoWasmValueTuple, R: FromWasmValueTuple>(
        &mut self,
        host: &mut H,
        name: &str,
        params: P,
    ) -> Result<R> {
        let results = self.invoke(host, name, &params.into_wasm_value_tuple())?;
        R::from_wasm_value_tuple(results)
    }

    /// The module bound to this backend.
    pub fn get_module(&self) -> &Module {
        &self.module
    }

    /// The options in effect.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The number of active calls. Zero whenever no call is running.
    pub fn call_depth(&self) -> u32 {
        self.guard.depth()
    }

    /// Whether the last [`Backend::initialize`] succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The instance's linear memory.
    pub fn memory(&self) -> Result<&dyn MemoryAllocator> {
        self.store.memory()
    }

    /// The instance's linear memory, mutably.
    pub fn memory_mut(&mut self) -> Result<&mut dyn MemoryAllocator> {
        self.store.memory_mut()
    }

    /// Find an export and check the arguments, yielding its address and result count.
    fn resolve_export(&self, namespace: &str, name: &str, args: &[WasmValue]) -> Result<(FuncAddr, usize)> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let func = self
            .module
            .export_func(name)
            .ok_or_else(|| Error::FunctionNotFound { module: String::from(namespace), name: String::from(name) })?;
        let ty = self.module.func_type(func).ok_or_else(|| Error::Other(format!("function {func} has no type")))?;
        check_arguments(ty, args)?;
        Ok((func, ty.results.len()))
    }

    fn invoke_addr(&mut self, host: &mut H, func: FuncAddr, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(Error::NotInitialized);
        };

        let mut caller = Caller {
            module: self.module.inner(),
            store: &mut self.store,
            host_funcs: &self.host_funcs,
            guard: &mut self.guard,
            host,
            runtime,
        };
        let result = runtime.invoke(&mut caller, func, args);

        if let Err(err) = &result {
            if let Error::Trap(Trap::CallDepthExceeded { max_depth }) = err {
                log::error!("call depth of {max_depth} exceeded by function {func}");
            }
            self.guard.reset(self.options.max_call_depth);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HardFloat, Jit, WasmAllocator};
    use detwasm_types::{DetWasmModule, Export, ExternalKind, FuncType, Instruction, ValType, WasmFunction};

    fn answer_module() -> DetWasmModule {
        DetWasmModule {
            func_types: Box::new([FuncType::new(&[], &[ValType::I32])]),
            funcs: Box::new([WasmFunction {
                ty: 0,
                locals: Box::new([]),
                instructions: Box::new([Instruction::I32Const(42), Instruction::Return]),
            }]),
            exports: Box::new([Export { name: "answer".into(), kind: ExternalKind::Func, index: 0 }]),
            ..Default::default()
        }
    }

    fn answer<E: ExecutionStrategy, F: FloatPolicy>() {
        let mut backend = Backend::<(), E, F>::from_module(answer_module(), Options::default());
        assert!(matches!(backend.call_with_return(&mut (), "env", "answer", &[]), Err(Error::NotInitialized)));
        assert!(matches!(backend.initialize(&mut (), None), Err(Error::AllocatorNotSet)));

        backend.set_memory_allocator(WasmAllocator::new());
        backend.initialize(&mut (), None).unwrap();
        assert_eq!(backend.call_with_return(&mut (), "env", "answer", &[]).unwrap(), Some(WasmValue::I32(42)));
        assert_eq!(backend.call_depth(), 0);
    }

    #[test]
    fn lifecycle_under_every_combination() {
        answer::<Interpreter, SoftFloat>();
        answer::<Interpreter, HardFloat>();
        answer::<Jit, SoftFloat>();
        answer::<Jit, HardFloat>();
    }

    #[test]
    fn new_options_take_effect_on_initialize() {
        let mut backend = Backend::<()>::from_module(answer_module(), Options::default());
        backend.set_memory_allocator(WasmAllocator::new());
        backend.initialize(&mut (), Some(Options::with_max_call_depth(7))).unwrap();
        assert_eq!(backend.options().max_call_depth, 7);

        backend.initialize(&mut (), None).unwrap();
        assert_eq!(backend.options().max_call_depth, 7);
    }

    #[test]
    fn a_zero_ceiling_refuses_the_entry_call() {
        let mut backend = Backend::<()>::from_module(answer_module(), Options::with_max_call_depth(0));
        backend.set_memory_allocator(WasmAllocator::new());
        backend.initialize(&mut (), None).unwrap();

        let err = backend.call(&mut (), "env", "answer", &[]).unwrap_err();
        assert!(matches!(err, Error::Trap(Trap::CallDepthExceeded { max_depth: 0 })));
        assert_eq!(backend.call_depth(), 0);
    }
}
