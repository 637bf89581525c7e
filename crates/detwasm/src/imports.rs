use core::fmt::Debug;

use alloc::{
    boxed::Box,
    collections::BTreeMap,
    format,
    rc::Rc,
    string::{String, ToString},
    vec::Vec,
};
use detwasm_types::{DetWasmModule, FuncAddr, FuncType, ImportKind, WasmValue};

use crate::func::{FromWasmValueTuple, IntoWasmValueTuple, ValTypesFromTuple};
use crate::store::Store;
use crate::{log, CallGuard, Error, Invoke, LinkingError, MemoryAllocator, Result};

type HostFuncInner<H> = Rc<dyn Fn(&mut Caller<'_, H>, &[WasmValue]) -> Result<Vec<WasmValue>>>;

/// A function implemented by the host.
///
/// Host functions are reference counted closures, so cloning one is cheap and a backend
/// holding them is neither `Send` nor `Sync`.
pub struct HostFunction<H> {
    pub(crate) ty: FuncType,
    pub(crate) func: HostFuncInner<H>,
}

impl<H> Clone for HostFunction<H> {
    fn clone(&self) -> Self {
        Self { ty: self.ty.clone(), func: self.func.clone() }
    }
}

impl<H> Debug for HostFunction<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostFunction").field("ty", &self.ty).field("func", &"...").finish()
    }
}

impl<H> HostFunction<H> {
    /// Create a host function from an untyped closure.
    ///
    /// The closure gets the arguments already checked against `ty`; its results are checked
    /// against `ty` after it returns.
    pub fn new(ty: &FuncType, func: impl Fn(&mut Caller<'_, H>, &[WasmValue]) -> Result<Vec<WasmValue>> + 'static) -> Self {
        Self { ty: ty.clone(), func: Rc::new(func) }
    }

    /// Create a host function from a closure over Rust tuples.
    pub fn typed<P, R>(func: impl Fn(&mut Caller<'_, H>, P) -> Result<R> + 'static) -> Self
    where
        P: FromWasmValueTuple + ValTypesFromTuple,
        R: IntoWasmValueTuple + ValTypesFromTuple,
    {
        let ty = FuncType { params: P::val_types(), results: R::val_types() };
        Self::new(&ty, move |caller, args| {
            let args = P::from_wasm_value_tuple(args.to_vec())?;
            let result = func(caller, args)?;
            Ok(result.into_wasm_value_tuple())
        })
    }

    /// The signature of the function.
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }
}

/// The host functions a module can import, keyed by module and field name.
pub struct Imports<H> {
    values: BTreeMap<(String, String), HostFunction<H>>,
}

impl<H> Default for Imports<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for Imports<H> {
    fn clone(&self) -> Self {
        Self { values: self.values.clone() }
    }
}

impl<H> Debug for Imports<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.values.iter().map(|((module, name), func)| (format!("{module}.{name}"), func))).finish()
    }
}

impl<H> Imports<H> {
    /// Create a new empty import set
    pub fn new() -> Self {
        Self { values: BTreeMap::new() }
    }

    /// Define an import. A later definition under the same name replaces the earlier one.
    pub fn define(&mut self, module: &str, name: &str, func: HostFunction<H>) -> Result<&mut Self> {
        self.values.insert((module.to_string(), name.to_string()), func);
        Ok(self)
    }

    /// Look up a definition.
    pub fn get(&self, module: &str, name: &str) -> Option<&HostFunction<H>> {
        self.values.get(&(module.to_string(), name.to_string()))
    }

    /// Match every import of `module` against the definitions.
    ///
    /// The result is indexed like the imported part of the function index space. Only function
    /// imports can be satisfied.
    pub(crate) fn resolve(&self, module: &DetWasmModule) -> Result<Box<[HostFunction<H>]>> {
        let mut funcs = Vec::with_capacity(module.imports.len());

        for import in module.imports.iter() {
            let found = self.get(&import.module, &import.name);
            let ty = match (&import.kind, found) {
                (_, None) => return Err(LinkingError::unknown_import(import).into()),
                (ImportKind::Function(ty), Some(_)) => module.func_types.get(*ty as usize),
                (_, Some(_)) => return Err(LinkingError::incompatible_import_type(import).into()),
            };

            match (ty, found) {
                (Some(ty), Some(func)) if *ty == func.ty => funcs.push(func.clone()),
                _ => return Err(LinkingError::incompatible_import_type(import).into()),
            }
        }

        log::debug!("resolved {} host functions", funcs.len());
        Ok(funcs.into_boxed_slice())
    }
}

/// The view a host function gets of the backend that called it.
///
/// A caller gives access to the host context, the instance's linear memory and the module's
/// exports, so host code can call back into WebAssembly. Re-entrant calls count against the
/// same call depth as the call that led to the host function.
pub struct Caller<'a, H> {
    pub(crate) module: &'a DetWasmModule,
    pub(crate) store: &'a mut Store,
    pub(crate) host_funcs: &'a [HostFunction<H>],
    pub(crate) guard: &'a mut CallGuard,
    pub(crate) host: &'a mut H,
    pub(crate) runtime: &'a dyn Invoke<H>,
}

impl<H> Debug for Caller<'_, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Caller").field("guard", &self.guard).field("store", &self.store).finish_non_exhaustive()
    }
}

impl<H> Caller<'_, H> {
    /// The host context passed to the backend.
    pub fn host(&self) -> &H {
        &*self.host
    }

    /// The host context passed to the backend, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut *self.host
    }

    /// The instance's linear memory.
    pub fn memory(&self) -> Result<&dyn MemoryAllocator> {
        self.store.memory()
    }

    /// The instance's linear memory, mutably.
    pub fn memory_mut(&mut self) -> Result<&mut dyn MemoryAllocator> {
        self.store.memory_mut()
    }

    /// The number of currently active calls, this host function's own unit included.
    pub fn depth(&self) -> u32 {
        self.guard.depth()
    }

    /// Call an exported function of the module.
    pub fn call(&mut self, name: &str, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        let func = self.module.export_func(name).ok_or_else(|| Error::FunctionNotFound {
            module: String::from("env"),
            name: name.to_string(),
        })?;
        let ty = self.module.func_type_of(func).ok_or_else(|| Error::Other(format!("function {func} has no type")))?;
        check_arguments(ty, args)?;

        let runtime = self.runtime;
        runtime.invoke(self, func, args)
    }

    /// Call a host function by its index in the imported function space.
    ///
    /// Takes one unit of call depth for the duration of the call.
    pub(crate) fn call_host(&mut self, func: FuncAddr, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        let host_funcs = self.host_funcs;
        let host_func = host_funcs
            .get(func as usize)
            .ok_or_else(|| Error::Other(format!("host function {func} is not linked")))?;

        self.guard.enter()?;
        let result = (host_func.func)(&mut *self, args);
        self.guard.exit();

        let results = result?;
        let valid = results.len() == host_func.ty.results.len()
            && results.iter().zip(host_func.ty.results.iter()).all(|(value, ty)| value.val_type() == *ty);
        if !valid {
            crate::cold();
            return Err(Error::Other(format!(
                "host function {func} returned {results:?}, expected {:?}",
                host_func.ty.results
            )));
        }

        Ok(results)
    }
}

/// Check call arguments against a function type.
pub(crate) fn check_arguments(ty: &FuncType, args: &[WasmValue]) -> Result<()> {
    if ty.params.len() != args.len() {
        return Err(Error::InvalidArguments(format!("expected {} arguments, got {}", ty.params.len(), args.len())));
    }

    if let Some((i, (arg, ty))) = args.iter().zip(ty.params.iter()).enumerate().find(|(_, (arg, ty))| arg.val_type() != **ty) {
        return Err(Error::InvalidArguments(format!("argument {i} is {arg:?}, expected {ty:?}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use detwasm_types::{Import, ValType};

    fn module_importing(kind: ImportKind, func_types: &[FuncType]) -> DetWasmModule {
        DetWasmModule {
            func_types: func_types.into(),
            imports: Box::new([Import { module: "env".into(), name: "f".into(), kind }]),
            ..Default::default()
        }
    }

    #[test]
    fn resolve_matches_signatures() {
        let mut imports = Imports::<()>::new();
        imports.define("env", "f", HostFunction::typed(|_, a: i32| Ok(a + 1))).unwrap();

        let ok = module_importing(ImportKind::Function(0), &[FuncType::new(&[ValType::I32], &[ValType::I32])]);
        assert_eq!(imports.resolve(&ok).unwrap().len(), 1);

        let wrong = module_importing(ImportKind::Function(0), &[FuncType::new(&[ValType::I64], &[ValType::I32])]);
        assert!(matches!(imports.resolve(&wrong), Err(Error::Linker(LinkingError::IncompatibleImportType { .. }))));
    }

    #[test]
    fn resolve_reports_missing_imports() {
        let imports = Imports::<()>::new();
        let module = module_importing(ImportKind::Function(0), &[FuncType::empty()]);
        assert!(matches!(imports.resolve(&module), Err(Error::Linker(LinkingError::UnknownImport { .. }))));
    }

    #[test]
    fn only_functions_can_be_imported() {
        let mut imports = Imports::<()>::new();
        imports.define("env", "f", HostFunction::new(&FuncType::empty(), |_, _| Ok(Vec::new()))).unwrap();
        let memory = detwasm_types::MemoryType { page_count_initial: 1, page_count_max: None };
        let module = module_importing(ImportKind::Memory(memory), &[]);
        assert!(matches!(imports.resolve(&module), Err(Error::Linker(LinkingError::IncompatibleImportType { .. }))));
    }

    #[test]
    fn arguments_are_checked() {
        let ty = FuncType::new(&[ValType::I32, ValType::F64], &[]);
        assert!(check_arguments(&ty, &[WasmValue::I32(1), WasmValue::F64(1.0)]).is_ok());
        assert!(matches!(check_arguments(&ty, &[WasmValue::I32(1)]), Err(Error::InvalidArguments(_))));
        assert!(matches!(check_arguments(&ty, &[WasmValue::I32(1), WasmValue::F32(1.0)]), Err(Error::InvalidArguments(_))));
    }
}
