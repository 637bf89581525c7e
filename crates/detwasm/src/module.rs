use detwasm_types::{DetWasmModule, Export, FuncAddr, FuncType, Import};

#[cfg(feature = "parser")]
use crate::Result;

#[derive(Debug, Clone)]
/// A validated WebAssembly module
///
/// See <https://webassembly.github.io/spec/core/syntax/modules.html#syntax-module>
pub struct Module {
    data: DetWasmModule,
}

impl From<&DetWasmModule> for Module {
    fn from(data: &DetWasmModule) -> Self {
        Self { data: data.clone() }
    }
}

impl From<DetWasmModule> for Module {
    fn from(data: DetWasmModule) -> Self {
        Self { data }
    }
}

impl Module {
    #[cfg(feature = "parser")]
    /// Parse a module from bytes. Requires `parser` feature.
    pub fn parse_bytes(wasm: &[u8]) -> Result<Self> {
        let parser = detwasm_parser::Parser::new();
        let data = parser.parse_module_bytes(wasm)?;
        Ok(data.into())
    }

    #[cfg(all(feature = "parser", feature = "std"))]
    /// Parse a module from a file. Requires `parser` and `std` features.
    pub fn parse_file(path: impl AsRef<crate::std::path::Path>) -> Result<Self> {
        let parser = detwasm_parser::Parser::new();
        let data = parser.parse_module_file(path)?;
        Ok(data.into())
    }

    /// The imports of the module, in index order.
    pub fn imports(&self) -> &[Import] {
        &self.data.imports
    }

    /// The exports of the module.
    pub fn exports(&self) -> &[Export] {
        &self.data.exports
    }

    /// Find an exported function by name.
    pub fn export_func(&self, name: &str) -> Option<FuncAddr> {
        self.data.export_func(name)
    }

    /// The type of a function in the function index space.
    pub fn func_type(&self, func: FuncAddr) -> Option<&FuncType> {
        self.data.func_type_of(func)
    }

    /// The function run at the end of initialization.
    pub fn start_func(&self) -> Option<FuncAddr> {
        self.data.start_func
    }

    /// The underlying lowered module.
    pub fn inner(&self) -> &DetWasmModule {
        &self.data
    }
}
