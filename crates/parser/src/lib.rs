#![no_std]
#![forbid(unsafe_code)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_assignments, unused_variables))
))]
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

//! Validation and lowering of WebAssembly binaries into a [`DetWasmModule`].
//!
//! Every module goes through [`wasmparser::Validator`] before any of it is lowered, so
//! the runtime can rely on well-typed instruction sequences.

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

// log for logging (optional).
#[cfg(feature = "log")]
#[allow(clippy::single_component_path_imports)]
use log;

// noop fallback if logging is disabled.
#[cfg(not(feature = "log"))]
#[allow(unused_imports, unused_macros)]
pub(crate) mod log {
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! info    ( ($($tt:tt)*) => {{}} );
    macro_rules! error    ( ($($tt:tt)*) => {{}} );
    pub(crate) use debug;
    pub(crate) use error;
    pub(crate) use info;
}

mod conversion;
mod error;
mod module;
mod visit;

pub use error::*;
use detwasm_types::DetWasmModule;
use module::ModuleReader;
use wasmparser::Validator;

/// Parser for WebAssembly binaries.
#[derive(Debug, Default)]
pub struct Parser {}

impl Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {}
    }

    /// Validate and lower a module from its binary representation.
    pub fn parse_module_bytes(&self, wasm: impl AsRef<[u8]>) -> Result<DetWasmModule> {
        let wasm = wasm.as_ref();
        // proposals beyond the supported set are rejected while lowering
        let mut validator = Validator::new();
        let mut reader = ModuleReader::new();

        for payload in wasmparser::Parser::new(0).parse_all(wasm) {
            reader.process_payload(payload?, &mut validator)?;
        }

        if !reader.end_reached {
            return Err(ParseError::EndNotReached);
        }

        reader.into_module()
    }

    #[cfg(feature = "std")]
    /// Validate and lower a module read from a file.
    pub fn parse_module_file(&self, path: impl AsRef<crate::std::path::Path>) -> Result<DetWasmModule> {
        use alloc::format;
        let path = path.as_ref();
        let wasm = crate::std::fs::read(path)
            .map_err(|e| ParseError::Other(format!("Error reading file {path:?}: {e}")))?;
        self.parse_module_bytes(wasm)
    }
}
