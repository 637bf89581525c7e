#![no_std]
#![forbid(unsafe_code)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_assignments, unused_variables))
))]
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

//! A deterministic WebAssembly engine.
//!
//! `detwasm` runs untrusted modules with bit-exact results. Every [`Backend`] is assembled
//! from two independent choices:
//!
//! * an [`ExecutionStrategy`]: the [`Interpreter`] walks the lowered instruction stream,
//!   the [`Jit`] compiles each function into a tree of closures before the first call;
//! * a [`FloatPolicy`]: [`SoftFloat`] emulates IEEE-754 on integers, [`HardFloat`] uses the
//!   FPU (or `libm` without `std`).
//!
//! All four combinations produce identical results, NaN payloads included, and share one
//! [`CallGuard`] that bounds recursion across direct, indirect and host calls.
//!
//! ## Features
//! - **`std`**\
//!   Enables the use of `std` and `std::io` for parsing from files and streams. This is enabled by default.
//! - **`log`**\
//!   Enables logging using the `log` crate. This is enabled by default.
//! - **`parser`**\
//!   Enables the `detwasm-parser` crate. This is enabled by default.
//! - **`serde`**\
//!   Derives `Serialize` and `Deserialize` for [`Options`].
//!
//! ## Getting started
//!
//! ```rust
//! use detwasm::{Backend, Interpreter, SoftFloat, WasmAllocator, types::WasmValue};
//!
//! let wasm = wat::parse_str(r#"(module (func (export "add") (param i32 i32) (result i32)
//!     (i32.add (local.get 0) (local.get 1))))"#)?;
//!
//! let mut backend = Backend::<(), Interpreter, SoftFloat>::new(&wasm)?;
//! backend.set_memory_allocator(WasmAllocator::new());
//! backend.initialize(&mut (), None)?;
//!
//! let sum = backend.call_with_return(&mut (), "env", "add", &[WasmValue::I32(1), WasmValue::I32(2)])?;
//! assert_eq!(sum, Some(WasmValue::I32(3)));
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

// log for logging (optional).
#[cfg(feature = "log")]
#[allow(clippy::single_component_path_imports, unused_imports)]
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

mod backend;
mod error;
mod func;
mod guard;
mod imports;
mod memory;
mod module;
mod options;
mod store;

pub mod float;
pub mod interpreter;
pub mod jit;
pub mod runtime;

pub use backend::Backend;
pub use error::*;
pub use float::{FloatPolicy, HardFloat, SoftFloat};
pub use func::{FromWasmValueTuple, IntoWasmValueTuple, ToValType, ValTypesFromTuple};
pub use guard::CallGuard;
pub use imports::{Caller, HostFunction, Imports};
pub use memory::{MemoryAllocator, WasmAllocator, PAGE_SIZE};
pub use module::Module;
pub use options::Options;
pub use runtime::{ExecutionStrategy, Interpreter, Invoke, Jit, RawValue};

/// Re-export of [`detwasm_types`].
pub mod types {
    pub use detwasm_types::*;
}

#[cfg(feature = "parser")]
/// Re-export of [`detwasm_parser`]. Requires the `parser` feature.
pub mod parser {
    pub use detwasm_parser::*;
}

#[cold]
pub(crate) fn cold() {}

pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold();
    };
    b
}
