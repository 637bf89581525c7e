#![no_std]
#![forbid(unsafe_code)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_assignments, unused_variables))
))]
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

//! Types shared by [`detwasm`](https://docs.rs/detwasm) and [`detwasm_parser`](https://docs.rs/detwasm_parser).

extern crate alloc;

mod instructions;
mod value;

use alloc::boxed::Box;
use core::{fmt::Debug, ops::Range};

pub use instructions::*;
pub use value::*;

/// A validated, lowered WebAssembly module.
///
/// Produced by `detwasm-parser` after full validation. Function bodies are stored as
/// [`Instruction`] sequences with precomputed block offsets, so both the interpreter and the
/// compiler can walk them without re-validating. A `DetWasmModule` built by hand is not
/// checked again and must be trusted by whoever constructs it.
#[derive(Debug, Clone, Default)]
pub struct DetWasmModule {
    /// The version of the WebAssembly module.
    pub version: Option<u16>,

    /// The start function of the WebAssembly module.
    pub start_func: Option<FuncAddr>,

    /// The function types of the WebAssembly module.
    pub func_types: Box<[FuncType]>,

    /// The functions defined by the module (imported functions come first in the
    /// function index space and are not part of this list).
    pub funcs: Box<[WasmFunction]>,

    /// The imports of the WebAssembly module.
    pub imports: Box<[Import]>,

    /// The exports of the WebAssembly module.
    pub exports: Box<[Export]>,

    /// The globals of the WebAssembly module.
    pub globals: Box<[Global]>,

    /// The tables of the WebAssembly module.
    pub table_types: Box<[TableType]>,

    /// The memories of the WebAssembly module.
    pub memory_types: Box<[MemoryType]>,

    /// Element segments of the WebAssembly module.
    pub elements: Box<[Element]>,

    /// Data segments of the WebAssembly module.
    pub data: Box<[Data]>,
}

impl DetWasmModule {
    /// Number of imported functions, which occupy the start of the function index space.
    pub fn imported_func_count(&self) -> u32 {
        self.imports.iter().filter(|import| matches!(import.kind, ImportKind::Function(_))).count() as u32
    }

    /// Resolve the type of any function in the function index space.
    pub fn func_type_of(&self, addr: FuncAddr) -> Option<&FuncType> {
        let imported = self.imported_func_count();
        let type_addr = match addr.checked_sub(imported) {
            Some(local) => self.funcs.get(local as usize)?.ty,
            None => self
                .imports
                .iter()
                .filter_map(|import| match import.kind {
                    ImportKind::Function(ty) => Some(ty),
                    _ => None,
                })
                .nth(addr as usize)?,
        };
        self.func_types.get(type_addr as usize)
    }

    /// Find an exported function by name.
    pub fn export_func(&self, name: &str) -> Option<FuncAddr> {
        self.exports.iter().find(|e| e.kind == ExternalKind::Func && &*e.name == name).map(|e| e.index)
    }
}

/// A WebAssembly External Kind.
///
/// See <https://webassembly.github.io/spec/core/syntax/types.html#external-types>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    /// A WebAssembly Function.
    Func,
    /// A WebAssembly Table.
    Table,
    /// A WebAssembly Memory.
    Memory,
    /// A WebAssembly Global.
    Global,
}

/// A WebAssembly Address.
///
/// These are indexes into the respective index spaces of a module.
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#addresses>
pub type Addr = u32;

// aliases for clarity
pub type FuncAddr = Addr;
pub type TableAddr = Addr;
pub type MemAddr = Addr;
pub type GlobalAddr = Addr;
pub type ElemAddr = Addr;
pub type DataAddr = Addr;

// additional internal addresses
pub type TypeAddr = Addr;
pub type LocalAddr = Addr;
pub type LabelAddr = Addr;

/// The type of a WebAssembly Function.
///
/// See <https://webassembly.github.io/spec/core/syntax/types.html#function-types>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub params: Box<[ValType]>,
    pub results: Box<[ValType]>,
}

impl FuncType {
    /// Create a new function type.
    pub fn new(params: &[ValType], results: &[ValType]) -> Self {
        Self { params: params.into(), results: results.into() }
    }

    /// Create a new function type with no parameters and no results.
    pub fn empty() -> Self {
        Self { params: Box::new([]), results: Box::new([]) }
    }
}

/// A function defined inside a module.
#[derive(Debug, Clone)]
pub struct WasmFunction {
    /// Index into the module's function types.
    pub ty: TypeAddr,
    /// Declared locals, not including the parameters.
    pub locals: Box<[ValType]>,
    pub instructions: Box<[Instruction]>,
}

/// A WebAssembly Module Export
#[derive(Debug, Clone)]
pub struct Export {
    /// The name of the export.
    pub name: Box<str>,
    /// The kind of the export.
    pub kind: ExternalKind,
    /// The index of the exported item.
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub mutable: bool,
    pub ty: ValType,
}

/// A `funcref` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub size_initial: u32,
    pub size_max: Option<u32>,
}

/// A 32-bit linear memory, sizes in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    pub page_count_initial: u32,
    pub page_count_max: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: Box<str>,
    pub name: Box<str>,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    Function(TypeAddr),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone)]
pub struct Data {
    pub data: Box<[u8]>,
    pub range: Range<usize>,
    pub kind: DataKind,
}

#[derive(Debug, Clone)]
pub enum DataKind {
    Active { mem: MemAddr, offset: ConstInstruction },
    Passive,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    /// `None` marks a `ref.null` entry.
    pub items: Box<[Option<FuncAddr>]>,
    pub range: Range<usize>,
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Passive,
    Active { table: TableAddr, offset: ConstInstruction },
    Declared,
}
