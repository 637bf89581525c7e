use super::{FuncAddr, GlobalAddr, LabelAddr, LocalAddr, MemAddr, TableAddr, TypeAddr, ValType};

/// Represents a memory immediate in a WebAssembly memory instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryArg {
    pub offset: u64,
    pub mem_addr: MemAddr,
}

type BrTableDefault = u32;
type BrTableLen = u32;
type EndOffset = u32;
type ElseOffset = u32;

/// Block signature of a `block`, `loop` or `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockArgs {
    Empty,
    Type(ValType),
    FuncType(TypeAddr),
}

/// A constant expression, as found in global initializers and segment offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstInstruction {
    I32Const(i32),
    I64Const(i64),
    /// Raw bits, so NaN payloads survive untouched.
    F32Const(u32),
    F64Const(u64),
    GlobalGet(GlobalAddr),
    RefNull,
    RefFunc(FuncAddr),
}

/// A lowered WebAssembly instruction.
///
/// This is the engine's own bytecode, so it does not match the binary format one to one.
///
/// # Differences to the binary format
/// * `br_table` stores its labels in the `BrLabel` instructions that directly follow it.
/// * Blocks carry the offset of their `EndBlockFrame` (and `If` the offset of its `Else`),
///   relative to the block instruction. The function-level `end` becomes `Return`.
/// * Float immediates are stored as raw bit patterns.
///
/// See <https://webassembly.github.io/spec/core/binary/instructions.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Instruction {
    // > Control Instructions
    // See <https://webassembly.github.io/spec/core/binary/instructions.html#control-instructions>
    Unreachable,
    Nop,
    Block(BlockArgs, EndOffset),
    Loop(BlockArgs, EndOffset),
    If(BlockArgs, ElseOffset, EndOffset),
    Else(EndOffset),
    EndBlockFrame,
    Br(LabelAddr),
    BrIf(LabelAddr),
    BrTable(BrTableDefault, BrTableLen), // has to be followed by multiple BrLabel instructions
    BrLabel(LabelAddr),
    Return,
    Call(FuncAddr),
    CallIndirect(TypeAddr, TableAddr),

    // > Parametric Instructions
    // See <https://webassembly.github.io/spec/core/binary/instructions.html#parametric-instructions>
    Drop,
    Select,

    // > Variable Instructions
    // See <https://webassembly.github.io/spec/core/binary/instructions.html#variable-instructions>
    LocalGet(LocalAddr),
    LocalSet(LocalAddr),
    LocalTee(LocalAddr),
    GlobalGet(GlobalAddr),
    GlobalSet(GlobalAddr),

    // > Memory Instructions
    I32Load(MemoryArg), I64Load(MemoryArg), F32Load(MemoryArg), F64Load(MemoryArg),
    I32Load8S(MemoryArg), I32Load8U(MemoryArg), I32Load16S(MemoryArg), I32Load16U(MemoryArg),
    I64Load8S(MemoryArg), I64Load8U(MemoryArg), I64Load16S(MemoryArg), I64Load16U(MemoryArg),
    I64Load32S(MemoryArg), I64Load32U(MemoryArg),
    I32Store(MemoryArg), I64Store(MemoryArg), F32Store(MemoryArg), F64Store(MemoryArg),
    I32Store8(MemoryArg), I32Store16(MemoryArg),
    I64Store8(MemoryArg), I64Store16(MemoryArg), I64Store32(MemoryArg),
    MemorySize(MemAddr),
    MemoryGrow(MemAddr),
    MemoryCopy(MemAddr, MemAddr),
    MemoryFill(MemAddr),

    // > Constants
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),

    // > Numeric Instructions
    // See <https://webassembly.github.io/spec/core/binary/instructions.html#numeric-instructions>
    I32Eqz, I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU, I32GeS, I32GeU,
    I64Eqz, I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU, I64GeS, I64GeU,
    // Comparisons
    F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge,
    F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge,
    I32Clz, I32Ctz, I32Popcnt, I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
    I64Clz, I64Ctz, I64Popcnt, I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
    // Bitwise
    I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr,
    I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr,
    // Floating Point
    F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt, F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign,
    F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt, F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign,
    I32WrapI64, I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U, I32Extend8S, I32Extend16S,
    I64Extend8S, I64Extend16S, I64Extend32S, I64ExtendI32S, I64ExtendI32U, I64TruncF32S, I64TruncF32U, I64TruncF64S, I64TruncF64U,
    F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U, F32DemoteF64,
    F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U, F64PromoteF32,
    // Reinterpretations (noops at runtime)
    I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,
    // Non-trapping Float-to-int Conversions
    I32TruncSatF32S, I32TruncSatF32U, I32TruncSatF64S, I32TruncSatF64U,
    I64TruncSatF32S, I64TruncSatF32U, I64TruncSatF64S, I64TruncSatF64U,
}
