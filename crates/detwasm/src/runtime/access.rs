use detwasm_types::{Instruction, MemoryArg};

use super::RawValue;
use crate::{MemoryAllocator, Result};

/// A resolved load instruction.
#[derive(Clone, Copy)]
pub(crate) struct LoadOp {
    pub(crate) arg: MemoryArg,
    width: usize,
    extend: fn(u64) -> u64,
}

/// A resolved store instruction. Stores write the low `width` bytes of the value.
#[derive(Clone, Copy)]
pub(crate) struct StoreOp {
    pub(crate) arg: MemoryArg,
    width: usize,
}

#[inline]
fn effective_address(base: RawValue, arg: &MemoryArg) -> u64 {
    (base.0 as u32 as u64) + arg.offset
}

impl LoadOp {
    /// Load from `base + offset`.
    #[inline]
    pub(crate) fn load(&self, memory: &dyn MemoryAllocator, base: RawValue) -> Result<RawValue> {
        let bytes = memory.load(effective_address(base, &self.arg), self.width)?;
        let mut buf = [0u8; 8];
        buf[..self.width].copy_from_slice(bytes);
        Ok(RawValue((self.extend)(u64::from_le_bytes(buf))))
    }
}

impl StoreOp {
    /// Store `value` at `base + offset`.
    #[inline]
    pub(crate) fn store(&self, memory: &mut dyn MemoryAllocator, base: RawValue, value: RawValue) -> Result<()> {
        let bytes = value.0.to_le_bytes();
        memory.store(effective_address(base, &self.arg), &bytes[..self.width])
    }
}

macro_rules! load {
    ($arg:expr, $width:expr, |$v:ident| $extend:expr) => {
        LoadOp { arg: *$arg, width: $width, extend: |$v| $extend }
    };
}

/// Resolve a load instruction.
#[rustfmt::skip]
pub(crate) fn load_op(instr: &Instruction) -> Option<LoadOp> {
    use Instruction::*;
    Some(match instr {
        I32Load(arg) | F32Load(arg) | I64Load32U(arg) => load!(arg, 4, |v| v),
        I64Load(arg) | F64Load(arg) => load!(arg, 8, |v| v),
        I32Load8U(arg) | I64Load8U(arg) => load!(arg, 1, |v| v),
        I32Load16U(arg) | I64Load16U(arg) => load!(arg, 2, |v| v),
        I32Load8S(arg) => load!(arg, 1, |v| v as i8 as i32 as u32 as u64),
        I32Load16S(arg) => load!(arg, 2, |v| v as i16 as i32 as u32 as u64),
        I64Load8S(arg) => load!(arg, 1, |v| v as i8 as i64 as u64),
        I64Load16S(arg) => load!(arg, 2, |v| v as i16 as i64 as u64),
        I64Load32S(arg) => load!(arg, 4, |v| v as i32 as i64 as u64),
        _ => return None,
    })
}

/// Resolve a store instruction.
pub(crate) fn store_op(instr: &Instruction) -> Option<StoreOp> {
    use Instruction::*;
    let (arg, width) = match instr {
        I32Store(arg) | F32Store(arg) | I64Store32(arg) => (arg, 4),
        I64Store(arg) | F64Store(arg) => (arg, 8),
        I32Store8(arg) | I64Store8(arg) => (arg, 1),
        I32Store16(arg) | I64Store16(arg) => (arg, 2),
        _ => return None,
    };
    Some(StoreOp { arg: *arg, width })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmAllocator;

    #[test]
    fn sign_extension() {
        let mut memory = WasmAllocator::new();
        memory.reset(1, 1).unwrap();
        let arg = MemoryArg { offset: 4, mem_addr: 0 };

        store_op(&Instruction::I32Store16(arg)).unwrap().store(&mut memory, RawValue(0), RawValue(0x1234_8001)).unwrap();
        assert_eq!(memory.load(4, 4).unwrap(), &[0x01, 0x80, 0, 0]);

        let signed = load_op(&Instruction::I32Load16S(arg)).unwrap();
        assert_eq!(signed.load(&memory, RawValue(0)).unwrap(), RawValue(0xffff_8001));
        let unsigned = load_op(&Instruction::I64Load16U(arg)).unwrap();
        assert_eq!(unsigned.load(&memory, RawValue(0)).unwrap(), RawValue(0x8001));
    }

    #[test]
    fn address_overflow_traps() {
        let mut memory = WasmAllocator::new();
        memory.reset(1, 1).unwrap();
        let op = load_op(&Instruction::I32Load(MemoryArg { offset: u32::MAX as u64, mem_addr: 0 })).unwrap();
        assert!(op.load(&memory, RawValue(u32::MAX as u64)).is_err());
        assert!(load_op(&Instruction::Drop).is_none());
    }
}
