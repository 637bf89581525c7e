use crate::conversion::{convert_blocktype, convert_memarg};
use crate::{ParseError, Result};
use alloc::{boxed::Box, format, vec::Vec};
use detwasm_types::Instruction;
use wasmparser::{FunctionBody, Operator};

/// Lower the operators of a validated function body.
pub(crate) fn process_operators(body: &FunctionBody<'_>) -> Result<Box<[Instruction]>> {
    let mut reader = body.get_operators_reader()?;
    let mut builder = FunctionBuilder::new(body.range().len());

    while !reader.eof() {
        builder.visit(reader.read()?)?;
    }

    if !builder.label_ptrs.is_empty() {
        return Err(ParseError::Other(format!("{} unterminated blocks", builder.label_ptrs.len())));
    }

    Ok(builder.instructions.into_boxed_slice())
}

macro_rules! define_operands {
    ($($name:ident),* $(,)?) => {
        fn lower_operand(op: &Operator<'_>) -> Option<Instruction> {
            match op {
                $(Operator::$name => Some(Instruction::$name),)*
                _ => None,
            }
        }
    };
}

macro_rules! define_mem_operands {
    ($($name:ident),* $(,)?) => {
        fn lower_mem_operand(op: &Operator<'_>) -> Option<Instruction> {
            match op {
                $(Operator::$name { memarg } => Some(Instruction::$name(convert_memarg(*memarg))),)*
                _ => None,
            }
        }
    };
}

define_operands! {
    Unreachable, Nop, Return, Drop, Select,
    I32Eqz, I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU, I32GeS, I32GeU,
    I64Eqz, I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU, I64GeS, I64GeU,
    F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge,
    F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge,
    I32Clz, I32Ctz, I32Popcnt, I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
    I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr,
    I64Clz, I64Ctz, I64Popcnt, I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
    I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr,
    F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt,
    F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign,
    F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt,
    F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign,
    I32WrapI64, I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U,
    I64ExtendI32S, I64ExtendI32U, I64TruncF32S, I64TruncF32U, I64TruncF64S, I64TruncF64U,
    F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U, F32DemoteF64,
    F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U, F64PromoteF32,
    I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,
    I32Extend8S, I32Extend16S, I64Extend8S, I64Extend16S, I64Extend32S,
    I32TruncSatF32S, I32TruncSatF32U, I32TruncSatF64S, I32TruncSatF64U,
    I64TruncSatF32S, I64TruncSatF32U, I64TruncSatF64S, I64TruncSatF64U,
}

define_mem_operands! {
    I32Load, I64Load, F32Load, F64Load,
    I32Load8S, I32Load8U, I32Load16S, I32Load16U,
    I64Load8S, I64Load8U, I64Load16S, I64Load16U, I64Load32S, I64Load32U,
    I32Store, I64Store, F32Store, F64Store,
    I32Store8, I32Store16, I64Store8, I64Store16, I64Store32,
}

#[derive(Debug)]
pub(crate) struct FunctionBuilder {
    instructions: Vec<Instruction>,
    label_ptrs: Vec<usize>,
}

impl FunctionBuilder {
    pub(crate) fn new(instr_capacity: usize) -> Self {
        Self { instructions: Vec::with_capacity(instr_capacity), label_ptrs: Vec::with_capacity(32) }
    }

    fn offset_from(&self, label_pointer: usize) -> Result<u32> {
        (self.instructions.len() - label_pointer)
            .try_into()
            .map_err(|_| ParseError::TooLarge(format!("block at {label_pointer}")))
    }

    fn visit(&mut self, op: Operator<'_>) -> Result<()> {
        if let Some(instr) = lower_operand(&op).or_else(|| lower_mem_operand(&op)) {
            self.instructions.push(instr);
            return Ok(());
        }

        let instr = match op {
            Operator::Block { blockty } => {
                self.label_ptrs.push(self.instructions.len());
                Instruction::Block(convert_blocktype(blockty)?, 0)
            }
            Operator::Loop { blockty } => {
                self.label_ptrs.push(self.instructions.len());
                Instruction::Loop(convert_blocktype(blockty)?, 0)
            }
            Operator::If { blockty } => {
                self.label_ptrs.push(self.instructions.len());
                Instruction::If(convert_blocktype(blockty)?, 0, 0)
            }
            Operator::Else => {
                self.label_ptrs.push(self.instructions.len());
                Instruction::Else(0)
            }
            Operator::End => return self.visit_end(),
            Operator::Br { relative_depth } => Instruction::Br(relative_depth),
            Operator::BrIf { relative_depth } => Instruction::BrIf(relative_depth),
            Operator::BrTable { targets } => {
                let labels = targets.targets().map(|t| t.map(Instruction::BrLabel)).collect::<Result<Vec<_>, _>>()?;
                self.instructions.push(Instruction::BrTable(targets.default(), labels.len() as u32));
                self.instructions.extend(labels);
                return Ok(());
            }
            Operator::Call { function_index } => Instruction::Call(function_index),
            Operator::CallIndirect { type_index, table_index } => Instruction::CallIndirect(type_index, table_index),
            Operator::TypedSelect { .. } => Instruction::Select,
            Operator::LocalGet { local_index } => Instruction::LocalGet(local_index),
            Operator::LocalSet { local_index } => Instruction::LocalSet(local_index),
            Operator::LocalTee { local_index } => Instruction::LocalTee(local_index),
            Operator::GlobalGet { global_index } => Instruction::GlobalGet(global_index),
            Operator::GlobalSet { global_index } => Instruction::GlobalSet(global_index),
            Operator::MemorySize { mem } => Instruction::MemorySize(mem),
            Operator::MemoryGrow { mem } => Instruction::MemoryGrow(mem),
            Operator::MemoryCopy { dst_mem, src_mem } => Instruction::MemoryCopy(dst_mem, src_mem),
            Operator::MemoryFill { mem } => Instruction::MemoryFill(mem),
            Operator::I32Const { value } => Instruction::I32Const(value),
            Operator::I64Const { value } => Instruction::I64Const(value),
            Operator::F32Const { value } => Instruction::F32Const(value.bits()),
            Operator::F64Const { value } => Instruction::F64Const(value.bits()),
            op => return Err(ParseError::UnsupportedOperator(format!("{op:?}"))),
        };

        self.instructions.push(instr);
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        let Some(label_pointer) = self.label_ptrs.pop() else {
            // end of the function body
            self.instructions.push(Instruction::Return);
            return Ok(());
        };

        let end_offset = self.offset_from(label_pointer)?;
        match self.instructions.get_mut(label_pointer) {
            Some(Instruction::Block(_, end) | Instruction::Loop(_, end) | Instruction::If(_, _, end)) => {
                *end = end_offset;
            }
            Some(Instruction::Else(end)) => {
                *end = end_offset;
                // ending an else block ends its if block as well
                self.end_if(label_pointer)?;
            }
            other => return Err(ParseError::Other(format!("end of a non-block instruction {other:?}"))),
        }

        self.instructions.push(Instruction::EndBlockFrame);
        Ok(())
    }

    fn end_if(&mut self, else_pointer: usize) -> Result<()> {
        let if_pointer =
            self.label_ptrs.pop().ok_or_else(|| ParseError::Other(format!("else at {else_pointer} without an if")))?;
        let if_end_offset = self.offset_from(if_pointer)?;
        let else_offset = (else_pointer - if_pointer)
            .try_into()
            .map_err(|_| ParseError::TooLarge(format!("block at {if_pointer}")))?;

        match self.instructions.get_mut(if_pointer) {
            Some(Instruction::If(_, if_else, if_end)) => {
                *if_else = else_offset;
                *if_end = if_end_offset;
                Ok(())
            }
            _ => Err(ParseError::Other(format!("else at {else_pointer} without an if"))),
        }
    }
}
