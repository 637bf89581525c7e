use crate::visit::process_operators;
use crate::{ParseError, Result};
use alloc::{boxed::Box, format, string::ToString, vec::Vec};
use detwasm_types::*;
use wasmparser::{FunctionBody, OperatorsReader};

pub(crate) fn convert_module_types(reader: wasmparser::TypeSectionReader<'_>) -> Result<Vec<FuncType>> {
    let mut types = Vec::new();
    for group in reader {
        for sub_type in group?.into_types() {
            match &sub_type.composite_type.inner {
                wasmparser::CompositeInnerType::Func(ty) => types.push(convert_func_type(ty)?),
                _ => return Err(ParseError::InvalidType("only function types are supported".to_string())),
            }
        }
    }
    Ok(types)
}

pub(crate) fn convert_func_type(ty: &wasmparser::FuncType) -> Result<FuncType> {
    let params = ty.params().iter().map(convert_valtype).collect::<Result<Vec<ValType>>>()?.into_boxed_slice();
    let results = ty.results().iter().map(convert_valtype).collect::<Result<Vec<ValType>>>()?.into_boxed_slice();
    Ok(FuncType { params, results })
}

pub(crate) fn convert_module_imports(reader: wasmparser::ImportSectionReader<'_>) -> Result<Vec<Import>> {
    let mut imports = Vec::new();
    for group in reader {
        for import in group? {
            let (_offset, import) = import?;
            imports.push(convert_module_import(import)?);
        }
    }
    Ok(imports)
}

pub(crate) fn convert_module_import(import: wasmparser::Import<'_>) -> Result<Import> {
    let kind = match import.ty {
        wasmparser::TypeRef::Func(ty) => ImportKind::Function(ty),
        wasmparser::TypeRef::Table(ty) => ImportKind::Table(convert_table_type(&ty)?),
        wasmparser::TypeRef::Memory(ty) => ImportKind::Memory(convert_module_memory(ty)?),
        wasmparser::TypeRef::Global(ty) => {
            ImportKind::Global(GlobalType { mutable: ty.mutable, ty: convert_valtype(&ty.content_type)? })
        }
        ty => return Err(ParseError::UnsupportedSection(format!("import of kind {ty:?}"))),
    };

    Ok(Import { module: Box::from(import.module), name: Box::from(import.name), kind })
}

pub(crate) fn convert_module_memories(reader: wasmparser::MemorySectionReader<'_>) -> Result<Vec<MemoryType>> {
    reader.into_iter().map(|memory| convert_module_memory(memory?)).collect()
}

pub(crate) fn convert_module_memory(memory: wasmparser::MemoryType) -> Result<MemoryType> {
    if memory.memory64 || memory.shared || memory.page_size_log2.is_some() {
        return Err(ParseError::UnsupportedSection("only 32-bit, unshared memories with 64 KiB pages".to_string()));
    }

    let page_count_initial = to_u32(memory.initial, "initial memory size")?;
    let page_count_max = memory.maximum.map(|max| to_u32(max, "maximum memory size")).transpose()?;
    Ok(MemoryType { page_count_initial, page_count_max })
}

pub(crate) fn convert_module_tables(reader: wasmparser::TableSectionReader<'_>) -> Result<Vec<TableType>> {
    reader
        .into_iter()
        .map(|table| {
            let table = table?;
            if !matches!(table.init, wasmparser::TableInit::RefNull) {
                return Err(ParseError::UnsupportedSection("table initializer expressions".to_string()));
            }
            convert_table_type(&table.ty)
        })
        .collect()
}

fn convert_table_type(ty: &wasmparser::TableType) -> Result<TableType> {
    if !ty.element_type.is_func_ref() || ty.table64 || ty.shared {
        return Err(ParseError::InvalidType(format!("table of {:?}", ty.element_type)));
    }

    let size_initial = to_u32(ty.initial, "initial table size")?;
    let size_max = ty.maximum.map(|max| to_u32(max, "maximum table size")).transpose()?;
    Ok(TableType { size_initial, size_max })
}

pub(crate) fn convert_module_globals(reader: wasmparser::GlobalSectionReader<'_>) -> Result<Vec<Global>> {
    reader
        .into_iter()
        .map(|global| {
            let global = global?;
            let ty = convert_valtype(&global.ty.content_type)?;
            let init = process_const_operators(global.init_expr.get_operators_reader())?;
            Ok(Global { init, ty: GlobalType { mutable: global.ty.mutable, ty } })
        })
        .collect()
}

pub(crate) fn convert_module_export(export: wasmparser::Export<'_>) -> Result<Export> {
    let kind = match export.kind {
        wasmparser::ExternalKind::Func => ExternalKind::Func,
        wasmparser::ExternalKind::Table => ExternalKind::Table,
        wasmparser::ExternalKind::Memory => ExternalKind::Memory,
        wasmparser::ExternalKind::Global => ExternalKind::Global,
        kind => return Err(ParseError::UnsupportedSection(format!("export of kind {kind:?}"))),
    };

    Ok(Export { index: export.index, name: Box::from(export.name), kind })
}

pub(crate) fn convert_module_elements(reader: wasmparser::ElementSectionReader<'_>) -> Result<Vec<Element>> {
    reader.into_iter().map(|element| convert_module_element(element?)).collect()
}

pub(crate) fn convert_module_element(element: wasmparser::Element<'_>) -> Result<Element> {
    let kind = match element.kind {
        wasmparser::ElementKind::Active { table_index, offset_expr } => ElementKind::Active {
            table: table_index.unwrap_or(0),
            offset: process_const_operators(offset_expr.get_operators_reader())?,
        },
        wasmparser::ElementKind::Passive => ElementKind::Passive,
        wasmparser::ElementKind::Declared => ElementKind::Declared,
    };

    let items = match element.items {
        wasmparser::ElementItems::Functions(funcs) => {
            funcs.into_iter().map(|func| Ok(Some(func?))).collect::<Result<Vec<_>>>()?
        }
        wasmparser::ElementItems::Expressions(ty, exprs) => {
            if !ty.is_func_ref() {
                return Err(ParseError::InvalidType(format!("element segment of {ty:?}")));
            }

            exprs
                .into_iter()
                .map(|expr| match process_const_operators(expr?.get_operators_reader())? {
                    ConstInstruction::RefFunc(func) => Ok(Some(func)),
                    ConstInstruction::RefNull => Ok(None),
                    other => Err(ParseError::UnsupportedOperator(format!("element item {other:?}"))),
                })
                .collect::<Result<Vec<_>>>()?
        }
    };

    Ok(Element { kind, items: items.into_boxed_slice(), range: element.range })
}

pub(crate) fn convert_module_data(reader: wasmparser::DataSectionReader<'_>) -> Result<Vec<Data>> {
    reader
        .into_iter()
        .map(|data| {
            let data = data?;
            let kind = match data.kind {
                wasmparser::DataKind::Active { memory_index, offset_expr } => {
                    let offset = process_const_operators(offset_expr.get_operators_reader())?;
                    DataKind::Active { mem: memory_index, offset }
                }
                wasmparser::DataKind::Passive => DataKind::Passive,
            };
            Ok(Data { data: data.data.to_vec().into_boxed_slice(), range: data.range, kind })
        })
        .collect()
}

/// Lower a validated function body into its declared locals and instruction sequence.
pub(crate) fn convert_module_code(body: FunctionBody<'_>) -> Result<(Box<[ValType]>, Box<[Instruction]>)> {
    let mut locals = Vec::new();
    for local in body.get_locals_reader()? {
        let (count, ty) = local?;
        let ty = convert_valtype(&ty)?;
        locals.extend(core::iter::repeat_n(ty, count as usize));
    }

    let instructions = process_operators(&body)?;
    Ok((locals.into_boxed_slice(), instructions))
}

pub(crate) fn convert_blocktype(blocktype: wasmparser::BlockType) -> Result<BlockArgs> {
    Ok(match blocktype {
        wasmparser::BlockType::Empty => BlockArgs::Empty,
        wasmparser::BlockType::Type(ty) => BlockArgs::Type(convert_valtype(&ty)?),
        wasmparser::BlockType::FuncType(ty) => BlockArgs::FuncType(ty),
    })
}

pub(crate) fn convert_valtype(valtype: &wasmparser::ValType) -> Result<ValType> {
    use wasmparser::ValType::*;
    match valtype {
        I32 => Ok(ValType::I32),
        I64 => Ok(ValType::I64),
        F32 => Ok(ValType::F32),
        F64 => Ok(ValType::F64),
        other => Err(ParseError::InvalidType(format!("{other:?}"))),
    }
}

pub(crate) fn convert_memarg(memarg: wasmparser::MemArg) -> MemoryArg {
    MemoryArg { offset: memarg.offset, mem_addr: memarg.memory }
}

pub(crate) fn process_const_operators(mut ops: OperatorsReader<'_>) -> Result<ConstInstruction> {
    let first = ops.read()?;
    let instr = process_const_operator(first)?;

    // extended constant expressions are valid WebAssembly, but not supported here
    match ops.read()? {
        wasmparser::Operator::End => Ok(instr),
        op => Err(ParseError::UnsupportedOperator(format!("constant expression with {op:?}"))),
    }
}

pub(crate) fn process_const_operator(op: wasmparser::Operator<'_>) -> Result<ConstInstruction> {
    match op {
        wasmparser::Operator::RefNull { .. } => Ok(ConstInstruction::RefNull),
        wasmparser::Operator::RefFunc { function_index } => Ok(ConstInstruction::RefFunc(function_index)),
        wasmparser::Operator::I32Const { value } => Ok(ConstInstruction::I32Const(value)),
        wasmparser::Operator::I64Const { value } => Ok(ConstInstruction::I64Const(value)),
        wasmparser::Operator::F32Const { value } => Ok(ConstInstruction::F32Const(value.bits())),
        wasmparser::Operator::F64Const { value } => Ok(ConstInstruction::F64Const(value.bits())),
        wasmparser::Operator::GlobalGet { global_index } => Ok(ConstInstruction::GlobalGet(global_index)),
        op => Err(ParseError::UnsupportedOperator(format!("constant expression with {op:?}"))),
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    value.try_into().map_err(|_| ParseError::TooLarge(format!("{what} {value}")))
}
