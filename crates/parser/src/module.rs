use crate::log::debug;
use crate::{conversion, ParseError, Result};
use alloc::{boxed::Box, format, string::ToString, vec::Vec};
use detwasm_types::{
    Data, DetWasmModule, Element, Export, FuncType, Global, Import, Instruction, MemoryType, TableType, TypeAddr,
    ValType, WasmFunction,
};
use wasmparser::{Payload, ValidPayload, Validator};

#[derive(Debug, Default)]
pub(crate) struct ModuleReader {
    pub(crate) version: Option<u16>,
    pub(crate) start_func: Option<u32>,
    pub(crate) func_types: Vec<FuncType>,
    pub(crate) code_type_addrs: Vec<TypeAddr>,
    pub(crate) code: Vec<(Box<[ValType]>, Box<[Instruction]>)>,
    pub(crate) imports: Vec<Import>,
    pub(crate) exports: Vec<Export>,
    pub(crate) globals: Vec<Global>,
    pub(crate) table_types: Vec<TableType>,
    pub(crate) memory_types: Vec<MemoryType>,
    pub(crate) elements: Vec<Element>,
    pub(crate) data: Vec<Data>,
    pub(crate) end_reached: bool,
}

impl ModuleReader {
    pub(crate) fn new() -> ModuleReader {
        Self::default()
    }

    pub(crate) fn process_payload(&mut self, payload: Payload<'_>, validator: &mut Validator) -> Result<()> {
        use wasmparser::Payload::*;

        // function bodies are validated in full before they get lowered
        if let ValidPayload::Func(func, body) = validator.payload(&payload)? {
            let mut func_validator = func.into_validator(Default::default());
            func_validator.validate(&body)?;
        }

        match payload {
            Version { num, encoding, .. } => {
                self.version = Some(num);
                match encoding {
                    wasmparser::Encoding::Module => {}
                    wasmparser::Encoding::Component => return Err(ParseError::InvalidEncoding(encoding)),
                }
            }
            StartSection { func, .. } => {
                debug!("Found start section");
                self.start_func = Some(func);
            }
            TypeSection(reader) => {
                debug!("Found type section");
                self.func_types = conversion::convert_module_types(reader)?;
            }
            ImportSection(reader) => {
                debug!("Found import section");
                self.imports = conversion::convert_module_imports(reader)?;
            }
            FunctionSection(reader) => {
                debug!("Found function section");
                self.code_type_addrs = reader.into_iter().map(|f| Ok(f?)).collect::<Result<Vec<_>>>()?;
            }
            TableSection(reader) => {
                debug!("Found table section");
                self.table_types = conversion::convert_module_tables(reader)?;
            }
            MemorySection(reader) => {
                debug!("Found memory section");
                self.memory_types = conversion::convert_module_memories(reader)?;
                let imported = self.imports.iter().filter(|i| matches!(i.kind, detwasm_types::ImportKind::Memory(_)));
                if self.memory_types.len() + imported.count() > 1 {
                    return Err(ParseError::UnsupportedSection("multiple memories".to_string()));
                }
            }
            GlobalSection(reader) => {
                debug!("Found global section");
                self.globals = conversion::convert_module_globals(reader)?;
            }
            ExportSection(reader) => {
                debug!("Found export section");
                self.exports = reader
                    .into_iter()
                    .map(|e| conversion::convert_module_export(e?))
                    .collect::<Result<Vec<_>>>()?;
            }
            ElementSection(reader) => {
                debug!("Found element section");
                self.elements = conversion::convert_module_elements(reader)?;
            }
            DataCountSection { .. } => {
                debug!("Found data count section");
            }
            DataSection(reader) => {
                debug!("Found data section");
                self.data = conversion::convert_module_data(reader)?;
            }
            CodeSectionStart { count, .. } => {
                debug!("Found code section ({} functions)", count);
                if !self.code.is_empty() {
                    return Err(ParseError::DuplicateSection("Code section".into()));
                }
                self.code.reserve(count as usize);
            }
            CodeSectionEntry(body) => {
                self.code.push(conversion::convert_module_code(body)?);
            }
            CustomSection(reader) => {
                debug!("Skipping custom section: {:?}", reader.name());
            }
            End(_) => {
                debug!("Reached end of module");
                if self.end_reached {
                    return Err(ParseError::DuplicateSection("End section".into()));
                }
                self.end_reached = true;
            }
            UnknownSection { id, .. } => {
                return Err(ParseError::UnsupportedSection(format!("unknown section {id}")));
            }
            section => return Err(ParseError::UnsupportedSection(format!("{section:?}"))),
        };

        Ok(())
    }

    pub(crate) fn into_module(self) -> Result<DetWasmModule> {
        if !self.end_reached {
            return Err(ParseError::EndNotReached);
        }

        if self.code.len() != self.code_type_addrs.len() {
            return Err(ParseError::Other(format!(
                "{} function bodies for {} declared functions",
                self.code.len(),
                self.code_type_addrs.len()
            )));
        }

        let funcs = self
            .code
            .into_iter()
            .zip(self.code_type_addrs)
            .map(|((locals, instructions), ty)| WasmFunction { ty, locals, instructions })
            .collect::<Vec<_>>();

        Ok(DetWasmModule {
            version: self.version,
            start_func: self.start_func,
            func_types: self.func_types.into_boxed_slice(),
            funcs: funcs.into_boxed_slice(),
            imports: self.imports.into_boxed_slice(),
            exports: self.exports.into_boxed_slice(),
            globals: self.globals.into_boxed_slice(),
            table_types: self.table_types.into_boxed_slice(),
            memory_types: self.memory_types.into_boxed_slice(),
            elements: self.elements.into_boxed_slice(),
            data: self.data.into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{ParseError, Parser};
    use detwasm_types::{ConstInstruction, DataKind, ElementKind, ExternalKind, ImportKind, ValType};

    #[test]
    fn sections_are_collected() {
        let wasm = wat::parse_str(
            r#"(module
                (import "env" "host.call" (func $host (param i32) (result i32)))
                (memory 1 2)
                (table 2 funcref)
                (global $g (mut i64) (i64.const 7))
                (func $f (export "f") (param i32) (result i32) (local f64) (local.get 0))
                (elem (i32.const 0) $f $host)
                (data (i32.const 8) "hi")
                (start $start)
                (func $start))"#,
        )
        .expect("valid wat");
        let module = Parser::new().parse_module_bytes(wasm).expect("valid module");

        assert_eq!(module.imported_func_count(), 1);
        assert!(matches!(module.imports[0].kind, ImportKind::Function(0)));
        assert_eq!(module.funcs.len(), 2);
        assert_eq!(&*module.funcs[0].locals, &[ValType::F64]);
        assert_eq!(module.export_func("f"), Some(1));
        assert_eq!(module.exports[0].kind, ExternalKind::Func);
        assert_eq!(module.start_func, Some(2));
        assert_eq!(module.memory_types[0].page_count_max, Some(2));
        assert_eq!(module.table_types[0].size_initial, 2);
        assert_eq!(module.globals[0].init, ConstInstruction::I64Const(7));
        assert!(matches!(module.elements[0].kind, ElementKind::Active { table: 0, .. }));
        assert_eq!(&*module.elements[0].items, &[Some(1), Some(0)]);
        assert!(matches!(module.data[0].kind, DataKind::Active { mem: 0, offset: ConstInstruction::I32Const(8) }));
        assert_eq!(&*module.data[0].data, b"hi");
    }

    #[test]
    fn invalid_modules_are_rejected() {
        let wasm = wat::parse_str("(module (func (result i32) (i64.const 1)))").expect("valid wat");
        assert!(matches!(Parser::new().parse_module_bytes(wasm), Err(ParseError::ParseError { .. })));
        assert!(Parser::new().parse_module_bytes(b"\0asm").is_err());
    }
}
