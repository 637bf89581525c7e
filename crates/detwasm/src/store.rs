use alloc::{boxed::Box, format, vec, vec::Vec};
use detwasm_types::{ConstInstruction, DataKind, DetWasmModule, ElementKind, FuncAddr, GlobalAddr, TableAddr};

use crate::{cold, log, Error, MemoryAllocator, Options, RawValue, Result, Trap};

/// Instance state that WebAssembly code can observe and change.
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#store>
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub(crate) globals: Vec<RawValue>,
    pub(crate) tables: Vec<Vec<Option<FuncAddr>>>,
    pub(crate) memory: Option<Box<dyn MemoryAllocator>>,
}

impl Store {
    /// Rebuild all instance state of `module`: memory, globals, tables and the active segments.
    ///
    /// See <https://webassembly.github.io/spec/core/exec/modules.html#exec-instantiation>
    pub(crate) fn instantiate(&mut self, module: &DetWasmModule, options: &Options) -> Result<()> {
        let memory = self.memory.as_deref_mut().ok_or(Error::AllocatorNotSet)?;
        match module.memory_types.first() {
            Some(ty) => {
                let maximum = ty.page_count_max.unwrap_or(u32::MAX).min(options.max_pages);
                memory.reset(ty.page_count_initial, maximum)?;
            }
            None => memory.reset(0, 0)?,
        }

        self.globals.clear();
        for global in module.globals.iter() {
            let value = self.eval_const(&global.init)?;
            self.globals.push(value);
        }

        self.tables = module.table_types.iter().map(|ty| vec![None; ty.size_initial as usize]).collect();
        self.init_elements(module)?;
        self.init_datas(module)?;

        log::debug!(
            "instantiated {} globals, {} tables and {} pages of memory",
            self.globals.len(),
            self.tables.len(),
            self.memory().map(|m| m.page_count()).unwrap_or(0)
        );
        Ok(())
    }

    fn init_elements(&mut self, module: &DetWasmModule) -> Result<()> {
        for element in module.elements.iter() {
            // passive and declared segments only matter to instructions we do not support
            let ElementKind::Active { table, offset } = element.kind else { continue };

            let offset = self.eval_offset(&offset)?;
            let table = self
                .tables
                .get_mut(table as usize)
                .ok_or_else(|| Error::Other(format!("table {table} not found for element segment")))?;

            let end = offset.checked_add(element.items.len()).filter(|end| *end <= table.len());
            let Some(end) = end else {
                cold();
                return Err(Trap::TableOutOfBounds { offset, len: element.items.len(), max: table.len() }.into());
            };

            table[offset..end].copy_from_slice(&element.items);
        }

        Ok(())
    }

    fn init_datas(&mut self, module: &DetWasmModule) -> Result<()> {
        for data in module.data.iter() {
            let DataKind::Active { mem, offset } = data.kind else { continue };
            if mem != 0 {
                return Err(Error::UnsupportedFeature(format!("data segment for memory {mem}")));
            }

            let offset = self.eval_offset(&offset)?;
            self.memory_mut()?.store(offset as u64, &data.data)?;
        }

        Ok(())
    }

    /// Evaluate a segment offset, an `i32` interpreted as unsigned
    fn eval_offset(&self, const_instr: &ConstInstruction) -> Result<usize> {
        let value = self.eval_const(const_instr)?;
        Ok(value.0 as u32 as usize)
    }

    /// Evaluate a constant expression
    fn eval_const(&self, const_instr: &ConstInstruction) -> Result<RawValue> {
        use ConstInstruction::*;
        let val = match const_instr {
            I32Const(i) => RawValue::from(*i),
            I64Const(i) => RawValue::from(*i),
            F32Const(bits) => RawValue(*bits as u64),
            F64Const(bits) => RawValue(*bits),
            GlobalGet(addr) => self.global(*addr)?,
            RefNull | RefFunc(_) => {
                return Err(Error::UnsupportedFeature(format!("reference constant {const_instr:?}")));
            }
        };
        Ok(val)
    }

    #[inline]
    pub(crate) fn global(&self, addr: GlobalAddr) -> Result<RawValue> {
        self.globals.get(addr as usize).copied().ok_or_else(|| Error::Other(format!("global {addr} not found")))
    }

    #[inline]
    pub(crate) fn set_global(&mut self, addr: GlobalAddr, value: RawValue) -> Result<()> {
        let global =
            self.globals.get_mut(addr as usize).ok_or_else(|| Error::Other(format!("global {addr} not found")))?;
        *global = value;
        Ok(())
    }

    /// Look up the function stored at `index` in a table.
    #[inline]
    pub(crate) fn table_func(&self, table: TableAddr, index: u32) -> Result<FuncAddr> {
        let table = self.tables.get(table as usize).ok_or_else(|| Error::Other(format!("table {table} not found")))?;
        match table.get(index as usize) {
            Some(Some(func)) => Ok(*func),
            Some(None) => Err(Trap::UninitializedElement { index: index as usize }.into()),
            None => Err(Trap::UndefinedElement { index: index as usize }.into()),
        }
    }

    #[inline]
    pub(crate) fn memory(&self) -> Result<&dyn MemoryAllocator> {
        self.memory.as_deref().ok_or(Error::AllocatorNotSet)
    }

    #[inline]
    pub(crate) fn memory_mut(&mut self) -> Result<&mut dyn MemoryAllocator> {
        match self.memory.as_deref_mut() {
            Some(memory) => Ok(memory),
            None => Err(Error::AllocatorNotSet),
        }
    }
}
