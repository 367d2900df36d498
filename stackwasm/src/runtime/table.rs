//! Table of function references used by `call_indirect`.

use crate::error::Trap;
use crate::model::{FuncIdx, TableType};

#[derive(Debug, Clone, Default)]
pub struct Table {
    elems: Vec<Option<FuncIdx>>,
}

impl Table {
    pub fn new(ty: &TableType) -> Self {
        Self {
            elems: vec![None; ty.limits.min as usize],
        }
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    /// Function stored at `index`, as an index into the owning module's function space.
    pub fn get(&self, index: u32) -> Result<FuncIdx, Trap> {
        match self.elems.get(index as usize) {
            Some(Some(func)) => Ok(*func),
            Some(None) => Err(Trap::UninitializedElement),
            None => Err(Trap::TableOutOfBounds),
        }
    }

    /// Copy `funcs` into the table starting at `offset`; nothing is written unless all fit.
    pub fn init(&mut self, offset: u32, funcs: &[FuncIdx]) -> Result<(), Trap> {
        let start = offset as usize;
        let slots = self
            .elems
            .get_mut(start..start + funcs.len())
            .ok_or(Trap::TableOutOfBounds)?;
        for (slot, &func) in slots.iter_mut().zip(funcs) {
            *slot = Some(func);
        }
        Ok(())
    }
}
