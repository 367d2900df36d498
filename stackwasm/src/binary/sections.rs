//! Section ids, headers and payload readers. Each reader consumes exactly one section payload
//! through a bounded cursor; cross-section consistency is the decoder's job.

use super::{
    cursor::Cursor,
    leb128,
    reader::{
        read_const_expr, read_global_type, read_len_prefixed_bytes, read_memory_type, read_name,
        read_table_type, read_val_type, read_vec, read_func_type,
    },
    BinaryReadError, Result,
};
use crate::model::{
    DataSegment, ElementSegment, Export, ExternalKind, FuncIdx, FuncType, FunctionBody,
    GlobalEntry, Import, ImportDesc, LocalDecl, MemoryType, TableType, TypeIdx,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionId::Custom => "custom",
            SectionId::Type => "type",
            SectionId::Import => "import",
            SectionId::Function => "function",
            SectionId::Table => "table",
            SectionId::Memory => "memory",
            SectionId::Global => "global",
            SectionId::Export => "export",
            SectionId::Start => "start",
            SectionId::Element => "element",
            SectionId::Code => "code",
            SectionId::Data => "data",
        }
    }
}

/// Raw section header. The id byte is kept undecoded so the caller can report unknown ids with
/// their offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: u8,
    pub id_offset: usize,
    pub payload_len: u32,
    pub payload_offset: usize,
}

pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let id_offset = cur.offset();
    let id = cur.read_u8()?;
    let payload_len = leb128::read_uleb_u32(cur)?;
    Ok(SectionHeader {
        id,
        id_offset,
        payload_len,
        payload_offset: cur.offset(),
    })
}

pub fn read_type_section(cur: &mut Cursor) -> Result<Vec<FuncType>> {
    read_vec(cur, read_func_type)
}

pub fn read_import_section(cur: &mut Cursor) -> Result<Vec<Import>> {
    read_vec(cur, |c| {
        let module = read_name(c)?;
        let name = read_name(c)?;
        let offset = c.offset();
        let desc = match ExternalKind::from_byte(c.read_u8()?) {
            Some(ExternalKind::Function) => ImportDesc::Func(leb128::read_uleb_u32(c)?),
            Some(ExternalKind::Table) => ImportDesc::Table(read_table_type(c)?),
            Some(ExternalKind::Memory) => ImportDesc::Memory(read_memory_type(c)?),
            Some(ExternalKind::Global) => ImportDesc::Global(read_global_type(c)?),
            None => {
                return Err(BinaryReadError::Malformed {
                    offset,
                    msg: "invalid import kind",
                })
            }
        };
        Ok(Import { module, name, desc })
    })
}

pub fn read_function_section(cur: &mut Cursor) -> Result<Vec<TypeIdx>> {
    read_vec(cur, leb128::read_uleb_u32)
}

pub fn read_table_section(cur: &mut Cursor) -> Result<Vec<TableType>> {
    read_vec(cur, read_table_type)
}

pub fn read_memory_section(cur: &mut Cursor) -> Result<Vec<MemoryType>> {
    read_vec(cur, read_memory_type)
}

pub fn read_global_section(cur: &mut Cursor) -> Result<Vec<GlobalEntry>> {
    read_vec(cur, |c| {
        let ty = read_global_type(c)?;
        let init = read_const_expr(c)?;
        Ok(GlobalEntry { ty, init })
    })
}

/// Exports in declaration order; name uniqueness is checked by the decoder.
pub fn read_export_section(cur: &mut Cursor) -> Result<Vec<(String, Export)>> {
    read_vec(cur, |c| {
        let name = read_name(c)?;
        let offset = c.offset();
        let kind = ExternalKind::from_byte(c.read_u8()?).ok_or(BinaryReadError::Malformed {
            offset,
            msg: "invalid export kind",
        })?;
        let index = leb128::read_uleb_u32(c)?;
        Ok((name, Export { kind, index }))
    })
}

pub fn read_start_section(cur: &mut Cursor) -> Result<FuncIdx> {
    leb128::read_uleb_u32(cur)
}

pub fn read_element_section(cur: &mut Cursor) -> Result<Vec<ElementSegment>> {
    read_vec(cur, |c| {
        let table = leb128::read_uleb_u32(c)?;
        let offset = read_const_expr(c)?;
        let init = read_vec(c, leb128::read_uleb_u32)?;
        Ok(ElementSegment {
            table,
            offset,
            init,
        })
    })
}

/// Code entries: each is size-prefixed, then local declarations, then the instruction bytes
/// (which run to the end of the entry).
pub fn read_code_section(cur: &mut Cursor) -> Result<Vec<FunctionBody>> {
    read_vec(cur, |c| {
        let size = leb128::read_uleb_u32(c)? as usize;
        let mut body = c.sub_cursor(size)?;
        let locals = read_vec(&mut body, |b| {
            let count = leb128::read_uleb_u32(b)?;
            let val_type = read_val_type(b)?;
            Ok(LocalDecl { count, val_type })
        })?;
        let offset = body.offset();
        let code = body.read_bytes(body.remaining())?.to_vec();
        Ok(FunctionBody {
            locals,
            code,
            offset,
        })
    })
}

pub fn read_data_section(cur: &mut Cursor) -> Result<Vec<DataSegment>> {
    read_vec(cur, |c| {
        let memory = leb128::read_uleb_u32(c)?;
        let offset = read_const_expr(c)?;
        let init = read_len_prefixed_bytes(c)?;
        Ok(DataSegment {
            memory,
            offset,
            init,
        })
    })
}
