//! Top-level module decoder: header, section sequence, import resolution and assembly of the
//! index spaces.

use std::collections::btree_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::cursor::Cursor;
use super::reader::read_name;
use super::sections::{self, read_section_header, SectionId};
use crate::error::DecodeError;
use crate::host::ImportResolver;
use crate::model::{
    DataSegment, ElementSegment, Export, FuncKind, FuncType, Function, FunctionBody, GlobalEntry,
    Import, ImportDesc, MemoryType, Module, TableType, TypeIdx,
};

const MAGIC: u32 = 0x6D73_6100;
const VERSION: u32 = 1;

/// Section payloads as read, before imports are resolved.
#[derive(Default)]
struct RawSections {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    functions: Vec<TypeIdx>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    globals: Vec<GlobalEntry>,
    exports: Vec<(String, Export)>,
    start: Option<u32>,
    elements: Vec<ElementSegment>,
    bodies: Vec<FunctionBody>,
    data: Vec<DataSegment>,
}

/// Decode a binary module. `resolver` is consulted once per distinct import module name;
/// every imported item is checked against the resolved module's exports.
pub fn decode<R>(bytes: &[u8], resolver: &mut R) -> Result<Module, DecodeError>
where
    R: ImportResolver + ?Sized,
{
    let mut cur = Cursor::new(bytes);
    if cur.read_u32_le().map_err(|_| DecodeError::BadMagic)? != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = cur.read_u32_le()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let raw = read_sections(&mut cur)?;
    if raw.functions.len() != raw.bodies.len() {
        return Err(DecodeError::FunctionCodeMismatch {
            functions: raw.functions.len(),
            bodies: raw.bodies.len(),
        });
    }

    let module = assemble(raw, resolver)?;
    debug!(
        types = module.types.len(),
        imports = module.imports.len(),
        functions = module.functions.len(),
        exports = module.exports.len(),
        "decoded module"
    );
    Ok(module)
}

fn read_sections(cur: &mut Cursor) -> Result<RawSections, DecodeError> {
    let mut raw = RawSections::default();
    let mut last: Option<SectionId> = None;

    while !cur.is_eof() {
        let header = read_section_header(cur)?;
        let id = SectionId::from_byte(header.id).ok_or(DecodeError::UnknownSection {
            id: header.id,
            offset: header.id_offset,
        })?;
        let mut payload = cur.sub_cursor(header.payload_len as usize)?;

        if id == SectionId::Custom {
            let name = read_name(&mut payload)?;
            debug!(name = %name, len = header.payload_len, "skipping custom section");
            continue;
        }

        if let Some(prev) = last {
            if id == prev {
                return Err(DecodeError::DuplicateSection(id.name()));
            }
            if id < prev {
                return Err(DecodeError::SectionOutOfOrder {
                    section: id.name(),
                    offset: header.id_offset,
                });
            }
        }
        last = Some(id);

        match id {
            SectionId::Type => raw.types = sections::read_type_section(&mut payload)?,
            SectionId::Import => raw.imports = sections::read_import_section(&mut payload)?,
            SectionId::Function => raw.functions = sections::read_function_section(&mut payload)?,
            SectionId::Table => raw.tables = sections::read_table_section(&mut payload)?,
            SectionId::Memory => raw.memories = sections::read_memory_section(&mut payload)?,
            SectionId::Global => raw.globals = sections::read_global_section(&mut payload)?,
            SectionId::Export => raw.exports = sections::read_export_section(&mut payload)?,
            SectionId::Start => raw.start = Some(sections::read_start_section(&mut payload)?),
            SectionId::Element => raw.elements = sections::read_element_section(&mut payload)?,
            SectionId::Code => raw.bodies = sections::read_code_section(&mut payload)?,
            SectionId::Data => raw.data = sections::read_data_section(&mut payload)?,
            SectionId::Custom => {}
        }

        if !payload.is_eof() {
            return Err(DecodeError::SectionSizeMismatch {
                section: id.name(),
                declared: header.payload_len as usize,
                consumed: payload.position(),
            });
        }
        debug!(
            section = id.name(),
            offset = header.payload_offset,
            len = header.payload_len,
            "decoded section"
        );
    }
    Ok(raw)
}

fn assemble<R>(raw: RawSections, resolver: &mut R) -> Result<Module, DecodeError>
where
    R: ImportResolver + ?Sized,
{
    let mut module = Module {
        types: raw.types,
        start: raw.start,
        elements: raw.elements,
        data: raw.data,
        ..Module::default()
    };

    resolve_imports(&mut module, &raw.imports, resolver)?;
    module.imports = raw.imports;

    module
        .functions
        .extend(raw.functions.into_iter().enumerate().map(|(body, type_idx)| Function {
            type_idx,
            kind: FuncKind::Defined { body },
        }));
    module.bodies = raw.bodies;
    module.tables.extend(raw.tables);
    module.memories.extend(raw.memories);
    module.globals.extend(raw.globals);

    for (name, export) in raw.exports {
        match module.exports.entry(name) {
            Entry::Occupied(e) => return Err(DecodeError::DuplicateExport(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(export);
            }
        }
    }
    Ok(module)
}

/// Fill the imported prefix of every index space. Imported memories, tables and globals are
/// copied as declarations; module-defined functions are referenced through their exporter.
fn resolve_imports<R>(
    module: &mut Module,
    imports: &[Import],
    resolver: &mut R,
) -> Result<(), DecodeError>
where
    R: ImportResolver + ?Sized,
{
    let mut resolved: HashMap<&str, Arc<Module>> = HashMap::new();

    for (i, import) in imports.iter().enumerate() {
        let index = i as u32;
        let exporter = match resolved.get(import.module.as_str()) {
            Some(m) => m.clone(),
            None => {
                let m = resolver.resolve(&import.module).map_err(|source| {
                    DecodeError::ImportResolution {
                        index,
                        module: import.module.clone(),
                        source,
                    }
                })?;
                debug!(module = %import.module, "resolved import module");
                resolved.insert(&import.module, m.clone());
                m
            }
        };

        let export = exporter
            .export(&import.name)
            .ok_or_else(|| DecodeError::MissingExport {
                index,
                module: import.module.clone(),
                name: import.name.clone(),
            })?;
        if export.kind != import.desc.kind() {
            return Err(DecodeError::ImportKindMismatch {
                index,
                module: import.module.clone(),
                name: import.name.clone(),
                expected: import.desc.kind(),
                found: export.kind,
            });
        }
        let incompatible = || DecodeError::IncompatibleImport {
            index,
            module: import.module.clone(),
            name: import.name.clone(),
            kind: export.kind,
        };
        let exported = |kind: &'static str| DecodeError::IndexOutOfRange {
            kind,
            index: export.index,
        };

        match import.desc {
            ImportDesc::Func(type_idx) => {
                let expected = module.types.get(type_idx as usize).ok_or(
                    DecodeError::IndexOutOfRange {
                        kind: "type",
                        index: type_idx,
                    },
                )?;
                let target = exporter
                    .functions
                    .get(export.index as usize)
                    .ok_or_else(|| exported("function"))?;
                let found = exporter
                    .func_type(export.index)
                    .ok_or_else(|| exported("type"))?;
                if expected != found {
                    return Err(DecodeError::InvalidImportSignature {
                        index,
                        module: import.module.clone(),
                        name: import.name.clone(),
                        expected: expected.clone(),
                        found: found.clone(),
                    });
                }
                let kind = match &target.kind {
                    FuncKind::Defined { .. } => FuncKind::Imported {
                        module: exporter.clone(),
                        index: export.index,
                    },
                    forwarded => forwarded.clone(),
                };
                module.functions.push(Function { type_idx, kind });
                module.imported_funcs += 1;
            }
            ImportDesc::Global(declared) => {
                let entry = exporter
                    .globals
                    .get(export.index as usize)
                    .ok_or_else(|| exported("global"))?;
                if entry.ty != declared {
                    return Err(incompatible());
                }
                let value = exporter
                    .global_value(export.index)
                    .ok_or(DecodeError::UnsupportedConstExpr)?;
                module.globals.push(GlobalEntry {
                    ty: declared,
                    init: value.into(),
                });
                module.imported_globals += 1;
            }
            ImportDesc::Memory(declared) => {
                let memory = exporter
                    .memories
                    .get(export.index as usize)
                    .ok_or_else(|| exported("memory"))?;
                if !memory.limits.satisfies(&declared.limits) {
                    return Err(incompatible());
                }
                module.memories.push(*memory);
                module.imported_memories += 1;
            }
            ImportDesc::Table(declared) => {
                let table = exporter
                    .tables
                    .get(export.index as usize)
                    .ok_or_else(|| exported("table"))?;
                if !table.limits.satisfies(&declared.limits) {
                    return Err(incompatible());
                }
                module.tables.push(*table);
                module.imported_tables += 1;
            }
        }
    }
    Ok(())
}
