//! Module validator. Checks the index spaces, types and initializers of a decoded module, then
//! type-checks every function body. Only a [`ValidatedModule`] can be instantiated.

pub mod func;
pub mod side_table;

use std::sync::Arc;

use tracing::debug;

pub use func::{CompiledBody, MAX_FUNCTION_LOCALS};
pub use side_table::{BranchTarget, Jump, SideTable};

use crate::error::{ValidationError, ValidationErrorKind as Kind};
use crate::model::{ConstExpr, ExternalKind, FuncKind, ImportDesc, Limits, Module, ValType};

/// Largest memory the 32-bit address space admits, in pages.
pub const MAX_PAGES: u32 = 65_536;

type VResult<T> = Result<T, ValidationError>;

/// A module that passed validation, together with the per-function data the interpreter needs.
/// Cheap to clone; the module and compiled bodies are shared.
#[derive(Debug, Clone)]
pub struct ValidatedModule {
    module: Arc<Module>,
    bodies: Arc<[CompiledBody]>,
}

impl ValidatedModule {
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Compiled data of the defined function whose body is `Module::bodies[index]`.
    pub fn body(&self, index: usize) -> Option<&CompiledBody> {
        self.bodies.get(index)
    }

    pub(crate) fn bodies(&self) -> &[CompiledBody] {
        &self.bodies
    }
}

/// Validate a decoded module.
pub fn validate(module: impl Into<Arc<Module>>) -> VResult<ValidatedModule> {
    let module = module.into();
    validate_declarations(&module)?;

    let mut bodies = Vec::with_capacity(module.bodies.len());
    for (func, f) in module.functions.iter().enumerate() {
        let FuncKind::Defined { body } = f.kind else {
            continue;
        };
        let func = func as u32;
        let ty = module
            .types
            .get(f.type_idx as usize)
            .ok_or(ValidationError::module(Kind::UnknownType(f.type_idx)))?;
        let code = module
            .bodies
            .get(body)
            .ok_or(ValidationError::module(Kind::UnknownFunction(func)))?;
        bodies.push(func::validate_function(&module, func, ty, code)?);
        debug!(func, "validated function");
    }

    Ok(ValidatedModule {
        module,
        bodies: bodies.into(),
    })
}

fn err<T>(kind: Kind) -> VResult<T> {
    Err(ValidationError::module(kind))
}

fn validate_declarations(m: &Module) -> VResult<()> {
    for (i, ty) in m.types.iter().enumerate() {
        if ty.results.len() > 1 {
            return err(Kind::MultipleResults(i as u32));
        }
    }
    for f in &m.functions {
        if f.type_idx as usize >= m.types.len() {
            return err(Kind::UnknownType(f.type_idx));
        }
    }

    if m.tables.len() > 1 {
        return err(Kind::TooMany("table"));
    }
    if m.memories.len() > 1 {
        return err(Kind::TooMany("memory"));
    }
    for t in &m.tables {
        check_limits(&t.limits)?;
    }
    for mem in &m.memories {
        check_limits(&mem.limits)?;
        for pages in std::iter::once(mem.limits.min).chain(mem.limits.max) {
            if pages > MAX_PAGES {
                return err(Kind::MemoryTooLarge(pages));
            }
        }
    }

    for (i, import) in m.imports.iter().enumerate() {
        if let ImportDesc::Global(g) = import.desc {
            if g.mutable {
                return err(Kind::MutableGlobalImport(i as u32));
            }
        }
    }

    for (i, g) in m.globals.iter().enumerate() {
        check_const_expr(m, &g.init, g.ty.val_type, i)?;
    }

    for export in m.exports.values() {
        let index = export.index;
        let (len, kind) = match export.kind {
            ExternalKind::Function => (m.functions.len(), Kind::UnknownFunction(index)),
            ExternalKind::Table => (m.tables.len(), Kind::UnknownTable(index)),
            ExternalKind::Memory => (m.memories.len(), Kind::UnknownMemory(index)),
            ExternalKind::Global => (m.globals.len(), Kind::UnknownGlobal(index)),
        };
        if index as usize >= len {
            return err(kind);
        }
    }

    if let Some(start) = m.start {
        let ty = m
            .func_type(start)
            .ok_or(ValidationError::module(Kind::UnknownFunction(start)))?;
        if !ty.params.is_empty() || !ty.results.is_empty() {
            return err(Kind::InvalidStartFunction(start));
        }
    }

    for seg in &m.elements {
        if seg.table as usize >= m.tables.len() {
            return err(Kind::UnknownTable(seg.table));
        }
        check_const_expr(m, &seg.offset, ValType::I32, m.globals.len())?;
        if let Some(&bad) = seg.init.iter().find(|&&f| f as usize >= m.functions.len()) {
            return err(Kind::UnknownFunction(bad));
        }
    }
    for seg in &m.data {
        if seg.memory as usize >= m.memories.len() {
            return err(Kind::UnknownMemory(seg.memory));
        }
        check_const_expr(m, &seg.offset, ValType::I32, m.globals.len())?;
    }
    Ok(())
}

fn check_limits(limits: &Limits) -> VResult<()> {
    match limits.max {
        Some(max) if max < limits.min => err(Kind::InvalidLimits {
            min: limits.min,
            max,
        }),
        _ => Ok(()),
    }
}

/// `global.get` in an initializer may only name an immutable global among the first `visible`.
fn check_const_expr(
    m: &Module,
    expr: &ConstExpr,
    expected: ValType,
    visible: usize,
) -> VResult<()> {
    if let ConstExpr::GlobalGet(index) = *expr {
        match m.globals.get(index as usize) {
            Some(g) if (index as usize) < visible && !g.ty.mutable => {}
            _ => return err(Kind::InvalidConstGlobal(index)),
        }
    }
    match expr.ty(&m.globals) {
        Some(found) if found == expected => Ok(()),
        Some(found) => err(Kind::TypeMismatch { expected, found }),
        None => err(Kind::InvalidConstGlobal(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ElementSegment, Export, FuncType, Function, FunctionBody, GlobalEntry, GlobalType,
        MemoryType, TableType,
    };
    use crate::vm::instructions::op;

    fn with_func(ty: FuncType, code: &[u8]) -> Module {
        let mut m = Module::default();
        m.types.push(ty);
        m.functions.push(Function {
            type_idx: 0,
            kind: FuncKind::Defined { body: 0 },
        });
        m.bodies.push(FunctionBody {
            locals: vec![],
            code: code.to_vec(),
            offset: 0,
        });
        m
    }

    fn kind_of(m: Module) -> Kind {
        validate(m).unwrap_err().kind
    }

    #[test]
    fn validated_module_carries_bodies() {
        let m = with_func(FuncType::new(&[], &[ValType::I32]), &[op::I32_CONST, 7, op::END]);
        let v = validate(m).unwrap();
        assert_eq!(v.body(0).map(|b| b.max_height), Some(1));
        assert!(v.body(1).is_none());
    }

    #[test]
    fn rejects_multi_value_types() {
        let m = with_func(
            FuncType::new(&[], &[ValType::I32, ValType::I32]),
            &[op::UNREACHABLE, op::END],
        );
        assert_eq!(kind_of(m), Kind::MultipleResults(0));
    }

    #[test]
    fn export_and_start_indices() {
        let mut m = with_func(FuncType::default(), &[op::END]);
        m.exports.insert(
            "g".into(),
            Export {
                kind: ExternalKind::Global,
                index: 0,
            },
        );
        assert_eq!(kind_of(m), Kind::UnknownGlobal(0));

        let mut m = with_func(FuncType::new(&[ValType::I32], &[]), &[op::END]);
        m.start = Some(0);
        assert_eq!(kind_of(m), Kind::InvalidStartFunction(0));
    }

    #[test]
    fn global_initializers() {
        let mut m = Module::default();
        m.globals.push(GlobalEntry {
            ty: GlobalType::new(ValType::I32, false),
            init: ConstExpr::GlobalGet(1),
        });
        m.globals.push(GlobalEntry {
            ty: GlobalType::new(ValType::I32, false),
            init: ConstExpr::I32(1),
        });
        assert_eq!(kind_of(m), Kind::InvalidConstGlobal(1));

        let mut m = Module::default();
        m.globals.push(GlobalEntry {
            ty: GlobalType::new(ValType::F32, true),
            init: ConstExpr::I64(1),
        });
        assert_eq!(
            kind_of(m),
            Kind::TypeMismatch {
                expected: ValType::F32,
                found: ValType::I64
            }
        );
    }

    #[test]
    fn segments_reference_existing_items() {
        let mut m = with_func(FuncType::default(), &[op::END]);
        m.tables.push(TableType {
            limits: Limits::new(1, None),
        });
        m.elements.push(ElementSegment {
            table: 0,
            offset: ConstExpr::I32(0),
            init: vec![0, 3],
        });
        assert_eq!(kind_of(m), Kind::UnknownFunction(3));

        let mut m = Module::default();
        m.memories.push(MemoryType {
            limits: Limits::new(1, Some(70_000)),
        });
        assert_eq!(kind_of(m), Kind::MemoryTooLarge(70_000));
    }
}
