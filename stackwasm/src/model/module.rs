//! Decoded module representation: function index space, globals, segments and code bodies.
//! A `Module` is immutable once the decoder hands it out and is shared behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::types::{
    Export, ExternalKind, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, MemIdx, MemoryType,
    TableIdx, TableType, TypeIdx, ValType, Value,
};
use crate::host::HostFunc;

/// Run-length local declaration inside a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDecl {
    pub count: u32,
    pub val_type: ValType,
}

/// Constant initializer expression (globals and segment offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    GlobalGet(GlobalIdx),
}

/// Code body of a defined function: locals and raw instruction bytes, ending in `end`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionBody {
    pub locals: Vec<LocalDecl>,
    pub code: Vec<u8>,
    /// Absolute offset of `code[0]` in the module bytes, for diagnostics.
    pub offset: usize,
}

impl FunctionBody {
    /// Number of declared locals (excluding parameters).
    pub fn local_count(&self) -> u64 {
        self.locals.iter().map(|d| d.count as u64).sum()
    }
}

/// Where a function's behavior comes from.
#[derive(Clone)]
pub enum FuncKind {
    /// Defined in this module; indexes `Module::bodies`.
    Defined { body: usize },
    /// Native callable supplied by the embedder.
    Host(Arc<HostFunc>),
    /// Defined in another module; runs inside that module's own instance.
    Imported { module: Arc<Module>, index: FuncIdx },
}

impl fmt::Debug for FuncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncKind::Defined { body } => f.debug_struct("Defined").field("body", body).finish(),
            FuncKind::Host(_) => f.write_str("Host"),
            FuncKind::Imported { index, .. } => {
                f.debug_struct("Imported").field("index", index).finish()
            }
        }
    }
}

/// Entry of the function index space (imports first, then definitions).
#[derive(Debug, Clone)]
pub struct Function {
    pub type_idx: TypeIdx,
    pub kind: FuncKind,
}

impl Function {
    pub fn is_imported(&self) -> bool {
        !matches!(self.kind, FuncKind::Defined { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalEntry {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// Active element segment: function indices copied into a table at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub table: TableIdx,
    pub offset: ConstExpr,
    pub init: Vec<FuncIdx>,
}

/// Active data segment: bytes copied into a memory at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub memory: MemIdx,
    pub offset: ConstExpr,
    pub init: Vec<u8>,
}

/// A decoded module. Every index space (functions, tables, memories, globals) lists imported
/// entries first, in import order, followed by the module's own definitions.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalEntry>,
    pub exports: BTreeMap<String, Export>,
    pub start: Option<FuncIdx>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub bodies: Vec<FunctionBody>,

    pub imported_funcs: u32,
    pub imported_tables: u32,
    pub imported_memories: u32,
    pub imported_globals: u32,
}

impl Module {
    /// Signature of a function in the index space.
    pub fn func_type(&self, func: FuncIdx) -> Option<&FuncType> {
        let f = self.functions.get(func as usize)?;
        self.types.get(f.type_idx as usize)
    }

    /// Look up an export by name.
    pub fn export(&self, name: &str) -> Option<Export> {
        self.exports.get(name).copied()
    }

    /// Index of an exported function.
    pub fn exported_func(&self, name: &str) -> Option<FuncIdx> {
        match self.export(name)? {
            Export {
                kind: ExternalKind::Function,
                index,
            } => Some(index),
            _ => None,
        }
    }

    /// Evaluate a global's initializer to a value, following `global.get` chains through this
    /// module's own global index space. `None` if the chain refers outside the index space or
    /// loops back on itself.
    pub fn global_value(&self, index: GlobalIdx) -> Option<Value> {
        let mut current = index;
        for _ in 0..=self.globals.len() {
            let g = self.globals.get(current as usize)?;
            match g.init {
                ConstExpr::GlobalGet(next) => current = next,
                other => return const_value(other, g.ty.val_type),
            }
        }
        None
    }

    pub fn defined_table(&self) -> Option<&TableType> {
        self.tables.first()
    }

    pub fn defined_memory(&self) -> Option<&MemoryType> {
        self.memories.first()
    }
}

fn const_value(expr: ConstExpr, ty: ValType) -> Option<Value> {
    let v = match expr {
        ConstExpr::I32(v) => Value::I32(v),
        ConstExpr::I64(v) => Value::I64(v),
        ConstExpr::F32(b) => Value::F32(b),
        ConstExpr::F64(b) => Value::F64(b),
        ConstExpr::GlobalGet(_) => return None,
    };
    (v.ty() == ty).then_some(v)
}

impl ConstExpr {
    /// Static type of the expression; `global.get` takes the referenced global's type.
    pub fn ty(&self, globals: &[GlobalEntry]) -> Option<ValType> {
        match self {
            ConstExpr::I32(_) => Some(ValType::I32),
            ConstExpr::I64(_) => Some(ValType::I64),
            ConstExpr::F32(_) => Some(ValType::F32),
            ConstExpr::F64(_) => Some(ValType::F64),
            ConstExpr::GlobalGet(i) => globals.get(*i as usize).map(|g| g.ty.val_type),
        }
    }
}

impl From<Value> for ConstExpr {
    fn from(v: Value) -> Self {
        match v {
            Value::I32(v) => ConstExpr::I32(v),
            Value::I64(v) => ConstExpr::I64(v),
            Value::F32(b) => ConstExpr::F32(b),
            Value::F64(b) => ConstExpr::F64(b),
        }
    }
}
