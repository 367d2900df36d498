//! Public model surface.

pub mod module;
pub mod types;

pub use module::{
    ConstExpr, DataSegment, ElementSegment, FuncKind, Function, FunctionBody, GlobalEntry,
    LocalDecl, Module,
};
pub use types::{
    Export, ExternalKind, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc, Limits,
    MemIdx, MemoryType, TableIdx, TableType, TypeIdx, ValType, Value,
};
