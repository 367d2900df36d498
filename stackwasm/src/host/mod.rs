//! Import resolution and host-provided modules.

pub mod func;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{BoxError, Trap};
use crate::model::{
    Export, ExternalKind, FuncKind, FuncType, Function, GlobalEntry, GlobalType, Limits,
    MemoryType, Module, TableType, Value,
};
pub use func::HostFunc;

/// Supplies the module behind an import's module name. The decoder calls it once per distinct
/// name and checks every imported item against what the returned module exports.
pub trait ImportResolver {
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, BoxError>;
}

impl<F> ImportResolver for F
where
    F: FnMut(&str) -> Result<Arc<Module>, BoxError>,
{
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, BoxError> {
        self(name)
    }
}

#[derive(Debug, Error)]
#[error("no module named {0:?}")]
pub struct UnknownModule(pub String);

/// Resolver for modules without imports; any lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, BoxError> {
        Err(Box::new(UnknownModule(name.to_string())))
    }
}

/// Resolver backed by a fixed name-to-module map.
#[derive(Debug, Clone, Default)]
pub struct Imports {
    modules: HashMap<String, Arc<Module>>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, module: Arc<Module>) -> Self {
        self.insert(name, module);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, module: Arc<Module>) {
        self.modules.insert(name.into(), module);
    }
}

impl ImportResolver for Imports {
    fn resolve(&mut self, name: &str) -> Result<Arc<Module>, BoxError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| Box::new(UnknownModule(name.to_string())) as BoxError)
    }
}

/// Builds a synthetic module whose exports are native callables, constant globals, and
/// memory/table declarations. Importers receive their own copies of memories, tables and
/// globals; functions are shared.
///
/// ```
/// use stackwasm::host::HostModule;
/// use stackwasm::model::{FuncType, ValType, Value};
///
/// let env = HostModule::new()
///     .func(
///         "add",
///         FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32]),
///         |args| match args {
///             [Value::I32(a), Value::I32(b)] => Ok(Some(Value::I32(a.wrapping_add(*b)))),
///             _ => unreachable!(),
///         },
///     )
///     .build();
/// assert!(env.exported_func("add").is_some());
/// ```
#[derive(Debug, Default)]
pub struct HostModule {
    module: Module,
}

impl HostModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn func<F>(mut self, name: impl Into<String>, ty: FuncType, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static,
    {
        let type_idx = match self.module.types.iter().position(|t| *t == ty) {
            Some(i) => i as u32,
            None => {
                self.module.types.push(ty);
                (self.module.types.len() - 1) as u32
            }
        };
        let index = self.module.functions.len() as u32;
        self.module.functions.push(Function {
            type_idx,
            kind: FuncKind::Host(Arc::new(f)),
        });
        self.export(name, ExternalKind::Function, index)
    }

    /// Immutable global initialized to `value`.
    pub fn global(mut self, name: impl Into<String>, value: Value) -> Self {
        let index = self.module.globals.len() as u32;
        self.module.globals.push(GlobalEntry {
            ty: GlobalType::new(value.ty(), false),
            init: value.into(),
        });
        self.export(name, ExternalKind::Global, index)
    }

    /// Declares the module's single memory. A second call replaces the limits.
    pub fn memory(mut self, name: impl Into<String>, limits: Limits) -> Self {
        self.module.memories = vec![MemoryType { limits }];
        self.export(name, ExternalKind::Memory, 0)
    }

    /// Declares the module's single table. A second call replaces the limits.
    pub fn table(mut self, name: impl Into<String>, limits: Limits) -> Self {
        self.module.tables = vec![TableType { limits }];
        self.export(name, ExternalKind::Table, 0)
    }

    pub fn build(self) -> Arc<Module> {
        Arc::new(self.module)
    }

    fn export(mut self, name: impl Into<String>, kind: ExternalKind, index: u32) -> Self {
        self.module.exports.insert(name.into(), Export { kind, index });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValType;

    #[test]
    fn host_module_shares_identical_signatures() {
        let ty = FuncType::new(&[ValType::I32], &[]);
        let m = HostModule::new()
            .func("a", ty.clone(), |_| Ok(None))
            .func("b", ty.clone(), |_| Ok(None))
            .global("g", Value::I64(5))
            .build();
        assert_eq!(m.types.len(), 1);
        assert_eq!(m.exported_func("b"), Some(1));
        assert_eq!(m.global_value(0), Some(Value::I64(5)));
    }

    #[test]
    fn map_resolver() {
        let env = HostModule::new().build();
        let mut imports = Imports::new().with("env", env.clone());
        assert!(Arc::ptr_eq(&imports.resolve("env").unwrap(), &env));
        let err = imports.resolve("missing").unwrap_err();
        assert_eq!(err.to_string(), "no module named \"missing\"");
        assert!(NoImports.resolve("env").is_err());
    }
}
