//! Execution: instantiation, invocation and the interpreter.

pub mod frames;
pub mod instructions;
mod interpreter;
pub mod numeric;
pub mod stack;

use std::sync::Arc;

use tracing::debug;

use crate::config::VmConfig;
use crate::debug::DebugHook;
use crate::error::{InstantiateError, InvokeError, Trap};
use crate::model::{ConstExpr, ExternalKind, FuncIdx, FuncKind, GlobalIdx, Module, Value};
use crate::runtime::{Memory, Table};
use crate::validate::{self, ValidatedModule};

use frames::Frame;
use stack::ValueStack;

/// An instance of a validated module: its globals, memory and table, plus the execution
/// state of the call in progress.
///
/// Functions imported from another module run in a child instance of that module, created
/// when this one is instantiated. Host functions run inline.
///
/// A trap leaves the instance unusable; later calls return [`InvokeError::Poisoned`].
pub struct Vm {
    module: ValidatedModule,
    config: VmConfig,
    globals: Vec<u64>,
    memory: Option<Memory>,
    table: Option<Table>,
    stack: ValueStack,
    frames: Vec<Frame>,
    /// One instance per distinct exporting module.
    children: Vec<Vm>,
    /// For each function of the index space: child slot and the exporter's function index.
    links: Vec<Option<(usize, FuncIdx)>>,
    /// Frames already active in parent instances; counts toward `max_call_depth`.
    depth_base: usize,
    fuel: Option<u64>,
    poisoned: bool,
    debug: Option<Box<dyn DebugHook>>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("functions", &self.module.module().functions.len())
            .field("globals", &self.globals.len())
            .field("memory_pages", &self.memory.as_ref().map(Memory::size_pages))
            .field("children", &self.children.len())
            .field("fuel", &self.fuel)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Vm {
    /// Instantiate with the default [`VmConfig`].
    pub fn new(module: ValidatedModule) -> Result<Self, InstantiateError> {
        Self::instantiate(module, VmConfig::default())
    }

    /// Create the module's storage, run its initializers and finally its start function.
    ///
    /// Every element and data segment is bounds-checked before any of them is written, so a
    /// failing instantiation leaves no partially initialized state behind.
    pub fn instantiate(module: ValidatedModule, config: VmConfig) -> Result<Self, InstantiateError> {
        let m = module.module().clone();
        let (children, links) = link_imports(&m, &config)?;

        let mut globals: Vec<u64> = Vec::with_capacity(m.globals.len());
        for g in &m.globals {
            let bits = const_bits(g.init, &globals);
            globals.push(bits);
        }

        let mut memory = m
            .memories
            .first()
            .map(|ty| Memory::new(ty, config.max_memory_pages))
            .transpose()?;
        let mut table = m.tables.first().map(Table::new);

        let mut elements = Vec::with_capacity(m.elements.len());
        for (i, seg) in m.elements.iter().enumerate() {
            let offset = const_bits(seg.offset, &globals) as u32;
            let size = table.as_ref().map_or(0, Table::size);
            if offset as u64 + seg.init.len() as u64 > size as u64 {
                return Err(InstantiateError::ElementSegmentOutOfBounds(i));
            }
            elements.push(offset);
        }
        let mut data = Vec::with_capacity(m.data.len());
        for (i, seg) in m.data.iter().enumerate() {
            let offset = const_bits(seg.offset, &globals) as u32;
            let len = memory.as_ref().map_or(0, |mem| mem.data().len());
            if offset as u64 + seg.init.len() as u64 > len as u64 {
                return Err(InstantiateError::DataSegmentOutOfBounds(i));
            }
            data.push(offset);
        }
        for (i, (seg, &offset)) in m.elements.iter().zip(&elements).enumerate() {
            if let Some(table) = table.as_mut() {
                table
                    .init(offset, &seg.init)
                    .map_err(|_| InstantiateError::ElementSegmentOutOfBounds(i))?;
            }
        }
        for (i, (seg, &offset)) in m.data.iter().zip(&data).enumerate() {
            if let Some(memory) = memory.as_mut() {
                memory
                    .write(offset, &seg.init)
                    .map_err(|_| InstantiateError::DataSegmentOutOfBounds(i))?;
            }
        }

        let mut vm = Vm {
            stack: ValueStack::new(config.max_value_stack),
            fuel: config.fuel,
            module,
            config,
            globals,
            memory,
            table,
            frames: Vec::new(),
            children,
            links,
            depth_base: 0,
            poisoned: false,
            debug: None,
        };
        debug!(
            functions = m.functions.len(),
            globals = vm.globals.len(),
            memory_pages = vm.memory.as_ref().map(Memory::size_pages),
            linked = vm.children.len(),
            "instantiated module"
        );

        if let Some(start) = m.start {
            debug!(func = start, "running start function");
            vm.call_raw(start, &[])
                .map_err(InstantiateError::StartTrap)?;
        }
        Ok(vm)
    }

    pub fn module(&self) -> &ValidatedModule {
        &self.module
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Call the function at `func` in the module's index space.
    pub fn invoke(&mut self, func: FuncIdx, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
        if self.poisoned {
            return Err(InvokeError::Poisoned);
        }
        let module = self.module.module().clone();
        let ty = module
            .func_type(func)
            .ok_or(InvokeError::FunctionNotFound(func))?;
        if ty.results.len() > 1 {
            return Err(InvokeError::UnsupportedResultArity(ty.results.len()));
        }
        if args.len() != ty.params.len()
            || args.iter().zip(&ty.params).any(|(a, &t)| a.ty() != t)
        {
            return Err(InvokeError::ArgumentMismatch {
                expected: ty.clone(),
            });
        }

        debug!(func, args = args.len(), "invoke");
        let bits: Vec<u64> = args.iter().map(|a| a.to_bits()).collect();
        let result = self.call_raw(func, &bits)?;
        Ok(ty
            .results
            .iter()
            .zip(result)
            .map(|(&t, bits)| Value::from_bits(t, bits))
            .collect())
    }

    /// Call an exported function by name.
    pub fn invoke_export(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
        let export = self
            .module
            .module()
            .export(name)
            .ok_or_else(|| InvokeError::ExportNotFound(name.to_string()))?;
        if export.kind != ExternalKind::Function {
            return Err(InvokeError::NotAFunction(name.to_string()));
        }
        self.invoke(export.index, args)
    }

    /// Run `func` on raw slots. A trap poisons the instance and discards the execution state.
    fn call_raw(&mut self, func: FuncIdx, args: &[u64]) -> Result<Option<u64>, Trap> {
        if self.poisoned {
            return Err(Trap::Poisoned);
        }
        let height = self.stack.len();
        if let Err(trap) = self.stack.reserve(args.len()) {
            self.poisoned = true;
            return Err(trap);
        }
        for &a in args {
            self.stack.push(a);
        }
        match self.run(func) {
            Ok(()) => {
                let result = (self.stack.len() > height).then(|| self.stack.pop());
                self.stack.truncate(height);
                Ok(result)
            }
            Err(trap) => {
                debug!(func, %trap, "trapped");
                self.poisoned = true;
                self.frames.clear();
                self.stack.clear();
                Err(trap)
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Remaining instruction budget, if one was configured.
    pub fn fuel(&self) -> Option<u64> {
        self.fuel
    }

    pub fn set_fuel(&mut self, fuel: Option<u64>) {
        self.fuel = fuel;
    }

    /// Attach a hook consulted before every instruction of this instance. Child instances of
    /// imported modules are not instrumented.
    pub fn set_debug_hook(&mut self, hook: impl DebugHook + 'static) {
        self.debug = Some(Box::new(hook));
    }

    pub fn take_debug_hook(&mut self) -> Option<Box<dyn DebugHook>> {
        self.debug.take()
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> Option<&mut Memory> {
        self.memory.as_mut()
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    /// Current value of a global in the module's index space.
    pub fn global(&self, index: GlobalIdx) -> Option<Value> {
        let ty = self.module.module().globals.get(index as usize)?.ty.val_type;
        let bits = *self.globals.get(index as usize)?;
        Some(Value::from_bits(ty, bits))
    }

    /// Current value of an exported global.
    pub fn exported_global(&self, name: &str) -> Option<Value> {
        match self.module.module().export(name)? {
            export if export.kind == ExternalKind::Global => self.global(export.index),
            _ => None,
        }
    }
}

/// Evaluate an initializer. `global.get` reads an already initialized global; validation
/// guarantees it refers to an earlier one.
fn const_bits(expr: ConstExpr, globals: &[u64]) -> u64 {
    match expr {
        ConstExpr::I32(v) => Value::I32(v).to_bits(),
        ConstExpr::I64(v) => Value::I64(v).to_bits(),
        ConstExpr::F32(b) => Value::F32(b).to_bits(),
        ConstExpr::F64(b) => Value::F64(b).to_bits(),
        ConstExpr::GlobalGet(i) => globals.get(i as usize).copied().unwrap_or_default(),
    }
}

type Links = (Vec<Vm>, Vec<Option<(usize, FuncIdx)>>);

/// Instantiate every module that defines one of `m`'s imported functions, once per module.
fn link_imports(m: &Module, config: &VmConfig) -> Result<Links, InstantiateError> {
    let mut children: Vec<Vm> = Vec::new();
    let mut links = vec![None; m.functions.len()];
    for (func, f) in m.functions.iter().enumerate() {
        let FuncKind::Imported { module, index } = &f.kind else {
            continue;
        };
        let existing = children
            .iter()
            .position(|child| Arc::ptr_eq(child.module.module(), module));
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let validated =
                    validate::validate(module.clone()).map_err(InstantiateError::ImportValidation)?;
                let child = Vm::instantiate(validated, config.clone())
                    .map_err(|e| InstantiateError::ImportInstantiation(Box::new(e)))?;
                children.push(child);
                children.len() - 1
            }
        };
        links[func] = Some((slot, *index));
    }
    Ok((children, links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FuncType, Function, FunctionBody, ValType};
    use instructions::op;

    fn single(ty: FuncType, code: &[u8]) -> ValidatedModule {
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
        validate::validate(m).unwrap()
    }

    #[test]
    fn adds_parameters() {
        let module = single(
            FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32]),
            &[op::LOCAL_GET, 0, op::LOCAL_GET, 1, op::I32_ADD, op::END],
        );
        let mut vm = Vm::new(module).unwrap();
        assert_eq!(
            vm.invoke(0, &[Value::I32(40), Value::I32(2)]).unwrap(),
            vec![Value::I32(42)]
        );
        // the instance stays usable after a successful call
        assert_eq!(
            vm.invoke(0, &[Value::I32(-1), Value::I32(1)]).unwrap(),
            vec![Value::I32(0)]
        );
    }

    #[test]
    fn checks_arguments_at_the_boundary() {
        let module = single(FuncType::new(&[ValType::I64], &[]), &[op::END]);
        let mut vm = Vm::new(module).unwrap();
        assert!(matches!(
            vm.invoke(0, &[Value::I32(1)]),
            Err(InvokeError::ArgumentMismatch { .. })
        ));
        assert!(matches!(vm.invoke(0, &[]), Err(InvokeError::ArgumentMismatch { .. })));
        assert!(matches!(vm.invoke(3, &[]), Err(InvokeError::FunctionNotFound(3))));
        assert!(vm.invoke(0, &[Value::I64(1)]).unwrap().is_empty());
    }

    #[test]
    fn trap_poisons_instance() {
        let module = single(FuncType::default(), &[op::UNREACHABLE, op::END]);
        let mut vm = Vm::new(module).unwrap();
        assert!(matches!(
            vm.invoke(0, &[]),
            Err(InvokeError::Trap(Trap::Unreachable))
        ));
        assert!(vm.is_poisoned());
        assert!(matches!(vm.invoke(0, &[]), Err(InvokeError::Poisoned)));
    }

    fn importer(lib: &ValidatedModule, kind: impl Fn(Arc<Module>) -> FuncKind) -> ValidatedModule {
        let mut m = Module::default();
        m.types.push(FuncType::new(&[ValType::I32], &[ValType::I32]));
        m.functions.push(Function {
            type_idx: 0,
            kind: kind(lib.module().clone()),
        });
        m.imported_funcs = 1;
        validate::validate(m).unwrap()
    }

    fn identity() -> ValidatedModule {
        single(
            FuncType::new(&[ValType::I32], &[ValType::I32]),
            &[op::LOCAL_GET, 0, op::END],
        )
    }

    #[test]
    fn host_functions_run_inline() {
        let lib = identity();
        let module = importer(&lib, |_| {
            FuncKind::Host(Arc::new(|args: &[Value]| match args {
                [Value::I32(v)] => Ok(Some(Value::I32(v * 3))),
                _ => Ok(None),
            }))
        });
        let mut vm = Vm::new(module).unwrap();
        assert_eq!(vm.invoke(0, &[Value::I32(5)]).unwrap(), vec![Value::I32(15)]);
    }

    #[test]
    fn engine_faults_are_not_host_errors() {
        let lib = identity();
        let linked = |module: Arc<Module>| FuncKind::Imported { module, index: 0 };

        let mut vm = Vm::new(importer(&lib, linked)).unwrap();
        assert_eq!(vm.invoke(0, &[Value::I32(9)]).unwrap(), vec![Value::I32(9)]);
        vm.links[0] = None;
        assert!(matches!(
            vm.invoke(0, &[Value::I32(9)]),
            Err(InvokeError::Trap(Trap::Internal(_)))
        ));
        assert_eq!(vm.call_raw(0, &[9]), Err(Trap::Poisoned));

        let mut vm = Vm::new(importer(&lib, linked)).unwrap();
        vm.children[0].poisoned = true;
        assert!(matches!(
            vm.invoke(0, &[Value::I32(9)]),
            Err(InvokeError::Trap(Trap::Poisoned))
        ));
    }

    #[test]
    fn fuel_is_consumed_per_instruction() {
        let module = single(
            FuncType::new(&[], &[ValType::I32]),
            &[op::I32_CONST, 1, op::END],
        );
        let mut vm = Vm::instantiate(module.clone(), VmConfig::default().with_fuel(2)).unwrap();
        assert_eq!(vm.invoke(0, &[]).unwrap(), vec![Value::I32(1)]);
        assert_eq!(vm.fuel(), Some(0));

        let mut vm = Vm::instantiate(module, VmConfig::default().with_fuel(1)).unwrap();
        assert!(matches!(
            vm.invoke(0, &[]),
            Err(InvokeError::Trap(Trap::OutOfFuel))
        ));
    }
}
