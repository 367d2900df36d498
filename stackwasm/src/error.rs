//! Crate-level error types. Decoding, validation and execution each have their own family; a
//! trap is never reported as a decode or validation failure and vice versa.

use std::fmt;

use thiserror::Error;

use crate::binary::BinaryReadError;
use crate::model::{ExternalKind, FuncIdx, FuncType, ValType};

/// Error type returned by import resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Binary(#[from] BinaryReadError),

    #[error("bad magic header")]
    BadMagic,

    #[error("unsupported binary version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { id: u8, offset: usize },

    #[error("duplicate {0} section")]
    DuplicateSection(&'static str),

    #[error("{section} section out of order at offset {offset}")]
    SectionOutOfOrder { section: &'static str, offset: usize },

    #[error("{section} section declares {declared} bytes but its contents span {consumed}")]
    SectionSizeMismatch {
        section: &'static str,
        declared: usize,
        consumed: usize,
    },

    #[error("function section declares {functions} functions but code section has {bodies} bodies")]
    FunctionCodeMismatch { functions: usize, bodies: usize },

    #[error("duplicate export name {0:?}")]
    DuplicateExport(String),

    #[error("import {index}: failed to resolve module {module:?}")]
    ImportResolution {
        index: u32,
        module: String,
        #[source]
        source: BoxError,
    },

    #[error("import {index}: module {module:?} has no export named {name:?}")]
    MissingExport {
        index: u32,
        module: String,
        name: String,
    },

    #[error("import {index} ({module}.{name}): expected a {expected}, found a {found}")]
    ImportKindMismatch {
        index: u32,
        module: String,
        name: String,
        expected: ExternalKind,
        found: ExternalKind,
    },

    #[error("import {index} ({module}.{name}): invalid signature, expected {expected}, found {found}")]
    InvalidImportSignature {
        index: u32,
        module: String,
        name: String,
        expected: FuncType,
        found: FuncType,
    },

    #[error("import {index} ({module}.{name}): incompatible {kind}")]
    IncompatibleImport {
        index: u32,
        module: String,
        name: String,
        kind: ExternalKind,
    },

    #[error("{kind} index {index} out of range")]
    IndexOutOfRange { kind: &'static str, index: u32 },

    #[error("unsupported constant expression")]
    UnsupportedConstExpr,

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// A function body or module-level check that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Function in the index space, `None` for module-level checks.
    pub func: Option<FuncIdx>,
    /// Absolute byte offset in the module, when known.
    pub offset: Option<usize>,
}

impl ValidationError {
    pub fn module(kind: ValidationErrorKind) -> Self {
        Self {
            kind,
            func: None,
            offset: None,
        }
    }

    pub fn in_func(kind: ValidationErrorKind, func: FuncIdx, offset: usize) -> Self {
        Self {
            kind,
            func: Some(func),
            offset: Some(offset),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(func) = self.func {
            write!(f, "function {func}: ")?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(offset) = self.offset {
            write!(f, " (at offset {offset})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValType, found: ValType },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("block ends with {found} values, expected {expected}")]
    UnbalancedStack { expected: usize, found: usize },

    #[error("invalid branch depth {0}")]
    InvalidBranchDepth(u32),

    #[error("br_table targets have differing arity")]
    BranchArityMismatch,

    #[error("unknown local {0}")]
    UnknownLocal(u32),

    #[error("unknown global {0}")]
    UnknownGlobal(u32),

    #[error("unknown function {0}")]
    UnknownFunction(u32),

    #[error("unknown type {0}")]
    UnknownType(u32),

    #[error("unknown table {0}")]
    UnknownTable(u32),

    #[error("unknown memory {0}")]
    UnknownMemory(u32),

    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),

    #[error("global {0} may not be referenced by this initializer")]
    InvalidConstGlobal(u32),

    #[error("import {0}: mutable globals cannot be imported")]
    MutableGlobalImport(u32),

    #[error("alignment 2^{align} exceeds natural alignment 2^{natural}")]
    InvalidAlignment { align: u32, natural: u32 },

    #[error("unsupported block type 0x{0:02x}")]
    UnsupportedBlockType(u8),

    #[error("type {0} has more than one result")]
    MultipleResults(u32),

    #[error("start function {0} must take no parameters and return nothing")]
    InvalidStartFunction(u32),

    #[error("at most one {0} is supported")]
    TooMany(&'static str),

    #[error("too many locals")]
    TooManyLocals,

    #[error("limits: minimum {min} exceeds maximum {max}")]
    InvalidLimits { min: u32, max: u32 },

    #[error("memory size of {0} pages exceeds 4 GiB")]
    MemoryTooLarge(u32),

    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("malformed function body: {0}")]
    Malformed(&'static str),
}

/// Runtime fault. Aborts the current invocation and poisons the instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("integer division by zero")]
    IntegerDivideByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,

    #[error("out of bounds memory access")]
    MemoryOutOfBounds,

    #[error("undefined table element")]
    TableOutOfBounds,

    #[error("uninitialized table element")]
    UninitializedElement,

    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("value stack exhausted")]
    ValueStackExhausted,

    #[error("out of fuel")]
    OutOfFuel,

    #[error("host function failed: {0}")]
    Host(String),

    /// A linked instance was entered after an earlier trap left it unusable.
    #[error("linked instance is unusable after an earlier trap")]
    Poisoned,

    /// An engine invariant did not hold. Validated code never reaches this.
    #[error("internal engine error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("element segment {0} does not fit in table")]
    ElementSegmentOutOfBounds(usize),

    #[error("data segment {0} does not fit in memory")]
    DataSegmentOutOfBounds(usize),

    #[error("memory of {pages} pages exceeds configured ceiling of {ceiling} pages")]
    MemoryLimitExceeded { pages: u32, ceiling: u32 },

    #[error("could not allocate {pages} pages of memory")]
    MemoryAllocation { pages: u32 },

    #[error("imported module failed validation")]
    ImportValidation(#[source] ValidationError),

    #[error("imported module failed to instantiate")]
    ImportInstantiation(#[source] Box<InstantiateError>),

    #[error("trap while running start function")]
    StartTrap(#[source] Trap),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("export {0:?} not found")]
    ExportNotFound(String),

    #[error("export {0:?} is not a function")]
    NotAFunction(String),

    #[error("function {0} not found")]
    FunctionNotFound(FuncIdx),

    #[error("argument mismatch: function expects {expected}")]
    ArgumentMismatch { expected: FuncType },

    #[error("functions returning {0} values cannot be invoked")]
    UnsupportedResultArity(usize),

    #[error("instance is unusable after a trap")]
    Poisoned,

    #[error(transparent)]
    Trap(#[from] Trap),
}
