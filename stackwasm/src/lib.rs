//! stackwasm: a WebAssembly MVP decoder, validator and stack-machine interpreter.
//!
//! The pipeline has three stages, each with its own error type:
//!
//! 1. [`decode`] turns module bytes into a [`Module`], resolving imports through an
//!    [`ImportResolver`] as it goes ([`DecodeError`]).
//! 2. [`validate()`] type-checks it and precomputes branch targets ([`ValidationError`]).
//! 3. [`Vm::instantiate`] builds an instance that can be invoked ([`InstantiateError`],
//!    [`InvokeError`], [`Trap`]).
//!
//! ```
//! use stackwasm::{decode, validate, NoImports, Value, Vm};
//!
//! // (module (func (export "answer") (result i32) i32.const 42))
//! let bytes = [
//!     0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
//!     0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F, // type: [] -> [i32]
//!     0x03, 0x02, 0x01, 0x00, // function: type 0
//!     0x07, 0x0A, 0x01, 0x06, b'a', b'n', b's', b'w', b'e', b'r', 0x00, 0x00, // export
//!     0x0A, 0x06, 0x01, 0x04, 0x00, 0x41, 0x2A, 0x0B, // code: i32.const 42
//! ];
//! let module = decode(&bytes, &mut NoImports)?;
//! let mut vm = Vm::new(validate(module)?)?;
//! assert_eq!(vm.invoke_export("answer", &[])?, vec![Value::I32(42)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binary;
pub mod config;
pub mod debug;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
pub mod validate;
pub mod vm;

pub use binary::decode::decode;
pub use config::VmConfig;
pub use debug::{DebugHook, Debugger, DebuggerHandle, ExecutionView};
pub use error::{DecodeError, InstantiateError, InvokeError, Trap, ValidationError};
pub use host::{HostModule, ImportResolver, Imports, NoImports};
pub use model::{FuncType, Module, ValType, Value};
pub use validate::{validate, ValidatedModule};
pub use vm::Vm;
