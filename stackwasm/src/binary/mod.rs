//! Binary reading for the module format: cursor, LEB128, shared helpers, section readers and the
//! top-level decoder.
//! The low-level readers report `BinaryReadError` (always carrying the absolute byte offset);
//! the decoder lifts those into `crate::error::DecodeError`.

pub mod cursor;
pub mod decode;
pub mod leb128;
pub mod reader;
pub mod sections;

use thiserror::Error;

/// Result alias for binary reading operations.
pub type Result<T> = core::result::Result<T, BinaryReadError>;

/// Errors that can occur while reading a module's byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryReadError {
    #[error("unexpected end of section or input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("malformed LEB128: value overflows {target_bits} bits at offset {offset}")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("malformed LEB128: more than {limit} bytes at offset {offset}")]
    Leb128TooManyBytes { limit: u8, offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("malformed binary at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
