//! Activation records.

use crate::model::FuncIdx;

/// One active call of a defined function.
///
/// The frame's locals (parameters first) occupy `locals..base` on the value stack; its operands
/// start at `base`. Branch heights recorded by validation are relative to `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub func: FuncIdx,
    /// Index into `Module::bodies`.
    pub body: usize,
    /// Resume point, saved while a callee runs.
    pub pc: usize,
    pub locals: usize,
    pub base: usize,
    /// Number of results left on the stack on return (0 or 1).
    pub arity: usize,
}

impl Frame {
    #[inline]
    pub fn local_slot(&self, index: u32) -> usize {
        self.locals + index as usize
    }
}
