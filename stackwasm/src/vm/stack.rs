//! Operand stack shared by every frame of one instance.
//!
//! Slots are untyped 64-bit words: validation already proved every read sees a value of the
//! expected type, so the interpreter reinterprets the bits instead of carrying a tag. Locals
//! live in the same vector, directly below the frame's operands.

use crate::error::Trap;

#[derive(Debug, Default)]
pub struct ValueStack {
    slots: Vec<u64>,
    limit: usize,
}

impl ValueStack {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Vec::with_capacity(limit.min(1024)),
            limit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fail unless `extra` more slots fit under the limit. Frames reserve their worst case up
    /// front so individual pushes need no check.
    #[inline]
    pub fn reserve(&self, extra: usize) -> Result<(), Trap> {
        match self.slots.len().checked_add(extra) {
            Some(n) if n <= self.limit => Ok(()),
            _ => Err(Trap::ValueStackExhausted),
        }
    }

    #[inline]
    pub fn push(&mut self, v: u64) {
        self.slots.push(v);
    }

    #[inline]
    pub fn pop(&mut self) -> u64 {
        debug_assert!(!self.slots.is_empty(), "operand stack underflow");
        self.slots.pop().unwrap_or_default()
    }

    #[inline]
    pub fn top(&self) -> u64 {
        self.slots.last().copied().unwrap_or_default()
    }

    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        self.slots.get(index).copied().unwrap_or_default()
    }

    #[inline]
    pub fn set(&mut self, index: usize, v: u64) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = v;
        }
    }

    /// Push `n` zeroed slots (declared locals).
    pub fn push_zeros(&mut self, n: usize) {
        self.slots.resize(self.slots.len() + n, 0);
    }

    pub fn truncate(&mut self, height: usize) {
        self.slots.truncate(height);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Drop everything between `height` and the top `keep` slots, which slide down to `height`.
    #[inline]
    pub fn unwind(&mut self, height: usize, keep: usize) {
        let len = self.slots.len();
        debug_assert!(height + keep <= len);
        if keep > 0 && height + keep < len {
            self.slots.copy_within(len - keep..len, height);
        }
        self.slots.truncate(height + keep);
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.slots
    }

    /// Slots from `start` to the top.
    pub fn slice_from(&self, start: usize) -> &[u64] {
        self.slots.get(start..).unwrap_or_default()
    }
}
