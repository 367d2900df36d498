//! Byte cursor with absolute offset tracking and little-endian primitives.

use super::BinaryReadError;

/// Forward-only cursor over a byte slice.
///
/// `base` is the absolute offset of `data[0]` inside the whole module, so errors raised from a
/// section sub-cursor still point at the right byte of the input.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    /// Create a new cursor over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, base: 0 }
    }

    /// Absolute byte offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Offset relative to the start of this cursor's slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek next byte without advancing.
    pub fn peek_u8(&self) -> super::Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.offset() })
    }

    pub fn read_u8(&mut self) -> super::Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly n bytes and return a slice view into the underlying data.
    pub fn read_bytes(&mut self, n: usize) -> super::Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(BinaryReadError::Malformed {
            offset: self.offset(),
            msg: "length overflows the address space",
        })?;
        if end > self.data.len() {
            return Err(BinaryReadError::UnexpectedEof { offset: self.offset() });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Split off the next `n` bytes as a cursor of their own and advance past them.
    /// Reads through the returned cursor can never run past those `n` bytes.
    pub fn sub_cursor(&mut self, n: usize) -> super::Result<Cursor<'a>> {
        let start = self.offset();
        let data = self.read_bytes(n)?;
        Ok(Cursor { data, pos: 0, base: start })
    }

    pub fn read_u32_le(&mut self) -> super::Result<u32> {
        let b = self.read_array::<4>()?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_u64_le(&mut self) -> super::Result<u64> {
        let b = self.read_array::<8>()?;
        Ok(u64::from_le_bytes(b))
    }

    /// Raw IEEE-754 bits of a little-endian f32; NaN payloads are preserved.
    pub fn read_f32_bits(&mut self) -> super::Result<u32> {
        self.read_u32_le()
    }

    /// Raw IEEE-754 bits of a little-endian f64; NaN payloads are preserved.
    pub fn read_f64_bits(&mut self) -> super::Result<u64> {
        self.read_u64_le()
    }

    fn read_array<const N: usize>(&mut self) -> super::Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }
}
