//! Linear memory (32-bit index space).
//! Page-based growth bounded by the declared maximum and the embedder ceiling, plus
//! bounds-checked little-endian access on behalf of the interpreter.

use std::collections::TryReserveError;
use std::ops::Range;

use tracing::warn;

use crate::error::{InstantiateError, Trap};
use crate::model::MemoryType;
use crate::validate::MAX_PAGES;

/// Page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

type Reserve = fn(&mut Vec<u8>, usize) -> Result<(), TryReserveError>;

fn reserve_exact(buf: &mut Vec<u8>, additional: usize) -> Result<(), TryReserveError> {
    buf.try_reserve_exact(additional)
}

#[derive(Debug, Clone)]
pub struct Memory {
    buf: Vec<u8>,
    /// Effective maximum in pages: the declared maximum capped by the embedder ceiling.
    max: u32,
}

impl Memory {
    /// Allocate the initial pages of `ty`. Fails if they already exceed `ceiling` or the host
    /// cannot provide them.
    pub fn new(ty: &MemoryType, ceiling: u32) -> Result<Self, InstantiateError> {
        Self::new_with(ty, ceiling, reserve_exact)
    }

    fn new_with(ty: &MemoryType, ceiling: u32, reserve: Reserve) -> Result<Self, InstantiateError> {
        let ceiling = ceiling.min(MAX_PAGES);
        let min = ty.limits.min;
        if min > ceiling {
            return Err(InstantiateError::MemoryLimitExceeded {
                pages: min,
                ceiling,
            });
        }
        let mut buf = Vec::new();
        let len = min as usize * PAGE_SIZE;
        reserve(&mut buf, len).map_err(|_| InstantiateError::MemoryAllocation { pages: min })?;
        buf.resize(len, 0);
        Ok(Self {
            buf,
            max: ty.limits.max.unwrap_or(MAX_PAGES).min(ceiling),
        })
    }

    /// Current size in pages.
    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    /// Grow by `delta` pages. Returns the previous size, or `None` when the result would
    /// exceed the effective maximum or the host cannot allocate it.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        self.grow_with(delta, reserve_exact)
    }

    fn grow_with(&mut self, delta: u32, reserve: Reserve) -> Option<u32> {
        let prev = self.size_pages();
        let new = match prev.checked_add(delta) {
            Some(new) if new <= self.max => new,
            _ => {
                warn!(current = prev, delta, max = self.max, "memory.grow refused");
                return None;
            }
        };
        let len = new as usize * PAGE_SIZE;
        let additional = len - self.buf.len();
        if let Err(err) = reserve(&mut self.buf, additional) {
            warn!(current = prev, delta, %err, "memory.grow could not allocate");
            return None;
        }
        self.buf.resize(len, 0);
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Byte range of an access at `addr + offset` spanning `len` bytes.
    #[inline]
    fn range(&self, addr: u32, offset: u32, len: usize) -> Result<Range<usize>, Trap> {
        let start = addr as u64 + offset as u64;
        let end = start + len as u64;
        if end > self.buf.len() as u64 {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(start as usize..end as usize)
    }

    #[inline]
    pub fn load<const N: usize>(&self, addr: u32, offset: u32) -> Result<[u8; N], Trap> {
        let range = self.range(addr, offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[range]);
        Ok(out)
    }

    #[inline]
    pub fn store<const N: usize>(
        &mut self,
        addr: u32,
        offset: u32,
        bytes: [u8; N],
    ) -> Result<(), Trap> {
        let range = self.range(addr, offset, N)?;
        self.buf[range].copy_from_slice(&bytes);
        Ok(())
    }

    /// Copy `bytes` to `addr`; nothing is written unless the whole range fits.
    pub fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Trap> {
        let range = self.range(addr, 0, bytes.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&self, addr: u32, len: usize) -> Result<&[u8], Trap> {
        let range = self.range(addr, 0, len)?;
        Ok(&self.buf[range])
    }
}
