//! Guest physical memory as seen by the surface cache.
//!
//! The emulator's memory system provides the real implementation and calls
//! back into the cache on CPU writes. [`VecGuestMemory`] is a contiguous RAM
//! window used by tests and tools.

use crate::interval::{IntervalSet, SurfaceInterval};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("guest memory access out of bounds: addr={addr:#x}, len={len:#x}")]
pub struct GuestMemoryError {
    pub addr: u32,
    pub len: usize,
}

pub trait GuestMemory {
    fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError>;
    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), GuestMemoryError>;

    /// Called when the first surface starts (or the last one stops) covering
    /// a 4 KiB page, so the memory system can route CPU writes there through
    /// the cache.
    fn mark_region_cached(&mut self, _addr: u32, _size: u32, _cached: bool) {}
}

#[derive(Clone, Debug)]
pub struct VecGuestMemory {
    base: u32,
    mem: Vec<u8>,
    cached: IntervalSet,
}

impl VecGuestMemory {
    pub fn new(base: u32, size_bytes: usize) -> Self {
        Self {
            base,
            mem: vec![0u8; size_bytes],
            cached: IntervalSet::new(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// Ranges currently reported as backed by cached surfaces.
    pub fn cached_regions(&self) -> &IntervalSet {
        &self.cached
    }

    pub fn is_cached(&self, addr: u32) -> bool {
        self.cached.intersects(SurfaceInterval::from_size(addr, 1))
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, GuestMemoryError> {
        let err = GuestMemoryError { addr, len };
        let start = addr.checked_sub(self.base).ok_or(err.clone())? as usize;
        let end = start.checked_add(len).ok_or(err.clone())?;
        if end > self.mem.len() {
            return Err(err);
        }
        Ok(start..end)
    }
}

impl GuestMemory for VecGuestMemory {
    fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(addr, dst.len())?;
        dst.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(addr, src.len())?;
        self.mem[range].copy_from_slice(src);
        Ok(())
    }

    fn mark_region_cached(&mut self, addr: u32, size: u32, cached: bool) {
        let interval = SurfaceInterval::from_size(addr, size);
        if cached {
            self.cached.insert(interval);
        } else {
            self.cached.remove(interval);
        }
    }
}
