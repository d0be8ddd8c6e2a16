// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! DMA-visible memory.
//!
//! Auxiliary buffers shared with the hardware (probability tables, segment maps) are allocated
//! through a [`DmaAllocator`]. Each [`DmaBuffer`] carries both the device address programmed into
//! the registers and the CPU view the driver fills.

use thiserror::Error;

use crate::utils::align_up;

/// Device address, as programmed into the 32-bit address registers.
pub type DmaAddr = u32;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DmaError {
    #[error("cannot allocate {requested} bytes of DMA memory ({available} bytes left)")]
    OutOfMemory { requested: usize, available: usize },
}

/// A zero-initialized buffer shared between the CPU and the device.
#[derive(Debug)]
pub struct DmaBuffer {
    dma: DmaAddr,
    cpu: Vec<u8>,
}

impl DmaBuffer {
    /// Device address of the start of the buffer.
    pub fn dma(&self) -> DmaAddr {
        self.dma
    }

    pub fn size(&self) -> usize {
        self.cpu.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cpu
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.cpu
    }
}

/// Provider of DMA-visible memory.
pub trait DmaAllocator {
    /// Allocates a zeroed buffer of `size` bytes.
    fn alloc(&mut self, size: usize) -> Result<DmaBuffer, DmaError>;

    /// Returns `buffer` to the allocator.
    fn free(&mut self, buffer: DmaBuffer);
}

/// Allocator handing out buffers from a fixed window of device address space.
///
/// Allocations are aligned to [`LinearDmaAllocator::ALIGNMENT`] and placed at the lowest address
/// that fits.
#[derive(Debug)]
pub struct LinearDmaAllocator {
    base: DmaAddr,
    size: u32,
    /// Allocated ranges as `(address, aligned size)`, sorted by address.
    allocations: Vec<(DmaAddr, u32)>,
}

impl LinearDmaAllocator {
    pub const ALIGNMENT: u32 = 64;

    /// Creates an allocator managing `size` bytes starting at `base`. `base` is rounded up to
    /// [`Self::ALIGNMENT`].
    pub fn new(base: DmaAddr, size: u32) -> Self {
        let aligned_base = align_up(base, Self::ALIGNMENT);

        Self {
            base: aligned_base,
            size: size.saturating_sub(aligned_base - base),
            allocations: Vec::new(),
        }
    }

    /// Number of bytes currently allocated, including alignment padding.
    pub fn allocated(&self) -> usize {
        self.allocations.iter().map(|(_, len)| *len as usize).sum()
    }

    pub fn available(&self) -> usize {
        self.size as usize - self.allocated()
    }
}

impl DmaAllocator for LinearDmaAllocator {
    fn alloc(&mut self, size: usize) -> Result<DmaBuffer, DmaError> {
        let out_of_memory = DmaError::OutOfMemory {
            requested: size,
            available: self.available(),
        };

        let len = u64::try_from(size)
            .ok()
            .map(|size| size.max(1).next_multiple_of(u64::from(Self::ALIGNMENT)))
            .ok_or(out_of_memory.clone())?;
        let end = u64::from(self.base) + u64::from(self.size);

        let mut candidate = u64::from(self.base);
        let mut slot = self.allocations.len();
        for (i, (addr, alloc_len)) in self.allocations.iter().enumerate() {
            if candidate + len <= u64::from(*addr) {
                slot = i;
                break;
            }
            candidate = u64::from(*addr) + u64::from(*alloc_len);
        }

        if candidate + len > end {
            return Err(out_of_memory);
        }

        // Both fit in a u32 since `end` does.
        let dma = candidate as DmaAddr;
        self.allocations.insert(slot, (dma, len as u32));
        log::debug!("allocated {} bytes of DMA memory at {:#010x}", size, dma);

        Ok(DmaBuffer {
            dma,
            cpu: vec![0; size],
        })
    }

    fn free(&mut self, buffer: DmaBuffer) {
        match self.allocations.iter().position(|(addr, _)| *addr == buffer.dma) {
            Some(pos) => {
                self.allocations.remove(pos);
            }
            None => log::warn!(
                "freeing DMA buffer {:#010x} that was not allocated here",
                buffer.dma
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_aligned_and_zeroed() {
        let mut alloc = LinearDmaAllocator::new(0x1000_0010, 0x1000);

        let a = alloc.alloc(100).unwrap();
        let b = alloc.alloc(1208).unwrap();

        assert_eq!(a.dma(), 0x1000_0040);
        assert_eq!(a.dma() % LinearDmaAllocator::ALIGNMENT, 0);
        assert_eq!(b.dma() % LinearDmaAllocator::ALIGNMENT, 0);
        assert!(b.dma() >= a.dma() + 128);
        assert_eq!(a.size(), 100);
        assert!(b.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn out_of_memory() {
        let mut alloc = LinearDmaAllocator::new(0, 256);

        let a = alloc.alloc(200).unwrap();
        assert_eq!(
            alloc.alloc(100).unwrap_err(),
            DmaError::OutOfMemory {
                requested: 100,
                available: 0
            }
        );

        alloc.free(a);
        assert_eq!(alloc.allocated(), 0);
        assert!(alloc.alloc(100).is_ok());
    }

    #[test]
    fn freed_holes_are_reused() {
        let mut alloc = LinearDmaAllocator::new(0, 0x1000);

        let a = alloc.alloc(64).unwrap();
        let b = alloc.alloc(64).unwrap();
        let a_addr = a.dma();
        alloc.free(a);

        let c = alloc.alloc(32).unwrap();
        assert_eq!(c.dma(), a_addr);
        assert!(c.dma() < b.dma());
    }
}
