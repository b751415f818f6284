// SPDX-License-Identifier: GPL-2.0

//! Simple DMA object wrapper, and the address space the objects get mapped into.

use core::alloc::Layout;
use core::ops::Deref;

use crate::error::{Error, Result};

/// Granularity of the GPU-visible allocations.
pub const PAGE_SIZE: usize = 4096;

/// Zero-initialized buffer meant to be made visible to the GPU, padded to a whole number of
/// pages.
pub struct DmaObject {
    data: Vec<u8>,
}

impl DmaObject {
    pub fn new(len: usize) -> Result<Self> {
        let len = Layout::from_size_align(len, PAGE_SIZE)
            .map_err(|_| Error::InvalidArgument)?
            .pad_to_align()
            .size();

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| Error::NoMemory)?;
        data.resize(len, 0);

        Ok(Self { data })
    }

    pub fn from_data(data: &[u8]) -> Result<Self> {
        Self::new(data.len()).and_then(|mut dma_obj| {
            dma_obj.write(0, data)?;
            Ok(dma_obj)
        })
    }

    /// Copies `src` into the object at byte `offset`.
    ///
    /// Fails with [`Error::InvalidArgument`] if the range does not fit in the object.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> Result {
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= self.data.len())
            .ok_or(Error::InvalidArgument)?;

        self.data[offset..end].copy_from_slice(src);
        Ok(())
    }

    /// Size of the object, including the padding.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Deref for DmaObject {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// An instance block, binding an engine to an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstBlock {
    /// Physical address of the block, 4 KiB aligned.
    pub addr: u64,
}

/// GPU address space used to run the context switch firmware from.
///
/// The page table management lives outside of this crate.
pub trait Vm {
    /// Allocates and initializes an instance block pointing at this address space.
    fn alloc_inst_block(&self) -> Result<InstBlock>;

    fn free_inst_block(&self, inst_block: InstBlock);

    /// Maps `obj` read-only, returning its GPU virtual address.
    fn map_read_only(&self, obj: &DmaObject) -> Result<u64>;

    fn unmap(&self, gpu_va: u64, obj: &DmaObject);
}
