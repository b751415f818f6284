// SPDX-License-Identifier: GPL-2.0

//! Copies between host buffers and the falcon memories.

use core::fmt::Write;

use log::{error, info};

use super::{Falcon, FalconMem};
use crate::error::{Error, Result};
use crate::io::Bar0;

/// Size of the blocks a memory dump is read in.
const DUMP_BLOCK_SIZE: usize = 256;

/// Target of a copy: a falcon memory, the byte offset into it and the port to go through.
///
/// The length of the copy is the length of the host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRequest {
    pub mem: FalconMem,
    pub offset: u32,
    pub port: u8,
}

impl CopyRequest {
    pub fn new(mem: FalconMem, offset: u32, port: u8) -> Self {
        Self { mem, offset, port }
    }
}

/// Host side of a copy, which also gives its direction.
#[derive(Debug)]
pub enum CopyBuffer<'a> {
    /// Copy the buffer into the falcon memory.
    ToFalcon(&'a [u8]),
    /// Fill the buffer from the falcon memory.
    FromFalcon(&'a mut [u8]),
}

impl CopyBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            CopyBuffer::ToFalcon(buf) => buf.len(),
            CopyBuffer::FromFalcon(buf) => buf.len(),
        }
    }
}

impl Falcon {
    /// Checks that a copy of `size` bytes at `offset` of `mem` through `port` stays within the
    /// memory.
    ///
    /// Nothing is written to the hardware, and no lock is taken.
    fn check_copy(&self, bar: &Bar0, mem: FalconMem, offset: u32, size: usize, port: u8) -> Result {
        if size == 0 {
            error!("falcon {}: copy size is zero", self.id);
            return Err(Error::InvalidArgument);
        }

        if offset & 0x3 != 0 {
            error!("falcon {}: offset ({:#010x}) not 4-byte aligned", self.id, offset);
            return Err(Error::InvalidArgument);
        }

        if port >= self.ports_count(bar, mem)? {
            error!("falcon {}: invalid {} port {}", self.id, mem, port);
            return Err(Error::InvalidArgument);
        }

        let mem_size = self.mem_size(bar, mem)?;
        let fits = u32::try_from(size)
            .ok()
            .and_then(|size| offset.checked_add(size))
            .is_some_and(|end| end <= mem_size);
        if !fits {
            error!(
                "falcon {}: {} copy overflow, total size {:#x}, offset {:#x}, copy size {:#x}",
                self.id, mem, mem_size, offset, size
            );
            return Err(Error::InvalidArgument);
        }

        Ok(())
    }

    /// Copies between `buf` and the falcon memory described by `req`.
    ///
    /// The request is validated in full before the memory lock is taken: a zero length, an
    /// unaligned offset, an invalid port or a range going past the end of the memory are rejected
    /// with [`Error::InvalidArgument`]. External memory requires the owning unit to have
    /// installed an [`EmemAccess`](super::EmemAccess).
    ///
    /// Writes to `IMEM` go through this method as non-secure, tagged with the block number of
    /// the destination.
    pub fn copy(&self, bar: &Bar0, req: CopyRequest, buf: CopyBuffer<'_>) -> Result {
        let hal = self.hal()?;

        self.check_copy(bar, req.mem, req.offset, buf.len(), req.port)?;

        match (req.mem, buf) {
            (FalconMem::Imem, CopyBuffer::ToFalcon(src)) => {
                let _guard = self.imem_lock.lock();
                hal.copy_to_imem(bar, req.offset, src, req.port, false, req.offset >> 8)
            }
            (FalconMem::Imem, CopyBuffer::FromFalcon(dst)) => {
                let _guard = self.imem_lock.lock();
                hal.copy_from_imem(bar, req.offset, dst, req.port)
            }
            (FalconMem::Dmem, CopyBuffer::ToFalcon(src)) => {
                let _guard = self.dmem_lock.lock();
                hal.copy_to_dmem(bar, req.offset, src, req.port)
            }
            (FalconMem::Dmem, CopyBuffer::FromFalcon(dst)) => {
                let _guard = self.dmem_lock.lock();
                hal.copy_from_dmem(bar, req.offset, dst, req.port)
            }
            (FalconMem::Emem, CopyBuffer::ToFalcon(src)) => {
                let emem = self.emem()?;
                let _guard = self.emem_lock.lock();
                emem.copy_to_emem(bar, req.offset, src, req.port)
            }
            (FalconMem::Emem, CopyBuffer::FromFalcon(dst)) => {
                let emem = self.emem()?;
                let _guard = self.emem_lock.lock();
                emem.copy_from_emem(bar, req.offset, dst, req.port)
            }
        }
    }

    pub fn copy_to_dmem(&self, bar: &Bar0, dst: u32, src: &[u8], port: u8) -> Result {
        self.copy(
            bar,
            CopyRequest::new(FalconMem::Dmem, dst, port),
            CopyBuffer::ToFalcon(src),
        )
    }

    pub fn copy_from_dmem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result {
        self.copy(
            bar,
            CopyRequest::new(FalconMem::Dmem, src, port),
            CopyBuffer::FromFalcon(dst),
        )
    }

    /// Copies `src` into `IMEM` at `dst`.
    ///
    /// `sec` marks the blocks as secure, and `tag` is the virtual tag given to the first block,
    /// incremented for each following block.
    pub fn copy_to_imem(
        &self,
        bar: &Bar0,
        dst: u32,
        src: &[u8],
        port: u8,
        sec: bool,
        tag: u32,
    ) -> Result {
        let hal = self.hal()?;

        self.check_copy(bar, FalconMem::Imem, dst, src.len(), port)?;

        let _guard = self.imem_lock.lock();
        hal.copy_to_imem(bar, dst, src, port, sec, tag)
    }

    pub fn copy_from_imem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result {
        self.copy(
            bar,
            CopyRequest::new(FalconMem::Imem, src, port),
            CopyBuffer::FromFalcon(dst),
        )
    }

    pub fn copy_to_emem(&self, bar: &Bar0, dst: u32, src: &[u8], port: u8) -> Result {
        self.copy(
            bar,
            CopyRequest::new(FalconMem::Emem, dst, port),
            CopyBuffer::ToFalcon(src),
        )
    }

    pub fn copy_from_emem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result {
        self.copy(
            bar,
            CopyRequest::new(FalconMem::Emem, src, port),
            CopyBuffer::FromFalcon(dst),
        )
    }

    /// Number of times the lock of `mem` has been taken.
    pub fn lock_acquisitions(&self, mem: FalconMem) -> u64 {
        match mem {
            FalconMem::Imem => self.imem_lock.acquisitions(),
            FalconMem::Dmem => self.dmem_lock.acquisitions(),
            FalconMem::Emem => self.emem_lock.acquisitions(),
        }
    }

    /// Writes `size` bytes of `mem` starting at `offset` to `out`, as lines of four 32-bit words
    /// prefixed with their offset.
    ///
    /// The memory is read through port 0 in blocks of 256 bytes. The first failing block aborts
    /// the dump.
    pub fn dump_mem<W: Write>(
        &self,
        bar: &Bar0,
        mem: FalconMem,
        offset: u32,
        size: u32,
        out: &mut W,
    ) -> Result {
        if mem == FalconMem::Emem {
            return Err(Error::InvalidArgument);
        }

        self.hal()?;
        self.check_copy(bar, mem, offset, size as usize, 0)?;

        let mut buf = [0u8; DUMP_BLOCK_SIZE];
        let mut addr = offset;
        let mut remaining = size as usize;

        while remaining > 0 {
            let len = remaining.min(DUMP_BLOCK_SIZE);
            let block = &mut buf[..len];

            let res = self.copy(
                bar,
                CopyRequest::new(mem, addr, 0),
                CopyBuffer::FromFalcon(block),
            );
            if let Err(e) = res {
                error!("falcon {}: {} dump failed at {:#x}: {}", self.id, mem, addr, e);
                return Err(e);
            }

            for (line, chunk) in block.chunks(16).enumerate() {
                write!(out, "{:#06x}:", addr as usize + line * 16).map_err(|_| Error::Io)?;
                for word in chunk.chunks(4) {
                    let mut bytes = [0u8; 4];
                    bytes[..word.len()].copy_from_slice(word);
                    write!(out, " {:#010x}", u32::from_le_bytes(bytes)).map_err(|_| Error::Io)?;
                }
                writeln!(out).map_err(|_| Error::Io)?;
            }

            addr += len as u32;
            remaining -= len;
        }

        Ok(())
    }

    /// Logs the content of `size` bytes of `DMEM` at `src`.
    pub fn print_dmem(&self, bar: &Bar0, src: u32, size: u32) -> Result {
        self.print_mem(bar, FalconMem::Dmem, src, size)
    }

    /// Logs the content of `size` bytes of `IMEM` at `src`.
    pub fn print_imem(&self, bar: &Bar0, src: u32, size: u32) -> Result {
        self.print_mem(bar, FalconMem::Imem, src, size)
    }

    fn print_mem(&self, bar: &Bar0, mem: FalconMem, src: u32, size: u32) -> Result {
        let mut out = String::new();
        self.dump_mem(bar, mem, src, size, &mut out)?;

        info!("falcon {}: {} offset {:#x} size {} bytes", self.id, mem, src, size);
        for line in out.lines() {
            info!("{}", line);
        }

        Ok(())
    }
}
