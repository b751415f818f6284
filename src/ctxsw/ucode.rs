// SPDX-License-Identifier: GPL-2.0

//! Layout of the context switch firmware in its GPU-visible surface.
//!
//! Both falcons share one surface. Each of them gets a boot segment holding its bootloader,
//! followed by a code and a data segment. Every segment starts on a 256-byte boundary, which is
//! the granularity of the bootloader DMA transfers:
//!
//! ```text
//! 0x0000  +------------------+
//!         | FECS boot        |
//!         +------------------+ <- rounded up to 256
//!         | FECS code        |
//!         +------------------+ <- rounded up to 256
//!         | FECS data        |
//!         +------------------+ <- rounded up to 256
//!         | GPCCS boot       |
//!         |       ...        |
//! ```

use crate::dma::DmaObject;
use crate::error::{Error, Result};
use crate::firmware::CtxswBootloaderDesc;
use crate::util::{self, align_up};

/// Alignment of the segments in the surface.
const SEGMENT_ALIGN: u32 = 256;

/// Location of a segment in the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UcodeSegment {
    /// Byte offset from the start of the surface.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

impl UcodeSegment {
    /// Offset right after the segment.
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Segments of the firmware of one falcon, and the bootloader parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UcodeSegments {
    pub boot: UcodeSegment,
    pub code: UcodeSegment,
    pub data: UcodeSegment,
    /// Entry point of the bootloader.
    pub boot_entry: u32,
    /// Destination of the bootloader in `IMEM`.
    pub boot_imem_offset: u32,
    /// Fingerprint of the bootloader, checked by the firmware to detect its version.
    pub boot_signature: u32,
}

/// Lays out segments one after the other in a surface.
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    offset: u32,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn segment(&mut self, size: u32) -> Result<UcodeSegment> {
        let segment = UcodeSegment {
            offset: self.offset,
            size,
        };

        self.offset = self
            .offset
            .checked_add(size)
            .and_then(|end| align_up(end, SEGMENT_ALIGN))
            .ok_or(Error::InvalidArgument)?;

        Ok(segment)
    }

    /// Lays out the boot, code and data segments of one falcon after the segments added so
    /// far.
    ///
    /// The boot segment holds the bootloader described by `desc`, rounded up to whole words.
    /// The signature is left to [`write_segments`].
    pub fn add(
        &mut self,
        desc: &CtxswBootloaderDesc,
        code_size: u32,
        data_size: u32,
    ) -> Result<UcodeSegments> {
        let boot_size = align_up(desc.size, 4).ok_or(Error::InvalidArgument)?;

        Ok(UcodeSegments {
            boot: self.segment(boot_size)?,
            code: self.segment(code_size)?,
            data: self.segment(data_size)?,
            boot_entry: desc.entry_point,
            boot_imem_offset: desc.imem_offset,
            boot_signature: 0,
        })
    }

    /// Size of the surface needed to hold every segment added so far.
    pub fn total_size(&self) -> u32 {
        self.offset
    }
}

/// Accumulates `word` into the running bootloader checksum.
#[inline]
pub fn checksum_u32(acc: u32, word: u32) -> u32 {
    acc.wrapping_add(word)
}

/// Copies the bootloader, code and data of one falcon into `surface` at the location given by
/// `segments`, and records the signature of the bootloader.
pub fn write_segments(
    surface: &mut DmaObject,
    segments: &mut UcodeSegments,
    bootloader: &[u8],
    code: &[u32],
    data: &[u32],
) -> Result {
    let boot_offset = segments.boot.offset as usize;
    let mut signature = 0;

    for (i, chunk) in bootloader.chunks(4).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);

        surface.write(boot_offset + i * 4, &word)?;
        signature = checksum_u32(signature, u32::from_le_bytes(word));
    }

    surface.write(segments.code.offset as usize, &util::words_to_bytes(code))?;
    surface.write(segments.data.offset as usize, &util::words_to_bytes(data))?;

    segments.boot_signature = signature;
    Ok(())
}
