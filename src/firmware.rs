// SPDX-License-Identifier: GPL-2.0

//! Context switch firmware images.

use log::error;

use crate::error::{Error, Result};

/// Bootloader image of the FECS falcon.
pub const FECS_UCODE_IMAGE: &str = "fecs.bin";
/// Bootloader image of the GPCCS falcon.
pub const GPCCS_UCODE_IMAGE: &str = "gpccs.bin";

/// Source of firmware files.
pub trait FirmwareLoader {
    /// Returns the content of firmware `name`, or [`Error::NoEntry`] if it does not exist.
    fn request(&self, name: &str) -> Result<Vec<u8>>;
}

/// Header of a context switch bootloader image, describing where and how to run it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CtxswBootloaderDesc {
    pub start_offset: u32,
    /// Size of the bootloader code, in bytes.
    pub size: u32,
    /// Destination offset of the bootloader in `IMEM`.
    pub imem_offset: u32,
    pub entry_point: u32,
}

impl CtxswBootloaderDesc {
    /// Size of the serialized header.
    pub const SIZE: usize = 16;

    /// Parses the little-endian header at the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = bytes.get(..Self::SIZE).ok_or(Error::InvalidArgument)?;
        let field = |i: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&header[i * 4..i * 4 + 4]);
            u32::from_le_bytes(word)
        };

        Ok(Self {
            start_offset: field(0),
            size: field(1),
            imem_offset: field(2),
            entry_point: field(3),
        })
    }
}

/// A context switch bootloader firmware: its header and its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtxswFirmware {
    pub desc: CtxswBootloaderDesc,
    pub bootloader: Vec<u8>,
}

impl CtxswFirmware {
    /// Parses a firmware blob made of a [`CtxswBootloaderDesc`] immediately followed by the
    /// bootloader code.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let desc = CtxswBootloaderDesc::from_bytes(blob)?;

        let bootloader = usize::try_from(desc.size)
            .ok()
            .and_then(|size| size.checked_add(CtxswBootloaderDesc::SIZE))
            .and_then(|end| blob.get(CtxswBootloaderDesc::SIZE..end))
            .ok_or(Error::InvalidArgument)?;

        Ok(Self {
            desc,
            bootloader: bootloader.to_vec(),
        })
    }

    /// Requests firmware `name` from `loader` and parses it.
    pub fn request(loader: &dyn FirmwareLoader, name: &str) -> Result<Self> {
        let blob = loader.request(name).map_err(|e| {
            error!("failed to load {} ucode: {}", name, e);
            e
        })?;

        Self::parse(&blob).map_err(|e| {
            error!("{} is truncated or malformed", name);
            e
        })
    }
}

/// Code and data of one context switch falcon, as 32-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtxswUcodeImage {
    pub inst: Vec<u32>,
    pub data: Vec<u32>,
}

/// The context switch firmware of the graphics engine, as provided by the netlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtxswNetlist {
    pub fecs: CtxswUcodeImage,
    pub gpccs: CtxswUcodeImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(desc: [u32; 4], code: &[u8]) -> Vec<u8> {
        let mut blob: Vec<u8> = desc.iter().flat_map(|w| w.to_le_bytes()).collect();
        blob.extend_from_slice(code);
        blob
    }

    #[test]
    fn parses_header_and_code() {
        let fw = CtxswFirmware::parse(&blob([0, 6, 0x3400, 0x3400], &[1, 2, 3, 4, 5, 6, 7])).unwrap();

        assert_eq!(
            fw.desc,
            CtxswBootloaderDesc {
                start_offset: 0,
                size: 6,
                imem_offset: 0x3400,
                entry_point: 0x3400,
            }
        );
        assert_eq!(fw.bootloader, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn truncated_blobs_are_rejected() {
        assert_eq!(
            CtxswBootloaderDesc::from_bytes(&[0; 15]),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            CtxswFirmware::parse(&blob([0, 8, 0, 0], &[0; 4])),
            Err(Error::InvalidArgument)
        );
    }
}
