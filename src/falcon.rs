// SPDX-License-Identifier: GPL-2.0

//! Falcon microprocessor base support

use core::fmt;
use core::time::Duration;

use bitflags::bitflags;
use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::io::Bar0;
use crate::poll;
use crate::regs::macros::RegisterBase;
use crate::sync::MemLock;

pub mod hal;
mod mem;

pub use hal::FalconHal;
pub use mem::{CopyBuffer, CopyRequest};

/// Number of mailbox registers of a falcon.
pub const FALCON_MAILBOX_COUNT: usize = 2;

// TIMEOUT: the falcon is expected to go idle well within 2 seconds.
const IDLE_POLL_INTERVAL: Duration = Duration::from_micros(100);
const IDLE_TIMEOUT: Duration = Duration::from_millis(2000);

// TIMEOUT: scrubbing time depends on the memory sizes and the clocks, 1ms is conservative.
const SCRUB_POLL_INTERVAL: Duration = Duration::from_micros(10);
const SCRUB_TIMEOUT: Duration = Duration::from_micros(1000);

const HALT_POLL_INTERVAL: Duration = Duration::from_micros(10);
const HALT_INTR_POLL_INTERVAL: Duration = Duration::from_micros(1);

/// Logical identifier of a falcon, using the hardware numbering.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FalconId {
    /// Power management unit.
    Pmu = 0,
    /// GSP lite.
    GspLite = 1,
    /// Front-end context switch, first half of the graphics context switch firmware.
    Fecs = 2,
    /// GPC context switch, running the per-GPC part of the context switch firmware.
    Gpccs = 3,
    /// Video decoder.
    Nvdec = 4,
    /// Security engine 2.
    Sec2 = 7,
    /// NVLink management.
    Minion = 10,
}

impl FalconId {
    /// Every falcon a device can carry, in registry order.
    pub const ALL: [FalconId; 7] = [
        FalconId::Pmu,
        FalconId::GspLite,
        FalconId::Fecs,
        FalconId::Gpccs,
        FalconId::Nvdec,
        FalconId::Sec2,
        FalconId::Minion,
    ];

    /// Returns the mask bit of this falcon.
    pub const fn mask(self) -> FalconIdMask {
        FalconIdMask::from_bits_retain(1 << self as u32)
    }

    /// Index of this falcon in [`FalconId::ALL`].
    pub(crate) fn index(self) -> usize {
        match self {
            FalconId::Pmu => 0,
            FalconId::GspLite => 1,
            FalconId::Fecs => 2,
            FalconId::Gpccs => 3,
            FalconId::Nvdec => 4,
            FalconId::Sec2 => 5,
            FalconId::Minion => 6,
        }
    }
}

impl From<FalconId> for u32 {
    fn from(value: FalconId) -> Self {
        value as u32
    }
}

// TODO replace with something like derive(FromPrimitive)
impl TryFrom<u32> for FalconId {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        FalconId::ALL
            .into_iter()
            .find(|id| u32::from(*id) == value)
            .ok_or(Error::NoDevice)
    }
}

impl fmt::Display for FalconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FalconId::Pmu => "PMU",
            FalconId::GspLite => "GSPLITE",
            FalconId::Fecs => "FECS",
            FalconId::Gpccs => "GPCCS",
            FalconId::Nvdec => "NVDEC",
            FalconId::Sec2 => "SEC2",
            FalconId::Minion => "MINION",
        };

        write!(f, "{}({:#x})", name, *self as u32)
    }
}

bitflags! {
    /// Set of falcons, one bit per [`FalconId`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FalconIdMask: u32 {
        const PMU = 1 << 0;
        const GSPLITE = 1 << 1;
        const FECS = 1 << 2;
        const GPCCS = 1 << 3;
        const NVDEC = 1 << 4;
        const SEC2 = 1 << 7;
        const MINION = 1 << 10;
    }
}

bitflags! {
    /// Capabilities of a falcon instance, assigned by the chip software initialization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FalconFlags: u32 {
        /// The falcon exists on this chip and can be operated.
        const SUPPORTED = 1 << 0;
        /// The falcon can raise interrupts to the host.
        const INTERRUPT = 1 << 1;
        /// The falcon has an external memory, reached through its owning unit.
        const EMEM = 1 << 2;
    }
}

/// Different types of memory present in a falcon core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FalconMem {
    /// Instruction Memory.
    Imem,
    /// Data Memory.
    Dmem,
    /// External Memory.
    Emem,
}

impl fmt::Display for FalconMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FalconMem::Imem => f.write_str("IMEM"),
            FalconMem::Dmem => f.write_str("DMEM"),
            FalconMem::Emem => f.write_str("EMEM"),
        }
    }
}

/// Snapshot of the security and CPU control registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FalconCtls {
    pub sctl: u32,
    pub cpuctl: u32,
}

/// Parameters of a DMA load of a bootloader into `IMEM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootLoadParams {
    /// Boot vector to start the falcon at.
    pub entry: u32,
    /// GPU virtual address of the bootloader, in units of 256 bytes.
    pub addr_load32: u32,
    /// Number of 256-byte blocks to transfer.
    pub blocks: u32,
    /// Destination offset in `IMEM`.
    pub dst: u32,
}

/// Description of a bootloader to run through [`Falcon::bl_bootstrap`].
#[derive(Debug, Clone, Copy)]
pub struct FalconBlInfo<'a> {
    /// Bootloader code, copied to the top of `IMEM`.
    pub bl_src: &'a [u8],
    /// Bootloader interface structure, copied to the start of `DMEM`.
    pub bl_desc: &'a [u8],
    /// Virtual tag of the first bootloader block.
    pub bl_start_tag: u32,
}

/// Type used to represent the `PFALCON` registers address base for a given falcon engine.
pub(crate) struct PFalconBase(());

/// Register base of one falcon instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FalconBase(pub usize);

impl RegisterBase<PFalconBase> for FalconBase {
    fn base(&self) -> usize {
        self.0
    }
}

/// Reset of the engine owning a falcon, which resets the falcon along with it.
pub trait EngineReset: Send + Sync {
    fn reset_eng(&self, bar: &Bar0) -> Result;
}

/// Access to the external memory of a falcon, provided by the unit owning it.
pub trait EmemAccess: Send + Sync {
    /// Size of the external memory, in bytes.
    fn size(&self, bar: &Bar0) -> u32;

    /// Number of ports giving access to the external memory.
    fn ports_count(&self, bar: &Bar0) -> u8;

    fn copy_to_emem(&self, bar: &Bar0, dst: u32, src: &[u8], port: u8) -> Result;

    fn copy_from_emem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result;
}

/// Contains the state of one falcon microcontroller.
///
/// A falcon is created unsupported and becomes usable once the chip software initialization has
/// given it a HAL and set [`FalconFlags::SUPPORTED`]. Every operation on an unsupported falcon
/// fails with [`Error::Unsupported`].
pub struct Falcon {
    id: FalconId,
    flags: FalconFlags,
    hal: Option<Box<dyn FalconHal>>,
    engine_reset: Option<Box<dyn EngineReset>>,
    emem: Option<Box<dyn EmemAccess>>,
    imem_lock: MemLock,
    dmem_lock: MemLock,
    emem_lock: MemLock,
}

impl Falcon {
    pub(crate) fn new(id: FalconId) -> Self {
        Self {
            id,
            flags: FalconFlags::empty(),
            hal: None,
            engine_reset: None,
            emem: None,
            imem_lock: MemLock::new(),
            dmem_lock: MemLock::new(),
            emem_lock: MemLock::new(),
        }
    }

    /// Makes the falcon usable with `hal`.
    pub(crate) fn setup(&mut self, hal: Box<dyn FalconHal>, flags: FalconFlags) {
        self.hal = Some(hal);
        self.flags = flags | FalconFlags::SUPPORTED;
    }

    /// Returns the falcon to its unsupported state, dropping its HAL and engine dependencies.
    ///
    /// Returns `false` if the falcon was not supported in the first place.
    pub(crate) fn release(&mut self) -> bool {
        if !self.is_supported() {
            return false;
        }

        self.flags = FalconFlags::empty();
        self.hal = None;
        self.engine_reset = None;
        self.emem = None;
        true
    }

    pub(crate) fn set_engine_reset(&mut self, reset: Box<dyn EngineReset>) {
        self.engine_reset = Some(reset);
    }

    pub(crate) fn set_emem(&mut self, emem: Box<dyn EmemAccess>) {
        self.emem = Some(emem);
    }

    pub fn id(&self) -> FalconId {
        self.id
    }

    pub fn flags(&self) -> FalconFlags {
        self.flags
    }

    pub fn is_supported(&self) -> bool {
        self.flags.contains(FalconFlags::SUPPORTED)
    }

    /// Returns the HAL of this falcon, or [`Error::Unsupported`] if it cannot be operated.
    fn hal(&self) -> Result<&dyn FalconHal> {
        match &self.hal {
            Some(hal) if self.is_supported() => Ok(hal.as_ref()),
            _ => {
                error!("falcon {} not supported", self.id);
                Err(Error::Unsupported)
            }
        }
    }

    /// Wait for the falcon to report itself and its attached units idle.
    pub fn wait_idle(&self, bar: &Bar0) -> Result {
        let hal = self.hal()?;

        poll::wait_on(IDLE_POLL_INTERVAL, IDLE_TIMEOUT, || hal.is_idle(bar)).map_err(|e| {
            error!("falcon {}: timeout waiting for idle: {}", self.id, e);
            e
        })
    }

    /// Wait for the `IMEM` and `DMEM` scrubbing to complete.
    pub fn wait_scrub_done(&self, bar: &Bar0) -> Result {
        let hal = self.hal()?;

        poll::wait_on(SCRUB_POLL_INTERVAL, SCRUB_TIMEOUT, || {
            hal.is_scrubbing_done(bar)
        })
        .map_err(|e| {
            error!("falcon {}: memory scrubbing did not complete: {}", self.id, e);
            e
        })
    }

    /// Wait up to `timeout` for the falcon CPU to halt.
    pub fn wait_halt(&self, bar: &Bar0, timeout: Duration) -> Result {
        let hal = self.hal()?;

        poll::wait_on(HALT_POLL_INTERVAL, timeout, || hal.is_cpu_halted(bar)).map_err(|e| {
            error!("falcon {}: CPU did not halt: {}", self.id, e);
            e
        })
    }

    /// Clear the halt interrupt, retrying for up to `timeout` until the status reads back clear.
    pub fn clear_halt_interrupt(&self, bar: &Bar0, timeout: Duration) -> Result {
        let hal = self.hal()?;

        poll::wait_on(HALT_INTR_POLL_INTERVAL, timeout, || {
            hal.clear_halt_interrupt_status(bar)
        })
        .map_err(|e| {
            error!("falcon {}: halt interrupt status did not clear: {}", self.id, e);
            e
        })
    }

    /// Reset the falcon and wait for memory scrubbing to complete.
    ///
    /// If the owning unit installed an engine reset, it is used in place of the falcon-only
    /// reset.
    pub fn reset(&self, bar: &Bar0) -> Result {
        let hal = self.hal()?;

        let res = match &self.engine_reset {
            // Falcon and engine reset.
            Some(eng) => eng.reset_eng(bar),
            None => hal.reset(bar),
        };
        res.map_err(|e| {
            error!("falcon {}: reset failed: {}", self.id, e);
            e
        })?;

        self.wait_scrub_done(bar)
    }

    /// Program the interrupt mask and destination of the falcon.
    ///
    /// Interrupts stay disabled on a falcon without interrupt support.
    pub fn set_irq(&self, bar: &Bar0, enable: bool, mask: u32, dest: u32) -> Result {
        let hal = self.hal()?;

        let enable = if self.flags.contains(FalconFlags::INTERRUPT) {
            enable
        } else {
            warn!("falcon {}: interrupts not supported, keeping them disabled", self.id);
            false
        };

        hal.set_irq(bar, enable, mask, dest);
        Ok(())
    }

    pub fn mailbox_read(&self, bar: &Bar0, index: usize) -> Result<u32> {
        let hal = self.hal()?;

        if index >= FALCON_MAILBOX_COUNT {
            error!("falcon {}: incorrect mailbox id {}", self.id, index);
            return Err(Error::InvalidArgument);
        }

        Ok(hal.mailbox_read(bar, index))
    }

    pub fn mailbox_write(&self, bar: &Bar0, index: usize, value: u32) -> Result {
        let hal = self.hal()?;

        if index >= FALCON_MAILBOX_COUNT {
            error!("falcon {}: incorrect mailbox id {}", self.id, index);
            return Err(Error::InvalidArgument);
        }

        hal.mailbox_write(bar, index, value);
        Ok(())
    }

    /// Set the boot vector and start the falcon CPU.
    pub fn bootstrap(&self, bar: &Bar0, boot_vector: u32) -> Result {
        self.hal()?.bootstrap(bar, boot_vector)
    }

    /// Start the falcon CPU at its currently programmed boot vector.
    pub fn start(&self, bar: &Bar0) -> Result {
        debug!("falcon {}: starting", self.id);
        self.hal()?.start_cpu(bar)
    }

    /// DMA a bootloader from GPU memory into `IMEM` and set the boot vector to its entry.
    pub fn load_boot(&self, bar: &Bar0, params: &BootLoadParams) -> Result {
        self.hal()?.load_boot(bar, params)
    }

    /// Bind the instance block at `inst_block_addr` to the falcon's memory interface.
    pub fn bind_instblk(&self, bar: &Bar0, inst_block_addr: u64) -> Result {
        self.hal()?.bind_instblk(bar, inst_block_addr)
    }

    pub fn ctls(&self, bar: &Bar0) -> Result<FalconCtls> {
        Ok(self.hal()?.ctls(bar))
    }

    /// Returns the size in bytes of `mem`.
    pub fn mem_size(&self, bar: &Bar0, mem: FalconMem) -> Result<u32> {
        let hal = self.hal()?;

        match mem {
            FalconMem::Emem => Ok(self.emem()?.size(bar)),
            _ => Ok(hal.mem_size(bar, mem)),
        }
    }

    /// Returns the number of access ports of `mem`.
    pub fn ports_count(&self, bar: &Bar0, mem: FalconMem) -> Result<u8> {
        let hal = self.hal()?;

        match mem {
            FalconMem::Emem => Ok(self.emem()?.ports_count(bar)),
            _ => Ok(hal.ports_count(bar, mem)),
        }
    }

    fn emem(&self) -> Result<&dyn EmemAccess> {
        match &self.emem {
            Some(emem) => Ok(emem.as_ref()),
            None => {
                warn!("falcon {}: no external memory access", self.id);
                Err(Error::Unsupported)
            }
        }
    }

    /// Load and run a bootloader.
    ///
    /// The bootloader interface structure goes to the start of `DMEM`, the bootloader itself to
    /// the top of `IMEM`, and the falcon is started at the virtual address of its first block.
    pub fn bl_bootstrap(&self, bar: &Bar0, bl_info: &FalconBlInfo<'_>) -> Result {
        self.hal()?;

        self.do_bl_bootstrap(bar, bl_info).map_err(|e| {
            error!("falcon {}: bootloader bootstrap failed: {}", self.id, e);
            e
        })
    }

    fn do_bl_bootstrap(&self, bar: &Bar0, bl_info: &FalconBlInfo<'_>) -> Result {
        let imem_size = self.mem_size(bar, FalconMem::Imem)?;
        let bl_size = u32::try_from(bl_info.bl_src.len()).map_err(|_| Error::InvalidArgument)?;

        if bl_size > imem_size {
            error!(
                "falcon {}: bootloader size {:#x} greater than IMEM size {:#x}",
                self.id, bl_size, imem_size
            );
            return Err(Error::InvalidArgument);
        }

        self.copy_to_dmem(bar, 0, bl_info.bl_desc, 0)?;

        let dst = imem_size - bl_size;
        self.copy_to_imem(bar, dst, bl_info.bl_src, 0, false, bl_info.bl_start_tag)?;

        let virt_addr = bl_info
            .bl_start_tag
            .checked_mul(256)
            .ok_or(Error::InvalidArgument)?;

        self.bootstrap(bar, virt_addr)
    }
}

impl fmt::Debug for Falcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Falcon")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("engine_reset", &self.engine_reset.is_some())
            .field("emem", &self.emem.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_masks_follow_hardware_numbering() {
        assert_eq!(FalconId::Fecs.mask(), FalconIdMask::FECS);
        assert_eq!(
            (FalconId::Fecs.mask() | FalconId::Gpccs.mask()).bits(),
            0xc
        );
        assert_eq!(FalconId::Minion.mask().bits(), 1 << 10);
    }

    #[test]
    fn id_from_raw() {
        assert_eq!(FalconId::try_from(7), Ok(FalconId::Sec2));
        assert_eq!(FalconId::try_from(5), Err(Error::NoDevice));

        for (i, id) in FalconId::ALL.into_iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn unsupported_falcon_fails_fast() {
        let falcon = Falcon::new(FalconId::Nvdec);

        assert!(!falcon.is_supported());
        assert_eq!(falcon.hal().err(), Some(Error::Unsupported));
    }
}
