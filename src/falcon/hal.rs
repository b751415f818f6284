// SPDX-License-Identifier: GPL-2.0

use crate::{
    error::{Error, Result},
    falcon::{BootLoadParams, FalconBase, FalconCtls, FalconMem},
    gpu::Chipset,
    io::Bar0,
};

mod gk20a;

/// Hardware Abstraction Layer for Falcon cores.
///
/// Implements chipset-specific low-level operations. One implementation exists per hardware
/// generation; it is selected when the falcon is initialized and used for the lifetime of the
/// instance.
///
/// Predicates return `Ok(false)` while the hardware has not reached the expected state yet, and
/// an error only when the hardware cannot answer at all.
pub trait FalconHal: Send + Sync {
    /// Returns the size in bytes of `mem`. Never called with [`FalconMem::Emem`].
    fn mem_size(&self, bar: &Bar0, mem: FalconMem) -> u32;

    /// Returns the number of access ports of `mem`. Never called with [`FalconMem::Emem`].
    fn ports_count(&self, bar: &Bar0, mem: FalconMem) -> u8;

    /// Reset the falcon alone, without waiting for the memory scrubbing.
    fn reset(&self, bar: &Bar0) -> Result;

    /// Whether the falcon and its attached units are idle.
    fn is_idle(&self, bar: &Bar0) -> Result<bool>;

    fn is_cpu_halted(&self, bar: &Bar0) -> Result<bool>;

    /// Whether `IMEM` and `DMEM` scrubbing has completed.
    fn is_scrubbing_done(&self, bar: &Bar0) -> Result<bool>;

    /// Clear the halt interrupt, returning `true` if it reads back as cleared.
    fn clear_halt_interrupt_status(&self, bar: &Bar0) -> Result<bool>;

    fn set_irq(&self, bar: &Bar0, enable: bool, mask: u32, dest: u32);

    fn mailbox_read(&self, bar: &Bar0, index: usize) -> u32;

    fn mailbox_write(&self, bar: &Bar0, index: usize, value: u32);

    fn copy_to_dmem(&self, bar: &Bar0, dst: u32, src: &[u8], port: u8) -> Result;

    fn copy_from_dmem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result;

    /// Copy `src` to `IMEM`, giving the virtual tag `tag` to the first block and marking the
    /// blocks secure if `sec` is set.
    fn copy_to_imem(
        &self,
        bar: &Bar0,
        dst: u32,
        src: &[u8],
        port: u8,
        sec: bool,
        tag: u32,
    ) -> Result;

    fn copy_from_imem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result;

    /// Set the boot vector to `boot_vector` and start the CPU.
    fn bootstrap(&self, bar: &Bar0, boot_vector: u32) -> Result;

    /// Start the CPU at the current boot vector.
    fn start_cpu(&self, bar: &Bar0) -> Result;

    /// DMA the bootloader described by `params` into `IMEM` and set the boot vector to its
    /// entry.
    fn load_boot(&self, bar: &Bar0, params: &BootLoadParams) -> Result;

    /// Bind the instance block at `inst_block_addr` to the falcon.
    ///
    /// Only the falcons owning a context switch arbiter support this.
    fn bind_instblk(&self, _bar: &Bar0, _inst_block_addr: u64) -> Result {
        Err(Error::Unsupported)
    }

    fn ctls(&self, bar: &Bar0) -> FalconCtls;
}

/// Returns a boxed falcon HAL adequate for `chipset`, operating the falcon at `base`.
pub(crate) fn falcon_hal(chipset: Chipset, base: FalconBase) -> Result<Box<dyn FalconHal>> {
    use Chipset::*;

    let hal = match chipset {
        GM20B | GM20B_B | GP10B | GV11B | GV100 | TU104 => {
            Box::new(gk20a::Gk20a::new(base)) as Box<dyn FalconHal>
        }
    };

    Ok(hal)
}
