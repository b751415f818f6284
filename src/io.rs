// SPDX-License-Identifier: GPL-2.0

//! MMIO access used by register-backed falcon HALs.

/// A 32-bit register window, typically PCI BAR 0 of the GPU.
///
/// Implementations must perform the access immediately; register reads can have side effects
/// (e.g. auto-incrementing memory ports), so accesses must not be cached or reordered.
pub trait Io: Send + Sync {
    /// Reads the 32-bit register at byte `offset`.
    fn read32(&self, offset: usize) -> u32;

    /// Writes `value` to the 32-bit register at byte `offset`.
    fn write32(&self, value: u32, offset: usize);
}

/// MMIO mapping of the GPU register space.
pub type Bar0 = dyn Io;

/// Returns `true` if `value` is the pattern returned by a PRI read to a powered-off or hung
/// unit.
#[inline]
pub(crate) fn is_badf(value: u32) -> bool {
    value & 0xffff_0000 == 0xbadf_0000
}
