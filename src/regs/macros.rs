// SPDX-License-Identifier: GPL-2.0

//! `register!` macro to define register layout and accessors.
//!
//! A single register typically includes several fields, which are accessed through a combination
//! of bit-shift and mask operations that introduce a class of potential mistakes. The `register!`
//! macro in this module provides a readable syntax for defining a dedicated type for each
//! register, with one accessor per field. See [`bitfield!`] for the syntax of field definitions.
//!
//! Falcon registers are all relative to the base of the engine they belong to, and the same
//! layout is instantiated at a different base for each falcon. The base is resolved at runtime
//! through the [`RegisterBase`] trait.

/// Trait providing a base address to be added to the offset of a relative register to obtain
/// its actual offset.
///
/// The `T` generic argument is used to distinguish which base to use, in case a type provides
/// several bases. It is given to the `register!` macro to restrict the use of the register to
/// implementors of this particular variant.
pub(crate) trait RegisterBase<T> {
    fn base(&self) -> usize;
}

/// Defines a dedicated type for a register relative to a base, including getter and setter
/// methods for its fields and methods to read and write it from a [`Bar0`](crate::io::Bar0).
///
/// ```ignore
/// register!(NV_PFALCON_FALCON_CPUCTL @ PFalconBase[0x00000100] {
///     1:1     startcpu as bool;
///     4:4     halted as bool;
/// });
///
/// // Start the falcon at `base`.
/// NV_PFALCON_FALCON_CPUCTL::alter(bar, &base, |r| r.set_startcpu(true));
/// ```
///
/// ## Arrays of registers
///
/// Registers repeated at a fixed stride (e.g. one control register per memory port) are defined
/// as `Base[Offset[Size ; Stride]]`. Their accessors take an extra index, checked at runtime:
///
/// ```ignore
/// register!(NV_PFALCON_FALCON_DMEMD @ PFalconBase[0x000001c4[8 ; 8]] {
///     31:0    data as u32;
/// });
///
/// let word = NV_PFALCON_FALCON_DMEMD::try_read(bar, &base, port)?.data();
/// ```
macro_rules! register {
    // Creates a register at a relative offset from a base address provider.
    ($name:ident @ $base:ty [ $offset:literal ] $(, $comment:literal)? { $($fields:tt)* }) => {
        bitfield!(struct $name $(, $comment)? { $($fields)* });
        register!(@io_relative $name @ $base [ $offset ]);
    };

    // Creates an array of registers at a relative offset from a base address provider.
    (
        $name:ident @ $base:ty [ $offset:literal [ $size:expr ; $stride:expr ] ]
            $(, $comment:literal)? { $($fields:tt)* }
    ) => {
        bitfield!(struct $name $(, $comment)? { $($fields)* });
        register!(@io_relative_array $name @ $base [ $offset [ $size ; $stride ] ]);
    };

    // Generates the IO accessors for a relative offset register.
    (@io_relative $name:ident @ $base:ty [ $offset:expr ]) => {
        #[allow(dead_code)]
        impl $name {
            pub(crate) const OFFSET: usize = $offset;

            /// Read the register from `bar`, using the base address provided by `base` and adding
            /// the register's offset to it.
            #[inline(always)]
            pub(crate) fn read<B>(bar: &$crate::io::Bar0, base: &B) -> Self
            where
                B: $crate::regs::macros::RegisterBase<$base>,
            {
                Self(bar.read32(base.base() + Self::OFFSET))
            }

            /// Write the value contained in `self` to `bar`, using the base address provided by
            /// `base` and adding the register's offset to it.
            #[inline(always)]
            pub(crate) fn write<B>(self, bar: &$crate::io::Bar0, base: &B)
            where
                B: $crate::regs::macros::RegisterBase<$base>,
            {
                bar.write32(self.0, base.base() + Self::OFFSET)
            }

            /// Read the register and run `f` on its value to obtain a new value to write back.
            #[inline(always)]
            pub(crate) fn alter<B, F>(bar: &$crate::io::Bar0, base: &B, f: F)
            where
                B: $crate::regs::macros::RegisterBase<$base>,
                F: ::core::ops::FnOnce(Self) -> Self,
            {
                let reg = f(Self::read(bar, base));
                reg.write(bar, base);
            }
        }
    };

    // Generates the IO accessors for an array of relative registers.
    (@io_relative_array $name:ident @ $base:ty [ $offset:literal [ $size:expr ; $stride:expr ] ]) => {
        #[allow(dead_code)]
        impl $name {
            pub(crate) const OFFSET: usize = $offset;
            pub(crate) const SIZE: usize = $size;
            pub(crate) const STRIDE: usize = $stride;

            #[inline(always)]
            fn offset_of(idx: usize) -> $crate::error::Result<usize> {
                if idx < Self::SIZE {
                    Ok(Self::OFFSET + idx * Self::STRIDE)
                } else {
                    Err($crate::error::Error::InvalidArgument)
                }
            }

            /// Read the array register at index `idx`, relative to the base provided by `base`.
            ///
            /// Fails if `idx` is out of bounds.
            #[inline(always)]
            pub(crate) fn try_read<B>(
                bar: &$crate::io::Bar0,
                base: &B,
                idx: usize,
            ) -> $crate::error::Result<Self>
            where
                B: $crate::regs::macros::RegisterBase<$base>,
            {
                Self::offset_of(idx).map(|offset| Self(bar.read32(base.base() + offset)))
            }

            /// Write the value contained in `self` to the array register at index `idx`.
            ///
            /// Fails if `idx` is out of bounds.
            #[inline(always)]
            pub(crate) fn try_write<B>(
                self,
                bar: &$crate::io::Bar0,
                base: &B,
                idx: usize,
            ) -> $crate::error::Result
            where
                B: $crate::regs::macros::RegisterBase<$base>,
            {
                Self::offset_of(idx).map(|offset| bar.write32(self.0, base.base() + offset))
            }
        }
    };
}
