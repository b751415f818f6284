// SPDX-License-Identifier: GPL-2.0

//! Bitfield support for register types.
//!
//! Used by the [`register!`] macro to give each register a dedicated type with typed field
//! accessors.

/// Defines a struct with accessors to access bits within an inner `u32`.
///
/// # Syntax
///
/// ```ignore
/// bitfield! {
///     struct ControlReg, "Optional documentation" {
///         7:7 state as bool, "Optional field documentation";
///         3:0 mode as u8;
///     }
/// }
/// ```
///
/// This generates a struct with:
/// - Field accessors: `mode()`, `state()`.
/// - Field setters: `set_mode()`, `set_state()`, chainable in a builder fashion.
/// - `Debug` and `Default` implementations, and conversions from and into `u32`.
///
/// `as <type>` returns the field value casted to `<type>` (`bool`, `u8`, `u16` or `u32`). `bool`
/// fields must have a range of 1 bit. Setters silently drop the bits of `value` that do not fit
/// in the field.
macro_rules! bitfield {
    (
        struct $name:ident $(, $comment:literal)? {
            $( $hi:literal : $lo:literal $field:ident as $type:tt $(, $field_comment:literal)? ; )*
        }
    ) => {
        $(
        #[doc = $comment]
        )?
        #[repr(transparent)]
        #[derive(Clone, Copy, Default, PartialEq, Eq)]
        pub(crate) struct $name(pub(crate) u32);

        impl ::core::convert::From<$name> for u32 {
            fn from(val: $name) -> u32 {
                val.0
            }
        }

        impl ::core::convert::From<u32> for $name {
            fn from(val: u32) -> Self {
                Self(val)
            }
        }

        #[allow(dead_code)]
        impl $name {
            $(
            bitfield!(@field $hi:$lo $field as $type $(, $field_comment)?);
            )*
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_struct(::core::stringify!($name))
                    .field("<raw>", &::core::format_args!("{:#x}", self.0))
                    $( .field(::core::stringify!($field), &self.$field()) )*
                    .finish()
            }
        }
    };

    // Single-bit field exposed as `bool`.
    (@field $hi:literal : $lo:literal $field:ident as bool $(, $comment:literal)?) => {
        $(
        #[doc = $comment]
        )?
        #[inline(always)]
        pub(crate) fn $field(self) -> bool {
            self.0 & bitfield!(@mask $hi, $lo) != 0
        }

        ::paste::paste! {
            $(
            #[doc = $comment]
            )?
            #[inline(always)]
            pub(crate) fn [<set_ $field>](mut self, value: bool) -> Self {
                let mask = bitfield!(@mask $hi, $lo);
                self.0 = if value { self.0 | mask } else { self.0 & !mask };
                self
            }
        }
    };

    // Multi-bit field exposed as an unsigned integer.
    (@field $hi:literal : $lo:literal $field:ident as $type:tt $(, $comment:literal)?) => {
        $(
        #[doc = $comment]
        )?
        #[inline(always)]
        pub(crate) fn $field(self) -> $type {
            ((self.0 & bitfield!(@mask $hi, $lo)) >> $lo) as $type
        }

        ::paste::paste! {
            $(
            #[doc = $comment]
            )?
            #[inline(always)]
            pub(crate) fn [<set_ $field>](mut self, value: $type) -> Self {
                let mask = bitfield!(@mask $hi, $lo);
                self.0 = (self.0 & !mask) | ((u32::from(value) << $lo) & mask);
                self
            }
        }
    };

    (@mask $hi:literal, $lo:literal) => {
        ((((1u64 << ($hi - $lo + 1)) - 1) << $lo) as u32)
    };
}
