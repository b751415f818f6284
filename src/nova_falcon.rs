// SPDX-License-Identifier: GPL-2.0

//! Falcon microcontroller control and graphics context-switch firmware bootstrap.
//!
//! The crate is organised bottom-up:
//!
//! - [`falcon`]: the generic falcon engine abstraction (memory ports, reset, polling, mailboxes)
//!   and its per-generation hardware abstraction layer.
//! - [`gpu`]: the device context owning every falcon instance of a chip.
//! - [`ctxsw`]: the FECS/GPCCS ucode loader that brings the graphics context-switch firmware up,
//!   either directly, through the DMA bootloader, or through a security delegate.

#[macro_use]
mod bitfield;
mod regs;
mod sync;
mod util;

pub mod ctxsw;
pub mod dma;
pub mod error;
pub mod falcon;
pub mod firmware;
pub mod gpu;
pub mod io;
pub mod poll;

pub use error::{Error, Result};
