// SPDX-License-Identifier: GPL-2.0

//! Bring-up of the graphics context switch firmware.
//!
//! The context switch firmware runs on two cooperating falcons, FECS and GPCCS. It can be
//! brought up in three ways:
//!
//! - Legacy: the host writes the firmware directly into `IMEM` and `DMEM` of both falcons and
//!   starts them.
//! - Bootloader: the firmware is laid out in a GPU-visible surface (see [`ucode`]), and each
//!   falcon is given a small bootloader which DMAs its code and data from there.
//! - Secure: the falcons run light-secure firmware and a security unit loads them (see
//!   [`secure`]). GPCCS may still go through the bootloader.

use core::time::Duration;

use log::{debug, error, info};

use crate::dma::{DmaObject, InstBlock, Vm};
use crate::error::{Error, Result};
use crate::falcon::{BootLoadParams, Falcon, FalconId, FalconIdMask};
use crate::firmware::{
    CtxswFirmware, CtxswNetlist, FirmwareLoader, FECS_UCODE_IMAGE, GPCCS_UCODE_IMAGE,
};
use crate::gpu::Gpu;
use crate::io::Bar0;
use crate::poll::read_poll_timeout;
use crate::util::{align_up, lo32, words_to_bytes};

pub mod secure;
pub mod ucode;

pub use secure::{
    boot_phase, delegate_request, gpccs_load_mode, BootPhase, GpccsLoad, LsfBootstrap,
    SecureDelegate,
};
pub use ucode::{SegmentBuilder, UcodeSegment, UcodeSegments};

/// Value written by FECS to its mailbox 0 once the firmware is up.
const CTXSW_STATUS_PASS: u32 = 1;
/// Value written by FECS to its mailbox 0 if the firmware failed to initialize.
const CTXSW_STATUS_FAIL: u32 = 2;

// TIMEOUT: the firmware is expected to report its status within 2 seconds.
const CTXSW_READY_POLL_INTERVAL: Duration = Duration::from_micros(10);
const CTXSW_READY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Configuration of the context switch firmware bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Load the firmware through the DMA bootloader instead of writing the falcon memories
    /// directly.
    pub use_bootloader: bool,
    /// The falcons run light-secure firmware, bootstrapped by [`BootConfig::delegate`].
    pub priv_security: bool,
    /// GPCCS is bootstrapped by the security unit too, rather than by the host bootloader.
    pub secure_gpccs: bool,
    /// Security unit the bootstrap is delegated to.
    pub delegate: SecureDelegate,
    /// Falcons the ACR left for lazy bootstrap.
    pub lazy_bootstrap: FalconIdMask,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            use_bootloader: true,
            priv_security: false,
            secure_gpccs: false,
            delegate: SecureDelegate::default(),
            lazy_bootstrap: FalconIdMask::empty(),
        }
    }
}

/// Progress of a bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Idle,
    /// The surface layout has been computed.
    SegmentsBuilt,
    /// The firmware has been written, to the surface or to the falcon memories.
    ImageCopied,
    /// The instance block is bound to FECS.
    InstanceBound,
    /// The bootloader header has been written to `DMEM`.
    HeaderLoaded,
    /// The bootloader has been loaded into `IMEM`.
    BootLoaded,
    /// Both falcons have been started.
    Running,
    /// A step failed. The next bring-up starts over.
    Failed,
}

/// Surface holding the firmware of both falcons, kept across bring-ups.
pub struct CtxswUcodeInfo {
    pub surface: DmaObject,
    /// GPU virtual address the surface is mapped at.
    pub gpu_va: u64,
    pub fecs: UcodeSegments,
    pub gpccs: UcodeSegments,
}

/// External resources used by a bring-up.
pub struct CtxswResources<'a> {
    pub bar: &'a Bar0,
    pub gpu: &'a Gpu,
    pub firmware: &'a dyn FirmwareLoader,
    pub netlist: &'a CtxswNetlist,
    pub vm: &'a dyn Vm,
    /// Security unit selected by [`BootConfig::delegate`], required for secure bring-ups.
    pub delegate: Option<&'a dyn LsfBootstrap>,
}

impl CtxswResources<'_> {
    fn fecs(&self) -> &Falcon {
        self.gpu.falcon(FalconId::Fecs)
    }

    fn gpccs(&self) -> &Falcon {
        self.gpu.falcon(FalconId::Gpccs)
    }
}

/// Logs the failure of `step` on falcon `id`.
fn step<T>(id: FalconId, step: &str, res: Result<T>) -> Result<T> {
    res.map_err(|e| {
        error!("falcon {}: {} failed: {}", id, step, e);
        e
    })
}

fn words_size(words: &[u32]) -> Result<u32> {
    u32::try_from(words.len())
        .ok()
        .and_then(|n| n.checked_mul(4))
        .ok_or(Error::InvalidArgument)
}

/// Returns the address at `offset` from `base`, in units of 256 bytes.
fn addr_256(base: u64, offset: u32) -> Result<u32> {
    base.checked_add(u64::from(offset))
        .map(|addr| lo32(addr >> 8))
        .ok_or(Error::InvalidArgument)
}

/// State of the context switch falcons of one GPU.
pub struct GrFalcon {
    config: BootConfig,
    state: BootState,
    ucode_info: Option<CtxswUcodeInfo>,
    inst_block: Option<InstBlock>,
    fecs_bootstrap_done: bool,
}

impl GrFalcon {
    pub fn new(config: BootConfig) -> Self {
        Self {
            config,
            state: BootState::Idle,
            ucode_info: None,
            inst_block: None,
            fecs_bootstrap_done: false,
        }
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Whether the surface is already built, in which case the next bring-up reuses it.
    pub fn skip_ucode_init(&self) -> bool {
        self.ucode_info.is_some()
    }

    /// Whether the first secure bring-up has happened, making the next ones recoveries.
    pub fn fecs_bootstrap_done(&self) -> bool {
        self.fecs_bootstrap_done
    }

    pub fn ucode_info(&self) -> Option<&CtxswUcodeInfo> {
        self.ucode_info.as_ref()
    }

    /// Brings up the context switch firmware and waits for it to report ready.
    pub fn init_ctxsw(&mut self, res: &CtxswResources<'_>) -> Result {
        let ret = self
            .load_ctxsw_ucode(res)
            .and_then(|()| self.wait_ctxsw_ready(res));

        match ret {
            Ok(()) => debug!("ctxsw firmware ready"),
            Err(e) => {
                self.state = BootState::Failed;
                error!("ctxsw init failed: {}", e);
            }
        }

        ret
    }

    /// Loads the context switch firmware on FECS and GPCCS, and starts both falcons.
    ///
    /// On success the state is [`BootState::Running`]. On failure it is [`BootState::Failed`]
    /// and the error of the failing step is returned.
    pub fn load_ctxsw_ucode(&mut self, res: &CtxswResources<'_>) -> Result {
        self.state = BootState::Idle;

        let ret = if self.config.priv_security {
            self.load_secure(res)
        } else if self.config.use_bootloader {
            self.load_with_bootloader(res)
        } else {
            self.load_legacy(res)
        };

        self.state = match ret {
            Ok(()) => BootState::Running,
            Err(_) => BootState::Failed,
        };

        ret
    }

    /// Writes the firmware directly into the falcon memories.
    fn load_legacy(&mut self, res: &CtxswResources<'_>) -> Result {
        let images = [
            (res.gpccs(), &res.netlist.gpccs),
            (res.fecs(), &res.netlist.fecs),
        ];

        for (falcon, image) in images {
            if !image.data.is_empty() {
                step(
                    falcon.id(),
                    "DMEM load",
                    falcon.copy_to_dmem(res.bar, 0, &words_to_bytes(&image.data), 0),
                )?;
            }
        }

        for (falcon, image) in images {
            if !image.inst.is_empty() {
                step(
                    falcon.id(),
                    "IMEM load",
                    falcon.copy_to_imem(res.bar, 0, &words_to_bytes(&image.inst), 0, false, 0),
                )?;
            }
        }
        self.state = BootState::ImageCopied;

        self.start(res)
    }

    /// Loads both falcons through the bootloader.
    fn load_with_bootloader(&mut self, res: &CtxswResources<'_>) -> Result {
        if !self.skip_ucode_init() {
            self.init_ctxsw_ucode(res)?;
        }

        self.bind_instblk(res)?;
        self.load_segments(res, FalconId::Fecs)?;
        self.load_segments(res, FalconId::Gpccs)?;

        self.start(res)
    }

    /// Brings the falcons up through the security unit.
    fn load_secure(&mut self, res: &CtxswResources<'_>) -> Result {
        let phase = boot_phase(self.fecs_bootstrap_done);
        let gpccs = gpccs_load_mode(self.config.secure_gpccs);

        if phase == BootPhase::ColdBoot {
            self.fecs_bootstrap_done = true;
        }

        match gpccs {
            GpccsLoad::Bootloader => {
                if !self.skip_ucode_init() {
                    self.init_ctxsw_ucode(res)?;
                }
                self.bind_instblk(res)?;
                self.load_segments(res, FalconId::Gpccs)?;
            }
            // Bind the WPR VA instance block.
            GpccsLoad::Secure => self.bind_instblk(res)?,
        }

        let mask = delegate_request(phase, gpccs, self.config.delegate, self.config.lazy_bootstrap);
        if let Some(mask) = mask {
            let delegate = res.delegate.ok_or_else(|| {
                error!("no {:?} to bootstrap falcons {:?}", self.config.delegate, mask);
                Error::Unsupported
            })?;

            debug!("{:?} bootstrapping falcons {:?}", self.config.delegate, mask);
            delegate.bootstrap_ls_falcons(mask).map_err(|e| {
                match phase {
                    BootPhase::ColdBoot => error!("unable to boot GPCCS: {}", e),
                    BootPhase::Recovery => error!("unable to recover GR falcon: {}", e),
                }
                e
            })?;
        }

        self.start(res)
    }

    /// Builds the firmware surface and maps it.
    fn init_ctxsw_ucode(&mut self, res: &CtxswResources<'_>) -> Result {
        let fecs_fw = CtxswFirmware::request(res.firmware, FECS_UCODE_IMAGE)?;
        let gpccs_fw = CtxswFirmware::request(res.firmware, GPCCS_UCODE_IMAGE)?;
        let netlist = res.netlist;

        let mut builder = SegmentBuilder::new();
        let mut fecs = step(
            FalconId::Fecs,
            "segment layout",
            builder.add(
                &fecs_fw.desc,
                words_size(&netlist.fecs.inst)?,
                words_size(&netlist.fecs.data)?,
            ),
        )?;
        let mut gpccs = step(
            FalconId::Gpccs,
            "segment layout",
            builder.add(
                &gpccs_fw.desc,
                words_size(&netlist.gpccs.inst)?,
                words_size(&netlist.gpccs.data)?,
            ),
        )?;
        self.state = BootState::SegmentsBuilt;

        let mut surface = DmaObject::new(builder.total_size() as usize).map_err(|e| {
            error!(
                "failed to allocate the {:#x} byte ctxsw ucode surface: {}",
                builder.total_size(),
                e
            );
            e
        })?;
        step(
            FalconId::Fecs,
            "ucode copy",
            ucode::write_segments(
                &mut surface,
                &mut fecs,
                &fecs_fw.bootloader,
                &netlist.fecs.inst,
                &netlist.fecs.data,
            ),
        )?;
        step(
            FalconId::Gpccs,
            "ucode copy",
            ucode::write_segments(
                &mut surface,
                &mut gpccs,
                &gpccs_fw.bootloader,
                &netlist.gpccs.inst,
                &netlist.gpccs.data,
            ),
        )?;
        self.state = BootState::ImageCopied;

        step(FalconId::Fecs, "instance block allocation", self.alloc_inst_block(res.vm))?;

        let gpu_va = res.vm.map_read_only(&surface).map_err(|e| {
            error!("failed to map the ctxsw ucode surface: {}", e);
            e
        })?;

        info!(
            "ctxsw ucode surface of {:#x} bytes at {:#x}, FECS signature {:#010x}, GPCCS signature {:#010x}",
            surface.size(),
            gpu_va,
            fecs.boot_signature,
            gpccs.boot_signature
        );

        self.ucode_info = Some(CtxswUcodeInfo {
            surface,
            gpu_va,
            fecs,
            gpccs,
        });

        Ok(())
    }

    fn alloc_inst_block(&mut self, vm: &dyn Vm) -> Result<InstBlock> {
        if let Some(inst_block) = self.inst_block {
            return Ok(inst_block);
        }

        let inst_block = vm.alloc_inst_block()?;
        self.inst_block = Some(inst_block);

        Ok(inst_block)
    }

    /// Binds the instance block of the firmware address space to FECS.
    fn bind_instblk(&mut self, res: &CtxswResources<'_>) -> Result {
        let inst_block = step(
            FalconId::Fecs,
            "instance block allocation",
            self.alloc_inst_block(res.vm),
        )?;

        step(
            FalconId::Fecs,
            "instance block bind",
            res.fecs().bind_instblk(res.bar, inst_block.addr),
        )?;
        self.state = BootState::InstanceBound;

        Ok(())
    }

    /// Writes the bootloader header into `DMEM` of falcon `id` and loads the bootloader.
    fn load_segments(&mut self, res: &CtxswResources<'_>, id: FalconId) -> Result {
        let info = self.ucode_info.as_ref().ok_or(Error::NotReady)?;
        let gpu_va = info.gpu_va;
        let segments = match id {
            FalconId::Fecs => info.fecs,
            _ => info.gpccs,
        };
        let falcon = res.gpu.falcon(id);

        let header = [
            0,
            0,
            0,
            0,
            segments.boot_signature,
            addr_256(gpu_va, segments.code.offset)?,
            segments.code.size,
            addr_256(gpu_va, segments.data.offset)?,
            segments.data.size,
        ];
        step(
            id,
            "bootloader header load",
            falcon.copy_to_dmem(res.bar, 0, &words_to_bytes(&header), 0),
        )?;
        self.state = BootState::HeaderLoaded;

        let params = BootLoadParams {
            entry: segments.boot_entry,
            addr_load32: addr_256(gpu_va, segments.boot.offset)?,
            blocks: align_up(segments.boot.size, 256).ok_or(Error::InvalidArgument)? >> 8,
            dst: segments.boot_imem_offset,
        };
        step(id, "bootloader load", falcon.load_boot(res.bar, &params))?;
        self.state = BootState::BootLoaded;

        Ok(())
    }

    /// Starts GPCCS, then FECS.
    fn start(&mut self, res: &CtxswResources<'_>) -> Result {
        let gpccs = res.gpccs();
        step(gpccs.id(), "start", gpccs.start(res.bar))?;

        let fecs = res.fecs();
        step(fecs.id(), "mailbox init", fecs.mailbox_write(res.bar, 0, 0))?;
        step(fecs.id(), "mailbox init", fecs.mailbox_write(res.bar, 1, 1))?;
        step(fecs.id(), "start", fecs.start(res.bar))?;

        Ok(())
    }

    /// Waits for FECS to report the status of the firmware initialization in its mailbox 0.
    pub fn wait_ctxsw_ready(&self, res: &CtxswResources<'_>) -> Result {
        let fecs = res.fecs();

        let status = read_poll_timeout(
            || fecs.mailbox_read(res.bar, 0),
            |status| *status == CTXSW_STATUS_PASS || *status == CTXSW_STATUS_FAIL,
            CTXSW_READY_POLL_INTERVAL,
            CTXSW_READY_TIMEOUT,
        )
        .map_err(|e| {
            error!("falcon {}: ctxsw firmware did not report its status: {}", fecs.id(), e);
            e
        })?;

        if status == CTXSW_STATUS_FAIL {
            error!("falcon {}: ctxsw firmware reported a failure", fecs.id());
            return Err(Error::NotReady);
        }

        Ok(())
    }

    /// Releases the firmware surface and the instance block.
    pub fn remove_support(&mut self, vm: &dyn Vm) {
        if let Some(info) = self.ucode_info.take() {
            vm.unmap(info.gpu_va, &info.surface);
        }

        if let Some(inst_block) = self.inst_block.take() {
            vm.free_inst_block(inst_block);
        }

        self.state = BootState::Idle;
    }
}
