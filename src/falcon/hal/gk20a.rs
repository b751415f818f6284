// SPDX-License-Identifier: GPL-2.0

use core::time::Duration;

use log::warn;

use crate::{
    error::{Error, Result},
    falcon::{BootLoadParams, FalconBase, FalconCtls, FalconMem},
    io::{self, Bar0},
    poll::read_poll_timeout,
    regs,
    util,
};

use super::FalconHal;

/// Number of 32-bit words in an `IMEM` block.
const IMEM_BLOCK_WORDS: u32 = 64;

/// Address bits of the `DMEMC` register (block and word offset).
const DMEMC_ADDR_MASK: u32 = 0x00ff_fffc;

/// Value of the `size` field of `DMATRFCMD` for 256 bytes transfers.
const DMA_TRF_SIZE_256B: u8 = 0x6;

/// Value of `ARB_CTX_CMD` requesting the arbiter to load a new instance block.
const ARB_CTX_CMD_BIND: u8 = 0x7;

// TIMEOUT: arbitrarily large value, no DMA transfer to the falcon's small memories or arbiter
// command should ever take that long.
const DMA_POLL_INTERVAL: Duration = Duration::from_micros(10);
const DMA_TIMEOUT: Duration = Duration::from_secs(2);

/// Register based HAL of the falcons found since the GK20A generation.
pub(super) struct Gk20a {
    base: FalconBase,
}

impl Gk20a {
    pub(super) fn new(base: FalconBase) -> Self {
        Self { base }
    }

    /// Fails with [`Error::NotReady`] if `raw` is the value returned by a dead register.
    fn check_badf(&self, raw: u32) -> Result<u32> {
        if io::is_badf(raw) {
            warn!("falcon at {:#x}: register read returned {:#010x}", self.base.0, raw);
            Err(Error::NotReady)
        } else {
            Ok(raw)
        }
    }
}

/// Packs up to 4 bytes into a little-endian word, zero-filling the missing bytes.
fn pack_word(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word[..bytes.len()].copy_from_slice(bytes);
    u32::from_le_bytes(word)
}

impl FalconHal for Gk20a {
    fn mem_size(&self, bar: &Bar0, mem: FalconMem) -> u32 {
        let hwcfg = regs::NV_PFALCON_FALCON_HWCFG::read(bar, &self.base);

        let blocks = match mem {
            FalconMem::Imem => hwcfg.imem_size(),
            FalconMem::Dmem => hwcfg.dmem_size(),
            FalconMem::Emem => 0,
        };

        u32::from(blocks) << 8
    }

    fn ports_count(&self, bar: &Bar0, mem: FalconMem) -> u8 {
        let hwcfg1 = regs::NV_PFALCON_FALCON_HWCFG1::read(bar, &self.base);

        match mem {
            FalconMem::Imem => hwcfg1.imem_ports(),
            FalconMem::Dmem => hwcfg1.dmem_ports(),
            FalconMem::Emem => 0,
        }
    }

    fn reset(&self, bar: &Bar0) -> Result {
        regs::NV_PFALCON_FALCON_CPUCTL::alter(bar, &self.base, |r| r.set_hreset(true));

        Ok(())
    }

    fn is_idle(&self, bar: &Bar0) -> Result<bool> {
        let raw = self.check_badf(regs::NV_PFALCON_FALCON_IDLESTATE::read(bar, &self.base).0)?;
        let idle = regs::NV_PFALCON_FALCON_IDLESTATE::from(raw);

        Ok(!idle.falcon_busy() && idle.ext_busy() == 0)
    }

    fn is_cpu_halted(&self, bar: &Bar0) -> Result<bool> {
        let raw = self.check_badf(regs::NV_PFALCON_FALCON_CPUCTL::read(bar, &self.base).0)?;

        Ok(regs::NV_PFALCON_FALCON_CPUCTL::from(raw).halted())
    }

    fn is_scrubbing_done(&self, bar: &Bar0) -> Result<bool> {
        let raw = self.check_badf(regs::NV_PFALCON_FALCON_DMACTL::read(bar, &self.base).0)?;

        Ok(regs::NV_PFALCON_FALCON_DMACTL::from(raw).mem_scrubbing_done())
    }

    fn clear_halt_interrupt_status(&self, bar: &Bar0) -> Result<bool> {
        regs::NV_PFALCON_FALCON_IRQSCLR::default()
            .set_halt(true)
            .write(bar, &self.base);

        let raw = self.check_badf(regs::NV_PFALCON_FALCON_IRQSTAT::read(bar, &self.base).0)?;

        Ok(!regs::NV_PFALCON_FALCON_IRQSTAT::from(raw).halt())
    }

    fn set_irq(&self, bar: &Bar0, enable: bool, mask: u32, dest: u32) {
        if enable {
            regs::NV_PFALCON_FALCON_IRQMSET::default()
                .set_value(mask)
                .write(bar, &self.base);
            regs::NV_PFALCON_FALCON_IRQDEST::default()
                .set_value(dest)
                .write(bar, &self.base);
        } else {
            regs::NV_PFALCON_FALCON_IRQMCLR::default()
                .set_value(0xffff_ffff)
                .write(bar, &self.base);
        }
    }

    fn mailbox_read(&self, bar: &Bar0, index: usize) -> u32 {
        match index {
            0 => regs::NV_PFALCON_FALCON_MAILBOX0::read(bar, &self.base).value(),
            _ => regs::NV_PFALCON_FALCON_MAILBOX1::read(bar, &self.base).value(),
        }
    }

    fn mailbox_write(&self, bar: &Bar0, index: usize, value: u32) {
        match index {
            0 => regs::NV_PFALCON_FALCON_MAILBOX0::default()
                .set_value(value)
                .write(bar, &self.base),
            _ => regs::NV_PFALCON_FALCON_MAILBOX1::default()
                .set_value(value)
                .write(bar, &self.base),
        }
    }

    fn copy_to_dmem(&self, bar: &Bar0, dst: u32, src: &[u8], port: u8) -> Result {
        let port = usize::from(port);
        let dst = dst & DMEMC_ADDR_MASK;
        let size = u32::try_from(src.len()).map_err(|_| Error::InvalidArgument)?;

        regs::NV_PFALCON_FALCON_DMEMC::from(dst)
            .set_aincw(true)
            .try_write(bar, &self.base, port)?;

        for word in src.chunks(4) {
            regs::NV_PFALCON_FALCON_DMEMD::default()
                .set_data(pack_word(word))
                .try_write(bar, &self.base, port)?;
        }

        // The port auto-increments on each write, so it must now point right after the data.
        let expected = util::align_up(size, 4)
            .map(|size| dst.wrapping_add(size) & DMEMC_ADDR_MASK)
            .ok_or(Error::InvalidArgument)?;
        let written = regs::NV_PFALCON_FALCON_DMEMC::try_read(bar, &self.base, port)?.address();
        if written != expected {
            warn!(
                "falcon at {:#x}: DMEM copy failed, port at {:#x}, expected {:#x}",
                self.base.0, written, expected
            );
            return Err(Error::Io);
        }

        Ok(())
    }

    fn copy_from_dmem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result {
        let port = usize::from(port);

        regs::NV_PFALCON_FALCON_DMEMC::from(src & DMEMC_ADDR_MASK)
            .set_aincr(true)
            .try_write(bar, &self.base, port)?;

        for chunk in dst.chunks_mut(4) {
            let word = regs::NV_PFALCON_FALCON_DMEMD::try_read(bar, &self.base, port)?.data();
            chunk.copy_from_slice(&word.to_le_bytes()[..chunk.len()]);
        }

        Ok(())
    }

    fn copy_to_imem(
        &self,
        bar: &Bar0,
        dst: u32,
        src: &[u8],
        port: u8,
        sec: bool,
        tag: u32,
    ) -> Result {
        let port = usize::from(port);

        regs::NV_PFALCON_FALCON_IMEMC::default()
            .set_offs(((dst >> 2) & 0x3f) as u8)
            .set_blk((dst >> 8) as u16)
            .set_aincw(true)
            .set_secure(sec)
            .try_write(bar, &self.base, port)?;

        let mut tag = tag;
        let mut word_addr = dst >> 2;

        for (i, word) in src.chunks(4).enumerate() {
            // Each block entered gets the next virtual tag.
            if i == 0 || word_addr % IMEM_BLOCK_WORDS == 0 {
                regs::NV_PFALCON_FALCON_IMEMT::default()
                    .set_tag(tag as u16)
                    .try_write(bar, &self.base, port)?;
                tag = tag.wrapping_add(1);
            }

            regs::NV_PFALCON_FALCON_IMEMD::default()
                .set_data(pack_word(word))
                .try_write(bar, &self.base, port)?;
            word_addr += 1;
        }

        // Zero the rest of the last block.
        while word_addr % IMEM_BLOCK_WORDS != 0 {
            regs::NV_PFALCON_FALCON_IMEMD::default().try_write(bar, &self.base, port)?;
            word_addr += 1;
        }

        Ok(())
    }

    fn copy_from_imem(&self, bar: &Bar0, src: u32, dst: &mut [u8], port: u8) -> Result {
        let port = usize::from(port);

        regs::NV_PFALCON_FALCON_IMEMC::default()
            .set_offs(((src >> 2) & 0x3f) as u8)
            .set_blk((src >> 8) as u16)
            .set_aincr(true)
            .try_write(bar, &self.base, port)?;

        for chunk in dst.chunks_mut(4) {
            let word = regs::NV_PFALCON_FALCON_IMEMD::try_read(bar, &self.base, port)?.data();
            chunk.copy_from_slice(&word.to_le_bytes()[..chunk.len()]);
        }

        Ok(())
    }

    fn bootstrap(&self, bar: &Bar0, boot_vector: u32) -> Result {
        regs::NV_PFALCON_FALCON_DMACTL::default()
            .set_require_ctx(false)
            .write(bar, &self.base);
        regs::NV_PFALCON_FALCON_BOOTVEC::default()
            .set_value(boot_vector)
            .write(bar, &self.base);

        self.start_cpu(bar)
    }

    fn start_cpu(&self, bar: &Bar0) -> Result {
        match regs::NV_PFALCON_FALCON_CPUCTL::read(bar, &self.base).alias_en() {
            true => regs::NV_PFALCON_FALCON_CPUCTL_ALIAS::default()
                .set_startcpu(true)
                .write(bar, &self.base),
            false => regs::NV_PFALCON_FALCON_CPUCTL::default()
                .set_startcpu(true)
                .write(bar, &self.base),
        }

        Ok(())
    }

    fn load_boot(&self, bar: &Bar0, params: &BootLoadParams) -> Result {
        regs::NV_PFALCON_FALCON_DMACTL::default()
            .set_require_ctx(false)
            .write(bar, &self.base);

        // The transfer offsets are relative to the base and start at `dst`, so move the base
        // back by as much.
        let base = params
            .addr_load32
            .checked_sub(params.dst >> 8)
            .ok_or(Error::InvalidArgument)?;
        regs::NV_PFALCON_FALCON_DMATRFBASE::default()
            .set_base(base)
            .write(bar, &self.base);

        let cmd = regs::NV_PFALCON_FALCON_DMATRFCMD::default()
            .set_imem(true)
            .set_size(DMA_TRF_SIZE_256B)
            .set_ctxdma(0);

        for block in 0..params.blocks {
            let offs = block
                .checked_mul(256)
                .and_then(|pos| params.dst.checked_add(pos))
                .ok_or(Error::InvalidArgument)?;

            regs::NV_PFALCON_FALCON_DMATRFMOFFS::default()
                .set_offs(offs)
                .write(bar, &self.base);
            regs::NV_PFALCON_FALCON_DMATRFFBOFFS::default()
                .set_offs(offs)
                .write(bar, &self.base);
            cmd.write(bar, &self.base);

            read_poll_timeout(
                || Ok(regs::NV_PFALCON_FALCON_DMATRFCMD::read(bar, &self.base)),
                |r| r.idle(),
                DMA_POLL_INTERVAL,
                DMA_TIMEOUT,
            )?;
        }

        regs::NV_PFALCON_FALCON_BOOTVEC::default()
            .set_value(params.entry)
            .write(bar, &self.base);

        Ok(())
    }

    fn bind_instblk(&self, bar: &Bar0, inst_block_addr: u64) -> Result {
        if inst_block_addr & 0xfff != 0 {
            return Err(Error::InvalidArgument);
        }

        let ptr = u32::try_from(inst_block_addr >> 12)
            .ok()
            .filter(|ptr| *ptr <= 0x0fff_ffff)
            .ok_or(Error::InvalidArgument)?;

        regs::NV_PGRAPH_FECS_ARB_CTX_ADR::default().write(bar, &self.base);
        regs::NV_PGRAPH_FECS_NEW_CTX::default()
            .set_ptr(ptr)
            .set_target(0)
            .set_valid(true)
            .write(bar, &self.base);
        regs::NV_PGRAPH_FECS_ARB_CTX_PTR::default()
            .set_ptr(ptr)
            .set_target(0)
            .write(bar, &self.base);
        regs::NV_PGRAPH_FECS_ARB_CTX_CMD::default()
            .set_cmd(ARB_CTX_CMD_BIND)
            .write(bar, &self.base);

        read_poll_timeout(
            || Ok(regs::NV_PGRAPH_FECS_ARB_CTX_CMD::read(bar, &self.base)),
            |r| r.cmd() == 0,
            DMA_POLL_INTERVAL,
            DMA_TIMEOUT,
        )
        .map(|_| ())
    }

    fn ctls(&self, bar: &Bar0) -> FalconCtls {
        FalconCtls {
            sctl: regs::NV_PFALCON_FALCON_SCTL::read(bar, &self.base).value(),
            cpuctl: regs::NV_PFALCON_FALCON_CPUCTL::read(bar, &self.base).0,
        }
    }
}
