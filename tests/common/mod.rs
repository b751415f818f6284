// SPDX-License-Identifier: GPL-2.0

//! Software models of the hardware and of the collaborators of the falcon layer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use spin::{Mutex, MutexGuard};

use nova_falcon::ctxsw::LsfBootstrap;
use nova_falcon::dma::{DmaObject, InstBlock, Vm};
use nova_falcon::falcon::{
    BootLoadParams, EmemAccess, EngineReset, FalconCtls, FalconFlags, FalconHal, FalconId,
    FalconIdMask, FalconMem,
};
use nova_falcon::firmware::FirmwareLoader;
use nova_falcon::gpu::{Chipset, Gpu};
use nova_falcon::io::{Bar0, Io};
use nova_falcon::{Error, Result};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Register window of a device with nothing behind it. The models below do not go through it.
pub struct NullBar;

impl Io for NullBar {
    fn read32(&self, _offset: usize) -> u32 {
        0
    }

    fn write32(&self, _value: u32, _offset: usize) {}
}

#[derive(Debug, Default)]
pub struct HalState {
    pub imem: Vec<u8>,
    pub dmem: Vec<u8>,
    pub imem_ports: u8,
    pub dmem_ports: u8,
    /// `(dst, tag, sec)` of every `IMEM` write.
    pub imem_writes: Vec<(u32, u32, bool)>,
    /// Destination of every `DMEM` write.
    pub dmem_writes: Vec<u32>,
    pub mailbox: [u32; 2],
    pub mailbox_writes: Vec<(usize, u32)>,
    pub starts: u32,
    pub bootstraps: Vec<u32>,
    pub load_boots: Vec<BootLoadParams>,
    pub bound: Vec<u64>,
    pub resets: u32,
    pub irq: Option<(bool, u32, u32)>,
    /// Number of predicate evaluations.
    pub polls: u32,
    /// Predicates report the hardware busy for this many evaluations.
    pub busy_polls: u32,
    /// Predicates fail with [`Error::NotReady`].
    pub poll_error: bool,
    /// Status the firmware reports in mailbox 0 once started.
    pub boot_status: Option<u32>,
}

/// Falcon HAL backed by plain memory.
#[derive(Clone)]
pub struct FakeHal {
    state: Arc<Mutex<HalState>>,
}

impl FakeHal {
    pub fn new(imem_size: usize, dmem_size: usize) -> Self {
        let state = HalState {
            imem: vec![0; imem_size],
            dmem: vec![0; dmem_size],
            imem_ports: 1,
            dmem_ports: 4,
            ..Default::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, HalState> {
        self.state.lock()
    }

    /// Number of copies that reached the memories.
    pub fn mem_writes(&self) -> usize {
        let state = self.state();
        state.imem_writes.len() + state.dmem_writes.len()
    }

    fn poll(&self) -> Result<bool> {
        let mut state = self.state();
        if state.poll_error {
            return Err(Error::NotReady);
        }

        state.polls += 1;
        Ok(state.polls > state.busy_polls)
    }
}

fn range(len: usize, offset: u32, size: usize) -> Result<core::ops::Range<usize>> {
    let start = offset as usize;
    let end = start + size;

    if end > len {
        return Err(Error::Io);
    }

    Ok(start..end)
}

impl FalconHal for FakeHal {
    fn mem_size(&self, _bar: &Bar0, mem: FalconMem) -> u32 {
        let state = self.state();
        match mem {
            FalconMem::Imem => state.imem.len() as u32,
            _ => state.dmem.len() as u32,
        }
    }

    fn ports_count(&self, _bar: &Bar0, mem: FalconMem) -> u8 {
        let state = self.state();
        match mem {
            FalconMem::Imem => state.imem_ports,
            _ => state.dmem_ports,
        }
    }

    fn reset(&self, _bar: &Bar0) -> Result {
        self.state().resets += 1;
        Ok(())
    }

    fn is_idle(&self, _bar: &Bar0) -> Result<bool> {
        self.poll()
    }

    fn is_cpu_halted(&self, _bar: &Bar0) -> Result<bool> {
        self.poll()
    }

    fn is_scrubbing_done(&self, _bar: &Bar0) -> Result<bool> {
        self.poll()
    }

    fn clear_halt_interrupt_status(&self, _bar: &Bar0) -> Result<bool> {
        self.poll()
    }

    fn set_irq(&self, _bar: &Bar0, enable: bool, mask: u32, dest: u32) {
        self.state().irq = Some((enable, mask, dest));
    }

    fn mailbox_read(&self, _bar: &Bar0, index: usize) -> u32 {
        self.state().mailbox[index]
    }

    fn mailbox_write(&self, _bar: &Bar0, index: usize, value: u32) {
        let mut state = self.state();
        state.mailbox[index] = value;
        state.mailbox_writes.push((index, value));
    }

    fn copy_to_dmem(&self, _bar: &Bar0, dst: u32, src: &[u8], _port: u8) -> Result {
        let mut state = self.state();
        let range = range(state.dmem.len(), dst, src.len())?;

        state.dmem[range].copy_from_slice(src);
        state.dmem_writes.push(dst);
        Ok(())
    }

    fn copy_from_dmem(&self, _bar: &Bar0, src: u32, dst: &mut [u8], _port: u8) -> Result {
        let state = self.state();
        let range = range(state.dmem.len(), src, dst.len())?;

        dst.copy_from_slice(&state.dmem[range]);
        Ok(())
    }

    fn copy_to_imem(
        &self,
        _bar: &Bar0,
        dst: u32,
        src: &[u8],
        _port: u8,
        sec: bool,
        tag: u32,
    ) -> Result {
        let mut state = self.state();
        let range = range(state.imem.len(), dst, src.len())?;

        state.imem[range].copy_from_slice(src);
        state.imem_writes.push((dst, tag, sec));
        Ok(())
    }

    fn copy_from_imem(&self, _bar: &Bar0, src: u32, dst: &mut [u8], _port: u8) -> Result {
        let state = self.state();
        let range = range(state.imem.len(), src, dst.len())?;

        dst.copy_from_slice(&state.imem[range]);
        Ok(())
    }

    fn bootstrap(&self, _bar: &Bar0, boot_vector: u32) -> Result {
        self.state().bootstraps.push(boot_vector);
        Ok(())
    }

    fn start_cpu(&self, _bar: &Bar0) -> Result {
        let mut state = self.state();

        state.starts += 1;
        if let Some(status) = state.boot_status {
            state.mailbox[0] = status;
        }
        Ok(())
    }

    fn load_boot(&self, _bar: &Bar0, params: &BootLoadParams) -> Result {
        self.state().load_boots.push(*params);
        Ok(())
    }

    fn bind_instblk(&self, _bar: &Bar0, inst_block_addr: u64) -> Result {
        self.state().bound.push(inst_block_addr);
        Ok(())
    }

    fn ctls(&self, _bar: &Bar0) -> FalconCtls {
        FalconCtls {
            sctl: 0x3000,
            cpuctl: 0x10,
        }
    }
}

/// Engine reset counting its invocations.
#[derive(Clone, Default)]
pub struct FakeEngineReset {
    pub count: Arc<Mutex<u32>>,
    pub fail: Option<Error>,
}

impl EngineReset for FakeEngineReset {
    fn reset_eng(&self, _bar: &Bar0) -> Result {
        *self.count.lock() += 1;
        match self.fail {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// External memory reached through its owning unit.
#[derive(Clone)]
pub struct FakeEmem {
    pub mem: Arc<Mutex<Vec<u8>>>,
}

impl FakeEmem {
    pub fn new(size: usize) -> Self {
        Self {
            mem: Arc::new(Mutex::new(vec![0; size])),
        }
    }
}

impl EmemAccess for FakeEmem {
    fn size(&self, _bar: &Bar0) -> u32 {
        self.mem.lock().len() as u32
    }

    fn ports_count(&self, _bar: &Bar0) -> u8 {
        2
    }

    fn copy_to_emem(&self, _bar: &Bar0, dst: u32, src: &[u8], _port: u8) -> Result {
        let mut mem = self.mem.lock();
        let range = range(mem.len(), dst, src.len())?;

        mem[range].copy_from_slice(src);
        Ok(())
    }

    fn copy_from_emem(&self, _bar: &Bar0, src: u32, dst: &mut [u8], _port: u8) -> Result {
        let mem = self.mem.lock();
        let range = range(mem.len(), src, dst.len())?;

        dst.copy_from_slice(&mem[range]);
        Ok(())
    }
}

pub const UCODE_GPU_VA: u64 = 0x1_0000_0000;
pub const INST_BLOCK_ADDR: u64 = 0x2000_0000;

#[derive(Debug, Default)]
pub struct VmState {
    pub inst_blocks: u32,
    pub freed: Vec<InstBlock>,
    /// Content of every surface mapped.
    pub mapped: Vec<Vec<u8>>,
    pub unmapped: Vec<u64>,
    pub fail_map: bool,
    pub fail_inst_block: bool,
}

/// Address space recording what gets mapped into it.
#[derive(Default)]
pub struct FakeVm {
    pub state: Mutex<VmState>,
}

impl Vm for FakeVm {
    fn alloc_inst_block(&self) -> Result<InstBlock> {
        let mut state = self.state.lock();
        if state.fail_inst_block {
            return Err(Error::NoMemory);
        }

        state.inst_blocks += 1;
        Ok(InstBlock {
            addr: INST_BLOCK_ADDR,
        })
    }

    fn free_inst_block(&self, inst_block: InstBlock) {
        self.state.lock().freed.push(inst_block);
    }

    fn map_read_only(&self, obj: &DmaObject) -> Result<u64> {
        let mut state = self.state.lock();
        if state.fail_map {
            return Err(Error::NoMemory);
        }

        state.mapped.push(obj.to_vec());
        Ok(UCODE_GPU_VA)
    }

    fn unmap(&self, gpu_va: u64, _obj: &DmaObject) {
        self.state.lock().unmapped.push(gpu_va);
    }
}

/// Security unit recording the falcons it is asked to bootstrap.
#[derive(Default)]
pub struct FakeDelegate {
    pub calls: Mutex<Vec<FalconIdMask>>,
    pub fail: Option<Error>,
}

impl FakeDelegate {
    pub fn failing(err: Error) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: Some(err),
        }
    }

    pub fn calls(&self) -> Vec<FalconIdMask> {
        self.calls.lock().clone()
    }
}

impl LsfBootstrap for FakeDelegate {
    fn bootstrap_ls_falcons(&self, mask: FalconIdMask) -> Result {
        self.calls.lock().push(mask);

        match self.fail {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Firmware files held in memory.
#[derive(Default)]
pub struct FakeFirmware {
    pub files: HashMap<String, Vec<u8>>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeFirmware {
    pub fn with(mut self, name: &str, blob: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), blob);
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.lock().len()
    }
}

impl FirmwareLoader for FakeFirmware {
    fn request(&self, name: &str) -> Result<Vec<u8>> {
        self.requests.lock().push(name.to_string());
        self.files.get(name).cloned().ok_or(Error::NoEntry)
    }
}

/// Bootloader code of `size` bytes, each byte its index plus `seed`.
pub fn bootloader_code(size: u32, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_add(seed)).collect()
}

/// Firmware blob made of a bootloader header followed by `code`.
pub fn bootloader_blob(code: &[u8], imem_offset: u32, entry_point: u32) -> Vec<u8> {
    let desc = [0, code.len() as u32, imem_offset, entry_point];

    let mut blob: Vec<u8> = desc.iter().flat_map(|w| w.to_le_bytes()).collect();
    blob.extend_from_slice(code);
    blob
}

/// Sum of the little-endian words of `code`, the last one zero-padded.
pub fn words_sum(code: &[u8]) -> u32 {
    code.chunks(4).fold(0u32, |acc, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        acc.wrapping_add(u32::from_le_bytes(word))
    })
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// A GPU whose FECS and GPCCS falcons are backed by [`FakeHal`]s.
pub struct FakeGpu {
    pub gpu: Gpu,
    pub fecs: FakeHal,
    pub gpccs: FakeHal,
}

impl FakeGpu {
    pub fn new(imem_size: usize, dmem_size: usize) -> Self {
        let fecs = FakeHal::new(imem_size, dmem_size);
        let gpccs = FakeHal::new(imem_size, dmem_size);

        let mut gpu = Gpu::new(Chipset::GV11B);
        gpu.init_falcon_with(FalconId::Fecs, Box::new(fecs.clone()), FalconFlags::empty());
        gpu.init_falcon_with(FalconId::Gpccs, Box::new(gpccs.clone()), FalconFlags::empty());

        Self { gpu, fecs, gpccs }
    }
}
