// SPDX-License-Identifier: GPL-2.0

mod common;

use core::time::Duration;
use std::time::Instant;

use common::{init_logger, FakeEngineReset, FakeHal, NullBar};
use nova_falcon::falcon::{FalconFlags, FalconId};
use nova_falcon::gpu::{Chipset, Gpu};
use nova_falcon::Error;

fn gpu_with(id: FalconId, hal: &FakeHal, flags: FalconFlags) -> Gpu {
    let mut gpu = Gpu::new(Chipset::TU104);
    gpu.init_falcon_with(id, Box::new(hal.clone()), flags);
    gpu
}

fn busy_for(polls: u32) -> FakeHal {
    let hal = FakeHal::new(0x100, 0x100);
    hal.state().busy_polls = polls;
    hal
}

#[test]
fn scrub_completes_after_a_few_polls() {
    init_logger();
    let hal = busy_for(2);
    let gpu = gpu_with(FalconId::Pmu, &hal, FalconFlags::empty());

    assert_eq!(gpu.falcon(FalconId::Pmu).wait_scrub_done(&NullBar), Ok(()));
    assert_eq!(hal.state().polls, 3);
}

// Scrubbing is given 1ms in steps of 10us, that is at most 100 evaluations.
#[test]
fn scrub_times_out_within_budget() {
    init_logger();
    let hal = busy_for(u32::MAX);
    let gpu = gpu_with(FalconId::Pmu, &hal, FalconFlags::empty());

    let start = Instant::now();
    assert_eq!(gpu.falcon(FalconId::Pmu).wait_scrub_done(&NullBar), Err(Error::Timeout));

    assert!(start.elapsed() < Duration::from_millis(100));
    assert!((1..=100).contains(&hal.state().polls));
}

#[test]
fn halt_interrupt_wait_respects_wall_clock() {
    init_logger();
    let hal = busy_for(u32::MAX);
    let gpu = gpu_with(FalconId::Pmu, &hal, FalconFlags::empty());
    let timeout = Duration::from_millis(20);

    let start = Instant::now();
    assert_eq!(
        gpu.falcon(FalconId::Pmu).clear_halt_interrupt(&NullBar, timeout),
        Err(Error::Timeout)
    );

    assert!(start.elapsed() < timeout * 10);
    assert!(hal.state().polls < 20_000);
}

#[test]
fn idle_after_a_few_polls() {
    init_logger();
    let hal = busy_for(3);
    let gpu = gpu_with(FalconId::Sec2, &hal, FalconFlags::empty());

    assert_eq!(gpu.falcon(FalconId::Sec2).wait_idle(&NullBar), Ok(()));
    assert_eq!(hal.state().polls, 4);
}

#[test]
fn halt_wait_uses_caller_timeout() {
    init_logger();
    let hal = busy_for(20);
    let gpu = gpu_with(FalconId::Pmu, &hal, FalconFlags::empty());
    let pmu = gpu.falcon(FalconId::Pmu);

    assert_eq!(pmu.wait_halt(&NullBar, Duration::from_micros(100)), Err(Error::Timeout));
    assert!((1..=10).contains(&hal.state().polls));

    assert_eq!(pmu.wait_halt(&NullBar, Duration::from_secs(1)), Ok(()));
    assert_eq!(hal.state().polls, 21);
}

#[test]
fn halt_interrupt_cleared_on_retry() {
    init_logger();
    let hal = busy_for(2);
    let gpu = gpu_with(FalconId::Pmu, &hal, FalconFlags::empty());
    let pmu = gpu.falcon(FalconId::Pmu);

    assert_eq!(pmu.clear_halt_interrupt(&NullBar, Duration::from_millis(100)), Ok(()));
    assert_eq!(hal.state().polls, 3);
}

#[test]
fn unreadable_hardware_is_not_a_timeout() {
    init_logger();
    let hal = FakeHal::new(0x100, 0x100);
    hal.state().poll_error = true;
    let gpu = gpu_with(FalconId::Pmu, &hal, FalconFlags::empty());
    let pmu = gpu.falcon(FalconId::Pmu);

    assert_eq!(pmu.wait_idle(&NullBar), Err(Error::NotReady));
    assert_eq!(pmu.wait_scrub_done(&NullBar), Err(Error::NotReady));
    assert_eq!(pmu.reset(&NullBar), Err(Error::NotReady));
}

#[test]
fn reset_prefers_engine_reset() {
    init_logger();
    let hal = FakeHal::new(0x100, 0x100);
    let mut gpu = gpu_with(FalconId::Sec2, &hal, FalconFlags::empty());

    gpu.falcon(FalconId::Sec2).reset(&NullBar).unwrap();
    assert_eq!(hal.state().resets, 1);

    let engine = FakeEngineReset::default();
    gpu.set_engine_reset(FalconId::Sec2, Box::new(engine.clone())).unwrap();
    gpu.falcon(FalconId::Sec2).reset(&NullBar).unwrap();

    assert_eq!(hal.state().resets, 1);
    assert_eq!(*engine.count.lock(), 1);
}

#[test]
fn engine_reset_needs_a_supported_falcon() {
    init_logger();
    let mut gpu = Gpu::new(Chipset::GM20B);

    assert_eq!(
        gpu.set_engine_reset(FalconId::Sec2, Box::new(FakeEngineReset::default())),
        Err(Error::Unsupported)
    );
}

#[test]
fn interrupts_follow_capability() {
    init_logger();
    let with_irq = FakeHal::new(0x100, 0x100);
    let without_irq = FakeHal::new(0x100, 0x100);

    let mut gpu = gpu_with(FalconId::Pmu, &with_irq, FalconFlags::INTERRUPT);
    gpu.init_falcon_with(FalconId::Fecs, Box::new(without_irq.clone()), FalconFlags::empty());

    gpu.falcon(FalconId::Pmu).set_irq(&NullBar, true, 0xff, 0x10).unwrap();
    gpu.falcon(FalconId::Fecs).set_irq(&NullBar, true, 0xff, 0x10).unwrap();

    assert_eq!(with_irq.state().irq, Some((true, 0xff, 0x10)));
    assert_eq!(without_irq.state().irq, Some((false, 0xff, 0x10)));
}

#[test]
fn mailboxes() {
    init_logger();
    let hal = FakeHal::new(0x100, 0x100);
    let gpu = gpu_with(FalconId::Fecs, &hal, FalconFlags::empty());
    let fecs = gpu.falcon(FalconId::Fecs);

    fecs.mailbox_write(&NullBar, 1, 0xcafe).unwrap();
    assert_eq!(fecs.mailbox_read(&NullBar, 1), Ok(0xcafe));

    assert_eq!(fecs.mailbox_write(&NullBar, 2, 0), Err(Error::InvalidArgument));
    assert_eq!(fecs.mailbox_read(&NullBar, 2), Err(Error::InvalidArgument));
    assert_eq!(hal.state().mailbox_writes, [(1, 0xcafe)]);
}

#[test]
fn control_registers_snapshot() {
    init_logger();
    let hal = FakeHal::new(0x100, 0x100);
    let gpu = gpu_with(FalconId::Fecs, &hal, FalconFlags::empty());

    let ctls = gpu.falcon(FalconId::Fecs).ctls(&NullBar).unwrap();
    assert_eq!((ctls.sctl, ctls.cpuctl), (0x3000, 0x10));

    assert_eq!(gpu.falcon(FalconId::Gpccs).ctls(&NullBar), Err(Error::Unsupported));
}
