// SPDX-License-Identifier: GPL-2.0

//! Secure bootstrap of the context switch falcons.
//!
//! When the falcons run in light-secure mode, the host cannot load them directly. The
//! bootstrap is delegated to a security unit which verifies and loads the firmware. Which unit
//! is used, and which falcons it is asked to load, depends on three independent parameters,
//! each decided by its own function below:
//!
//! - whether this is the first bring-up of the engine or a recovery ([`boot_phase`]),
//! - whether GPCCS is loaded by the host bootloader or securely ([`gpccs_load_mode`]),
//! - which unit the platform uses ([`SecureDelegate`]).

use crate::error::Result;
use crate::falcon::FalconIdMask;

/// A security unit able to bootstrap light-secure falcons.
pub trait LsfBootstrap {
    /// Bootstraps every falcon in `mask`.
    ///
    /// Errors reported by the unit are returned as is, typically as
    /// [`Error::DelegateFailure`](crate::error::Error::DelegateFailure).
    fn bootstrap_ls_falcons(&self, mask: FalconIdMask) -> Result;
}

/// Security unit the platform delegates the light-secure bootstrap to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecureDelegate {
    /// The RTOS running on SEC2.
    Sec2Rtos,
    /// The light-secure falcon manager of the PMU firmware.
    Pmu,
    /// The access controlled region firmware, run by the host. The falcons are loaded as a
    /// side effect of the ACR bootstrap at cold boot.
    #[default]
    Acr,
}

/// Bring-up phase of the context switch falcons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    /// First bring-up since the device was bound, or exit from railgating.
    ColdBoot,
    /// Bring-up after the engine was reset for recovery.
    Recovery,
}

/// How the GPCCS firmware gets into its falcon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpccsLoad {
    /// Through the host-driven DMA bootloader.
    Bootloader,
    /// Through the security unit.
    Secure,
}

pub fn boot_phase(fecs_bootstrap_done: bool) -> BootPhase {
    if fecs_bootstrap_done {
        BootPhase::Recovery
    } else {
        BootPhase::ColdBoot
    }
}

pub fn gpccs_load_mode(secure_gpccs: bool) -> GpccsLoad {
    if secure_gpccs {
        GpccsLoad::Secure
    } else {
        GpccsLoad::Bootloader
    }
}

/// Returns the falcons the security unit must be asked to bootstrap, or `None` if it must not
/// be called.
///
/// `lazy` is the set of falcons the ACR marked for lazy bootstrap, which the PMU loads on
/// request at cold boot.
pub fn delegate_request(
    phase: BootPhase,
    gpccs: GpccsLoad,
    delegate: SecureDelegate,
    lazy: FalconIdMask,
) -> Option<FalconIdMask> {
    let ctxsw = FalconIdMask::FECS | FalconIdMask::GPCCS;

    match (phase, gpccs, delegate) {
        // GPCCS is reloaded by the host, only FECS needs the PMU.
        (BootPhase::Recovery, GpccsLoad::Bootloader, SecureDelegate::Pmu) => {
            Some(FalconIdMask::FECS)
        }
        (BootPhase::Recovery, GpccsLoad::Bootloader, _) => None,
        (BootPhase::Recovery, GpccsLoad::Secure, _) => Some(ctxsw),
        (BootPhase::ColdBoot, GpccsLoad::Bootloader, _) => None,
        (BootPhase::ColdBoot, GpccsLoad::Secure, SecureDelegate::Sec2Rtos) => Some(ctxsw),
        (BootPhase::ColdBoot, GpccsLoad::Secure, SecureDelegate::Pmu) => {
            Some(lazy & ctxsw).filter(|mask| !mask.is_empty())
        }
        // Already loaded by the ACR bootstrap.
        (BootPhase::ColdBoot, GpccsLoad::Secure, SecureDelegate::Acr) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTXSW: FalconIdMask = FalconIdMask::FECS.union(FalconIdMask::GPCCS);

    #[test]
    fn phase_and_mode() {
        assert_eq!(boot_phase(false), BootPhase::ColdBoot);
        assert_eq!(boot_phase(true), BootPhase::Recovery);
        assert_eq!(gpccs_load_mode(false), GpccsLoad::Bootloader);
        assert_eq!(gpccs_load_mode(true), GpccsLoad::Secure);
    }

    #[test]
    fn recovery_requests() {
        use SecureDelegate::*;

        let lazy = FalconIdMask::empty();
        let req = |gpccs, delegate| delegate_request(BootPhase::Recovery, gpccs, delegate, lazy);

        assert_eq!(req(GpccsLoad::Bootloader, Pmu), Some(FalconIdMask::FECS));
        assert_eq!(req(GpccsLoad::Bootloader, Sec2Rtos), None);
        assert_eq!(req(GpccsLoad::Bootloader, Acr), None);

        for delegate in [Sec2Rtos, Pmu, Acr] {
            assert_eq!(req(GpccsLoad::Secure, delegate), Some(CTXSW));
        }
    }

    #[test]
    fn cold_boot_requests() {
        use SecureDelegate::*;

        let req = |gpccs, delegate, lazy| {
            delegate_request(BootPhase::ColdBoot, gpccs, delegate, lazy)
        };

        for delegate in [Sec2Rtos, Pmu, Acr] {
            assert_eq!(req(GpccsLoad::Bootloader, delegate, CTXSW), None);
        }

        assert_eq!(req(GpccsLoad::Secure, Sec2Rtos, FalconIdMask::empty()), Some(CTXSW));
        assert_eq!(req(GpccsLoad::Secure, Acr, CTXSW), None);
    }

    #[test]
    fn pmu_only_loads_lazy_falcons() {
        let req = |lazy| {
            delegate_request(BootPhase::ColdBoot, GpccsLoad::Secure, SecureDelegate::Pmu, lazy)
        };

        assert_eq!(req(CTXSW), Some(CTXSW));
        assert_eq!(req(FalconIdMask::GPCCS), Some(FalconIdMask::GPCCS));
        assert_eq!(req(FalconIdMask::FECS | FalconIdMask::PMU), Some(FalconIdMask::FECS));
        assert_eq!(req(FalconIdMask::empty()), None);
    }
}
