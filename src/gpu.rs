// SPDX-License-Identifier: GPL-2.0

use core::fmt;

use log::{error, info};

use crate::error::{Error, Result};
use crate::falcon::{
    hal::{self, FalconHal},
    EmemAccess, EngineReset, Falcon, FalconBase, FalconFlags, FalconId,
};

macro_rules! define_chipset {
    ({ $($variant:ident = $value:expr),* $(,)* }) =>
    {
        /// Enum representation of the GPU chipset.
        #[allow(non_camel_case_types)]
        #[derive(fmt::Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Chipset {
            $($variant = $value),*,
        }

        impl Chipset {
            pub const ALL: &'static [Chipset] = &[
                $( Chipset::$variant, )*
            ];
        }

        // TODO replace with something like derive(FromPrimitive)
        impl TryFrom<u32> for Chipset {
            type Error = Error;

            fn try_from(value: u32) -> Result<Self> {
                match value {
                    $( $value => Ok(Chipset::$variant), )*
                    _ => {
                        error!("no support for GPUID {:#x}", value);
                        Err(Error::InvalidArgument)
                    }
                }
            }
        }
    }
}

define_chipset!({
    // Maxwell
    GM20B = 0x12b,
    GM20B_B = 0x12e,
    // Pascal
    GP10B = 0x13b,
    // Volta
    GV100 = 0x140,
    GV11B = 0x15b,
    // Turing
    TU104 = 0x164,
});

impl Chipset {
    /// Whether the chipset is integrated to a SoC.
    pub fn is_igpu(&self) -> bool {
        matches!(
            self,
            Self::GM20B | Self::GM20B_B | Self::GP10B | Self::GV11B
        )
    }

    /// Returns the register base and capabilities of falcon `id` on this chipset, or `None` if
    /// the chipset does not have it.
    fn falcon_sw_config(&self, id: FalconId) -> Option<(FalconBase, FalconFlags)> {
        let flags = match (self, id) {
            (_, FalconId::Pmu) => FalconFlags::INTERRUPT,
            (_, FalconId::Fecs | FalconId::Gpccs) => FalconFlags::empty(),
            (Self::GV100 | Self::TU104, FalconId::GspLite | FalconId::Nvdec) => {
                FalconFlags::empty()
            }
            (Self::GV100 | Self::TU104, FalconId::Minion) => FalconFlags::INTERRUPT,
            (Self::TU104, FalconId::Sec2) => FalconFlags::INTERRUPT | FalconFlags::EMEM,
            _ => return None,
        };

        Some((falcon_base(id), flags))
    }
}

impl fmt::Display for Chipset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Register base of falcon `id`.
const fn falcon_base(id: FalconId) -> FalconBase {
    let base = match id {
        FalconId::Pmu => 0x0010_a000,
        FalconId::GspLite => 0x0011_0000,
        FalconId::Fecs => 0x0040_9000,
        FalconId::Gpccs => 0x0041_a000,
        FalconId::Nvdec => 0x0008_4000,
        FalconId::Sec2 => 0x0008_7000,
        FalconId::Minion => 0x00a0_6000,
    };

    FalconBase(base)
}

/// Structure holding the falcons of a GPU.
///
/// Every falcon the driver knows about has an instance, created unsupported. The instances
/// become usable through [`Gpu::init_falcon`], and return to the unsupported state through
/// [`Gpu::teardown_falcon`].
pub struct Gpu {
    chipset: Chipset,
    falcons: [Falcon; FalconId::ALL.len()],
}

impl Gpu {
    pub fn new(chipset: Chipset) -> Self {
        Self {
            chipset,
            falcons: FalconId::ALL.map(Falcon::new),
        }
    }

    /// Creates the GPU from its raw chip identifier (architecture + implementation).
    pub fn from_gpuid(gpuid: u32) -> Result<Self> {
        Chipset::try_from(gpuid).map(Self::new)
    }

    pub fn chipset(&self) -> Chipset {
        self.chipset
    }

    /// Returns the falcon instance for `id`.
    pub fn falcon(&self, id: FalconId) -> &Falcon {
        &self.falcons[id.index()]
    }

    fn falcon_mut(&mut self, id: FalconId) -> &mut Falcon {
        &mut self.falcons[id.index()]
    }

    /// Returns the falcon instance with the raw identifier `id`.
    pub fn get_instance(&self, id: u32) -> Result<&Falcon> {
        match FalconId::try_from(id) {
            Ok(id) => Ok(self.falcon(id)),
            Err(e) => {
                error!("invalid/unsupported falcon ID {:#x}", id);
                Err(e)
            }
        }
    }

    /// Assigns the register HAL and capabilities of falcon `id` for this chipset.
    ///
    /// A falcon the chipset does not have is left unsupported, which is not an error.
    pub fn init_falcon(&mut self, id: FalconId) -> Result {
        let Some((base, flags)) = self.chipset.falcon_sw_config(id) else {
            info!("falcon {} not present on {}", id, self.chipset);
            return Ok(());
        };

        let hal = hal::falcon_hal(self.chipset, base).map_err(|e| {
            error!("chip specific falcon sw init failed for {}: {}", id, e);
            e
        })?;

        self.falcon_mut(id).setup(hal, flags);
        Ok(())
    }

    /// Makes falcon `id` usable with a caller-provided HAL.
    pub fn init_falcon_with(&mut self, id: FalconId, hal: Box<dyn FalconHal>, flags: FalconFlags) {
        self.falcon_mut(id).setup(hal, flags);
    }

    /// Initializes every falcon of the chipset.
    pub fn init_falcons(&mut self) -> Result {
        FalconId::ALL
            .into_iter()
            .try_for_each(|id| self.init_falcon(id))
    }

    /// Returns falcon `id` to the unsupported state. Calling this on an unsupported falcon does
    /// nothing.
    pub fn teardown_falcon(&mut self, id: FalconId) {
        let chipset = self.chipset;

        if !self.falcon_mut(id).release() {
            info!("falcon {} not supported on {}", id, chipset);
        }
    }

    /// Installs the engine reset of the unit owning falcon `id`.
    pub fn set_engine_reset(&mut self, id: FalconId, reset: Box<dyn EngineReset>) -> Result {
        let falcon = self.falcon_mut(id);
        if !falcon.is_supported() {
            error!("falcon {} not supported", id);
            return Err(Error::Unsupported);
        }

        falcon.set_engine_reset(reset);
        Ok(())
    }

    /// Installs the external memory access of the unit owning falcon `id`.
    pub fn set_emem(&mut self, id: FalconId, emem: Box<dyn EmemAccess>) -> Result {
        let falcon = self.falcon_mut(id);
        if !falcon.flags().contains(FalconFlags::SUPPORTED | FalconFlags::EMEM) {
            error!("falcon {} has no external memory", id);
            return Err(Error::Unsupported);
        }

        falcon.set_emem(emem);
        Ok(())
    }
}

impl fmt::Debug for Gpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gpu")
            .field("chipset", &self.chipset)
            .field("falcons", &self.falcons)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chipset_from_gpuid() {
        assert_eq!(Chipset::try_from(0x164), Ok(Chipset::TU104));
        assert_eq!(Chipset::try_from(0x12e), Ok(Chipset::GM20B_B));
        assert_eq!(Chipset::try_from(0x162), Err(Error::InvalidArgument));
        assert!(Gpu::from_gpuid(0x999).is_err());
    }

    #[test]
    fn igpu_falcon_set() {
        let mut gpu = Gpu::new(Chipset::GP10B);
        gpu.init_falcons().unwrap();

        assert!(gpu.falcon(FalconId::Pmu).flags().contains(FalconFlags::INTERRUPT));
        assert!(gpu.falcon(FalconId::Fecs).is_supported());
        assert!(gpu.falcon(FalconId::Gpccs).is_supported());
        assert!(!gpu.falcon(FalconId::Sec2).is_supported());
        assert!(!gpu.falcon(FalconId::Minion).is_supported());
    }

    #[test]
    fn tu104_falcon_set() {
        let mut gpu = Gpu::new(Chipset::TU104);
        gpu.init_falcons().unwrap();

        assert!(FalconId::ALL.iter().all(|id| gpu.falcon(*id).is_supported()));
        assert_eq!(
            gpu.falcon(FalconId::Sec2).flags(),
            FalconFlags::SUPPORTED | FalconFlags::INTERRUPT | FalconFlags::EMEM
        );
        assert_eq!(gpu.falcon(FalconId::Nvdec).flags(), FalconFlags::SUPPORTED);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut gpu = Gpu::new(Chipset::GV100);
        gpu.init_falcon(FalconId::Fecs).unwrap();

        gpu.teardown_falcon(FalconId::Fecs);
        assert!(!gpu.falcon(FalconId::Fecs).is_supported());

        gpu.teardown_falcon(FalconId::Fecs);
        assert!(!gpu.falcon(FalconId::Fecs).is_supported());
    }

    #[test]
    fn unknown_raw_id() {
        let gpu = Gpu::new(Chipset::GM20B);

        assert_eq!(gpu.get_instance(2).map(Falcon::id), Ok(FalconId::Fecs));
        assert_eq!(gpu.get_instance(42).err(), Some(Error::NoDevice));
    }
}
