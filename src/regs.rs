// SPDX-License-Identifier: GPL-2.0

// Required to retain the original register names used by OpenRM, which are all capital snake case
// but are mapped to types.
#![allow(non_camel_case_types)]

#[macro_use]
pub(crate) mod macros;

use crate::falcon::PFalconBase;

/* PFALCON */

register!(NV_PFALCON_FALCON_IRQSCLR @ PFalconBase[0x00000004] {
    4:4     halt as bool;
    6:6     swgen0 as bool;
});

register!(NV_PFALCON_FALCON_IRQSTAT @ PFalconBase[0x00000008] {
    4:4     halt as bool;
    6:6     swgen0 as bool;
});

register!(NV_PFALCON_FALCON_IRQMSET @ PFalconBase[0x00000010] {
    31:0    value as u32;
});

register!(NV_PFALCON_FALCON_IRQMCLR @ PFalconBase[0x00000014] {
    31:0    value as u32;
});

register!(NV_PFALCON_FALCON_IRQDEST @ PFalconBase[0x0000001c] {
    31:0    value as u32;
});

register!(NV_PFALCON_FALCON_MAILBOX0 @ PFalconBase[0x00000040] {
    31:0    value as u32;
});

register!(NV_PFALCON_FALCON_MAILBOX1 @ PFalconBase[0x00000044] {
    31:0    value as u32;
});

register!(NV_PFALCON_FALCON_IDLESTATE @ PFalconBase[0x0000004c] {
    0:0     falcon_busy as bool;
    15:1    ext_busy as u16, "Busy bits of the units attached to the falcon";
});

register!(NV_PFALCON_FALCON_CPUCTL @ PFalconBase[0x00000100] {
    1:1     startcpu as bool;
    3:3     hreset as bool;
    4:4     halted as bool;
    6:6     alias_en as bool;
});

register!(NV_PFALCON_FALCON_BOOTVEC @ PFalconBase[0x00000104] {
    31:0    value as u32;
});

register!(NV_PFALCON_FALCON_HWCFG @ PFalconBase[0x00000108] {
    8:0     imem_size as u16, "Size of IMEM in units of 256 bytes";
    17:9    dmem_size as u16, "Size of DMEM in units of 256 bytes";
});

register!(NV_PFALCON_FALCON_DMACTL @ PFalconBase[0x0000010c] {
    0:0     require_ctx as bool;
    1:1     dmem_scrubbing as bool;
    2:2     imem_scrubbing as bool;
});

impl NV_PFALCON_FALCON_DMACTL {
    /// Returns `true` if memory scrubbing is completed.
    pub(crate) fn mem_scrubbing_done(self) -> bool {
        !self.dmem_scrubbing() && !self.imem_scrubbing()
    }
}

register!(NV_PFALCON_FALCON_DMATRFBASE @ PFalconBase[0x00000110] {
    31:0    base as u32, "Transfer base address, in units of 256 bytes";
});

register!(NV_PFALCON_FALCON_DMATRFMOFFS @ PFalconBase[0x00000114] {
    23:0    offs as u32, "Offset into the falcon memory";
});

register!(NV_PFALCON_FALCON_DMATRFCMD @ PFalconBase[0x00000118] {
    1:1     idle as bool;
    4:4     imem as bool;
    10:8    size as u8, "Transfer size, 0x6 for 256 bytes";
    14:12   ctxdma as u8;
});

register!(NV_PFALCON_FALCON_DMATRFFBOFFS @ PFalconBase[0x0000011c] {
    31:0    offs as u32, "Offset from the transfer base";
});

register!(NV_PFALCON_FALCON_HWCFG1 @ PFalconBase[0x0000012c] {
    11:8    imem_ports as u8;
    15:12   dmem_ports as u8;
});

register!(NV_PFALCON_FALCON_CPUCTL_ALIAS @ PFalconBase[0x00000130] {
    1:1     startcpu as bool;
});

register!(NV_PFALCON_FALCON_IMEMC @ PFalconBase[0x00000180[4; 16]] {
    7:2     offs as u8, "Word offset within the block";
    23:8    blk as u16;
    24:24   aincw as bool, "Auto-increment on write";
    25:25   aincr as bool, "Auto-increment on read";
    28:28   secure as bool;
});

register!(NV_PFALCON_FALCON_IMEMD @ PFalconBase[0x00000184[4; 16]] {
    31:0    data as u32;
});

register!(NV_PFALCON_FALCON_IMEMT @ PFalconBase[0x00000188[4; 16]] {
    15:0    tag as u16;
});

register!(NV_PFALCON_FALCON_DMEMC @ PFalconBase[0x000001c0[8; 8]] {
    7:2     offs as u8;
    23:8    blk as u16;
    24:24   aincw as bool;
    25:25   aincr as bool;
});

impl NV_PFALCON_FALCON_DMEMC {
    /// Byte address pointed to by the port, as a combination of its block and word offset.
    pub(crate) fn address(self) -> u32 {
        (u32::from(self.blk()) << 8) | (u32::from(self.offs()) << 2)
    }
}

register!(NV_PFALCON_FALCON_DMEMD @ PFalconBase[0x000001c4[8; 8]] {
    31:0    data as u32;
});

register!(NV_PFALCON_FALCON_SCTL @ PFalconBase[0x00000240] {
    31:0    value as u32;
});

/* PGRAPH FECS */

// Only meaningful relative to the FECS falcon.

register!(NV_PGRAPH_FECS_ARB_CTX_PTR @ PFalconBase[0x00000a0c] {
    27:0    ptr as u32, "Instance block address, in units of 4 KiB";
    29:28   target as u8;
});

register!(NV_PGRAPH_FECS_ARB_CTX_CMD @ PFalconBase[0x00000a10] {
    4:0     cmd as u8;
});

register!(NV_PGRAPH_FECS_ARB_CTX_ADR @ PFalconBase[0x00000a24] {
    31:0    value as u32;
});

register!(NV_PGRAPH_FECS_NEW_CTX @ PFalconBase[0x00000b04] {
    27:0    ptr as u32;
    29:28   target as u8;
    31:31   valid as bool;
});
