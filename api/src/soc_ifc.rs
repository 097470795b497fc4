/*++

Licensed under the Apache-2.0 license.

File Name:

    soc_ifc.rs

Abstract:

    SoC-visible register map of the soc_ifc and mailbox peripherals.

--*/

use tock_registers::{register_bitfields, LocalRegisterCopy};

/// Base of the mailbox peripheral on the SoC APB bus.
pub const SOC_MBOX_ADDR: u32 = 0x3002_0000;

/// Base of the soc_ifc peripheral on the SoC APB bus.
pub const SOC_IFC_ADDR: u32 = 0x3003_0000;

/// Size of each peripheral's address window.
pub const PERIPH_WINDOW: u32 = 0x1000;

/// Mailbox SRAM capacity.
pub const MBOX_SIZE: u32 = 128 * 1024;

/// Register offsets within the mailbox block.
pub mod mbox {
    pub const LOCK: u32 = 0x00;
    pub const USER: u32 = 0x04;
    pub const CMD: u32 = 0x08;
    pub const DLEN: u32 = 0x0c;
    pub const DATAIN: u32 = 0x10;
    pub const DATAOUT: u32 = 0x14;
    pub const EXECUTE: u32 = 0x18;
    pub const STATUS: u32 = 0x1c;
}

/// Register offsets within the soc_ifc block.
pub mod regs {
    pub const CPTRA_FW_ERROR_FATAL: u32 = 0x008;
    pub const CPTRA_FW_ERROR_NON_FATAL: u32 = 0x00c;
    pub const CPTRA_FLOW_STATUS: u32 = 0x03c;
    pub const CPTRA_RESET_REASON: u32 = 0x040;
    pub const CPTRA_FUSE_WR_DONE: u32 = 0x0ac;
    pub const CPTRA_BOOTFSM_GO: u32 = 0x0b4;

    pub const FUSE_UDS_SEED: u32 = 0x200;
    pub const FUSE_FIELD_ENTROPY: u32 = 0x230;
    pub const FUSE_KEY_MANIFEST_PK_HASH: u32 = 0x250;
    pub const FUSE_KEY_MANIFEST_PK_HASH_MASK: u32 = 0x280;
    pub const FUSE_OWNER_PK_HASH: u32 = 0x284;
    pub const FUSE_FMC_KEY_MANIFEST_SVN: u32 = 0x2b4;
    pub const FUSE_RUNTIME_SVN: u32 = 0x2b8;
    pub const FUSE_ANTI_ROLLBACK_DISABLE: u32 = 0x2c8;
    pub const FUSE_IDEVID_CERT_ATTR: u32 = 0x2cc;
    pub const FUSE_IDEVID_MANUF_HSM_ID: u32 = 0x32c;
    pub const FUSE_LIFE_CYCLE: u32 = 0x33c;
    pub const FUSE_LMS_VERIFY: u32 = 0x340;
    pub const FUSE_LMS_REVOCATION: u32 = 0x344;
    pub const FUSE_SOC_STEPPING_ID: u32 = 0x348;

    /// One past the last fuse register.
    pub const FUSE_END: u32 = 0x34c;
}

register_bitfields! [
    u32,

    pub FlowStatus [
        STATUS OFFSET(0) NUMBITS(24) [],
        IDEVID_CSR_READY OFFSET(24) NUMBITS(1) [],
        BOOT_FSM_PS OFFSET(25) NUMBITS(3) [],
        READY_FOR_MB_PROCESSING OFFSET(28) NUMBITS(1) [],
        READY_FOR_RUNTIME OFFSET(29) NUMBITS(1) [],
        READY_FOR_FUSES OFFSET(30) NUMBITS(1) [],
        MAILBOX_FLOW_DONE OFFSET(31) NUMBITS(1) [],
    ],

    pub MboxStatus [
        STATUS OFFSET(0) NUMBITS(4) [
            CMD_BUSY = 0x0,
            DATA_READY = 0x1,
            CMD_COMPLETE = 0x2,
            CMD_FAILURE = 0x3,
        ],
        ECC_SINGLE_ERROR OFFSET(4) NUMBITS(1) [],
        ECC_DOUBLE_ERROR OFFSET(5) NUMBITS(1) [],
        MBOX_FSM_PS OFFSET(6) NUMBITS(3) [
            MBOX_IDLE = 0x0,
            MBOX_RDY_FOR_CMD = 0x1,
            MBOX_RDY_FOR_DLEN = 0x3,
            MBOX_RDY_FOR_DATA = 0x2,
            MBOX_EXECUTE_UC = 0x6,
            MBOX_EXECUTE_SOC = 0x4,
        ],
        SOC_HAS_LOCK OFFSET(9) NUMBITS(1) [],
    ],
];

pub type FlowStatusReg = LocalRegisterCopy<u32, FlowStatus::Register>;
pub type MboxStatusReg = LocalRegisterCopy<u32, MboxStatus::Register>;
