/*++

Licensed under the Apache-2.0 license.

File Name:

    soc_ifc.rs

Abstract:

    SoC interface register file: boot FSM go, flow status, firmware error
    registers and the fuse bank.

--*/

use crate::bus::{BusError, RvData};
use caliptra_api::soc_ifc::{regs, FlowStatus, FlowStatusReg};
use tock_registers::fields::FieldValue;

pub struct SocIfcRegs {
    flow_status: FlowStatusReg,
    fw_error_fatal: u32,
    fw_error_non_fatal: u32,
    reset_reason: u32,
    bootfsm_go: bool,
    fuse_wr_done: bool,
    fuses: Vec<u32>,
}

impl Default for SocIfcRegs {
    fn default() -> Self {
        Self::new()
    }
}

impl SocIfcRegs {
    const FUSE_WORDS: usize = ((regs::FUSE_END - regs::FUSE_UDS_SEED) / 4) as usize;

    pub fn new() -> Self {
        Self {
            flow_status: FlowStatusReg::new(0),
            fw_error_fatal: 0,
            fw_error_non_fatal: 0,
            reset_reason: 0,
            bootfsm_go: false,
            fuse_wr_done: false,
            fuses: vec![0; Self::FUSE_WORDS],
        }
    }

    pub fn read(&self, offset: u32) -> Result<RvData, BusError> {
        match offset {
            regs::CPTRA_FW_ERROR_FATAL => Ok(self.fw_error_fatal),
            regs::CPTRA_FW_ERROR_NON_FATAL => Ok(self.fw_error_non_fatal),
            regs::CPTRA_FLOW_STATUS => Ok(self.flow_status.get()),
            regs::CPTRA_RESET_REASON => Ok(self.reset_reason),
            regs::CPTRA_FUSE_WR_DONE => Ok(u32::from(self.fuse_wr_done)),
            regs::CPTRA_BOOTFSM_GO => Ok(u32::from(self.bootfsm_go)),
            regs::FUSE_UDS_SEED..=regs::FUSE_END if offset < regs::FUSE_END => {
                Ok(self.fuses[Self::fuse_index(offset)])
            }
            _ => Err(BusError::LoadAccessFault),
        }
    }

    pub fn write(&mut self, offset: u32, val: RvData) -> Result<(), BusError> {
        match offset {
            // Error registers belong to the firmware; the SoC may only clear
            // them, which this model has no use for.
            regs::CPTRA_FW_ERROR_FATAL
            | regs::CPTRA_FW_ERROR_NON_FATAL
            | regs::CPTRA_FLOW_STATUS
            | regs::CPTRA_RESET_REASON => Ok(()),
            regs::CPTRA_FUSE_WR_DONE => {
                self.fuse_wr_done |= val & 1 != 0;
                Ok(())
            }
            regs::CPTRA_BOOTFSM_GO => {
                self.bootfsm_go |= val & 1 != 0;
                Ok(())
            }
            regs::FUSE_UDS_SEED..=regs::FUSE_END if offset < regs::FUSE_END => {
                // Fuses are sticky once FUSE_WR_DONE is set.
                if !self.fuse_wr_done {
                    self.fuses[Self::fuse_index(offset)] = val;
                }
                Ok(())
            }
            _ => Err(BusError::StoreAccessFault),
        }
    }

    fn fuse_index(offset: u32) -> usize {
        ((offset - regs::FUSE_UDS_SEED) / 4) as usize
    }

    /// Reads a run of fuse words starting at `offset`.
    pub fn fuse_words(&self, offset: u32, count: usize) -> &[u32] {
        let start = Self::fuse_index(offset);
        &self.fuses[start..start + count]
    }

    pub fn bootfsm_go(&self) -> bool {
        self.bootfsm_go
    }

    pub fn fuse_wr_done(&self) -> bool {
        self.fuse_wr_done
    }

    pub fn set_flow_status(&mut self, field: FieldValue<u32, FlowStatus::Register>) {
        self.flow_status.modify(field);
    }

    pub fn set_fw_error_non_fatal(&mut self, val: u32) {
        self.fw_error_non_fatal = val;
    }

    pub fn set_fw_error_fatal(&mut self, val: u32) {
        self.fw_error_fatal = val;
    }
}
