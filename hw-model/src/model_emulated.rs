// Licensed under the Apache-2.0 license

use crate::bus::{check_word_access, Bus, BusError, RvAddr, RvData, RvSize};
use crate::bus_logger::BusLogger;
use crate::dpe::{self, DpeProfile};
use crate::mailbox::{MailboxRegs, States as MailboxStates};
use crate::soc_ifc::SocIfcRegs;
use crate::{HwModel, InitParams, ModelError};
use caliptra_api::mailbox::{CommandId, InvokeDpeReq, InvokeDpeResp};
use caliptra_api::soc_ifc::{FlowStatus, PERIPH_WINDOW, SOC_IFC_ADDR, SOC_MBOX_ADDR};
use caliptra_api::verify_checksum;
use caliptra_error::CaliptraError;

/// Cycles the emulated ROM spends before asking for fuses.
const ROM_BOOT_CYCLES: u32 = 64;

/// Cycles between firmware acceptance and runtime readiness.
const RUNTIME_BOOT_CYCLES: u32 = 128;

/// Firmware progress, advanced only from `step()`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FwStage {
    /// Waiting for CPTRA_BOOTFSM_GO.
    Reset,
    RomBoot { cycles_left: u32 },
    /// READY_FOR_FUSES is set, waiting for CPTRA_FUSE_WR_DONE.
    WaitForFuses,
    /// READY_FOR_MB_PROCESSING is set, waiting for FIRMWARE_LOAD.
    WaitForFirmware,
    /// Firmware accepted, waiting for the SoC to release the mailbox.
    FirmwareLoaded,
    RuntimeBoot { cycles_left: u32 },
    Runtime,
}

pub struct EmulatedApbBus<'a> {
    model: &'a mut ModelEmulated,
}

impl Bus for EmulatedApbBus<'_> {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        check_word_access(size, addr, true)?;
        match addr {
            SOC_MBOX_ADDR..=u32::MAX if addr < SOC_MBOX_ADDR + PERIPH_WINDOW => {
                self.model.mbox.soc_read(addr - SOC_MBOX_ADDR)
            }
            SOC_IFC_ADDR..=u32::MAX if addr < SOC_IFC_ADDR + PERIPH_WINDOW => {
                self.model.soc_ifc.read(addr - SOC_IFC_ADDR)
            }
            _ => Err(BusError::LoadAccessFault),
        }
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        check_word_access(size, addr, false)?;
        match addr {
            SOC_MBOX_ADDR..=u32::MAX if addr < SOC_MBOX_ADDR + PERIPH_WINDOW => {
                self.model.mbox.soc_write(addr - SOC_MBOX_ADDR, val)
            }
            SOC_IFC_ADDR..=u32::MAX if addr < SOC_IFC_ADDR + PERIPH_WINDOW => {
                self.model.soc_ifc.write(addr - SOC_IFC_ADDR, val)
            }
            _ => Err(BusError::StoreAccessFault),
        }
    }
}

/// Behavioural model of the SoC-facing side of Caliptra: the soc_ifc
/// register file, the mailbox, and a ROM/runtime that follow the real boot
/// flow closely enough for SoC drivers to be exercised end to end.
pub struct ModelEmulated {
    soc_ifc: SocIfcRegs,
    mbox: MailboxRegs,
    stage: FwStage,
    cycle_count: u64,
    rom_len: usize,
    trace_bus: bool,
    dpe_profile: DpeProfile,
    firmware_len: usize,
}

impl ModelEmulated {
    pub fn stage(&self) -> FwStage {
        self.stage
    }

    pub fn rom_len(&self) -> usize {
        self.rom_len
    }

    /// Size of the firmware bundle the ROM accepted, if any.
    pub fn firmware_len(&self) -> usize {
        self.firmware_len
    }

    pub fn mailbox_state(&self) -> MailboxStates {
        self.mbox.state()
    }

    fn rom_step(&mut self) {
        let Some((cmd, data)) = self.mbox.pending_request() else {
            return;
        };
        if CommandId(cmd) != CommandId::FIRMWARE_LOAD {
            log::warn!("ROM rejected mailbox command 0x{cmd:08x}");
            self.rom_fail_command(CaliptraError::FW_PROC_MAILBOX_INVALID_COMMAND);
            return;
        }
        if data.is_empty() {
            log::warn!("ROM rejected an empty firmware bundle");
            self.rom_fail_command(CaliptraError::FW_PROC_INVALID_IMAGE_SIZE);
            return;
        }
        log::info!("ROM accepted {} byte firmware bundle", data.len());
        self.firmware_len = data.len();
        self.soc_ifc.set_fw_error_fatal(0);
        self.mbox.complete();
        self.stage = FwStage::FirmwareLoaded;
    }

    fn runtime_step(&mut self) {
        let Some((cmd, data)) = self.mbox.pending_request() else {
            return;
        };
        self.soc_ifc.set_fw_error_non_fatal(0);
        let result = if CommandId(cmd) == CommandId::INVOKE_DPE {
            self.invoke_dpe(cmd, &data)
        } else {
            Err(CaliptraError::RUNTIME_UNIMPLEMENTED_COMMAND)
        };
        if let Err(err) = result {
            log::warn!("runtime failed command 0x{cmd:08x}: {err}");
            self.fail_command(err);
        }
    }

    fn invoke_dpe(&mut self, cmd: u32, data: &[u8]) -> Result<(), CaliptraError> {
        let (chksum, rest) = data
            .split_first_chunk::<4>()
            .ok_or(CaliptraError::RUNTIME_MAILBOX_INVALID_PARAMS)?;
        if !verify_checksum(u32::from_le_bytes(*chksum), cmd, rest) {
            return Err(CaliptraError::RUNTIME_INVALID_CHECKSUM);
        }
        let (data_size, payload) = rest
            .split_first_chunk::<4>()
            .ok_or(CaliptraError::RUNTIME_MAILBOX_INVALID_PARAMS)?;
        let data_size = u32::from_le_bytes(*data_size) as usize;
        if data_size > InvokeDpeReq::DATA_MAX_SIZE {
            return Err(CaliptraError::RUNTIME_MAILBOX_API_REQUEST_DATA_LEN_TOO_LARGE);
        }
        let command = payload
            .get(..data_size)
            .ok_or(CaliptraError::RUNTIME_MAILBOX_INVALID_PARAMS)?;

        let outcome = dpe::execute_command(&self.dpe_profile, command);

        let mut resp = Box::<InvokeDpeResp>::default();
        let len = outcome.response.len().min(InvokeDpeResp::DATA_MAX_SIZE);
        resp.data[..len].copy_from_slice(&outcome.response[..len]);
        resp.data_size = len as u32;
        resp.populate_chksum()
            .map_err(|_| CaliptraError::RUNTIME_MAILBOX_INVALID_PARAMS)?;
        let bytes = resp
            .as_bytes_partial()
            .map_err(|_| CaliptraError::RUNTIME_MAILBOX_INVALID_PARAMS)?;
        self.mbox.respond_data(bytes);

        // The mailbox transaction itself succeeded; a DPE-level rejection is
        // only visible through the non-fatal error register.
        if let Some(err) = outcome.non_fatal {
            self.soc_ifc.set_fw_error_non_fatal(err.into());
        }
        Ok(())
    }

    // ROM errors land in the fatal register, runtime errors in the
    // non-fatal one.
    fn rom_fail_command(&mut self, err: CaliptraError) {
        self.soc_ifc.set_fw_error_fatal(err.into());
        self.mbox.fail();
    }

    fn fail_command(&mut self, err: CaliptraError) {
        self.soc_ifc.set_fw_error_non_fatal(err.into());
        self.mbox.fail();
    }
}

impl HwModel for ModelEmulated {
    type TBus<'a> = BusLogger<EmulatedApbBus<'a>>;

    fn new_unbooted(params: InitParams) -> Result<Self, ModelError>
    where
        Self: Sized,
    {
        if params.rom.is_empty() {
            return Err(ModelError::EmptyRom);
        }
        log::debug!(
            "creating emulated model: {} byte ROM, soc_user {}",
            params.rom.len(),
            params.soc_user
        );
        Ok(Self {
            soc_ifc: SocIfcRegs::new(),
            mbox: MailboxRegs::new(params.soc_user),
            stage: FwStage::Reset,
            cycle_count: 0,
            rom_len: params.rom.len(),
            trace_bus: params.trace_bus,
            dpe_profile: DpeProfile::default(),
            firmware_len: 0,
        })
    }

    fn apb_bus(&mut self) -> Self::TBus<'_> {
        let enabled = self.trace_bus;
        BusLogger::new(EmulatedApbBus { model: self }, enabled)
    }

    fn step(&mut self) {
        self.cycle_count += 1;
        let stage = self.stage;
        self.stage = match stage {
            FwStage::Reset if self.soc_ifc.bootfsm_go() => {
                log::debug!("boot FSM released at cycle {}", self.cycle_count);
                FwStage::RomBoot {
                    cycles_left: ROM_BOOT_CYCLES,
                }
            }
            FwStage::RomBoot { cycles_left: 0 } => {
                self.soc_ifc
                    .set_flow_status(FlowStatus::READY_FOR_FUSES::SET);
                FwStage::WaitForFuses
            }
            FwStage::RomBoot { cycles_left } => FwStage::RomBoot {
                cycles_left: cycles_left - 1,
            },
            FwStage::WaitForFuses if self.soc_ifc.fuse_wr_done() => {
                log::debug!("fuses locked, ROM ready for firmware");
                self.soc_ifc.set_flow_status(
                    FlowStatus::READY_FOR_FUSES::CLEAR
                        + FlowStatus::IDEVID_CSR_READY::SET
                        + FlowStatus::READY_FOR_MB_PROCESSING::SET,
                );
                FwStage::WaitForFirmware
            }
            FwStage::WaitForFirmware => {
                self.rom_step();
                self.stage
            }
            FwStage::FirmwareLoaded if self.mbox.state() == MailboxStates::Idle => {
                self.soc_ifc
                    .set_flow_status(FlowStatus::READY_FOR_MB_PROCESSING::CLEAR);
                FwStage::RuntimeBoot {
                    cycles_left: RUNTIME_BOOT_CYCLES,
                }
            }
            FwStage::RuntimeBoot { cycles_left: 0 } => {
                log::info!("runtime ready at cycle {}", self.cycle_count);
                self.soc_ifc.set_flow_status(
                    FlowStatus::READY_FOR_MB_PROCESSING::SET
                        + FlowStatus::READY_FOR_RUNTIME::SET
                        + FlowStatus::MAILBOX_FLOW_DONE::SET,
                );
                FwStage::Runtime
            }
            FwStage::RuntimeBoot { cycles_left } => FwStage::RuntimeBoot {
                cycles_left: cycles_left - 1,
            },
            FwStage::Runtime => {
                self.runtime_step();
                FwStage::Runtime
            }
            stage => stage,
        };
    }

    fn cycle_count(&self) -> u64 {
        self.cycle_count
    }
}
