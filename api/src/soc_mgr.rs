// Licensed under the Apache-2.0 license

use crate::{
    mailbox::{CommandId, InvokeDpeReq, InvokeDpeResp, MailboxRespHeader},
    soc_ifc::{
        mbox, regs, FlowStatus, FlowStatusReg, MboxStatus, MboxStatusReg, MBOX_SIZE,
        SOC_IFC_ADDR, SOC_MBOX_ADDR,
    },
    calc_checksum, CaliptraApiError, Fuses,
};
use core::mem::size_of;
use tock_registers::fields::Field;
use zerocopy::IntoBytes;

/// SoC-side driver for the Caliptra soc_ifc and mailbox peripherals.
///
/// Implementors only provide 32-bit register access and a time base; every
/// boot, fuse and mailbox operation is built on top of those three
/// primitives.
///
/// # Example
///
/// ```rust
/// use caliptra_api::{CaliptraApiError, SocManager};
///
/// struct NullSoc;
///
/// impl SocManager for NullSoc {
///     const MAX_WAIT_CYCLES: u32 = 400000;
///
///     fn read_u32(&mut self, _addr: u32) -> Result<u32, CaliptraApiError> {
///         Ok(0)
///     }
///
///     fn write_u32(&mut self, _addr: u32, _data: u32) -> Result<(), CaliptraApiError> {
///         Ok(())
///     }
///
///     fn wait(&mut self) {}
/// }
///
/// assert!(!NullSoc.ready_for_fuses().unwrap());
/// ```
pub trait SocManager {
    /// Number of `wait()` calls before a polling loop gives up.
    const MAX_WAIT_CYCLES: u32;

    fn read_u32(&mut self, addr: u32) -> Result<u32, CaliptraApiError>;

    fn write_u32(&mut self, addr: u32, data: u32) -> Result<(), CaliptraApiError>;

    // Provide a time base for status polling loops.
    fn wait(&mut self);

    fn soc_ifc_read(&mut self, offset: u32) -> Result<u32, CaliptraApiError> {
        self.read_u32(SOC_IFC_ADDR + offset)
    }

    fn soc_ifc_write(&mut self, offset: u32, data: u32) -> Result<(), CaliptraApiError> {
        self.write_u32(SOC_IFC_ADDR + offset, data)
    }

    fn soc_ifc_write_words(&mut self, offset: u32, words: &[u32]) -> Result<(), CaliptraApiError> {
        for (idx, word) in (0u32..).zip(words) {
            self.soc_ifc_write(offset + idx * 4, *word)?;
        }
        Ok(())
    }

    fn mbox_read(&mut self, offset: u32) -> Result<u32, CaliptraApiError> {
        self.read_u32(SOC_MBOX_ADDR + offset)
    }

    fn mbox_write(&mut self, offset: u32, data: u32) -> Result<(), CaliptraApiError> {
        self.write_u32(SOC_MBOX_ADDR + offset, data)
    }

    fn flow_status(&mut self) -> Result<FlowStatusReg, CaliptraApiError> {
        Ok(FlowStatusReg::new(
            self.soc_ifc_read(regs::CPTRA_FLOW_STATUS)?,
        ))
    }

    fn ready_for_fuses(&mut self) -> Result<bool, CaliptraApiError> {
        Ok(self.flow_status()?.is_set(FlowStatus::READY_FOR_FUSES))
    }

    fn ready_for_fw(&mut self) -> Result<bool, CaliptraApiError> {
        Ok(self
            .flow_status()?
            .is_set(FlowStatus::READY_FOR_MB_PROCESSING))
    }

    fn ready_for_runtime(&mut self) -> Result<bool, CaliptraApiError> {
        Ok(self.flow_status()?.is_set(FlowStatus::READY_FOR_RUNTIME))
    }

    /// Polls a flow status bit, calling `wait()` between reads. Returns
    /// false if the bit was still clear after `MAX_WAIT_CYCLES`.
    fn wait_for_flow_status(
        &mut self,
        field: Field<u32, FlowStatus::Register>,
    ) -> Result<bool, CaliptraApiError> {
        for _ in 0..Self::MAX_WAIT_CYCLES {
            if self.flow_status()?.is_set(field) {
                return Ok(true);
            }
            self.wait();
        }
        Ok(self.flow_status()?.is_set(field))
    }

    /// Releases the boot FSM so the ROM starts executing.
    fn bootfsm_go(&mut self) -> Result<(), CaliptraApiError> {
        log::debug!("setting CPTRA_BOOTFSM_GO");
        self.soc_ifc_write(regs::CPTRA_BOOTFSM_GO, 1)
    }

    /// Initializes the fuse values and locks them in until the next reset.
    ///
    /// # Errors
    ///
    /// If the device never asks for fuses, if cptra_fuse_wr_done has
    /// already been written, or the hardware prevents cptra_fuse_wr_done
    /// from being set.
    fn init_fuses(&mut self, fuses: &Fuses) -> Result<(), CaliptraApiError> {
        if !self.wait_for_flow_status(FlowStatus::READY_FOR_FUSES)? {
            return Err(CaliptraApiError::NotReadyForFuses);
        }
        if self.soc_ifc_read(regs::CPTRA_FUSE_WR_DONE)? & 1 != 0 {
            return Err(CaliptraApiError::FusesAlreadyLocked);
        }

        self.soc_ifc_write_words(regs::FUSE_UDS_SEED, &fuses.uds_seed)?;
        self.soc_ifc_write_words(regs::FUSE_FIELD_ENTROPY, &fuses.field_entropy)?;
        self.soc_ifc_write_words(
            regs::FUSE_KEY_MANIFEST_PK_HASH,
            &fuses.key_manifest_pk_hash,
        )?;
        self.soc_ifc_write(
            regs::FUSE_KEY_MANIFEST_PK_HASH_MASK,
            fuses.key_manifest_pk_hash_mask,
        )?;
        self.soc_ifc_write_words(regs::FUSE_OWNER_PK_HASH, &fuses.owner_pk_hash)?;
        self.soc_ifc_write(
            regs::FUSE_FMC_KEY_MANIFEST_SVN,
            fuses.fmc_key_manifest_svn,
        )?;
        self.soc_ifc_write_words(regs::FUSE_RUNTIME_SVN, &fuses.runtime_svn)?;
        self.soc_ifc_write(
            regs::FUSE_ANTI_ROLLBACK_DISABLE,
            u32::from(fuses.anti_rollback_disable),
        )?;
        self.soc_ifc_write_words(regs::FUSE_IDEVID_CERT_ATTR, &fuses.idevid_cert_attr)?;
        self.soc_ifc_write_words(regs::FUSE_IDEVID_MANUF_HSM_ID, &fuses.idevid_manuf_hsm_id)?;
        self.soc_ifc_write(regs::FUSE_LIFE_CYCLE, fuses.life_cycle.into())?;
        self.soc_ifc_write(regs::FUSE_LMS_VERIFY, u32::from(fuses.lms_verify))?;
        self.soc_ifc_write(regs::FUSE_LMS_REVOCATION, fuses.fuse_lms_revocation)?;
        self.soc_ifc_write(
            regs::FUSE_SOC_STEPPING_ID,
            u32::from(fuses.soc_stepping_id),
        )?;

        self.soc_ifc_write(regs::CPTRA_FUSE_WR_DONE, 1)?;

        if self.soc_ifc_read(regs::CPTRA_FUSE_WR_DONE)? & 1 == 0 {
            return Err(CaliptraApiError::FuseDoneNotSet);
        }
        log::debug!("fuses written and locked");
        Ok(())
    }

    /// Blocks until the ROM reports it is ready to receive firmware.
    fn ready_for_firmware(&mut self) -> Result<(), CaliptraApiError> {
        if self.wait_for_flow_status(FlowStatus::READY_FOR_MB_PROCESSING)? {
            Ok(())
        } else {
            Err(CaliptraApiError::ReadyForFirmwareTimeout {
                cycles: Self::MAX_WAIT_CYCLES,
            })
        }
    }

    /// Sends a firmware bundle with FIRMWARE_LOAD. Returns once the ROM has
    /// acknowledged the transfer; runtime boot continues afterwards.
    ///
    /// A rejected bundle is reported with the ROM's error code, taken from
    /// the fatal error register or, if that is clear, the non-fatal one.
    fn upload_fw(&mut self, bundle: &[u8]) -> Result<(), CaliptraApiError> {
        log::debug!("uploading {} byte firmware bundle", bundle.len());
        match self.mailbox_execute(CommandId::FIRMWARE_LOAD.into(), bundle, &mut []) {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(CaliptraApiError::UploadFirmwareUnexpectedResponse),
            Err(CaliptraApiError::MailboxCmdFailed) => {
                let fatal = self.read_fw_fatal_error()?;
                let code = if fatal != 0 {
                    fatal
                } else {
                    self.read_fw_non_fatal_error()?
                };
                Err(CaliptraApiError::UploadFirmwareFailed(code))
            }
            Err(err) => Err(err),
        }
    }

    /// Sends an INVOKE_DPE request. The checksum of `req` is filled in
    /// here. With `async_` set this returns right after the doorbell and
    /// the caller finishes with [`SocManager::complete_dpe_command`].
    fn invoke_dpe_command(
        &mut self,
        req: &mut InvokeDpeReq,
        resp: &mut InvokeDpeResp,
        async_: bool,
    ) -> Result<(), CaliptraApiError> {
        req.populate_chksum()?;
        self.start_mailbox_execute(CommandId::INVOKE_DPE.into(), req.as_bytes_partial()?)?;
        if async_ {
            return Ok(());
        }
        self.complete_dpe_command(resp)
    }

    /// Waits for an INVOKE_DPE response and validates its header.
    fn complete_dpe_command(&mut self, resp: &mut InvokeDpeResp) -> Result<(), CaliptraApiError> {
        let len = self
            .finish_mailbox_execute(resp.as_mut_bytes())?
            .ok_or(CaliptraApiError::MailboxNoResponseData)?;

        if len < InvokeDpeResp::HEADER_SIZE {
            return Err(CaliptraApiError::MailboxUnexpectedResponseLen { actual: len as u32 });
        }

        let actual_checksum = calc_checksum(0, &resp.as_bytes()[size_of::<u32>()..len]);
        if actual_checksum != resp.hdr.chksum {
            return Err(CaliptraApiError::MailboxRespInvalidChecksum {
                expected: resp.hdr.chksum,
                actual: actual_checksum,
            });
        }
        if resp.hdr.fips_status != MailboxRespHeader::FIPS_STATUS_APPROVED {
            return Err(CaliptraApiError::MailboxRespInvalidFipsStatus(
                resp.hdr.fips_status,
            ));
        }

        let available = len - InvokeDpeResp::HEADER_SIZE;
        if resp.data_size as usize > available {
            return Err(CaliptraApiError::MailboxRespDataLenTooLarge {
                data_size: resp.data_size,
                available: available as u32,
            });
        }
        Ok(())
    }

    fn read_fw_non_fatal_error(&mut self) -> Result<u32, CaliptraApiError> {
        self.soc_ifc_read(regs::CPTRA_FW_ERROR_NON_FATAL)
    }

    fn read_fw_fatal_error(&mut self) -> Result<u32, CaliptraApiError> {
        self.soc_ifc_read(regs::CPTRA_FW_ERROR_FATAL)
    }

    /// Executes `cmd` with request data `buf`. Returns `Ok(Some(len))` if
    /// the uC responded with `len` bytes now in `resp_data`, `Ok(None)` if
    /// the uC indicated success without data,
    /// Err(CaliptraApiError::MailboxCmdFailed) if the microcontroller
    /// responded with an error, or other errors if there was a problem
    /// communicating with the mailbox. The firmware error registers are
    /// left for the caller to consult.
    fn mailbox_execute(
        &mut self,
        cmd: u32,
        buf: &[u8],
        resp_data: &mut [u8],
    ) -> Result<Option<usize>, CaliptraApiError> {
        self.start_mailbox_execute(cmd, buf)?;
        self.finish_mailbox_execute(resp_data)
    }

    /// Send a command to the mailbox but don't wait for the response
    fn start_mailbox_execute(&mut self, cmd: u32, buf: &[u8]) -> Result<(), CaliptraApiError> {
        let dlen = u32::try_from(buf.len())
            .ok()
            .filter(|len| *len <= MBOX_SIZE)
            .ok_or(CaliptraApiError::BufferTooLargeForMailbox)?;

        // Read a 0 to get the lock
        if self.mbox_read(mbox::LOCK)? & 1 != 0 {
            return Err(CaliptraApiError::UnableToLockMailbox);
        }

        // Mailbox lock value should read 1 now
        // If not, the reads are likely being blocked by the user check or some other issue
        if self.mbox_read(mbox::LOCK)? & 1 == 0 {
            return Err(CaliptraApiError::UnableToReadMailbox);
        }

        log::debug!("mailbox cmd 0x{cmd:08x}, {dlen} bytes");
        self.mbox_write(mbox::CMD, cmd)?;
        self.mbox_write(mbox::DLEN, dlen)?;
        for chunk in buf.chunks(size_of::<u32>()) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.mbox_write(mbox::DATAIN, u32::from_le_bytes(word))?;
        }

        // Ask the microcontroller to execute this command
        self.mbox_write(mbox::EXECUTE, 1)
    }

    fn finish_mailbox_execute(
        &mut self,
        resp_data: &mut [u8],
    ) -> Result<Option<usize>, CaliptraApiError> {
        // Wait for the microcontroller to finish executing
        let mut timeout_cycles = Self::MAX_WAIT_CYCLES;
        let status = loop {
            let status = MboxStatusReg::new(self.mbox_read(mbox::STATUS)?);
            if !status.matches_all(MboxStatus::STATUS::CMD_BUSY) {
                break status;
            }
            if timeout_cycles == 0 {
                return Err(CaliptraApiError::MailboxTimeout);
            }
            timeout_cycles -= 1;
            self.wait();
        };

        let state: Option<MboxStatus::STATUS::Value> = status.read_as_enum(MboxStatus::STATUS);
        match state {
            Some(MboxStatus::STATUS::Value::CMD_FAILURE) => {
                self.mbox_write(mbox::EXECUTE, 0)?;
                log::debug!("mailbox command failed");
                return Err(CaliptraApiError::MailboxCmdFailed);
            }
            Some(MboxStatus::STATUS::Value::CMD_COMPLETE) => {
                self.mbox_write(mbox::EXECUTE, 0)?;
                return Ok(None);
            }
            Some(MboxStatus::STATUS::Value::DATA_READY) => {}
            _ => return Err(CaliptraApiError::UnknownCommandStatus(status.get())),
        }

        let res = self.mbox_read_fifo(resp_data);

        self.mbox_write(mbox::EXECUTE, 0)?;

        let len = res?;
        log::debug!("mailbox response, {len} bytes");
        Ok(Some(len))
    }

    /// Drains DLEN bytes of DATAOUT into `buf`.
    fn mbox_read_fifo(&mut self, buf: &mut [u8]) -> Result<usize, CaliptraApiError> {
        let dlen = self.mbox_read(mbox::DLEN)?;
        let capacity = buf.len() as u32;
        let buf = buf
            .get_mut(..dlen as usize)
            .ok_or(CaliptraApiError::MailboxRespTooLarge { dlen, capacity })?;
        for chunk in buf.chunks_mut(size_of::<u32>()) {
            let word = self.mbox_read(mbox::DATAOUT)?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(dlen as usize)
    }
}
