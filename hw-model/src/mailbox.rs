/*++

Licensed under the Apache-2.0 license.

File Name:

    mailbox.rs

Abstract:

    Mailbox peripheral as seen from the SoC, plus the firmware-side hooks
    the emulated ROM and runtime use to consume requests and post
    responses.

--*/

use crate::bus::{BusError, RvData};
use caliptra_api::soc_ifc::{mbox, MboxStatus, MboxStatusReg, MBOX_SIZE};
use smlang::statemachine;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MailboxRequester {
    Caliptra,
    Soc(u32),
}

/// Command register value
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cmd(pub u32);

/// Data length
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataLength(pub u32);

/// Data In
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataIn(pub u32);

statemachine! {
    derive_states: [Clone, Copy, Debug],
    transitions: {
        // CurrentState Event [guard] / action = NextState

        // move from idle to rdy for command when lock is acquired.
        *Idle + RdLock(MailboxRequester) [is_not_locked] / lock = RdyForCmd,

        // move from rdy for cmd to rdy for dlen when cmd is written to.
        RdyForCmd + CmdWrite(Cmd) / set_cmd = RdyForDlen,

        // move from rdy for dlen to rdy for data when dlen is written to.
        RdyForDlen + DlenWrite(DataLength) / init_dlen = RdyForData,

        RdyForData + DataWrite(DataIn) / enqueue = RdyForData,

        // the SoC rings the doorbell and the microcontroller owns the mailbox
        RdyForData + SocExecSet = ExecUc,

        ExecUc + DataRead / dequeue = ExecUc,
        ExecUc + UcRespond(DataLength) / init_dlen = ExecUc,
        ExecUc + UcWrite(DataIn) / enqueue = ExecUc,
        ExecUc + SocExecClear [is_locked] / unlock = Idle,
    }
}

/// State machine extended variables.
pub struct Context {
    locked: bool,
    user: MailboxRequester,
    cmd: u32,
    dlen: u32,
    fifo: Fifo,
    status: MboxStatusReg,
    data_out: u32,
}

impl Context {
    fn new() -> Self {
        Self {
            locked: false,
            user: MailboxRequester::Caliptra,
            cmd: 0,
            dlen: 0,
            fifo: Fifo::default(),
            status: MboxStatusReg::new(0),
            data_out: 0,
        }
    }
}

impl StateMachineContext for Context {
    fn is_not_locked(&self, _user: &MailboxRequester) -> Result<bool, ()> {
        Ok(!self.locked)
    }

    fn is_locked(&self) -> Result<bool, ()> {
        Ok(self.locked)
    }

    fn lock(&mut self, user: MailboxRequester) -> Result<(), ()> {
        self.fifo.reset();
        self.locked = true;
        self.user = user;
        self.status.set(0);
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), ()> {
        self.locked = false;
        self.status.set(0);
        Ok(())
    }

    fn set_cmd(&mut self, cmd: Cmd) -> Result<(), ()> {
        self.cmd = cmd.0;
        Ok(())
    }

    fn init_dlen(&mut self, data_len: DataLength) -> Result<(), ()> {
        self.fifo.reset();
        self.dlen = data_len.0;
        self.fifo.latch_dlen(self.dlen);
        Ok(())
    }

    fn enqueue(&mut self, data_in: DataIn) -> Result<(), ()> {
        self.fifo.enqueue(data_in.0);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<(), ()> {
        if let Some(data_out) = self.fifo.dequeue() {
            self.data_out = data_out;
        }
        Ok(())
    }
}

/// Word-granular mailbox SRAM with separate read and write cursors.
#[derive(Default)]
pub struct Fifo {
    words: Vec<u32>,
    latched_dlen: u32,
    read_index: usize,
}

impl Fifo {
    const CAPACITY_WORDS: usize = MBOX_SIZE as usize / 4;

    fn latch_dlen(&mut self, dlen: u32) {
        self.latched_dlen = dlen.min(MBOX_SIZE);
    }

    fn enqueue(&mut self, element: u32) {
        // On buffer full condition, ignore the write.
        if self.words.len() < Self::CAPACITY_WORDS {
            self.words.push(element);
        }
    }

    fn dequeue(&mut self) -> Option<u32> {
        if self.read_index * 4 >= self.latched_dlen as usize {
            return None;
        }
        let element = self.words.get(self.read_index).copied().unwrap_or(0);
        self.read_index += 1;
        Some(element)
    }

    fn reset(&mut self) {
        self.words.clear();
        self.read_index = 0;
    }

    /// First `latched_dlen` bytes of the stored words.
    fn bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.resize(self.latched_dlen as usize, 0);
        bytes
    }
}

pub struct MailboxRegs {
    state_machine: StateMachine<Context>,
    soc_user: u32,
}

impl MailboxRegs {
    pub fn new(soc_user: u32) -> Self {
        Self {
            state_machine: StateMachine::new(Context::new()),
            soc_user,
        }
    }

    pub fn state(&self) -> States {
        *self.state_machine.state()
    }

    /// SoC-side register read at `offset` within the mailbox block.
    pub fn soc_read(&mut self, offset: u32) -> Result<RvData, BusError> {
        match offset {
            mbox::LOCK => {
                let user = MailboxRequester::Soc(self.soc_user);
                if self
                    .state_machine
                    .process_event(Events::RdLock(user))
                    .is_ok()
                {
                    Ok(0)
                } else {
                    Ok(1)
                }
            }
            mbox::USER => Ok(match self.state_machine.context().user {
                MailboxRequester::Soc(user) => user,
                MailboxRequester::Caliptra => 0,
            }),
            mbox::CMD => Ok(self.state_machine.context().cmd),
            mbox::DLEN => Ok(self.state_machine.context().dlen),
            mbox::DATAIN => Ok(0),
            mbox::DATAOUT => {
                let _ = self.state_machine.process_event(Events::DataRead);
                Ok(self.state_machine.context().data_out)
            }
            mbox::EXECUTE => Ok(u32::from(matches!(self.state(), States::ExecUc))),
            mbox::STATUS => Ok(self.read_status()),
            _ => Err(BusError::LoadAccessFault),
        }
    }

    /// SoC-side register write at `offset` within the mailbox block. Writes
    /// that are not legal in the current state are dropped, as the RTL
    /// does.
    pub fn soc_write(&mut self, offset: u32, val: RvData) -> Result<(), BusError> {
        let event = match offset {
            mbox::CMD => Events::CmdWrite(Cmd(val)),
            mbox::DLEN => Events::DlenWrite(DataLength(val)),
            mbox::DATAIN => Events::DataWrite(DataIn(val)),
            mbox::EXECUTE if val & 1 != 0 => Events::SocExecSet,
            mbox::EXECUTE => Events::SocExecClear,
            mbox::LOCK | mbox::USER | mbox::DATAOUT | mbox::STATUS => return Ok(()),
            _ => return Err(BusError::StoreAccessFault),
        };
        let _ = self.state_machine.process_event(event);
        Ok(())
    }

    fn read_status(&self) -> u32 {
        let ctx = self.state_machine.context();
        let mut result = ctx.status;
        result.modify(match self.state() {
            States::Idle => MboxStatus::MBOX_FSM_PS::MBOX_IDLE,
            States::RdyForCmd => MboxStatus::MBOX_FSM_PS::MBOX_RDY_FOR_CMD,
            States::RdyForDlen => MboxStatus::MBOX_FSM_PS::MBOX_RDY_FOR_DLEN,
            States::RdyForData => MboxStatus::MBOX_FSM_PS::MBOX_RDY_FOR_DATA,
            States::ExecUc => MboxStatus::MBOX_FSM_PS::MBOX_EXECUTE_UC,
        });
        if matches!(ctx.user, MailboxRequester::Soc(_)) && ctx.locked {
            result.modify(MboxStatus::SOC_HAS_LOCK::SET);
        }
        result.get()
    }

    /// A command the microcontroller has not answered yet.
    pub fn pending_request(&self) -> Option<(u32, Vec<u8>)> {
        let ctx = self.state_machine.context();
        let busy = ctx.status.matches_all(MboxStatus::STATUS::CMD_BUSY);
        if matches!(self.state(), States::ExecUc) && busy {
            Some((ctx.cmd, ctx.fifo.bytes()))
        } else {
            None
        }
    }

    /// Posts response data and flags DATA_READY.
    pub fn respond_data(&mut self, data: &[u8]) {
        let dlen = u32::try_from(data.len()).unwrap_or(MBOX_SIZE);
        let _ = self
            .state_machine
            .process_event(Events::UcRespond(DataLength(dlen)));
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let _ = self
                .state_machine
                .process_event(Events::UcWrite(DataIn(u32::from_le_bytes(word))));
        }
        self.set_status(MboxStatus::STATUS::DATA_READY.value);
    }

    pub fn complete(&mut self) {
        let _ = self
            .state_machine
            .process_event(Events::UcRespond(DataLength(0)));
        self.set_status(MboxStatus::STATUS::CMD_COMPLETE.value);
    }

    pub fn fail(&mut self) {
        let _ = self
            .state_machine
            .process_event(Events::UcRespond(DataLength(0)));
        self.set_status(MboxStatus::STATUS::CMD_FAILURE.value);
    }

    fn set_status(&mut self, status: u32) {
        self.state_machine
            .context_mut()
            .status
            .modify(MboxStatus::STATUS.val(status));
    }
}
