// Licensed under the Apache-2.0 license

use crate::CaliptraApiError;
use core::mem::size_of;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandId(pub u32);

impl CommandId {
    pub const FIRMWARE_LOAD: Self = Self(0x46574C44); // "FWLD"
    pub const INVOKE_DPE: Self = Self(0x44504543); // "DPEC"
}

impl From<u32> for CommandId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<CommandId> for u32 {
    fn from(value: CommandId) -> Self {
        value.0
    }
}

/// A request that can be sent through the mailbox.
pub trait Request: IntoBytes + FromBytes + Immutable + KnownLayout {
    const ID: CommandId;
}

/// Verify checksum
pub fn verify_checksum(checksum: u32, cmd: u32, data: &[u8]) -> bool {
    calc_checksum(cmd, data) == checksum
}

/// Calculate the checksum
/// 0 - (SUM(command code bytes) + SUM(request/response bytes))
pub fn calc_checksum(cmd: u32, data: &[u8]) -> u32 {
    let sum = cmd
        .to_le_bytes()
        .iter()
        .chain(data)
        .fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)));
    0u32.wrapping_sub(sum)
}

// HEADER
#[repr(C)]
#[derive(Default, Debug, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct MailboxReqHeader {
    pub chksum: u32,
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable, PartialEq, Eq, Clone)]
pub struct MailboxRespHeader {
    pub chksum: u32,
    pub fips_status: u32,
}

impl MailboxRespHeader {
    pub const FIPS_STATUS_APPROVED: u32 = 0;
}

impl Default for MailboxRespHeader {
    fn default() -> Self {
        Self {
            chksum: 0,
            fips_status: MailboxRespHeader::FIPS_STATUS_APPROVED,
        }
    }
}

// INVOKE_DPE_COMMAND
#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct InvokeDpeReq {
    pub hdr: MailboxReqHeader,
    pub data_size: u32,
    pub data: [u8; InvokeDpeReq::DATA_MAX_SIZE], // variable length
}

impl InvokeDpeReq {
    pub const DATA_MAX_SIZE: usize = 512;

    /// Header plus `data_size`, without the unused tail of `data`.
    pub fn as_bytes_partial(&self) -> Result<&[u8], CaliptraApiError> {
        let data_size = self.data_size as usize;
        if data_size > Self::DATA_MAX_SIZE {
            return Err(CaliptraApiError::InvalidParams);
        }
        let unused_byte_count = Self::DATA_MAX_SIZE - data_size;
        Ok(&self.as_bytes()[..size_of::<Self>() - unused_byte_count])
    }

    /// Computes the checksum over everything after the checksum word and
    /// stores it in the header.
    pub fn populate_chksum(&mut self) -> Result<(), CaliptraApiError> {
        let chksum = calc_checksum(
            Self::ID.into(),
            &self.as_bytes_partial()?[size_of::<u32>()..],
        );
        self.hdr.chksum = chksum;
        Ok(())
    }
}

impl Default for InvokeDpeReq {
    fn default() -> Self {
        Self {
            hdr: MailboxReqHeader::default(),
            data_size: 0,
            data: [0u8; InvokeDpeReq::DATA_MAX_SIZE],
        }
    }
}

impl Request for InvokeDpeReq {
    const ID: CommandId = CommandId::INVOKE_DPE;
}

#[repr(C)]
#[derive(Debug, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct InvokeDpeResp {
    pub hdr: MailboxRespHeader,
    pub data_size: u32,
    pub data: [u8; InvokeDpeResp::DATA_MAX_SIZE], // variable length
}

impl InvokeDpeResp {
    pub const DATA_MAX_SIZE: usize = 6556;
    pub const HEADER_SIZE: usize = size_of::<MailboxRespHeader>() + size_of::<u32>();

    /// Valid portion of `data`, as declared by `data_size`.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.get(..self.data_size as usize)
    }

    pub fn as_bytes_partial(&self) -> Result<&[u8], CaliptraApiError> {
        let data_size = self.data_size as usize;
        if data_size > Self::DATA_MAX_SIZE {
            return Err(CaliptraApiError::InvalidParams);
        }
        Ok(&self.as_bytes()[..Self::HEADER_SIZE + data_size])
    }

    /// Response checksums cover everything after the checksum word with a
    /// command id of zero.
    pub fn populate_chksum(&mut self) -> Result<(), CaliptraApiError> {
        let chksum = calc_checksum(0, &self.as_bytes_partial()?[size_of::<u32>()..]);
        self.hdr.chksum = chksum;
        Ok(())
    }
}

impl Default for InvokeDpeResp {
    fn default() -> Self {
        Self {
            hdr: MailboxRespHeader::default(),
            data_size: 0,
            data: [0u8; InvokeDpeResp::DATA_MAX_SIZE],
        }
    }
}
