// Licensed under the Apache-2.0 license

//! Minimal DPE responder used by the emulated runtime. It understands the
//! profile-independent command framing and answers GET_PROFILE; every
//! other command is rejected with `INVALID_COMMAND`.

use caliptra_error::CaliptraError;
use core::mem::size_of;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const DPE_COMMAND_MAGIC: u32 = u32::from_be_bytes(*b"DPEC");
pub const DPE_RESPONSE_MAGIC: u32 = u32::from_be_bytes(*b"DPER");

pub const DPE_PROFILE_P384_SHA384: u32 = 4;

pub const DPE_STATUS_OK: u32 = 0;
pub const DPE_STATUS_INVALID_COMMAND: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DpeCommandId(pub u32);

impl DpeCommandId {
    pub const GET_PROFILE: Self = Self(0x1);
    pub const INITIALIZE_CONTEXT: Self = Self(0x7);
    pub const DERIVE_CONTEXT: Self = Self(0x8);
    pub const CERTIFY_KEY: Self = Self(0x9);
    pub const SIGN: Self = Self(0xa);
    pub const ROTATE_CONTEXT_HANDLE: Self = Self(0xe);
    pub const DESTROY_CONTEXT: Self = Self(0xf);
    pub const GET_CERTIFICATE_CHAIN: Self = Self(0x10);
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct CommandHdr {
    pub magic: u32,
    pub cmd_id: u32,
    pub profile: u32,
}

impl CommandHdr {
    pub fn new(cmd_id: DpeCommandId) -> Self {
        Self {
            magic: DPE_COMMAND_MAGIC,
            cmd_id: cmd_id.0,
            profile: DPE_PROFILE_P384_SHA384,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct ResponseHdr {
    pub magic: u32,
    pub status: u32,
    pub profile: u32,
}

impl ResponseHdr {
    pub fn new(status: u32) -> Self {
        Self {
            magic: DPE_RESPONSE_MAGIC,
            status,
            profile: DPE_PROFILE_P384_SHA384,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct GetProfileResp {
    pub resp_hdr: ResponseHdr,
    pub major_version: u16,
    pub minor_version: u16,
    pub vendor_id: u32,
    pub vendor_sku: u32,
    pub max_tci_nodes: u32,
    pub flags: u32,
}

/// Identity the emulated DPE instance reports through GET_PROFILE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DpeProfile {
    pub major_version: u16,
    pub minor_version: u16,
    pub vendor_id: u32,
    pub vendor_sku: u32,
    pub max_tci_nodes: u32,
    pub flags: u32,
}

impl DpeProfile {
    /// Support bits: simulation, recursive, auto-init, rotate-context,
    /// x509, csr, internal-info, internal-dice, retain-parent-context and
    /// cdi-export.
    pub const CALIPTRA_FLAGS: u32 = (1 << 31)
        | (1 << 30)
        | (1 << 29)
        | (1 << 27)
        | (1 << 26)
        | (1 << 25)
        | (1 << 22)
        | (1 << 21)
        | (1 << 19)
        | (1 << 18);
}

impl Default for DpeProfile {
    fn default() -> Self {
        Self {
            major_version: 0,
            minor_version: 12,
            vendor_id: u32::from_be_bytes(*b"CTRA"),
            vendor_sku: u32::from_be_bytes(*b"CTRA"),
            max_tci_nodes: 24,
            flags: Self::CALIPTRA_FLAGS,
        }
    }
}

/// Result of running one DPE command: the response frame, plus the
/// runtime error to leave in the non-fatal register when the command was
/// rejected.
#[derive(Debug, PartialEq, Eq)]
pub struct DpeOutcome {
    pub response: Vec<u8>,
    pub non_fatal: Option<CaliptraError>,
}

pub fn execute_command(profile: &DpeProfile, cmd: &[u8]) -> DpeOutcome {
    let hdr = match CommandHdr::read_from_prefix(cmd) {
        Ok((hdr, _)) if hdr.magic == DPE_COMMAND_MAGIC => hdr,
        _ => return rejected(),
    };
    log::debug!("DPE command 0x{:x}", hdr.cmd_id);

    match DpeCommandId(hdr.cmd_id) {
        DpeCommandId::GET_PROFILE => {
            let resp = GetProfileResp {
                resp_hdr: ResponseHdr::new(DPE_STATUS_OK),
                major_version: profile.major_version,
                minor_version: profile.minor_version,
                vendor_id: profile.vendor_id,
                vendor_sku: profile.vendor_sku,
                max_tci_nodes: profile.max_tci_nodes,
                flags: profile.flags,
            };
            DpeOutcome {
                response: resp.as_bytes().to_vec(),
                non_fatal: None,
            }
        }
        _ => rejected(),
    }
}

fn rejected() -> DpeOutcome {
    DpeOutcome {
        response: ResponseHdr::new(DPE_STATUS_INVALID_COMMAND)
            .as_bytes()
            .to_vec(),
        non_fatal: Some(CaliptraError::RUNTIME_DPE_COMMAND_DESERIALIZATION_FAILED),
    }
}

pub const GET_PROFILE_RESP_SIZE: usize = size_of::<GetProfileResp>();
