// Licensed under the Apache-2.0 license

mod fuses;
pub mod mailbox;
pub mod soc_ifc;
mod soc_mgr;

pub use caliptra_error as error;

pub use fuses::{DeviceLifecycle, Fuses};
pub use mailbox::{calc_checksum, verify_checksum};
pub use soc_mgr::SocManager;

use thiserror::Error;

/// Failures of the SoC-side API. Each variant maps onto a stable numeric
/// code (see [`CaliptraApiError::code`]) so callers that only carry a
/// status word can still tell them apart.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CaliptraApiError {
    #[error("invalid parameters")]
    InvalidParams,
    #[error("register access failed with bus status {0}")]
    RegAccess(u32),
    #[error("device never reported ready for fuses")]
    NotReadyForFuses,
    #[error("fuses are already locked")]
    FusesAlreadyLocked,
    #[error("CPTRA_FUSE_WR_DONE did not latch")]
    FuseDoneNotSet,
    #[error("timed out after {cycles} cycles waiting for ready_for_fw")]
    ReadyForFirmwareTimeout { cycles: u32 },
    #[error("unable to lock the mailbox")]
    UnableToLockMailbox,
    #[error("mailbox lock did not read back as held")]
    UnableToReadMailbox,
    #[error("timed out waiting for the mailbox command to finish")]
    MailboxTimeout,
    #[error("mailbox command failed")]
    MailboxCmdFailed,
    #[error("unknown mailbox status 0x{0:08x}")]
    UnknownCommandStatus(u32),
    #[error("mailbox command completed without response data")]
    MailboxNoResponseData,
    #[error("response of {dlen} bytes does not fit the {capacity} byte buffer")]
    MailboxRespTooLarge { dlen: u32, capacity: u32 },
    #[error("response shorter than its header ({actual} bytes)")]
    MailboxUnexpectedResponseLen { actual: u32 },
    #[error("response checksum 0x{expected:08x} does not match computed 0x{actual:08x}")]
    MailboxRespInvalidChecksum { expected: u32, actual: u32 },
    #[error("response FIPS status 0x{0:08x} is not approved")]
    MailboxRespInvalidFipsStatus(u32),
    #[error("response declares {data_size} data bytes but only {available} are available")]
    MailboxRespDataLenTooLarge { data_size: u32, available: u32 },
    #[error("buffer too large for the mailbox")]
    BufferTooLargeForMailbox,
    #[error("firmware upload returned unexpected response data")]
    UploadFirmwareUnexpectedResponse,
    #[error("firmware upload failed with firmware error 0x{0:08x}")]
    UploadFirmwareFailed(u32),
}

impl CaliptraApiError {
    /// Numeric status for this error: 0x1xx general, 0x2xx boot and fuses,
    /// 0x3xx mailbox.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidParams => 0x100,
            Self::RegAccess(_) => 0x102,
            Self::NotReadyForFuses => 0x200,
            Self::FusesAlreadyLocked => 0x201,
            Self::FuseDoneNotSet => 0x202,
            Self::ReadyForFirmwareTimeout { .. } => 0x203,
            Self::UnableToLockMailbox => 0x300,
            Self::UnableToReadMailbox => 0x301,
            Self::MailboxTimeout => 0x302,
            Self::MailboxCmdFailed => 0x303,
            Self::UnknownCommandStatus(_) => 0x304,
            Self::MailboxNoResponseData => 0x305,
            Self::MailboxRespTooLarge { .. } => 0x306,
            Self::MailboxRespInvalidChecksum { .. } => 0x307,
            Self::MailboxRespInvalidFipsStatus(_) => 0x308,
            Self::MailboxRespDataLenTooLarge { .. } => 0x309,
            Self::BufferTooLargeForMailbox => 0x30a,
            Self::UploadFirmwareUnexpectedResponse => 0x30b,
            Self::MailboxUnexpectedResponseLen { .. } => 0x30c,
            Self::UploadFirmwareFailed(_) => 0x30d,
        }
    }
}
