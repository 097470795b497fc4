/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Numeric error codes reported by the device firmware through the
    CPTRA_FW_ERROR_FATAL and CPTRA_FW_ERROR_NON_FATAL registers.

--*/
use core::num::{NonZeroU32, TryFromIntError};
use std::fmt;

/// Caliptra Error Type
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CaliptraError(pub NonZeroU32);

/// Defines the error constants together with a name lookup table.
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: CaliptraError = CaliptraError::new_const($value);
        )*

        const ALL: &'static [(&'static str, u32, &'static str)] = &[
            $((stringify!($name), $value, $doc),)*
        ];
    };
}

impl CaliptraError {
    /// Only usable from const contexts; a zero value fails the build.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("CaliptraError cannot be 0"),
        }
    }

    define_error_constants![
        (
            FW_PROC_INVALID_IMAGE_SIZE,
            0x01020002,
            "Firmware Processor Error: Invalid image size"
        ),
        (
            FW_PROC_MAILBOX_INVALID_COMMAND,
            0x01020004,
            "Firmware Processor Error: Mailbox invalid command"
        ),
        (
            RUNTIME_UNIMPLEMENTED_COMMAND,
            0x000E0002,
            "Runtime Error: Unimplemented command"
        ),
        (
            RUNTIME_INVALID_CHECKSUM,
            0x000E0005,
            "Runtime Error: Invalid checksum"
        ),
        (
            RUNTIME_MAILBOX_INVALID_PARAMS,
            0x000E000B,
            "Runtime Error: Mailbox invalid params"
        ),
        (
            RUNTIME_DPE_COMMAND_DESERIALIZATION_FAILED,
            0x000E0027,
            "Runtime Error: DPE command deserialization failed"
        ),
        (
            RUNTIME_MAILBOX_API_REQUEST_DATA_LEN_TOO_LARGE,
            0x000E0034,
            "Runtime Error: Mailbox API request data length too large"
        ),
    ];

    /// The constant name of a known error code.
    pub fn name(self) -> Option<&'static str> {
        Self::lookup(self.0.get()).map(|(name, _, _)| name)
    }

    fn lookup(val: u32) -> Option<(&'static str, u32, &'static str)> {
        Self::ALL.iter().copied().find(|(_, v, _)| *v == val)
    }
}

impl fmt::Display for CaliptraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::lookup(self.0.get()) {
            Some((_, val, doc)) => write!(f, "{doc} (0x{val:08x})"),
            None => write!(f, "Unknown error 0x{:08x}", self.0.get()),
        }
    }
}

impl std::error::Error for CaliptraError {}

impl From<CaliptraError> for u32 {
    fn from(val: CaliptraError) -> Self {
        val.0.get()
    }
}

impl TryFrom<u32> for CaliptraError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        NonZeroU32::try_from(val).map(CaliptraError)
    }
}

pub type CaliptraResult<T> = Result<T, CaliptraError>;
