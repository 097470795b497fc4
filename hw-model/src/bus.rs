/*++

Licensed under the Apache-2.0 license.

File Name:

    bus.rs

Abstract:

    File contains definition of the Bus trait.

--*/

/// RISCV Data width
pub type RvData = u32;

/// RISCV Address width
pub type RvAddr = u32;

/// RISCV IO Operation size
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum RvSize {
    Byte = 1,
    HalfWord = 2,
    Word = 4,
}

impl From<RvSize> for usize {
    fn from(size: RvSize) -> Self {
        size as usize
    }
}

/// Bus faults, numbered after the RISC-V exception cause they raise.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum BusError {
    /// Load address misaligned exception
    LoadAddrMisaligned = 4,

    /// Load access fault exception
    LoadAccessFault = 5,

    /// Store address misaligned exception
    StoreAddrMisaligned = 6,

    /// Store access fault exception
    StoreAccessFault = 7,
}

impl From<BusError> for u32 {
    fn from(err: BusError) -> Self {
        err as u32
    }
}

/// Represents an abstract memory bus. Used to read and write from
/// peripheral addresses.
pub trait Bus {
    /// Read data of specified size from given address
    ///
    /// # Error
    ///
    /// * `BusError::LoadAccessFault` or `BusError::LoadAddrMisaligned`
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError>;

    /// Write data of specified size to given address
    ///
    /// # Error
    ///
    /// * `BusError::StoreAccessFault` or `BusError::StoreAddrMisaligned`
    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError>;
}

/// Checks that an access is a naturally aligned word, the only width the
/// SoC interface registers accept.
pub(crate) fn check_word_access(size: RvSize, addr: RvAddr, is_load: bool) -> Result<(), BusError> {
    match (size, addr & 3 == 0, is_load) {
        (RvSize::Word, true, _) => Ok(()),
        (RvSize::Word, false, true) => Err(BusError::LoadAddrMisaligned),
        (RvSize::Word, false, false) => Err(BusError::StoreAddrMisaligned),
        (_, _, true) => Err(BusError::LoadAccessFault),
        (_, _, false) => Err(BusError::StoreAccessFault),
    }
}
