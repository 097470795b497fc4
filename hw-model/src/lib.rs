// Licensed under the Apache-2.0 license

mod bus;
mod bus_logger;
pub mod dpe;
mod mailbox;
mod model_emulated;
mod soc_ifc;

pub use bus::{Bus, BusError, RvAddr, RvData, RvSize};
pub use bus_logger::BusLogger;
pub use mailbox::States as MailboxState;
pub use model_emulated::{EmulatedApbBus, FwStage, ModelEmulated};

use thiserror::Error;

/// The model used when nothing else was asked for.
pub type DefaultHwModel = ModelEmulated;

#[derive(Clone, Copy, Debug, Default)]
pub struct InitParams<'a> {
    // The contents of the boot ROM
    pub rom: &'a [u8],

    // Value reported in the mailbox USER register for SoC requests
    pub soc_user: u32,

    // Trace every APB access through `log`
    pub trace_bus: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("ROM image is empty")]
    EmptyRom,
}

// Represents a emulator or simulation of the caliptra hardware, to be called
// from tests.
pub trait HwModel {
    type TBus<'a>: Bus
    where
        Self: 'a;

    /// Creates a model held in reset. Nothing runs until the SoC sets
    /// CPTRA_BOOTFSM_GO and the model is stepped.
    fn new_unbooted(params: InitParams) -> Result<Self, ModelError>
    where
        Self: Sized;

    /// The APB bus from the SoC to Caliptra
    ///
    /// WARNING: Reading or writing to this bus does not advance the clock;
    /// call `step()` to let the firmware react.
    fn apb_bus(&mut self) -> Self::TBus<'_>;

    /// Step execution ahead one clock cycle.
    fn step(&mut self);

    /// Number of `step()` calls since construction.
    fn cycle_count(&self) -> u64;

    /// Execute until the result of `predicate` becomes true.
    fn step_until(&mut self, mut predicate: impl FnMut(&mut Self) -> bool) {
        while !predicate(self) {
            self.step();
        }
    }
}
