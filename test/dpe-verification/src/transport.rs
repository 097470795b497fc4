/*++

Licensed under the Apache-2.0 license.

File Name:

    transport.rs

Abstract:

    The `Transport` contract the DPE verification suite runs against, and
    its implementation on top of the Caliptra hardware model.

--*/

use crate::config::{ConfigError, HarnessConfig};
use crate::lifecycle::{DefaultModelBuilder, DeviceContext, LifecycleError, ModelBuilder};
use crate::mailbox::MailboxTransport;
use bitflags::bitflags;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to send DPE command, error 0x{0:08x}")]
    CommandDispatch(u32),
    #[error("Caliptra mailbox returned error 0x{0:08x}")]
    Device(u32),
    #[error("DPE command of {0} bytes does not fit the 512 byte request")]
    InvalidCommandSize(usize),
    #[error("device is not powered on")]
    NotPoweredOn,
}

bitflags! {
    /// Optional DPE features implemented by a profile, in GET_PROFILE flag
    /// bit order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Support: u32 {
        const SIMULATION = 1 << 31;
        const RECURSIVE = 1 << 30;
        const AUTO_INIT = 1 << 29;
        const ROTATE_CONTEXT = 1 << 27;
        const X509 = 1 << 26;
        const CSR = 1 << 25;
        const IS_SYMMETRIC = 1 << 24;
        const INTERNAL_INFO = 1 << 22;
        const INTERNAL_DICE = 1 << 21;
        const IS_CA = 1 << 20;
        const RETAIN_PARENT_CONTEXT = 1 << 19;
        const CDI_EXPORT = 1 << 18;
    }
}

impl Support {
    /// What Caliptra's DPE advertises.
    pub const CALIPTRA: Self = Self::SIMULATION
        .union(Self::RECURSIVE)
        .union(Self::AUTO_INIT)
        .union(Self::ROTATE_CONTEXT)
        .union(Self::X509)
        .union(Self::CSR)
        .union(Self::INTERNAL_INFO)
        .union(Self::INTERNAL_DICE)
        .union(Self::RETAIN_PARENT_CONTEXT)
        .union(Self::CDI_EXPORT);
}

/// A device (or simulator) the DPE verification suite can drive.
pub trait Transport {
    fn power_on(&mut self) -> Result<(), TransportError>;

    fn power_off(&mut self) -> Result<(), TransportError>;

    /// Whether `power_on` / `power_off` really start and stop the device.
    fn has_power_control(&self) -> bool;

    /// Sends one DPE command frame and returns the response frame.
    fn send_cmd(&mut self, cmd: &[u8]) -> Result<Vec<u8>, TransportError>;

    fn support(&self) -> Support;

    fn profile_major_version(&self) -> u16;

    fn profile_minor_version(&self) -> u16;

    fn profile_vendor_id(&self) -> u32;

    fn profile_vendor_sku(&self) -> u32;

    fn max_tci_nodes(&self) -> u32;

    fn is_initialized(&self) -> bool;

    fn set_is_initialized(&mut self, initialized: bool);

    fn supported_localities(&self) -> &[u32];

    fn has_locality_control(&self) -> bool;

    fn set_locality(&mut self, locality: u32);

    fn locality(&self) -> u32;
}

pub const SUPPORTED_LOCALITIES: [u32; 2] = [0, 1];

const PROFILE_MAJOR_VERSION: u16 = 0;
const PROFILE_MINOR_VERSION: u16 = 12;
const PROFILE_VENDOR_ID: u32 = u32::from_be_bytes(*b"CTRA");
const PROFILE_VENDOR_SKU: u32 = u32::from_be_bytes(*b"CTRA");
const MAX_TCI_NODES: u32 = 24;

/// `Transport` over a Caliptra hardware model.
///
/// Boot problems (missing images, model creation, fuses, firmware upload)
/// leave nothing to test, so `power_on` panics on them; command failures
/// are returned to the caller.
pub struct CptraModel<B: ModelBuilder = DefaultModelBuilder> {
    device: DeviceContext<B>,
    mailbox: MailboxTransport,
    locality: u32,
}

impl CptraModel {
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_builder(config, DefaultModelBuilder)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(HarnessConfig::from_env()?))
    }
}

impl<B: ModelBuilder> CptraModel<B> {
    pub fn with_builder(config: HarnessConfig, builder: B) -> Self {
        Self {
            device: DeviceContext::with_builder(config, builder),
            mailbox: MailboxTransport::new(),
            locality: 0,
        }
    }

    pub fn device(&self) -> &DeviceContext<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut DeviceContext<B> {
        &mut self.device
    }
}

fn fatal(err: LifecycleError) -> ! {
    log::error!("{err}");
    panic!("{err}");
}

impl<B: ModelBuilder> Transport for CptraModel<B> {
    fn power_on(&mut self) -> Result<(), TransportError> {
        if let Err(err) = self.device.power_on() {
            fatal(err);
        }
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), TransportError> {
        if let Err(err) = self.device.power_off() {
            fatal(err);
        }
        Ok(())
    }

    fn has_power_control(&self) -> bool {
        true
    }

    fn send_cmd(&mut self, cmd: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.device.is_operational() {
            return Err(TransportError::NotPoweredOn);
        }
        let mut soc = self
            .device
            .registers()
            .ok_or(TransportError::NotPoweredOn)?;
        self.mailbox.send_dpe_command(&mut soc, cmd)
    }

    fn support(&self) -> Support {
        Support::CALIPTRA
    }

    fn profile_major_version(&self) -> u16 {
        PROFILE_MAJOR_VERSION
    }

    fn profile_minor_version(&self) -> u16 {
        PROFILE_MINOR_VERSION
    }

    fn profile_vendor_id(&self) -> u32 {
        PROFILE_VENDOR_ID
    }

    fn profile_vendor_sku(&self) -> u32 {
        PROFILE_VENDOR_SKU
    }

    fn max_tci_nodes(&self) -> u32 {
        MAX_TCI_NODES
    }

    // The device initializes DPE itself while booting.
    fn is_initialized(&self) -> bool {
        true
    }

    fn set_is_initialized(&mut self, _initialized: bool) {}

    fn supported_localities(&self) -> &[u32] {
        &SUPPORTED_LOCALITIES
    }

    fn has_locality_control(&self) -> bool {
        false
    }

    fn set_locality(&mut self, locality: u32) {
        self.locality = locality;
    }

    fn locality(&self) -> u32 {
        self.locality
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caliptra_hw_model::dpe::DpeProfile;

    fn unpowered() -> CptraModel {
        CptraModel::new(HarnessConfig::new("missing-rom.bin", "missing-image.bin"))
    }

    #[test]
    fn test_profile_getters() {
        let mut model = unpowered();
        for _ in 0..2 {
            assert!(model.has_power_control());
            assert_eq!(model.profile_major_version(), 0);
            assert_eq!(model.profile_minor_version(), 12);
            assert_eq!(model.profile_vendor_id(), 0x43545241);
            assert_eq!(model.profile_vendor_sku(), 0x43545241);
            assert_eq!(model.max_tci_nodes(), 24);
            assert_eq!(model.supported_localities(), &[0, 1]);
            assert!(!model.has_locality_control());
            assert!(model.is_initialized());
            model.set_is_initialized(false);
        }
    }

    #[test]
    fn test_support_matches_device_profile() {
        let support = unpowered().support();
        assert_eq!(support.bits(), DpeProfile::CALIPTRA_FLAGS);
        assert_eq!(support.iter().count(), 10);
        assert!(support.contains(Support::SIMULATION | Support::CDI_EXPORT));
        assert!(!support.intersects(Support::IS_SYMMETRIC | Support::IS_CA));
    }

    #[test]
    fn test_locality_is_not_validated() {
        let mut model = unpowered();
        assert_eq!(model.locality(), 0);
        for locality in [1, 0x4f4e4e41, u32::MAX, 0] {
            model.set_locality(locality);
            assert_eq!(model.locality(), locality);
        }
    }

    #[test]
    fn test_send_before_power_on() {
        let mut model = unpowered();
        assert_eq!(
            model.send_cmd(&[0x43, 0x45, 0x50, 0x44]),
            Err(TransportError::NotPoweredOn)
        );
        // nothing was constructed on the way
        assert!(!model.device().is_constructed());
    }

    #[test]
    #[should_panic(expected = "unable to read ROM image")]
    fn test_power_on_without_rom_is_fatal() {
        let _ = unpowered().power_on();
    }
}
