/*++

Licensed under the Apache-2.0 license.

File Name:

    lifecycle.rs

Abstract:

    Owns one hardware model and walks it from construction through fuse
    provisioning and firmware upload to the point where it accepts DPE
    commands.

--*/

use crate::config::HarnessConfig;
use crate::regs::ModelRegisters;
use caliptra_api::{CaliptraApiError, Fuses, SocManager};
use caliptra_hw_model::{DefaultHwModel, HwModel, InitParams, ModelError};
use smlang::statemachine;
use std::path::{Path, PathBuf};

pub const DEFAULT_UDS_SEED: [u32; 12] = [
    0x00010203, 0x04050607, 0x08090a0b, 0x0c0d0e0f, 0x10111213, 0x14151617, 0x18191a1b,
    0x1c1d1e1f, 0x20212223, 0x24252627, 0x28292a2b, 0x2c2d2e2f,
];

pub const DEFAULT_FIELD_ENTROPY: [u32; 8] = [
    0x80818283, 0x84858687, 0x88898a8b, 0x8c8d8e8f, 0x90919293, 0x94959697, 0x98999a9b,
    0x9c9d9e9f,
];

statemachine! {
    derive_states: [Clone, Copy, Debug],
    transitions: {
        // CurrentState Event = NextState

        *Uninitialized + Construct = Constructed,
        Destroyed + Construct = Constructed,

        Constructed + BootFsmGo = BootFsmRunning,
        BootFsmRunning + FusesWritten = FusesSet,
        FusesSet + FirmwareReady = ReadyForFirmware,
        ReadyForFirmware + FirmwareUploaded = FirmwareLoaded,

        // teardown is allowed from anywhere
        Uninitialized + Destroy = Destroyed,
        Constructed + Destroy = Destroyed,
        BootFsmRunning + Destroy = Destroyed,
        FusesSet + Destroy = Destroyed,
        ReadyForFirmware + Destroy = Destroyed,
        FirmwareLoaded + Destroy = Destroyed,
        Destroyed + Destroy = Destroyed,
    }
}

/// State machine extended variables.
pub struct Context;

impl StateMachineContext for Context {}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("unable to read {kind} image {}: {source}", .path.display())]
    ReadImage {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to initialize caliptra model: {0}")]
    CreateModel(#[from] ModelError),
    #[error("failed to start the boot FSM: {0}")]
    BootFsm(#[source] CaliptraApiError),
    #[error("failed to set fuses: {0}")]
    Fuses(#[source] CaliptraApiError),
    #[error("device never became ready for firmware: {0}")]
    ReadyForFirmware(#[source] CaliptraApiError),
    #[error("failed to upload firmware: {0}")]
    UploadFirmware(#[source] CaliptraApiError),
    #[error("{event} is not allowed in lifecycle state {state:?}")]
    InvalidTransition { state: States, event: &'static str },
}

/// Creates hardware models. Tests substitute their own to observe or
/// fake construction.
pub trait ModelBuilder {
    type Model: HwModel;

    fn build(&mut self, params: InitParams) -> Result<Self::Model, ModelError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultModelBuilder;

impl ModelBuilder for DefaultModelBuilder {
    type Model = DefaultHwModel;

    fn build(&mut self, params: InitParams) -> Result<Self::Model, ModelError> {
        DefaultHwModel::new_unbooted(params)
    }
}

/// Builds the fuse bank used by the verification harness: fixed UDS seed
/// and field entropy plus the two key hashes.
///
/// `owner_pk_hash` is laid out as little-endian words and is provisioned
/// with every word byte-swapped; `vendor_pk_hash` is copied as-is.
pub fn harness_fuses(vendor_pk_hash: &[u8; 48], owner_pk_hash: &[u8; 48]) -> Fuses {
    let mut fuses = Fuses {
        uds_seed: DEFAULT_UDS_SEED,
        field_entropy: DEFAULT_FIELD_ENTROPY,
        ..Default::default()
    };
    for (word, bytes) in fuses
        .owner_pk_hash
        .iter_mut()
        .zip(owner_pk_hash.chunks_exact(4))
    {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).swap_bytes();
    }
    for (word, bytes) in fuses
        .key_manifest_pk_hash
        .iter_mut()
        .zip(vendor_pk_hash.chunks_exact(4))
    {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    fuses
}

fn read_image(kind: &'static str, path: &Path) -> Result<Vec<u8>, LifecycleError> {
    std::fs::read(path).map_err(|source| LifecycleError::ReadImage {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

/// One device under test.
///
/// The model is created lazily from the configured ROM and dropped again
/// by [`DeviceContext::power_off`]; a later power-on builds a fresh one.
pub struct DeviceContext<B: ModelBuilder = DefaultModelBuilder> {
    config: HarnessConfig,
    builder: B,
    model: Option<B::Model>,
    lifecycle: StateMachine<Context>,
}

impl DeviceContext {
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_builder(config, DefaultModelBuilder)
    }
}

impl<B: ModelBuilder> DeviceContext<B> {
    pub fn with_builder(config: HarnessConfig, builder: B) -> Self {
        Self {
            config,
            builder,
            model: None,
            lifecycle: StateMachine::new(Context),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn state(&self) -> States {
        *self.lifecycle.state()
    }

    pub fn is_constructed(&self) -> bool {
        self.model.is_some()
    }

    /// True once firmware has been handed to the device.
    pub fn is_operational(&self) -> bool {
        self.state() == States::FirmwareLoaded
    }

    /// Returns the model, building it from the ROM image if needed.
    pub fn model(&mut self) -> Result<&mut B::Model, LifecycleError> {
        let model = match self.model.take() {
            Some(model) => model,
            None => self.construct()?,
        };
        Ok(self.model.insert(model))
    }

    /// SoC register access to the live model, if there is one.
    pub fn registers(&mut self) -> Option<ModelRegisters<'_, B::Model>> {
        self.model.as_mut().map(ModelRegisters::new)
    }

    /// Boots the device up to firmware upload. Does nothing if it is already
    /// operational.
    pub fn power_on(&mut self) -> Result<(), LifecycleError> {
        if self.is_operational() {
            log::debug!("device already powered on");
            return Ok(());
        }
        let mut model = match self.model.take() {
            Some(model) => model,
            None => self.construct()?,
        };
        let result = self.boot(&mut model);
        self.model = Some(model);
        result
    }

    /// Drops the model. Safe from any state, including before power-on.
    pub fn power_off(&mut self) -> Result<(), LifecycleError> {
        if self.model.take().is_some() {
            log::info!("caliptra model destroyed");
        }
        self.advance(Events::Destroy, "Destroy")
    }

    fn construct(&mut self) -> Result<B::Model, LifecycleError> {
        let rom = read_image("ROM", &self.config.rom_path)?;
        let model = self.builder.build(InitParams {
            rom: &rom,
            soc_user: self.config.soc_user,
            ..Default::default()
        })?;
        self.advance(Events::Construct, "Construct")?;
        log::info!(
            "caliptra model created from {} ({} byte ROM)",
            self.config.rom_path.display(),
            rom.len()
        );
        Ok(model)
    }

    fn boot(&mut self, model: &mut B::Model) -> Result<(), LifecycleError> {
        let mut soc = ModelRegisters::new(model);

        soc.bootfsm_go().map_err(LifecycleError::BootFsm)?;
        self.advance(Events::BootFsmGo, "BootFsmGo")?;

        let fuses = harness_fuses(&self.config.vendor_pk_hash, &self.config.owner_pk_hash);
        soc.init_fuses(&fuses).map_err(LifecycleError::Fuses)?;
        self.advance(Events::FusesWritten, "FusesWritten")?;

        soc.ready_for_firmware()
            .map_err(LifecycleError::ReadyForFirmware)?;
        self.advance(Events::FirmwareReady, "FirmwareReady")?;

        let firmware = read_image("firmware", &self.config.fw_path)?;
        soc.upload_fw(&firmware)
            .map_err(LifecycleError::UploadFirmware)?;
        self.advance(Events::FirmwareUploaded, "FirmwareUploaded")?;

        log::info!("uploaded {} byte firmware bundle", firmware.len());
        Ok(())
    }

    fn advance(&mut self, event: Events, name: &'static str) -> Result<(), LifecycleError> {
        let state = self.state();
        match self.lifecycle.process_event(event) {
            Ok(next) => {
                log::debug!("lifecycle {state:?} -> {next:?}");
                Ok(())
            }
            Err(_) => Err(LifecycleError::InvalidTransition { state, event: name }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caliptra_hw_model::{FwStage, ModelEmulated};
    use std::fs;
    use tempfile::TempDir;

    struct CountingBuilder {
        builds: usize,
        rom_len: usize,
    }

    impl ModelBuilder for CountingBuilder {
        type Model = ModelEmulated;

        fn build(&mut self, params: InitParams) -> Result<ModelEmulated, ModelError> {
            self.builds += 1;
            self.rom_len = params.rom.len();
            ModelEmulated::new_unbooted(params)
        }
    }

    fn images(dir: &TempDir, rom: &[u8], fw: &[u8]) -> HarnessConfig {
        let rom_path = dir.path().join("rom.bin");
        let fw_path = dir.path().join("image.bin");
        fs::write(&rom_path, rom).unwrap();
        fs::write(&fw_path, fw).unwrap();
        HarnessConfig::new(rom_path, fw_path)
    }

    fn counting_context(config: HarnessConfig) -> DeviceContext<CountingBuilder> {
        DeviceContext::with_builder(
            config,
            CountingBuilder {
                builds: 0,
                rom_len: 0,
            },
        )
    }

    #[test]
    fn test_owner_hash_is_byte_swapped() {
        let mut owner = [0u8; 48];
        for (i, b) in owner.iter_mut().enumerate() {
            *b = i as u8;
        }
        let vendor = owner;
        let fuses = harness_fuses(&vendor, &owner);

        assert_eq!(fuses.owner_pk_hash[0], 0x00010203);
        assert_eq!(fuses.owner_pk_hash[1], 0x04050607);
        assert_eq!(fuses.owner_pk_hash[11], 0x2c2d2e2f);
        assert_eq!(fuses.key_manifest_pk_hash[0], 0x03020100);
        assert_eq!(fuses.key_manifest_pk_hash[11], 0x2f2e2d2c);
        assert_eq!(fuses.uds_seed, DEFAULT_UDS_SEED);
        assert_eq!(fuses.field_entropy, DEFAULT_FIELD_ENTROPY);
        assert!(!fuses.anti_rollback_disable);
    }

    #[test]
    fn test_model_is_built_once() {
        let dir = TempDir::new().unwrap();
        let mut device = counting_context(images(&dir, &[0x6f; 32], &[0xaa; 64]));
        assert_eq!(device.state(), States::Uninitialized);
        assert!(device.registers().is_none());

        device.model().unwrap();
        device.model().unwrap();
        assert_eq!(device.builder().builds, 1);
        assert_eq!(device.builder().rom_len, 32);
        assert_eq!(device.state(), States::Constructed);
    }

    #[test]
    fn test_power_on_and_off() {
        let dir = TempDir::new().unwrap();
        let mut device = counting_context(images(&dir, &[0x6f; 32], &[0xaa; 64]));

        device.power_on().unwrap();
        assert!(device.is_operational());
        assert_eq!(device.model().unwrap().firmware_len(), 64);
        // releasing the mailbox after the upload lets the runtime start booting
        assert!(matches!(
            device.model().unwrap().stage(),
            FwStage::RuntimeBoot { .. }
        ));

        device.power_on().unwrap();
        assert_eq!(device.builder().builds, 1);

        device.power_off().unwrap();
        assert_eq!(device.state(), States::Destroyed);
        assert!(!device.is_constructed());

        device.power_on().unwrap();
        assert_eq!(device.builder().builds, 2);
        assert!(device.is_operational());
    }

    #[test]
    fn test_power_off_before_power_on() {
        let dir = TempDir::new().unwrap();
        let mut device = counting_context(images(&dir, &[0x6f; 32], &[0xaa; 64]));
        device.power_off().unwrap();
        device.power_off().unwrap();
        assert_eq!(device.state(), States::Destroyed);
        assert_eq!(device.builder().builds, 0);
    }

    #[test]
    fn test_missing_images() {
        let dir = TempDir::new().unwrap();
        let mut device = counting_context(HarnessConfig::new(
            dir.path().join("missing-rom.bin"),
            dir.path().join("missing-image.bin"),
        ));
        assert!(matches!(
            device.power_on(),
            Err(LifecycleError::ReadImage { kind: "ROM", .. })
        ));
        assert_eq!(device.builder().builds, 0);
        assert_eq!(device.state(), States::Uninitialized);

        let mut device = counting_context(images(&dir, &[0x6f; 32], &[]));
        fs::remove_file(dir.path().join("image.bin")).unwrap();
        assert!(matches!(
            device.power_on(),
            Err(LifecycleError::ReadImage {
                kind: "firmware",
                ..
            })
        ));
        // the model survives a failed power-on
        assert!(device.is_constructed());
        assert_eq!(device.state(), States::ReadyForFirmware);
    }

    #[test]
    fn test_empty_rom_fails_construction() {
        let dir = TempDir::new().unwrap();
        let mut device = counting_context(images(&dir, &[], &[0xaa; 64]));
        assert!(matches!(
            device.model(),
            Err(LifecycleError::CreateModel(ModelError::EmptyRom))
        ));
        assert_eq!(device.state(), States::Uninitialized);
    }

    #[test]
    fn test_empty_firmware_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut device = counting_context(images(&dir, &[0x6f; 32], &[]));
        let err = device.power_on().unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::UploadFirmware(CaliptraApiError::UploadFirmwareFailed(0x01020002))
        ));
    }
}
