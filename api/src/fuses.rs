// Licensed under the Apache-2.0 license

// Based on device_lifecycle_e from RTL
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceLifecycle {
    #[default]
    Unprovisioned = 0b00,
    Manufacturing = 0b01,
    Reserved2 = 0b10,
    Production = 0b11,
}

impl TryFrom<u32> for DeviceLifecycle {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0b00 => Ok(Self::Unprovisioned),
            0b01 => Ok(Self::Manufacturing),
            0b10 => Ok(Self::Reserved2),
            0b11 => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

impl From<DeviceLifecycle> for u32 {
    fn from(value: DeviceLifecycle) -> Self {
        value as u32
    }
}

/// Values written to the fuse registers before the ROM accepts firmware.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fuses {
    pub uds_seed: [u32; 12],
    pub field_entropy: [u32; 8],
    pub key_manifest_pk_hash: [u32; 12],
    pub key_manifest_pk_hash_mask: u32,
    pub owner_pk_hash: [u32; 12],
    pub fmc_key_manifest_svn: u32,
    pub runtime_svn: [u32; 4],
    pub anti_rollback_disable: bool,
    pub idevid_cert_attr: [u32; 24],
    pub idevid_manuf_hsm_id: [u32; 4],
    pub life_cycle: DeviceLifecycle,
    pub lms_verify: bool,
    pub fuse_lms_revocation: u32,
    pub soc_stepping_id: u16,
}
