//! Gadget volume model, role registry, and validation profiles.
//!
//! This crate defines the schema layer: the in-memory gadget description
//! (`Info`, `Volume`, `VolumeStructure`, `Content`), partition type codes and
//! offset-write references (`PartitionType`, `RelativeOffset`), the static
//! role registry consulted by the validator (`ROLE_RULES`, `LabelScheme`),
//! and the device model / deployment constraint inputs that can be loaded
//! from a TOML validation profile.

pub mod model;
pub mod profile;
pub mod roles;
pub mod types;

pub use model::{
    Content, Filesystem, FilesystemContent, Info, ModelCharacteristics, RawContent, Role, Schema,
    ValidationConstraints, Volume, VolumeStructure, GIB, KIB, MIB,
};
pub use profile::{parse_profile_file, parse_profile_str, ValidationProfile};
pub use roles::{
    reserved_label_owner, rule_for, LabelScheme, RoleRule, ROLE_RULES, UBUNTU_BOOT_LABEL,
    UBUNTU_DATA_LABEL, UBUNTU_SAVE_LABEL, UBUNTU_SEED_LABEL, WRITABLE_LABEL,
};
pub use types::{PartitionType, RelativeOffset};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read validation profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse validation profile: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid partition type {0:?}")]
    InvalidPartitionType(String),
    #[error("invalid offset-write reference {0:?}")]
    InvalidRelativeOffset(String),
}
