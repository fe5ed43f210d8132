//! Static role registry: reserved labels, accepted labels per layout scheme,
//! and per-volume cardinality of each recognized role.

use crate::model::{Info, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const UBUNTU_BOOT_LABEL: &str = "ubuntu-boot";
pub const UBUNTU_SEED_LABEL: &str = "ubuntu-seed";
pub const UBUNTU_DATA_LABEL: &str = "ubuntu-data";
pub const UBUNTU_SAVE_LABEL: &str = "ubuntu-save";
pub const WRITABLE_LABEL: &str = "writable";

/// Which label convention applies to the data partition.
///
/// Gadgets with a `system-seed` structure anywhere use the seeded layout;
/// everything else is the legacy single-writable-partition layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelScheme {
    Seeded,
    Legacy,
}

impl LabelScheme {
    pub fn for_info(info: &Info) -> Self {
        if info.has_role(Role::SystemSeed) {
            LabelScheme::Seeded
        } else {
            LabelScheme::Legacy
        }
    }
}

impl fmt::Display for LabelScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelScheme::Seeded => write!(f, "seeded"),
            LabelScheme::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRule {
    pub role: Role,
    /// Label no structure of another role may use.
    pub reserved_label: Option<&'static str>,
    /// Only explicit label accepted under the seeded scheme; `None` accepts any.
    pub seeded_label: Option<&'static str>,
    /// Only explicit label accepted under the legacy scheme; `None` accepts any.
    pub legacy_label: Option<&'static str>,
    pub unique_per_volume: bool,
}

impl RoleRule {
    pub fn accepted_label(&self, scheme: LabelScheme) -> Option<&'static str> {
        match scheme {
            LabelScheme::Seeded => self.seeded_label,
            LabelScheme::Legacy => self.legacy_label,
        }
    }

    /// An empty label is always accepted: the structure gets the implicit one.
    pub fn accepts_label(&self, label: &str, scheme: LabelScheme) -> bool {
        label.is_empty() || self.accepted_label(scheme).is_none_or(|l| l == label)
    }
}

pub const ROLE_RULES: &[RoleRule] = &[
    RoleRule {
        role: Role::Mbr,
        reserved_label: None,
        seeded_label: None,
        legacy_label: None,
        unique_per_volume: true,
    },
    RoleRule {
        role: Role::SystemBoot,
        reserved_label: None,
        seeded_label: None,
        legacy_label: None,
        unique_per_volume: true,
    },
    RoleRule {
        role: Role::SystemSeed,
        reserved_label: Some(UBUNTU_SEED_LABEL),
        seeded_label: Some(UBUNTU_SEED_LABEL),
        legacy_label: Some(UBUNTU_SEED_LABEL),
        unique_per_volume: true,
    },
    RoleRule {
        role: Role::SystemData,
        reserved_label: Some(UBUNTU_DATA_LABEL),
        seeded_label: Some(UBUNTU_DATA_LABEL),
        legacy_label: Some(WRITABLE_LABEL),
        unique_per_volume: true,
    },
    RoleRule {
        role: Role::SystemSave,
        reserved_label: Some(UBUNTU_SAVE_LABEL),
        seeded_label: Some(UBUNTU_SAVE_LABEL),
        legacy_label: Some(UBUNTU_SAVE_LABEL),
        unique_per_volume: true,
    },
];

pub fn rule_for(role: Role) -> Option<&'static RoleRule> {
    ROLE_RULES.iter().find(|r| r.role == role)
}

/// The role that owns a reserved label, if the label is reserved.
pub fn reserved_label_owner(label: &str) -> Option<Role> {
    if label.is_empty() {
        return None;
    }
    ROLE_RULES
        .iter()
        .find(|r| r.reserved_label == Some(label))
        .map(|r| r.role)
}
