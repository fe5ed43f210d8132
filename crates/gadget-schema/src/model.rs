use crate::types::{PartitionType, RelativeOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// A complete gadget description: every volume, keyed by name.
///
/// Volumes are kept in a sorted map so that every pass over the description
/// visits them in the same order and reports the same error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Info {
    #[serde(default)]
    pub volumes: BTreeMap<String, Volume>,
}

impl Info {
    pub fn new(volumes: impl IntoIterator<Item = Volume>) -> Self {
        Self {
            volumes: volumes
                .into_iter()
                .map(|v| (v.name.clone(), v))
                .collect(),
        }
    }

    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.get(name)
    }

    /// Every structure as `(volume name, index, structure)`, volumes sorted by
    /// name and structures in declaration order.
    pub fn structures(&self) -> impl Iterator<Item = (&str, usize, &VolumeStructure)> {
        self.volumes.iter().flat_map(|(name, vol)| {
            vol.structures
                .iter()
                .enumerate()
                .map(move |(idx, s)| (name.as_str(), idx, s))
        })
    }

    /// Name of the first volume holding a structure with the given effective role.
    pub fn volume_with_role(&self, role: Role) -> Option<&str> {
        self.structures()
            .find(|(_, _, s)| s.effective_role() == role)
            .map(|(name, _, _)| name)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.volume_with_role(role).is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    #[default]
    #[serde(alias = "")]
    Gpt,
    Mbr,
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Gpt => write!(f, "gpt"),
            Schema::Mbr => write!(f, "mbr"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Volume {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub bootloader: String,
    #[serde(default, rename = "structure")]
    pub structures: Vec<VolumeStructure>,
}

impl Volume {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_bootloader(mut self, bootloader: &str) -> Self {
        self.bootloader = bootloader.to_owned();
        self
    }

    #[must_use]
    pub fn with_structure(mut self, structure: VolumeStructure) -> Self {
        self.structures.push(structure);
        self
    }
}

/// Special function of a structure, as recognized by the provisioning system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "mbr")]
    Mbr,
    #[serde(rename = "system-boot")]
    SystemBoot,
    #[serde(rename = "system-seed")]
    SystemSeed,
    #[serde(rename = "system-data")]
    SystemData,
    #[serde(rename = "system-save")]
    SystemSave,
}

impl Role {
    pub fn is_none(self) -> bool {
        self == Role::None
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::None => Ok(()),
            Role::Mbr => write!(f, "mbr"),
            Role::SystemBoot => write!(f, "system-boot"),
            Role::SystemSeed => write!(f, "system-seed"),
            Role::SystemData => write!(f, "system-data"),
            Role::SystemSave => write!(f, "system-save"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Filesystem {
    #[default]
    None,
    Vfat,
    Ext4,
    Other(String),
}

impl From<String> for Filesystem {
    fn from(s: String) -> Self {
        match s.trim() {
            "" | "none" => Filesystem::None,
            "vfat" => Filesystem::Vfat,
            "ext4" => Filesystem::Ext4,
            other => Filesystem::Other(other.to_owned()),
        }
    }
}

impl From<&str> for Filesystem {
    fn from(s: &str) -> Self {
        Filesystem::from(s.to_owned())
    }
}

impl From<Filesystem> for String {
    fn from(fs: Filesystem) -> Self {
        fs.to_string()
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filesystem::None => Ok(()),
            Filesystem::Vfat => write!(f, "vfat"),
            Filesystem::Ext4 => write!(f, "ext4"),
            Filesystem::Other(name) => f.write_str(name),
        }
    }
}

/// Raw image written verbatim into a bare structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawContent {
    pub image: String,
}

/// File or directory copied into a structure's filesystem.
///
/// A `source` ending in `/` means "the contents of this directory".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemContent {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Raw(RawContent),
    Filesystem(FilesystemContent),
}

impl Content {
    pub fn raw(image: impl Into<String>) -> Self {
        Content::Raw(RawContent {
            image: image.into(),
        })
    }

    pub fn filesystem(source: impl Into<String>, target: impl Into<String>) -> Self {
        Content::Filesystem(FilesystemContent {
            source: source.into(),
            target: target.into(),
        })
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Content::Raw(_))
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Raw(raw) => write!(f, "image:{}", raw.image),
            Content::Filesystem(fs) => write!(f, "source:{}", fs.source),
        }
    }
}

/// One partition-like region of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VolumeStructure {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub partition_type: PartitionType,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub filesystem: Filesystem,
    #[serde(default)]
    pub filesystem_label: String,
    pub size: u64,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub offset_write: Option<RelativeOffset>,
    #[serde(default)]
    pub content: Vec<Content>,
}

impl VolumeStructure {
    pub fn new(name: impl Into<String>, partition_type: PartitionType, size: u64) -> Self {
        Self {
            name: name.into(),
            partition_type,
            role: Role::None,
            filesystem: Filesystem::None,
            filesystem_label: String::new(),
            size,
            offset: None,
            offset_write: None,
            content: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_filesystem(mut self, filesystem: Filesystem) -> Self {
        self.filesystem = filesystem;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        self.filesystem_label = label.to_owned();
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_offset_write(mut self, offset_write: RelativeOffset) -> Self {
        self.offset_write = Some(offset_write);
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: Content) -> Self {
        self.content.push(content);
        self
    }

    /// Role the validator and layout planner act on.
    ///
    /// Structures of type `mbr` implicitly carry the mbr role, and legacy
    /// gadgets mark the boot partition only through the `system-boot` label.
    pub fn effective_role(&self) -> Role {
        if !self.role.is_none() {
            return self.role;
        }
        if self.partition_type.is_mbr() {
            return Role::Mbr;
        }
        if self.filesystem_label == "system-boot" {
            return Role::SystemBoot;
        }
        Role::None
    }

    /// A bare structure has no filesystem and takes raw image content.
    pub fn is_bare(&self) -> bool {
        self.filesystem == Filesystem::None
    }
}

/// Device model properties relevant to gadget validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModelCharacteristics {
    #[serde(default)]
    pub classic: bool,
    #[serde(default)]
    pub requires_system_seed: bool,
}

/// Deployment-time requirements the gadget must be able to satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ValidationConstraints {
    #[serde(default)]
    pub encrypted_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_fs() -> PartitionType {
        "0FC63DAF-8483-4772-8E79-3D69D8477DE4".parse().unwrap()
    }

    #[test]
    fn effective_role_prefers_explicit_role() {
        let s = VolumeStructure::new("data", linux_fs(), MIB)
            .with_role(Role::SystemData)
            .with_label("system-boot");
        assert_eq!(s.effective_role(), Role::SystemData);
    }

    #[test]
    fn effective_role_is_implicit_for_mbr_type_and_legacy_boot_label() {
        let mbr = VolumeStructure::new("mbr", PartitionType::Mbr, 440);
        assert_eq!(mbr.effective_role(), Role::Mbr);

        let boot = VolumeStructure::new("EFI System", linux_fs(), MIB).with_label("system-boot");
        assert_eq!(boot.effective_role(), Role::SystemBoot);

        let plain = VolumeStructure::new("other", linux_fs(), MIB).with_label("ubuntu-boot");
        assert_eq!(plain.effective_role(), Role::None);
    }

    #[test]
    fn info_iterates_volumes_sorted_by_name() {
        let info = Info::new([
            Volume::new("zeta", Schema::Gpt)
                .with_structure(VolumeStructure::new("z0", linux_fs(), MIB)),
            Volume::new("alpha", Schema::Gpt)
                .with_structure(VolumeStructure::new("a0", linux_fs(), MIB))
                .with_structure(VolumeStructure::new("a1", linux_fs(), MIB)),
        ]);
        let order: Vec<(&str, usize, &str)> = info
            .structures()
            .map(|(vol, idx, s)| (vol, idx, s.name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("alpha", 0, "a0"), ("alpha", 1, "a1"), ("zeta", 0, "z0")]
        );
    }

    #[test]
    fn volume_with_role_finds_first_holder() {
        let info = Info::new([Volume::new("pc", Schema::Gpt).with_structure(
            VolumeStructure::new("data", linux_fs(), MIB).with_role(Role::SystemData),
        )]);
        assert_eq!(info.volume_with_role(Role::SystemData), Some("pc"));
        assert!(!info.has_role(Role::SystemSeed));
    }

    #[test]
    fn deserializes_structure_from_json() {
        let json = r#"{
            "name": "BIOS Boot",
            "type": "DA,21686148-6449-6E6F-744E-656564454649",
            "size": 1048576,
            "offset": 1048576,
            "offset-write": "mbr+92",
            "content": [{"image": "pc-core.img"}]
        }"#;
        let s: VolumeStructure = serde_json::from_str(json).unwrap();
        assert_eq!(s.role, Role::None);
        assert!(s.is_bare());
        assert_eq!(s.offset, Some(MIB));
        assert_eq!(s.offset_write, Some(RelativeOffset::relative("mbr", 92)));
        assert_eq!(s.content, vec![Content::raw("pc-core.img")]);
    }

    #[test]
    fn content_untagged_variants() {
        let raw: Content = serde_json::from_str(r#"{"image": "a.img"}"#).unwrap();
        assert!(raw.is_raw());
        let fs: Content =
            serde_json::from_str(r#"{"source": "grub.cfg", "target": "EFI/ubuntu/grub.cfg"}"#)
                .unwrap();
        assert_eq!(fs.to_string(), "source:grub.cfg");
        assert!(serde_json::from_str::<Content>(r#"{"image": "a", "source": "b"}"#).is_err());
    }

    #[test]
    fn role_and_filesystem_wire_names() {
        assert_eq!(
            serde_json::to_string(&Role::SystemSeed).unwrap(),
            "\"system-seed\""
        );
        let role: Role = serde_json::from_str("\"\"").unwrap();
        assert_eq!(role, Role::None);
        assert_eq!(Filesystem::from("ext4"), Filesystem::Ext4);
        assert_eq!(Filesystem::from(""), Filesystem::None);
        assert_eq!(
            Filesystem::from("btrfs"),
            Filesystem::Other("btrfs".to_owned())
        );
    }

    #[test]
    fn empty_schema_means_gpt() {
        let schema: Schema = serde_json::from_str("\"\"").unwrap();
        assert_eq!(schema, Schema::Gpt);
    }
}
