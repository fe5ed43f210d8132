use crate::layout::MBR_MAX_SIZE;
use crate::GadgetError;
use gadget_schema::{
    reserved_label_owner, rule_for, Content, Info, LabelScheme, ModelCharacteristics,
    PartitionType, Role, Schema, ValidationConstraints, Volume, VolumeStructure,
};
use std::collections::{BTreeSet, HashSet};
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RuleViolation {
    #[error("cannot have more than one partition with {0} role")]
    DuplicateRole(Role),
    #[error("invalid structure #{index} ({name:?}): {source}")]
    InvalidStructure {
        index: usize,
        name: String,
        source: StructureViolation,
    },
    #[error("structure name {0:?} is not unique")]
    DuplicateName(String),
    #[error("filesystem label {0:?} is not unique")]
    DuplicateLabel(String),
    #[error("{role} structure must have an implicit label or {expected:?}, not {found:?}")]
    UnexpectedLabel {
        role: Role,
        expected: &'static str,
        found: String,
    },
    #[error("the system-seed role requires system-data to be defined")]
    SeedRequiresData,
    #[error("system-save requires system-seed and system-data structures")]
    SaveRequiresSeedAndData,
    #[error("model requires system-seed partition, but no system-seed or system-data partition found")]
    ModelRequiresSeedPartition,
    #[error("model requires system-seed structure, but none was found")]
    ModelRequiresSeed,
    #[error("model does not support the system-seed role")]
    ModelDoesNotSupportSeed,
}

impl RuleViolation {
    pub fn is_model_inconsistency(&self) -> bool {
        matches!(
            self,
            RuleViolation::ModelRequiresSeedPartition
                | RuleViolation::ModelRequiresSeed
                | RuleViolation::ModelDoesNotSupportSeed
        )
    }
}

#[derive(Debug, Error)]
pub enum StructureViolation {
    #[error("structure size must be positive")]
    ZeroSize,
    #[error("MBR structure type with non-MBR schema")]
    MbrTypeOnGpt,
    #[error("GUID structure type with non-GPT schema")]
    GuidTypeOnMbr,
    #[error("label {0:?} is reserved")]
    ReservedLabel(String),
    #[error("mbr structure must not specify a file system")]
    MbrWithFilesystem,
    #[error("mbr structure size {0} exceeds {max} bytes", max = MBR_MAX_SIZE)]
    MbrTooLarge(u64),
    #[error("mbr structure must start at offset 0, not {0}")]
    MbrNotAtStart(u64),
    #[error("invalid content #{0}: cannot use image content for non-bare file system")]
    ImageOnFilesystem(usize),
    #[error("invalid content #{0}: cannot use non-image content for bare file system")]
    NonImageOnBare(usize),
    #[error("invalid content #{0}: missing image file name")]
    MissingImage(usize),
    #[error("invalid content #{0}: missing source or target")]
    MissingSourceOrTarget(usize),
}

/// Check a gadget description against role, label, and model rules.
///
/// Checks run in a fixed order and the first violation is returned:
/// role cardinality, per-structure rules, seed and save labels, role
/// pairing, model consistency, data label scheme, then deployment
/// constraints. No filesystem access takes place.
pub fn validate(
    info: &Info,
    model: Option<&ModelCharacteristics>,
    constraints: Option<&ValidationConstraints>,
) -> Result<(), GadgetError> {
    let mut checker = Checker::new(true);
    match run_checks(&mut checker, info, model, constraints) {
        ControlFlow::Break(err) => Err(err),
        ControlFlow::Continue(()) => {
            debug!("gadget with {} volume(s) is valid", info.volumes.len());
            Ok(())
        }
    }
}

/// Like [`validate`], but keeps going and returns every violation, in the
/// order [`validate`] would have reported them.
pub fn validate_all(
    info: &Info,
    model: Option<&ModelCharacteristics>,
    constraints: Option<&ValidationConstraints>,
) -> Vec<GadgetError> {
    let mut checker = Checker::new(false);
    if let ControlFlow::Break(err) = run_checks(&mut checker, info, model, constraints) {
        checker.errors.push(err);
    }
    checker.errors
}

/// Collects violations, or hands the first one back as `Break` when
/// `stop_at_first` is set.
struct Checker {
    errors: Vec<GadgetError>,
    stop_at_first: bool,
}

impl Checker {
    fn new(stop_at_first: bool) -> Self {
        Self {
            errors: Vec::new(),
            stop_at_first,
        }
    }

    fn report(&mut self, err: GadgetError) -> ControlFlow<GadgetError> {
        if self.stop_at_first {
            return ControlFlow::Break(err);
        }
        self.errors.push(err);
        ControlFlow::Continue(())
    }

    fn volume(&mut self, volume: &str, source: RuleViolation) -> ControlFlow<GadgetError> {
        self.report(GadgetError::InvalidVolume {
            volume: volume.to_owned(),
            source,
        })
    }
}

fn run_checks(
    checker: &mut Checker,
    info: &Info,
    model: Option<&ModelCharacteristics>,
    constraints: Option<&ValidationConstraints>,
) -> ControlFlow<GadgetError> {
    for (name, volume) in &info.volumes {
        check_role_cardinality(checker, name, volume)?;
    }
    for (name, volume) in &info.volumes {
        check_structures(checker, name, volume)?;
    }

    let scheme = LabelScheme::for_info(info);
    debug!("checking role labels against the {scheme} label scheme");

    check_role_label(checker, info, Role::SystemSeed, scheme)?;
    check_role_label(checker, info, Role::SystemSave, scheme)?;
    check_role_pairing(checker, info)?;
    if let Some(model) = model.filter(|m| !m.classic) {
        check_model_consistency(checker, info, model)?;
    }
    check_role_label(checker, info, Role::SystemData, scheme)?;

    if constraints.is_some_and(|c| c.encrypted_data) {
        check_encryption_support(checker, info)?;
    }
    ControlFlow::Continue(())
}

fn check_role_cardinality(
    checker: &mut Checker,
    name: &str,
    volume: &Volume,
) -> ControlFlow<GadgetError> {
    let mut seen = HashSet::new();
    let mut reported = BTreeSet::new();
    for structure in &volume.structures {
        let role = structure.effective_role();
        let Some(rule) = rule_for(role) else {
            continue;
        };
        if rule.unique_per_volume && !seen.insert(role) && reported.insert(role) {
            checker.volume(name, RuleViolation::DuplicateRole(role))?;
        }
    }
    ControlFlow::Continue(())
}

fn check_structures(
    checker: &mut Checker,
    name: &str,
    volume: &Volume,
) -> ControlFlow<GadgetError> {
    for (index, structure) in volume.structures.iter().enumerate() {
        if let Err(source) = check_structure(volume.schema, structure) {
            checker.volume(
                name,
                RuleViolation::InvalidStructure {
                    index,
                    name: structure.name.clone(),
                    source,
                },
            )?;
        }
    }

    let mut names = HashSet::new();
    let mut labels = HashSet::new();
    for structure in &volume.structures {
        if !structure.name.is_empty() && !names.insert(structure.name.as_str()) {
            checker.volume(name, RuleViolation::DuplicateName(structure.name.clone()))?;
        }
        let label = structure.filesystem_label.as_str();
        if !label.is_empty() && !labels.insert(label) {
            checker.volume(name, RuleViolation::DuplicateLabel(label.to_owned()))?;
        }
    }
    ControlFlow::Continue(())
}

fn check_structure(schema: Schema, structure: &VolumeStructure) -> Result<(), StructureViolation> {
    if structure.size == 0 {
        return Err(StructureViolation::ZeroSize);
    }
    if !structure.partition_type.is_compatible_with(schema) {
        return Err(match structure.partition_type {
            PartitionType::Guid(_) => StructureViolation::GuidTypeOnMbr,
            _ => StructureViolation::MbrTypeOnGpt,
        });
    }

    let role = structure.effective_role();
    let label = &structure.filesystem_label;
    if reserved_label_owner(label).is_some_and(|owner| owner != role) {
        return Err(StructureViolation::ReservedLabel(label.clone()));
    }

    if role == Role::Mbr {
        if !structure.is_bare() {
            return Err(StructureViolation::MbrWithFilesystem);
        }
        if structure.size > MBR_MAX_SIZE {
            return Err(StructureViolation::MbrTooLarge(structure.size));
        }
        if let Some(offset) = structure.offset.filter(|o| *o != 0) {
            return Err(StructureViolation::MbrNotAtStart(offset));
        }
    }

    check_content_kinds(structure)
}

pub(crate) fn check_content_kinds(
    structure: &VolumeStructure,
) -> Result<(), StructureViolation> {
    let bare = structure.is_bare();
    for (index, content) in structure.content.iter().enumerate() {
        match content {
            Content::Raw(_) if !bare => return Err(StructureViolation::ImageOnFilesystem(index)),
            Content::Filesystem(_) if bare => {
                return Err(StructureViolation::NonImageOnBare(index))
            }
            Content::Raw(raw) if raw.image.is_empty() => {
                return Err(StructureViolation::MissingImage(index))
            }
            Content::Filesystem(fs) if fs.source.is_empty() || fs.target.is_empty() => {
                return Err(StructureViolation::MissingSourceOrTarget(index))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Every structure carrying `role` must use the implicit label or the one
/// the registry accepts under `scheme`.
fn check_role_label(
    checker: &mut Checker,
    info: &Info,
    role: Role,
    scheme: LabelScheme,
) -> ControlFlow<GadgetError> {
    let Some(rule) = rule_for(role) else {
        return ControlFlow::Continue(());
    };
    for (volume, _, structure) in info.structures() {
        if structure.effective_role() != role {
            continue;
        }
        let label = &structure.filesystem_label;
        if rule.accepts_label(label, scheme) {
            continue;
        }
        if let Some(expected) = rule.accepted_label(scheme) {
            checker.volume(
                volume,
                RuleViolation::UnexpectedLabel {
                    role,
                    expected,
                    found: label.clone(),
                },
            )?;
        }
    }
    ControlFlow::Continue(())
}

fn check_role_pairing(checker: &mut Checker, info: &Info) -> ControlFlow<GadgetError> {
    let has_seed = info.has_role(Role::SystemSeed);
    let has_data = info.has_role(Role::SystemData);

    if let Some(volume) = info.volume_with_role(Role::SystemSeed) {
        if !has_data {
            checker.volume(volume, RuleViolation::SeedRequiresData)?;
        }
    }
    if let Some(volume) = info.volume_with_role(Role::SystemSave) {
        if !has_seed || !has_data {
            checker.volume(volume, RuleViolation::SaveRequiresSeedAndData)?;
        }
    }
    ControlFlow::Continue(())
}

fn check_model_consistency(
    checker: &mut Checker,
    info: &Info,
    model: &ModelCharacteristics,
) -> ControlFlow<GadgetError> {
    let seed_volume = info.volume_with_role(Role::SystemSeed);
    let data_volume = info.volume_with_role(Role::SystemData);

    match (model.requires_system_seed, seed_volume, data_volume) {
        (true, None, None) => {
            let violation = RuleViolation::ModelRequiresSeedPartition;
            match info.volumes.keys().next() {
                Some(first) => checker.volume(first, violation),
                None => checker.report(GadgetError::InvalidGadget(violation)),
            }
        }
        (true, None, Some(volume)) => checker.volume(volume, RuleViolation::ModelRequiresSeed),
        (false, Some(volume), _) => checker.volume(volume, RuleViolation::ModelDoesNotSupportSeed),
        _ => ControlFlow::Continue(()),
    }
}

/// Encrypted data needs a save partition to hold the recovery keys.
fn check_encryption_support(checker: &mut Checker, info: &Info) -> ControlFlow<GadgetError> {
    if info.has_role(Role::SystemSave) {
        return ControlFlow::Continue(());
    }
    let volume = info
        .volume_with_role(Role::SystemData)
        .or_else(|| info.volumes.keys().next().map(String::as_str));
    match volume {
        Some(volume) => checker.report(GadgetError::EncryptionUnsupported {
            volume: volume.to_owned(),
        }),
        None => ControlFlow::Continue(()),
    }
}
