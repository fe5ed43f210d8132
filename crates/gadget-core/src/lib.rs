//! Validation and layout engine for gadget descriptions.
//!
//! Three pure operations sit on top of the `gadget-schema` model:
//! [`validate`] checks role, label, and model consistency rules,
//! [`lay_out_volume`] computes non-overlapping byte ranges for a volume's
//! structures, and [`validate_content`] verifies that every image and
//! filesystem source referenced by the gadget exists under a content root.
//! Every operation returns the first violation it finds.

pub mod content;
pub mod layout;
pub mod validate;

pub use content::{validate_content, ContentError};
pub use layout::{
    lay_out_info, lay_out_volume, LaidOutStructure, LaidOutVolume, LayoutCause, LayoutError,
    MBR_MAX_SIZE, NON_MBR_START_OFFSET, OFFSET_WRITE_SIZE,
};
pub use validate::{validate, validate_all, RuleViolation, StructureViolation};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GadgetError {
    #[error("invalid volume {volume:?}: {source}")]
    InvalidVolume {
        volume: String,
        source: RuleViolation,
    },
    #[error("invalid gadget: {0}")]
    InvalidGadget(RuleViolation),
    #[error(
        "gadget does not support encrypted data: volume {volume:?} has no structure with system-save role"
    )]
    EncryptionUnsupported { volume: String },
    #[error("invalid layout of volume {volume:?}: {source}")]
    InvalidLayout { volume: String, source: LayoutError },
    #[error("invalid volume {volume:?}: structure #{index} ({name:?}), content {content}: {source}")]
    InvalidContent {
        volume: String,
        index: usize,
        name: String,
        content: String,
        source: ContentError,
    },
}

/// Broad class of a [`GadgetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Role cardinality, reserved label, label scheme, or role pairing.
    Structural,
    /// The gadget does not match the device model's seed requirement.
    ModelInconsistency,
    /// A deployment constraint cannot be met by the gadget.
    ConstraintUnsatisfied,
    /// Overlapping offsets or an unresolvable offset-write reference.
    LayoutInfeasible,
    /// Missing image or source, or a file where a directory is required.
    ContentPrecondition,
}

impl GadgetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GadgetError::InvalidVolume { source, .. } | GadgetError::InvalidGadget(source) => {
                if source.is_model_inconsistency() {
                    ErrorKind::ModelInconsistency
                } else {
                    ErrorKind::Structural
                }
            }
            GadgetError::EncryptionUnsupported { .. } => ErrorKind::ConstraintUnsatisfied,
            GadgetError::InvalidLayout { source, .. } => {
                if source.cause.is_content_failure() {
                    ErrorKind::ContentPrecondition
                } else {
                    ErrorKind::LayoutInfeasible
                }
            }
            GadgetError::InvalidContent { .. } => ErrorKind::ContentPrecondition,
        }
    }

    /// Name of the offending volume, when the failure is tied to one.
    pub fn volume(&self) -> Option<&str> {
        match self {
            GadgetError::InvalidVolume { volume, .. }
            | GadgetError::EncryptionUnsupported { volume }
            | GadgetError::InvalidLayout { volume, .. }
            | GadgetError::InvalidContent { volume, .. } => Some(volume),
            GadgetError::InvalidGadget(_) => None,
        }
    }
}
