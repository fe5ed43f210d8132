use crate::GadgetError;
use gadget_schema::{Info, RelativeOffset, Role, Schema, Volume, VolumeStructure, MIB};
use thiserror::Error;
use tracing::debug;

/// Implicitly placed structures other than the MBR never start below this
/// offset; the first MiB holds the boot sector and partition table.
pub const NON_MBR_START_OFFSET: u64 = MIB;

/// Boot code area of the MBR, in front of the partition table.
pub const MBR_MAX_SIZE: u64 = 446;

/// Width of the little-endian pointer written at an offset-write location.
pub const OFFSET_WRITE_SIZE: u64 = 4;

#[derive(Debug, Error)]
#[error("cannot lay out structure #{index} ({name:?}): {cause}")]
pub struct LayoutError {
    pub index: usize,
    pub name: String,
    #[source]
    pub cause: LayoutCause,
}

impl LayoutError {
    fn new(index: usize, structure: &VolumeStructure, cause: LayoutCause) -> Self {
        Self {
            index,
            name: structure.name.clone(),
            cause,
        }
    }

    pub(crate) fn at(laid_out: &LaidOutStructure<'_>, cause: LayoutCause) -> Self {
        Self::new(laid_out.index, laid_out.structure, cause)
    }
}

#[derive(Debug, Error)]
pub enum LayoutCause {
    #[error("overlaps with previous structure #{index} ({name:?})")]
    Overlap { index: usize, name: String },
    #[error("structure end offset overflows the volume address space")]
    Overflow,
    #[error("offset-write refers to an unknown structure {0:?}")]
    UnknownReference(String),
    #[error("offset-write {reference} does not fit in structure {target:?}")]
    OffsetWriteOutOfBounds { reference: String, target: String },
    #[error("content {image:?}: stat {path}: {reason}")]
    ImageStat {
        image: String,
        path: String,
        reason: String,
    },
    #[error("content {image:?} is not a regular file")]
    ImageNotAFile { image: String },
    #[error("content {image:?} does not fit in the structure")]
    ImageTooLarge { image: String },
}

impl LayoutCause {
    pub fn is_content_failure(&self) -> bool {
        matches!(
            self,
            LayoutCause::ImageStat { .. }
                | LayoutCause::ImageNotAFile { .. }
                | LayoutCause::ImageTooLarge { .. }
        )
    }
}

/// A structure placed in its volume. `end_offset` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaidOutStructure<'a> {
    pub index: usize,
    pub structure: &'a VolumeStructure,
    pub start_offset: u64,
    pub end_offset: u64,
    /// Resolved absolute location of the structure's offset-write, if any.
    pub absolute_offset_write: Option<u64>,
}

impl LaidOutStructure<'_> {
    pub fn name(&self) -> &str {
        &self.structure.name
    }

    pub fn size(&self) -> u64 {
        self.end_offset - self.start_offset
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaidOutVolume<'a> {
    pub volume: &'a Volume,
    /// End offset of the last structure.
    pub size: u64,
    /// Declaration order; ranges are ascending and never overlap.
    pub structures: Vec<LaidOutStructure<'a>>,
}

impl LaidOutVolume<'_> {
    pub fn schema(&self) -> Schema {
        self.volume.schema
    }
}

/// Compute the placement of every structure of a volume.
///
/// Structures are placed in declaration order. An explicit offset may leave
/// a gap but never reach back into the previous structure; implicit offsets
/// follow the previous structure directly. Offset-write references are
/// resolved once all structures are placed.
pub fn lay_out_volume(volume: &Volume) -> Result<LaidOutVolume<'_>, LayoutError> {
    let mut structures: Vec<LaidOutStructure<'_>> = Vec::with_capacity(volume.structures.len());
    let mut cursor = 0_u64;

    for (index, structure) in volume.structures.iter().enumerate() {
        let start_offset = match structure.offset {
            Some(offset) => {
                if let Some(previous) = structures.last().filter(|p| offset < p.end_offset) {
                    let cause = LayoutCause::Overlap {
                        index: previous.index,
                        name: previous.name().to_owned(),
                    };
                    return Err(LayoutError::new(index, structure, cause));
                }
                offset
            }
            None if structure.effective_role() == Role::Mbr => cursor,
            None => cursor.max(NON_MBR_START_OFFSET),
        };
        let end_offset = start_offset
            .checked_add(structure.size)
            .ok_or_else(|| LayoutError::new(index, structure, LayoutCause::Overflow))?;

        structures.push(LaidOutStructure {
            index,
            structure,
            start_offset,
            end_offset,
            absolute_offset_write: None,
        });
        cursor = end_offset;
    }

    let resolved = structures
        .iter()
        .map(|laid_out| {
            laid_out
                .structure
                .offset_write
                .as_ref()
                .map(|reference| resolve_offset_write(reference, &structures))
                .transpose()
                .map_err(|cause| LayoutError::at(laid_out, cause))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (laid_out, absolute) in structures.iter_mut().zip(resolved) {
        laid_out.absolute_offset_write = absolute;
    }

    debug!(
        "laid out volume {:?}: {} structure(s), {cursor} bytes",
        volume.name,
        structures.len()
    );

    Ok(LaidOutVolume {
        volume,
        size: cursor,
        structures,
    })
}

fn resolve_offset_write(
    reference: &RelativeOffset,
    structures: &[LaidOutStructure<'_>],
) -> Result<u64, LayoutCause> {
    let Some(target_name) = &reference.relative_to else {
        return Ok(reference.offset);
    };
    let target = structures
        .iter()
        .find(|s| s.name() == target_name)
        .ok_or_else(|| LayoutCause::UnknownReference(target_name.clone()))?;

    let fits = reference
        .offset
        .checked_add(OFFSET_WRITE_SIZE)
        .is_some_and(|end| end <= target.size());
    if !fits {
        return Err(LayoutCause::OffsetWriteOutOfBounds {
            reference: reference.to_string(),
            target: target_name.clone(),
        });
    }
    Ok(target.start_offset + reference.offset)
}

/// Lay out every volume of the gadget, in volume name order.
pub fn lay_out_info(info: &Info) -> Result<Vec<LaidOutVolume<'_>>, GadgetError> {
    info.volumes
        .iter()
        .map(|(name, volume)| {
            lay_out_volume(volume).map_err(|source| GadgetError::InvalidLayout {
                volume: name.clone(),
                source,
            })
        })
        .collect()
}
