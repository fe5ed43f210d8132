use crate::layout::{lay_out_volume, LaidOutStructure, LayoutCause, LayoutError};
use crate::validate::check_content_kinds;
use crate::{GadgetError, RuleViolation};
use gadget_schema::{Content, FilesystemContent, Info, RawContent};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("source path does not exist")]
    SourceMissing,
    #[error("cannot specify trailing / for a source which is not a directory")]
    TrailingSlashOnFile,
    #[error("cannot stat source: {0}")]
    Stat(String),
}

/// Verify that every piece of content referenced by the gadget exists under
/// `content_root` and has the right shape for its structure.
///
/// Each volume is laid out first, so geometry failures surface here too.
/// Content of the wrong kind for its structure, or with an empty name, is
/// rejected before anything is looked up.
/// Volumes are visited in name order and structures in layout order; the
/// first failure aborts.
pub fn validate_content(info: &Info, content_root: impl AsRef<Path>) -> Result<(), GadgetError> {
    let root = content_root.as_ref();

    for (name, volume) in &info.volumes {
        let laid_out = lay_out_volume(volume).map_err(|source| GadgetError::InvalidLayout {
            volume: name.clone(),
            source,
        })?;
        debug!(
            "checking content of {} volume {name:?}, {} structure(s)",
            laid_out.schema(),
            laid_out.structures.len()
        );

        for structure in &laid_out.structures {
            check_content_kinds(structure.structure).map_err(|source| {
                GadgetError::InvalidVolume {
                    volume: name.clone(),
                    source: RuleViolation::InvalidStructure {
                        index: structure.index,
                        name: structure.name().to_owned(),
                        source,
                    },
                }
            })?;
            if structure.structure.is_bare() {
                check_raw_content(root, structure).map_err(|source| {
                    GadgetError::InvalidLayout {
                        volume: name.clone(),
                        source,
                    }
                })?;
            } else {
                check_filesystem_content(root, name, structure)?;
            }
        }
    }

    debug!(
        "content of {} volume(s) present under {}",
        info.volumes.len(),
        root.display()
    );
    Ok(())
}

fn check_raw_content(root: &Path, laid_out: &LaidOutStructure<'_>) -> Result<(), LayoutError> {
    for content in &laid_out.structure.content {
        let Content::Raw(RawContent { image }) = content else {
            continue;
        };
        let path = root.join(image.trim_start_matches('/'));
        let meta = fs::metadata(&path).map_err(|e| {
            let cause = LayoutCause::ImageStat {
                image: image.clone(),
                path: path.display().to_string(),
                reason: stat_reason(&e),
            };
            LayoutError::at(laid_out, cause)
        })?;

        if !meta.is_file() {
            let cause = LayoutCause::ImageNotAFile {
                image: image.clone(),
            };
            return Err(LayoutError::at(laid_out, cause));
        }
        if meta.len() > laid_out.size() {
            let cause = LayoutCause::ImageTooLarge {
                image: image.clone(),
            };
            return Err(LayoutError::at(laid_out, cause));
        }
    }
    Ok(())
}

fn check_filesystem_content(
    root: &Path,
    volume: &str,
    laid_out: &LaidOutStructure<'_>,
) -> Result<(), GadgetError> {
    for content in &laid_out.structure.content {
        let Content::Filesystem(fs_content) = content else {
            continue;
        };
        check_source(root, fs_content).map_err(|source| GadgetError::InvalidContent {
            volume: volume.to_owned(),
            index: laid_out.index,
            name: laid_out.name().to_owned(),
            content: content.to_string(),
            source,
        })?;
    }
    Ok(())
}

/// `target` names a path inside a filesystem that does not exist yet, so only
/// the source side is checked.
fn check_source(root: &Path, content: &FilesystemContent) -> Result<(), ContentError> {
    let path = resolve_source(root, &content.source);
    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ContentError::SourceMissing),
        Err(e) => return Err(ContentError::Stat(stat_reason(&e))),
    };
    if content.source.ends_with('/') && !meta.is_dir() {
        return Err(ContentError::TrailingSlashOnFile);
    }
    Ok(())
}

/// Sources are relative to the content root even when written with a
/// leading `/`; the trailing `/` only selects directory-contents semantics.
fn resolve_source(root: &Path, source: &str) -> PathBuf {
    let relative = source.trim_start_matches('/').trim_end_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn stat_reason(err: &io::Error) -> String {
    if err.kind() == io::ErrorKind::NotFound {
        "no such file or directory".to_owned()
    } else {
        err.to_string()
    }
}
