use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, error, warn};

use crate::fs_utils::{move_path, remove_path_if_exists};
use crate::PackageArchive;

const LICENSE_FILE_NAMES: &[&str] = &[
    "license",
    "license.txt",
    "license.md",
    "licence",
    "licence.txt",
    "copying",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Installed,
    /// Extraction failed after the previous contents were moved aside; they
    /// were put back unchanged.
    RolledBack {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl ExtractOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

pub fn is_license_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    LICENSE_FILE_NAMES.contains(&lower.as_str())
}

/// The single top-level directory to un-nest, if the archive has one.
///
/// One segment: that segment. Two segments where one is a license file: the
/// other one. Anything else keeps the archive's own layout.
pub fn wrapper_segment(segments: &BTreeSet<String>) -> Option<&str> {
    match segments.len() {
        1 => segments.iter().next().map(String::as_str),
        2 => {
            let mut non_license = segments.iter().filter(|s| !is_license_file_name(s));
            match (non_license.next(), non_license.next()) {
                (Some(wrapper), None) => Some(wrapper.as_str()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Extracts `archive` into `target`, leaving `target` either fully replaced or
/// exactly as it was before the call.
pub fn install_archive<A>(archive: &mut A, target: &Path, allow_nesting: bool) -> ExtractOutcome
where
    A: PackageArchive + ?Sized,
{
    let segments = archive.top_level_segments();

    let snapshot = match snapshot_existing(target) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            return ExtractOutcome::Failed {
                reason: format!("{err:#}"),
            };
        }
    };

    let result = extract_and_flatten(archive, target, &segments, allow_nesting);
    let Err(err) = result else {
        return ExtractOutcome::Installed;
    };
    let reason = format!("{err:#}");
    warn!(dir = %target.display(), "extraction failed: {reason}");

    let Some(snapshot) = snapshot else {
        if let Err(cleanup) = remove_path_if_exists(target) {
            error!("failed to clean up partial extraction: {cleanup:#}");
        }
        return ExtractOutcome::Failed { reason };
    };

    match snapshot.restore(target) {
        Ok(()) => ExtractOutcome::RolledBack { reason },
        Err(restore_err) => {
            let kept = snapshot.keep();
            error!(
                snapshot = %kept.display(),
                "failed to restore previous package contents: {restore_err:#}"
            );
            ExtractOutcome::Failed {
                reason: format!(
                    "{reason}; restoring previous contents also failed ({restore_err:#}), they remain at {}",
                    kept.display()
                ),
            }
        }
    }
}

fn extract_and_flatten<A>(
    archive: &mut A,
    target: &Path,
    segments: &BTreeSet<String>,
    allow_nesting: bool,
) -> Result<()>
where
    A: PackageArchive + ?Sized,
{
    archive.extract_to(target)?;
    if allow_nesting {
        return Ok(());
    }
    flatten_wrapper(target, segments)
}

pub(crate) fn flatten_wrapper(target: &Path, segments: &BTreeSet<String>) -> Result<()> {
    let Some(wrapper) = wrapper_segment(segments) else {
        debug!(segments = segments.len(), "no single wrapper directory to un-nest");
        return Ok(());
    };
    let wrapper_path = target.join(wrapper);
    if !wrapper_path.is_dir() {
        debug!(wrapper, "top-level entry is not a directory; keeping layout");
        return Ok(());
    }

    // park the wrapper outside its own namespace so a child sharing its name can move up
    let parking = tempfile::Builder::new()
        .prefix(".mpm-unnest-")
        .tempdir_in(target)
        .with_context(|| format!("failed to create scratch dir in {}", target.display()))?;
    let parked = parking.path().join("wrapper");
    fs::rename(&wrapper_path, &parked).with_context(|| {
        format!(
            "failed to move {} to {}",
            wrapper_path.display(),
            parked.display()
        )
    })?;

    for entry in
        fs::read_dir(&parked).with_context(|| format!("failed to read {}", parked.display()))?
    {
        let entry = entry?;
        let dst = target.join(entry.file_name());
        remove_path_if_exists(&dst)?;
        move_path(&entry.path(), &dst)?;
    }

    debug!(wrapper, dir = %target.display(), "un-nested wrapper directory");
    Ok(())
}

struct Snapshot {
    scratch: TempDir,
}

impl Snapshot {
    fn contents(&self) -> PathBuf {
        self.scratch.path().join("previous")
    }

    fn restore(&self, target: &Path) -> Result<()> {
        remove_path_if_exists(target)?;
        move_path(&self.contents(), target)
            .with_context(|| format!("failed to restore {}", target.display()))
    }

    fn keep(self) -> PathBuf {
        let contents = self.contents();
        let _ = self.scratch.keep();
        contents
    }
}

fn snapshot_existing(target: &Path) -> Result<Option<Snapshot>> {
    if fs::symlink_metadata(target).is_err() {
        return Ok(None);
    }

    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| anyhow!("install target has no parent: {}", target.display()))?;
    let scratch = tempfile::Builder::new()
        .prefix(".mpm-snapshot-")
        .tempdir_in(parent)
        .with_context(|| format!("failed to create snapshot dir in {}", parent.display()))?;
    let snapshot = Snapshot { scratch };
    move_path(target, &snapshot.contents())
        .with_context(|| format!("failed to snapshot {}", target.display()))?;
    debug!(dir = %target.display(), "snapshotted previous contents");
    Ok(Some(snapshot))
}
