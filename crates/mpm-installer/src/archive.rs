use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use zip::ZipArchive;

/// What the installer needs from a fetched archive.
pub trait PackageArchive {
    /// Distinct first path segments across every entry.
    fn top_level_segments(&self) -> BTreeSet<String>;

    fn extract_to(&mut self, dst: &Path) -> Result<()>;
}

/// A zip archive held entirely in memory; nothing touches disk until
/// `extract_to`.
pub struct ArchiveHandle {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl ArchiveHandle {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let archive =
            ZipArchive::new(Cursor::new(bytes)).context("response is not a readable zip archive")?;
        Ok(Self { archive })
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }
}

impl PackageArchive for ArchiveHandle {
    fn top_level_segments(&self) -> BTreeSet<String> {
        self.archive
            .file_names()
            .filter_map(top_level_segment)
            .collect()
    }

    fn extract_to(&mut self, dst: &Path) -> Result<()> {
        fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;

        for index in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(index)
                .with_context(|| format!("failed to read archive entry #{index}"))?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(anyhow!(
                    "archive entry escapes the install directory: {}",
                    entry.name()
                ));
            };
            let out_path = dst.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)
                    .with_context(|| format!("failed to create {}", out_path.display()))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut out_file = fs::File::create(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            io::copy(&mut entry, &mut out_file)
                .with_context(|| format!("failed to extract {}", out_path.display()))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;

                let permissions = fs::Permissions::from_mode((mode & 0o777) | 0o600);
                fs::set_permissions(&out_path, permissions)
                    .with_context(|| format!("failed to set mode on {}", out_path.display()))?;
            }
        }

        Ok(())
    }
}

pub(crate) fn top_level_segment(name: &str) -> Option<String> {
    name.split(['/', '\\'])
        .find(|segment| !segment.is_empty() && *segment != ".")
        .map(str::to_string)
}
