use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "mpm.json";

/// One installation root: a flat set of package directories plus the
/// manifest document that records them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name.trim())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn ensure_root_exists(&self) -> Result<()> {
        if self.root.is_dir() {
            return Ok(());
        }
        Err(anyhow!(
            "Invalid installation directory: {}",
            self.root.display()
        ))
    }
}

pub fn default_install_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let profile = std::env::var("USERPROFILE")
            .context("USERPROFILE is not set; cannot resolve default installation directory")?;
        return Ok(PathBuf::from(profile).join("Documents").join("MATLAB"));
    }

    let home = std::env::var("HOME")
        .context("HOME is not set; cannot resolve default installation directory")?;
    Ok(PathBuf::from(home).join("Documents").join("MATLAB"))
}
