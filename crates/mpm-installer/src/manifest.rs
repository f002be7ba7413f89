use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};

use mpm_core::{InstalledPackage, ManifestDocument, UpsertOutcome};
use tracing::info;

use crate::InstallLayout;

pub fn read_manifest(layout: &InstallLayout) -> Result<ManifestDocument> {
    let path = layout.manifest_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(ManifestDocument::default());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read mpm manifest: {}", path.display()));
        }
    };

    ManifestDocument::from_json_str(&raw)
        .with_context(|| format!("failed to load mpm manifest: {}", path.display()))
}

/// Rewrites the whole document; the previous file is only replaced once the
/// new one is fully on disk.
pub fn write_manifest(layout: &InstallLayout, document: &ManifestDocument) -> Result<()> {
    let path = layout.manifest_path();
    let rendered = document.to_json_string()?;

    let mut staged = tempfile::Builder::new()
        .prefix(".mpm-manifest-")
        .tempfile_in(layout.root())
        .with_context(|| format!("failed to stage mpm manifest in {}", layout.root().display()))?;
    staged
        .write_all(rendered.as_bytes())
        .with_context(|| format!("failed to write staged mpm manifest for {}", path.display()))?;
    staged
        .persist(&path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace mpm manifest: {}", path.display()))?;
    Ok(())
}

pub fn upsert_manifest_entry(
    layout: &InstallLayout,
    entry: InstalledPackage,
) -> Result<UpsertOutcome> {
    let mut document = read_manifest(layout)?;
    let name = entry.name.clone();
    let outcome = document.upsert(entry);
    if outcome == UpsertOutcome::Replaced {
        info!(package = %name, "overwriting existing manifest entry");
    }
    write_manifest(layout, &document)?;
    Ok(outcome)
}
