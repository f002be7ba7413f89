use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub url: String,
    pub date_downloaded: String,
    pub mdir: String,
}

impl InstalledPackage {
    pub fn new(name: impl Into<String>, url: impl Into<String>, mdir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            date_downloaded: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            mdir: mdir.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub packages: Vec<InstalledPackage>,
}

impl Default for ManifestDocument {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            packages: Vec::new(),
        }
    }
}

impl ManifestDocument {
    /// Accepts the versioned document, a legacy bare array of entries, or
    /// blank input. All three describe the same collection shape.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        if trimmed.starts_with('[') {
            let packages: Vec<InstalledPackage> =
                serde_json::from_str(trimmed).context("failed to parse legacy mpm manifest")?;
            return Ok(Self {
                schema_version: MANIFEST_SCHEMA_VERSION,
                packages,
            });
        }

        let document: Self = serde_json::from_str(trimmed).context("failed to parse mpm manifest")?;
        if document.schema_version > MANIFEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported mpm manifest schema_version {} (newest supported is {})",
                document.schema_version,
                MANIFEST_SCHEMA_VERSION
            ));
        }
        Ok(document)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut rendered =
            serde_json::to_string_pretty(self).context("failed to serialize mpm manifest")?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackage> {
        self.packages.iter().find(|entry| entry.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn upsert(&mut self, entry: InstalledPackage) -> UpsertOutcome {
        let Some(index) = self.packages.iter().position(|p| p.name == entry.name) else {
            self.packages.push(entry);
            return UpsertOutcome::Inserted;
        };

        // legacy documents may carry repeats of a name; only the replaced slot survives
        let name = entry.name.clone();
        self.packages[index] = entry;
        let mut position = 0_usize;
        self.packages.retain(|p| {
            let keep = p.name != name || position == index;
            position += 1;
            keep
        });
        UpsertOutcome::Replaced
    }
}
