use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use mpm_core::{InstallRequest, InstalledPackage, Resolution, UpsertOutcome};
use mpm_installer::{
    find_module_dir, install_archive, upsert_manifest_entry, ArchiveFetcher, ExtractOutcome,
    InstallLayout, RetrievalFailure, Retriever, MANIFEST_FILE_NAME,
};
use mpm_resolver::Resolver;
use tracing::{debug, warn};

use crate::render::{LineKind, TerminalRenderer};

#[derive(Debug)]
pub(crate) enum InstallStatus {
    NotFound {
        version: Option<String>,
    },
    SearchOnly,
    AlreadyExists {
        package_dir: PathBuf,
    },
    RetrievalFailed {
        failure: RetrievalFailure,
    },
    ExtractionFailed {
        reason: String,
        rolled_back: bool,
    },
    Installed {
        package_dir: PathBuf,
        module_dir: PathBuf,
        manifest: UpsertOutcome,
    },
    /// The package is on disk but its manifest entry could not be written.
    InstalledUnrecorded {
        package_dir: PathBuf,
        module_dir: PathBuf,
        reason: String,
    },
}

/// Everything printed for one package: its source, additive warnings, and
/// exactly one terminal status.
#[derive(Debug)]
pub(crate) struct InstallReport {
    pub(crate) name: String,
    pub(crate) source: Option<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) status: InstallStatus,
}

impl InstallReport {
    pub(crate) fn succeeded(&self) -> bool {
        matches!(
            self.status,
            InstallStatus::Installed { .. } | InstallStatus::SearchOnly
        )
    }
}

pub(crate) struct InstallPipeline<'a, F> {
    pub(crate) resolver: &'a Resolver,
    pub(crate) retriever: &'a Retriever<F>,
    pub(crate) renderer: TerminalRenderer,
}

impl<F: ArchiveFetcher> InstallPipeline<'_, F> {
    pub(crate) fn install(&self, request: &InstallRequest) -> Result<InstallReport> {
        let name = request.trimmed_name().to_string();
        let mut report = InstallReport {
            name: name.clone(),
            source: None,
            warnings: Vec::new(),
            status: InstallStatus::SearchOnly,
        };

        let url = match request.explicit_url() {
            Some(url) => url.to_string(),
            None => {
                let resolution =
                    self.resolver
                        .resolve(&name, request.preference, request.version.as_deref());
                match resolution {
                    Resolution::Found(source) => {
                        debug!(package = %name, provider = source.provider.as_str(), "resolved");
                        source.url
                    }
                    Resolution::NotFound => {
                        report.status = InstallStatus::NotFound {
                            version: request.version.clone(),
                        };
                        return Ok(report);
                    }
                }
            }
        };
        report.source = Some(url.clone());

        if request.search_only {
            return Ok(report);
        }

        let layout = InstallLayout::new(&request.install_root);
        layout.ensure_root_exists()?;
        let package_dir = layout.package_dir(&name);
        if is_occupied(&package_dir) && !request.force {
            report.status = InstallStatus::AlreadyExists { package_dir };
            return Ok(report);
        }

        let spinner = self.renderer.start_download(&url);
        let fetched = self.retriever.fetch(&url);
        spinner.finish();
        let mut fetched = match fetched {
            Ok(fetched) => fetched,
            Err(failure) => {
                report.status = InstallStatus::RetrievalFailed { failure };
                return Ok(report);
            }
        };

        match install_archive(&mut fetched.archive, &package_dir, request.allow_nesting) {
            ExtractOutcome::Installed => {}
            ExtractOutcome::RolledBack { reason } => {
                report.status = InstallStatus::ExtractionFailed {
                    reason,
                    rolled_back: true,
                };
                return Ok(report);
            }
            ExtractOutcome::Failed { reason } => {
                report.status = InstallStatus::ExtractionFailed {
                    reason,
                    rolled_back: false,
                };
                return Ok(report);
            }
        }

        let module_dir = find_module_dir(&package_dir, request.internal_dir.as_deref());
        report.warnings.extend(module_dir.warnings);
        let entry = InstalledPackage::new(
            name.as_str(),
            url.as_str(),
            module_dir.path.display().to_string(),
        );
        report.status = match upsert_manifest_entry(&layout, entry) {
            Ok(manifest) => InstallStatus::Installed {
                package_dir,
                module_dir: module_dir.path,
                manifest,
            },
            Err(err) => {
                warn!(package = %name, "manifest update failed: {err:#}");
                InstallStatus::InstalledUnrecorded {
                    package_dir,
                    module_dir: module_dir.path,
                    reason: format!("{err:#}"),
                }
            }
        };
        Ok(report)
    }
}

fn is_occupied(path: &Path) -> bool {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return false;
    };
    if !metadata.is_dir() {
        return true;
    }
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(true)
}

pub(crate) fn format_install_report_lines(report: &InstallReport) -> Vec<(LineKind, String)> {
    let name = &report.name;
    let mut lines = Vec::new();

    if let Some(source) = &report.source {
        lines.push((
            LineKind::Info,
            format!("Package \"{name}\" found at \"{source}\"."),
        ));
    }
    for warning in &report.warnings {
        lines.push((LineKind::Warning, format!("WARNING: {warning}")));
    }

    match &report.status {
        InstallStatus::NotFound { version: None } => lines.push((
            LineKind::Error,
            format!("Could not find any package named \"{name}\" on GitHub or File Exchange."),
        )),
        InstallStatus::NotFound {
            version: Some(version),
        } => lines.push((
            LineKind::Error,
            format!(
                "Could not find any package named \"{name}\" on GitHub with version {version}."
            ),
        )),
        InstallStatus::SearchOnly => lines.push((
            LineKind::Info,
            format!("Not installing \"{name}\" because search-only was requested."),
        )),
        InstallStatus::AlreadyExists { package_dir } => lines.push((
            LineKind::Warning,
            format!(
                "Package \"{name}\" already exists at {}",
                package_dir.display()
            ),
        )),
        InstallStatus::RetrievalFailed { failure } => lines.push((
            LineKind::Error,
            format!("ERROR: Could not install \"{name}\": {failure}"),
        )),
        InstallStatus::ExtractionFailed {
            reason,
            rolled_back,
        } => {
            let suffix = if *rolled_back {
                " (previous contents restored)"
            } else {
                ""
            };
            lines.push((
                LineKind::Error,
                format!("ERROR: Could not install \"{name}\": {reason}{suffix}"),
            ));
        }
        InstallStatus::Installed {
            package_dir,
            module_dir,
            manifest,
        } => {
            if *manifest == UpsertOutcome::Replaced {
                lines.push((
                    LineKind::Info,
                    format!("Overwriting entry for \"{name}\" in {MANIFEST_FILE_NAME}"),
                ));
            }
            lines.push((
                LineKind::Success,
                format!("Installed \"{name}\" to {}", package_dir.display()),
            ));
            lines.push((
                LineKind::Info,
                format!("Will add \"{}\" to path.", module_dir.display()),
            ));
        }
        InstallStatus::InstalledUnrecorded {
            package_dir,
            module_dir,
            reason,
        } => {
            lines.push((
                LineKind::Error,
                format!(
                    "ERROR: Installed \"{name}\" to {} but could not update {MANIFEST_FILE_NAME}: {reason}",
                    package_dir.display()
                ),
            ));
            lines.push((
                LineKind::Info,
                format!("Will add \"{}\" to path.", module_dir.display()),
            ));
        }
    }

    lines
}
