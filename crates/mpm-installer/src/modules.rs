use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

const CONVENTIONAL_MODULE_DIRS: &[&str] = &["bin", "src", "lib", "code"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDir {
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// Locates the directory holding loadable `.m` files inside an installed
/// package. Never fails: the package root is the fallback.
pub fn find_module_dir(package_dir: &Path, internal_dir: Option<&str>) -> ModuleDir {
    let mut warnings = Vec::new();
    let internal_dir = internal_dir.map(str::trim).filter(|dir| !dir.is_empty());

    if has_loadable_modules(package_dir, true) {
        if let Some(dir) = internal_dir {
            warnings.push(format!(
                "Ignoring internaldir \"{dir}\" because .m files were found in the base directory"
            ));
        }
        return ModuleDir {
            path: package_dir.to_path_buf(),
            warnings,
        };
    }

    if let Some(dir) = internal_dir {
        let candidate = package_dir.join(dir);
        if !candidate.is_dir() {
            warnings.push(format!(
                "Ignoring internaldir \"{dir}\" because it did not exist."
            ));
        } else if has_loadable_modules(&candidate, false) {
            return ModuleDir {
                path: candidate,
                warnings,
            };
        } else {
            debug!(dir, "internal directory holds no .m files");
        }
    }

    for dir in CONVENTIONAL_MODULE_DIRS {
        let candidate = package_dir.join(dir);
        if candidate.is_dir() && has_loadable_modules(&candidate, false) {
            return ModuleDir {
                path: candidate,
                warnings,
            };
        }
    }

    warnings.push("No .m files will be added to path".to_string());
    ModuleDir {
        path: package_dir.to_path_buf(),
        warnings,
    }
}

fn has_loadable_modules(dir: &Path, include_package_dirs: bool) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if include_package_dirs && name.starts_with('+') {
            return true;
        }
        path.is_file() && path.extension().is_some_and(|ext| ext == "m")
    })
}
