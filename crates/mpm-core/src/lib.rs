mod manifest;
mod request;
mod source;

pub use manifest::{InstalledPackage, ManifestDocument, UpsertOutcome, MANIFEST_SCHEMA_VERSION};
pub use request::{InstallRequest, ProviderPreference};
pub use source::{ProviderKind, Resolution, ResolvedSource};
