mod archive;
mod extract;
mod fetch;
mod fs_utils;
mod layout;
mod manifest;
mod modules;
mod retrieve;

pub use archive::{ArchiveHandle, PackageArchive};
pub use extract::{install_archive, is_license_file_name, wrapper_segment, ExtractOutcome};
pub use fetch::{ArchiveFetcher, HttpFetcher};
pub use layout::{default_install_root, InstallLayout, MANIFEST_FILE_NAME};
pub use manifest::{read_manifest, upsert_manifest_entry, write_manifest};
pub use modules::{find_module_dir, ModuleDir};
pub use retrieve::{
    candidate_urls, FetchAttempt, FetchedArchive, RetrievalFailure, Retriever,
    DEFAULT_BRANCH_SNAPSHOT, EXCHANGE_MARKER, VCS_MARKER,
};
