use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::{ArchiveFetcher, ArchiveHandle};

pub const VCS_MARKER: &str = ".git";
pub const DEFAULT_BRANCH_SNAPSHOT: &str = "/zipball/master";
pub const EXCHANGE_MARKER: &str = "fileexchange";
pub const FORCE_DOWNLOAD_PARAM: &str = "download=true";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalFailure {
    pub attempts: Vec<FetchAttempt>,
}

impl fmt::Display for RetrievalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no archive could be retrieved")?;
        for attempt in &self.attempts {
            write!(f, "; {}: {}", attempt.url, attempt.error)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FetchedArchive {
    pub url: String,
    pub archive: ArchiveHandle,
}

/// Ordered URLs to try for `url`: the URL itself, then the version-control
/// snapshot rewrites, then the forced-download listing rewrite.
pub fn candidate_urls(url: &str) -> Vec<String> {
    let mut candidates = vec![url.to_string()];

    if let Some(index) = url.rfind(VCS_MARKER) {
        let rewritten = format!(
            "{}{}{}",
            &url[..index],
            DEFAULT_BRANCH_SNAPSHOT,
            &url[index + VCS_MARKER.len()..]
        );
        candidates.push(rewritten);
        candidates.push(format!(
            "{}{}",
            url.trim_end_matches('/'),
            DEFAULT_BRANCH_SNAPSHOT
        ));
    }

    if url.contains(EXCHANGE_MARKER) && !url.contains(FORCE_DOWNLOAD_PARAM) {
        let separator = if url.contains('?') { '&' } else { '?' };
        candidates.push(format!("{url}{separator}{FORCE_DOWNLOAD_PARAM}"));
    }

    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.clone()));
    candidates
}

pub struct Retriever<F> {
    fetcher: F,
}

impl<F: ArchiveFetcher> Retriever<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// First URL in the rewrite ladder whose body parses as an archive wins.
    pub fn fetch(&self, url: &str) -> Result<FetchedArchive, RetrievalFailure> {
        let url = url.trim();
        let mut attempts = Vec::new();

        for candidate in candidate_urls(url) {
            let parsed = self
                .fetcher
                .fetch_bytes(&candidate)
                .and_then(ArchiveHandle::from_bytes);
            match parsed {
                Ok(archive) => {
                    if candidate != url {
                        info!(
                            original = url,
                            rewritten = %candidate,
                            "retrieved archive from rewritten url"
                        );
                    }
                    return Ok(FetchedArchive {
                        url: candidate,
                        archive,
                    });
                }
                Err(err) => {
                    debug!(url = %candidate, "fetch attempt failed: {err:#}");
                    attempts.push(FetchAttempt {
                        url: candidate,
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        Err(RetrievalFailure { attempts })
    }
}
