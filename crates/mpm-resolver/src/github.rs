use anyhow::{anyhow, Context, Result};
use mpm_core::ProviderKind;
use serde::Deserialize;
use tracing::debug;

use crate::{ProviderConfig, SearchProvider};

const TAGS_PER_PAGE: usize = 100;
const MAX_TAG_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct RepositorySearch {
    #[serde(default)]
    items: Vec<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
struct Repository {
    full_name: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    zipball_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GitHubTag {
    pub name: String,
    pub zipball_url: String,
}

/// Exact tag-name match; prefixes and newer patch releases never qualify.
pub fn select_tag_zipball(tags: &[GitHubTag], tag: &str) -> Option<String> {
    tags.iter()
        .find(|candidate| candidate.name == tag)
        .map(|candidate| candidate.zipball_url.clone())
}

/// Target of the `rel="next"` entry in a GitHub `Link` header.
pub(crate) fn next_page_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim().eq_ignore_ascii_case("rel=\"next\""));
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

pub struct GitHubProvider {
    client: reqwest::blocking::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            api_base: config.github_api_base.trim_end_matches('/').to_string(),
            token: config.github_token.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    fn first_repository(&self, query: &str) -> Result<Option<Repository>> {
        let url = format!("{}/search/repositories", self.api_base);
        let response = self
            .get(&url)
            .query(&[("q", format!("{query} language:matlab"))])
            .send()
            .with_context(|| format!("failed to query GitHub repository search: {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "GitHub repository search returned status {}",
                response.status()
            ));
        }

        let search: RepositorySearch = response
            .json()
            .context("failed to parse GitHub repository search response")?;
        Ok(search.items.into_iter().next())
    }

    fn latest_release_zipball(&self, repository: &Repository) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/releases/latest",
            self.api_base, repository.full_name
        );
        let response = self
            .get(&url)
            .send()
            .with_context(|| format!("failed to query latest release: {url}"))?;
        if !response.status().is_success() {
            debug!(
                repository = %repository.full_name,
                status = %response.status(),
                "no latest release"
            );
            return Ok(None);
        }

        let release: LatestRelease = response
            .json()
            .context("failed to parse GitHub latest release response")?;
        Ok(release.zipball_url)
    }

    /// Walks the tag listing page by page, stopping at the first exact match.
    fn find_tag_zipball(&self, repository: &Repository, tag: &str) -> Result<Option<String>> {
        let mut next = Some(format!(
            "{}/repos/{}/tags?per_page={TAGS_PER_PAGE}",
            self.api_base, repository.full_name
        ));
        let mut pages = 0_usize;

        while let Some(url) = next.take() {
            if pages == MAX_TAG_PAGES {
                debug!(repository = %repository.full_name, pages, "stopped paging tags");
                break;
            }
            pages += 1;

            let response = self
                .get(&url)
                .send()
                .with_context(|| format!("failed to list repository tags: {url}"))?;
            if !response.status().is_success() {
                return Err(anyhow!(
                    "GitHub tag listing for {} returned status {}",
                    repository.full_name,
                    response.status()
                ));
            }

            next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page_link);
            let tags: Vec<GitHubTag> = response
                .json()
                .context("failed to parse GitHub tag listing response")?;
            if let Some(url) = select_tag_zipball(&tags, tag) {
                return Ok(Some(url));
            }
        }
        Ok(None)
    }
}

impl SearchProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn search(&self, query: &str) -> Result<Option<String>> {
        let Some(repository) = self.first_repository(query)? else {
            return Ok(None);
        };

        match self.latest_release_zipball(&repository) {
            Ok(Some(url)) => Ok(Some(url)),
            Ok(None) => Ok(Some(default_branch_zipball(&repository))),
            Err(err) => {
                debug!(repository = %repository.full_name, "latest release lookup failed: {err:#}");
                Ok(Some(default_branch_zipball(&repository)))
            }
        }
    }

    fn search_release(&self, query: &str, tag: &str) -> Result<Option<String>> {
        let Some(repository) = self.first_repository(query)? else {
            return Ok(None);
        };
        self.find_tag_zipball(&repository, tag)
    }
}

fn default_branch_zipball(repository: &Repository) -> String {
    format!(
        "{}/zipball/master",
        repository.html_url.trim_end_matches('/')
    )
}
