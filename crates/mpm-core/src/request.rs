use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    #[default]
    FileExchangeFirst,
    GitHubFirst,
}

impl ProviderPreference {
    pub fn from_github_first(github_first: bool) -> Self {
        if github_first {
            Self::GitHubFirst
        } else {
            Self::FileExchangeFirst
        }
    }
}

/// One install operation. Exactly one of `url` or name resolution drives
/// acquisition; `version` and `preference` only matter when resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub name: String,
    pub url: Option<String>,
    pub install_root: PathBuf,
    pub force: bool,
    pub allow_nesting: bool,
    pub internal_dir: Option<String>,
    pub search_only: bool,
    pub preference: ProviderPreference,
    pub version: Option<String>,
}

impl InstallRequest {
    pub fn new(name: impl Into<String>, install_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            url: None,
            install_root: install_root.into(),
            force: false,
            allow_nesting: false,
            internal_dir: None,
            search_only: false,
            preference: ProviderPreference::default(),
            version: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn trimmed_name(&self) -> &str {
        self.name.trim()
    }

    pub fn explicit_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn package_dir(&self) -> PathBuf {
        self.install_root.join(self.trimmed_name())
    }
}
