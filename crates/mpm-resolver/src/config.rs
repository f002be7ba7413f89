use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const DEFAULT_FILE_EXCHANGE_BASE: &str = "https://www.mathworks.com/matlabcentral/fileexchange";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub github_api_base: String,
    pub github_token: Option<String>,
    pub file_exchange_base: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("mpm/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(60),
            github_api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            github_token: None,
            file_exchange_base: DEFAULT_FILE_EXCHANGE_BASE.to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|value| !value.trim().is_empty());
        self
    }

    pub(crate) fn build_client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()
            .context("failed to build provider HTTP client")
    }
}
