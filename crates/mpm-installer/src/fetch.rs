use anyhow::{anyhow, Context, Result};
use std::time::Duration;

/// Blocking byte source for archive URLs.
pub trait ArchiveFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Only connecting is bounded; archive bodies may take as long as the
    /// link needs.
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .context("failed to build archive HTTP client")?;
        Ok(Self { client })
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to download {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("download of {url} returned status {status}"));
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response body from {url}"))?;
        Ok(bytes.to_vec())
    }
}
