use anyhow::Result;
use mpm_core::{ProviderKind, ProviderPreference, Resolution, ResolvedSource};
use tracing::{debug, warn};

use crate::{FileExchangeProvider, GitHubProvider, ProviderConfig, SearchProvider};

/// Orders the code-hosting and package-exchange providers and stops at the
/// first hit. Provider failures count as "no result".
pub struct Resolver {
    code_host: Box<dyn SearchProvider>,
    exchange: Box<dyn SearchProvider>,
}

impl Resolver {
    pub fn new(code_host: Box<dyn SearchProvider>, exchange: Box<dyn SearchProvider>) -> Self {
        Self {
            code_host,
            exchange,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self::new(
            Box::new(GitHubProvider::new(config)?),
            Box::new(FileExchangeProvider::new(config)?),
        ))
    }

    pub fn resolve(
        &self,
        name: &str,
        preference: ProviderPreference,
        version: Option<&str>,
    ) -> Resolution {
        if let Some(tag) = version {
            return self.query_release(name, tag);
        }

        let order: [&dyn SearchProvider; 2] = match preference {
            ProviderPreference::GitHubFirst => [self.code_host.as_ref(), self.exchange.as_ref()],
            ProviderPreference::FileExchangeFirst => {
                [self.exchange.as_ref(), self.code_host.as_ref()]
            }
        };

        for provider in order {
            if let Some(source) = query(provider, name) {
                return Resolution::Found(source);
            }
        }
        Resolution::NotFound
    }

    fn query_release(&self, name: &str, tag: &str) -> Resolution {
        let provider = self.code_host.as_ref();
        match provider.search_release(name, tag) {
            Ok(Some(url)) if !url.trim().is_empty() => Resolution::Found(ResolvedSource {
                url: url.trim().to_string(),
                provider: provider.kind(),
            }),
            Ok(_) => {
                debug!(
                    provider = provider.kind().as_str(),
                    package = name,
                    tag,
                    "no release with tag"
                );
                Resolution::NotFound
            }
            Err(err) => {
                warn!(
                    provider = provider.kind().as_str(),
                    package = name,
                    tag,
                    "release lookup unavailable: {err:#}"
                );
                Resolution::NotFound
            }
        }
    }
}

fn query(provider: &dyn SearchProvider, name: &str) -> Option<ResolvedSource> {
    let kind: ProviderKind = provider.kind();
    match provider.search(name) {
        Ok(Some(url)) if !url.trim().is_empty() => Some(ResolvedSource {
            url: url.trim().to_string(),
            provider: kind,
        }),
        Ok(_) => {
            debug!(provider = kind.as_str(), package = name, "no search result");
            None
        }
        Err(err) => {
            warn!(
                provider = kind.as_str(),
                package = name,
                "search unavailable: {err:#}"
            );
            None
        }
    }
}
