use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use mpm_core::ProviderKind;
use regex::Regex;

use crate::{ProviderConfig, SearchProvider};

const MATHWORKS_ORIGIN: &str = "https://www.mathworks.com";

/// Anchor and attribute patterns, compiled on first use.
pub(crate) fn results_page_patterns() -> Result<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Result<(Regex, Regex), regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let anchor = Regex::new(r#"(?is)<a\s[^>]*>"#)?;
            let attribute = Regex::new(r#"(?is)([a-z_:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?;
            Ok((anchor, attribute))
        })
        .as_ref()
        .map_err(|err| anyhow!("invalid results page pattern: {err}"))
}

/// Returns the href of the first `results_title` anchor in a File Exchange
/// search page, made absolute against the MathWorks origin.
pub fn parse_results_title_href(html: &str) -> Result<Option<String>> {
    let (anchor_pattern, attribute_pattern) = results_page_patterns()?;
    for anchor in anchor_pattern.find_iter(html) {
        let mut class = None;
        let mut href = None;
        for attribute in attribute_pattern.captures_iter(anchor.as_str()) {
            let value = attribute
                .get(2)
                .or_else(|| attribute.get(3))
                .map(|m| m.as_str());
            match attribute.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
                Some(name) if name == "class" => class = value,
                Some(name) if name == "href" => href = value,
                _ => {}
            }
        }

        let is_result = class.is_some_and(|value| {
            value
                .split_ascii_whitespace()
                .any(|token| token == "results_title")
        });
        if !is_result {
            continue;
        }
        if let Some(href) = href.map(str::trim).filter(|value| !value.is_empty()) {
            return Ok(Some(absolutize(href)));
        }
    }
    Ok(None)
}

fn absolutize(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if href.starts_with('/') {
        return format!("{MATHWORKS_ORIGIN}{href}");
    }
    format!("{MATHWORKS_ORIGIN}/{href}")
}

pub struct FileExchangeProvider {
    client: reqwest::blocking::Client,
    base: String,
}

impl FileExchangeProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            base: config.file_exchange_base.trim_end_matches('/').to_string(),
        })
    }
}

impl SearchProvider for FileExchangeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FileExchange
    }

    fn search(&self, query: &str) -> Result<Option<String>> {
        let url = format!("{}/", self.base);
        let response = self
            .client
            .get(&url)
            .query(&[("term", query)])
            .send()
            .with_context(|| format!("failed to query File Exchange search: {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "File Exchange search returned status {}",
                response.status()
            ));
        }

        let html = response
            .text()
            .context("failed to read File Exchange search page")?;
        parse_results_title_href(&html)
    }
}
