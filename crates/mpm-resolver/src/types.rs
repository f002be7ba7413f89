use anyhow::Result;
use mpm_core::ProviderKind;

/// A remote search backend mapping a text query to a candidate download URL.
pub trait SearchProvider {
    fn kind(&self) -> ProviderKind;

    fn search(&self, query: &str) -> Result<Option<String>>;

    /// Only providers with named releases answer this; the rest find nothing.
    fn search_release(&self, _query: &str, _tag: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
