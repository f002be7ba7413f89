mod config;
mod file_exchange;
mod github;
mod resolve;
mod types;

pub use config::ProviderConfig;
pub use file_exchange::{parse_results_title_href, FileExchangeProvider};
pub use github::{select_tag_zipball, GitHubProvider, GitHubTag};
pub use resolve::Resolver;
pub use types::SearchProvider;
