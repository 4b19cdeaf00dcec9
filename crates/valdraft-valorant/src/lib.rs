// Valorant data sources and the roster aggregator that turns them into the
// candidate list for a draft.

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod stats;
pub mod teams;

use anyhow::Context;
use valdraft_core::config::HttpConfig;

/// Shared HTTP client for both sources, with the configured timeout and
/// user agent. A request that times out fails that fetch only.
pub fn build_http_client(config: &HttpConfig) -> anyhow::Result<reqwest::Client> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("valdraft/{}", env!("CARGO_PKG_VERSION")));
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(user_agent)
        .build()
        .context("failed to build HTTP client")
}
