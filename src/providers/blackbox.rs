//! IPinfo blackbox proxy lookup.
//!
//! Plain-text endpoint: the body is `Y` for a known proxy/hosting address
//! and `N` otherwise.

use super::{join_url, ProviderError, ReputationProvider, ReputationResult};
use crate::config::ProviderConfig;
use crate::http::HttpFetch;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://blackbox.ipinfo.app";

/// Body that marks an address as a proxy.
const PROXY_SENTINEL: &str = "Y";

pub struct BlackboxProvider {
    config: ProviderConfig,
    fetcher: Arc<dyn HttpFetch>,
}

impl BlackboxProvider {
    pub fn new(config: ProviderConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { config, fetcher }
    }

    fn url(&self, ip: &str) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        join_url(base, &format!("lookup/{}", ip))
    }
}

#[async_trait]
impl ReputationProvider for BlackboxProvider {
    async fn check(&self, ip: &str) -> Result<ReputationResult, ProviderError> {
        let body = self.fetcher.get(&self.url(ip)).await?.into_success()?;

        debug!(ip = %ip, body = %body, "Blackbox lookup complete");

        if body == PROXY_SENTINEL {
            Ok(ReputationResult::block(self.name(), "blackbox: proxy"))
        } else {
            Ok(ReputationResult::allow(self.name()))
        }
    }

    fn name(&self) -> &str {
        "blackbox"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
