//! teoh.io VPN risk classification.

use super::{join_url, ProviderError, ReputationProvider, ReputationResult};
use crate::config::ProviderConfig;
use crate::http::HttpFetch;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://ip.teoh.io";

/// teoh.io API response.
#[derive(Debug, Deserialize)]
struct TeohResponse {
    /// Risk class: "low", "medium" or "high".
    #[serde(default)]
    risk: Option<String>,
}

pub struct TeohProvider {
    config: ProviderConfig,
    fetcher: Arc<dyn HttpFetch>,
}

impl TeohProvider {
    pub fn new(config: ProviderConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl ReputationProvider for TeohProvider {
    async fn check(&self, ip: &str) -> Result<ReputationResult, ProviderError> {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = join_url(base, &format!("api/vpn/{}", ip));

        let body = self.fetcher.get(&url).await?.into_success()?;
        let response: TeohResponse = serde_json::from_str(&body)?;

        debug!(ip = %ip, risk = ?response.risk, "teoh lookup complete");

        if response.risk.as_deref() == Some("high") {
            Ok(ReputationResult::block(self.name(), "teoh risk: high"))
        } else {
            Ok(ReputationResult::allow(self.name()))
        }
    }

    fn name(&self) -> &str {
        "teoh"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
