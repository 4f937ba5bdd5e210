//! proxycheck.io proxy/VPN flag.

use super::{join_url, ProviderError, ReputationProvider, ReputationResult};
use crate::config::ProviderConfig;
use crate::http::HttpFetch;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://proxycheck.io";

/// proxycheck.io API response. Per-address details live under a key equal
/// to the queried address, next to the top-level `status`.
#[derive(Debug, Deserialize)]
struct ProxyCheckResponse {
    #[serde(default)]
    status: Option<String>,

    #[serde(flatten)]
    entries: HashMap<String, serde_json::Value>,
}

/// Per-address details.
#[derive(Debug, Default, Deserialize)]
struct ProxyCheckEntry {
    #[serde(default)]
    proxy: Option<String>,

    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl ProxyCheckResponse {
    fn entry(&self, ip: &str) -> Option<ProxyCheckEntry> {
        self.entries
            .get(ip)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

pub struct ProxyCheckProvider {
    config: ProviderConfig,
    fetcher: Arc<dyn HttpFetch>,
}

impl ProxyCheckProvider {
    pub fn new(config: ProviderConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl ReputationProvider for ProxyCheckProvider {
    async fn check(&self, ip: &str) -> Result<ReputationResult, ProviderError> {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = join_url(base, &format!("v2/{}?risk=1&vpn=1", ip));

        let body = self.fetcher.get(&url).await?.into_success()?;
        let response: ProxyCheckResponse = serde_json::from_str(&body)?;
        let entry = response.entry(ip).unwrap_or_default();

        debug!(
            ip = %ip,
            status = ?response.status,
            proxy = ?entry.proxy,
            kind = ?entry.kind,
            "proxycheck lookup complete"
        );

        let ok = response.status.as_deref() == Some("ok");
        if ok && entry.proxy.as_deref() == Some("yes") {
            let reason = match entry.kind {
                Some(kind) => format!("proxycheck: {}", kind),
                None => "proxycheck: proxy".to_string(),
            };
            Ok(ReputationResult::block(self.name(), &reason))
        } else {
            Ok(ReputationResult::allow(self.name()))
        }
    }

    fn name(&self) -> &str {
        "proxycheck"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
