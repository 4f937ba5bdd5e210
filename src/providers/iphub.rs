//! IPHub block flag.

use super::{join_url, random_token, ProviderError, ReputationProvider, ReputationResult};
use crate::config::ProviderConfig;
use crate::http::HttpFetch;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://v2.api.iphub.info";

/// IPHub API response. `block` is kept loose: only a numeric 1 (`1` or
/// `1.0`) marks an address, anything else is ignored.
#[derive(Debug, Deserialize)]
struct IpHubResponse {
    /// 0 = residential, 1 = non-residential, 2 = mixed.
    #[serde(default)]
    block: Option<Value>,
}

impl IpHubResponse {
    fn is_non_residential(&self) -> bool {
        self.block.as_ref().and_then(Value::as_f64) == Some(1.0)
    }
}

pub struct IpHubProvider {
    config: ProviderConfig,
    fetcher: Arc<dyn HttpFetch>,
}

impl IpHubProvider {
    pub fn new(config: ProviderConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl ReputationProvider for IpHubProvider {
    async fn check(&self, ip: &str) -> Result<ReputationResult, ProviderError> {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = join_url(base, &format!("guest/ip/{}?c={}", ip, random_token()));

        let body = self.fetcher.get(&url).await?.into_success()?;
        let response: IpHubResponse = serde_json::from_str(&body)?;

        debug!(ip = %ip, block = ?response.block, "IPHub lookup complete");

        if response.is_non_residential() {
            Ok(ReputationResult::block(self.name(), "iphub: non-residential"))
        } else {
            Ok(ReputationResult::allow(self.name()))
        }
    }

    fn name(&self) -> &str {
        "iphub"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetcher;
    use crate::providers::Action;

    async fn check(body: &str) -> Result<ReputationResult, ProviderError> {
        let fetcher = FakeFetcher::new().ok("iphub", body);
        IpHubProvider::new(ProviderConfig::default(), Arc::new(fetcher))
            .check("203.0.113.5")
            .await
    }

    #[tokio::test]
    async fn test_block_flag() {
        let body = r#"{"ip":"203.0.113.5","countryCode":"US","asn":64500,"isp":"HOSTING","block":1}"#;
        assert_eq!(check(body).await.unwrap().action, Action::Block);
        assert_eq!(check(r#"{"block":1.0}"#).await.unwrap().action, Action::Block);
    }

    #[tokio::test]
    async fn test_other_values_allow() {
        for body in [
            r#"{"block":0}"#,
            r#"{"block":2}"#,
            r#"{"block":"1"}"#,
            r#"{"block":null}"#,
            "{}",
        ] {
            assert_eq!(check(body).await.unwrap().action, Action::Allow, "body {}", body);
        }
    }

    #[tokio::test]
    async fn test_malformed_json() {
        assert!(matches!(
            check("<html>rate limited</html>").await,
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_buster() {
        let fetcher = Arc::new(FakeFetcher::new().ok("iphub", "{}"));
        let p = IpHubProvider::new(ProviderConfig::default(), fetcher.clone());
        p.check("203.0.113.5").await.unwrap();
        assert!(fetcher.urls()[0].starts_with("https://v2.api.iphub.info/guest/ip/203.0.113.5?c="));
    }
}
