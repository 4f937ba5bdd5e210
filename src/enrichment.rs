//! ISP and country lookup. Informational only: nothing here can change
//! where a visitor is sent.

use crate::config::EnrichmentConfig;
use crate::http::HttpFetch;
use crate::providers::{join_url, ProviderError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const UNKNOWN: &str = "Unknown";

/// ipinfo.io response, reduced to what gets logged.
#[derive(Debug, Default, Deserialize)]
struct IpInfoResponse {
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// ISP and country of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpDetails {
    pub isp: String,
    pub country: String,
}

impl IpDetails {
    pub fn unknown() -> Self {
        Self {
            isp: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
        }
    }
}

pub struct Enricher {
    config: EnrichmentConfig,
    fetcher: Arc<dyn HttpFetch>,
}

impl Enricher {
    pub fn new(config: EnrichmentConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { config, fetcher }
    }

    /// Look up ISP and country; any failure yields "Unknown" fields.
    pub async fn lookup(&self, ip: &str) -> IpDetails {
        if !self.config.enabled {
            return IpDetails::unknown();
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let info = match tokio::time::timeout(timeout, self.fetch(ip)).await {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                debug!(ip = %ip, error = %e, "Enrichment lookup failed");
                IpInfoResponse::default()
            }
            Err(_) => {
                debug!(ip = %ip, "Enrichment lookup timed out");
                IpInfoResponse::default()
            }
        };

        IpDetails {
            isp: info.org.unwrap_or_else(|| UNKNOWN.to_string()),
            country: info.country.unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    async fn fetch(&self, ip: &str) -> Result<IpInfoResponse, ProviderError> {
        let url = join_url(&self.config.base_url, &format!("{}/json", ip));
        let body = self.fetcher.get(&url).await?.into_success()?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{FakeFetcher, Reply};

    fn enricher(fetcher: FakeFetcher) -> Enricher {
        Enricher::new(EnrichmentConfig::default(), Arc::new(fetcher))
    }

    #[tokio::test]
    async fn test_lookup() {
        let body = r#"{"ip":"203.0.113.5","org":"AS64500 Example Net","country":"NL"}"#;
        let details = enricher(FakeFetcher::new().ok("ipinfo.io/203.0.113.5/json", body))
            .lookup("203.0.113.5")
            .await;
        assert_eq!(details.isp, "AS64500 Example Net");
        assert_eq!(details.country, "NL");
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let details = enricher(FakeFetcher::new().ok("ipinfo.io", r#"{"bogon":true}"#))
            .lookup("10.0.0.1")
            .await;
        assert_eq!(details, IpDetails::unknown());
    }

    #[tokio::test]
    async fn test_failure_is_unknown() {
        let details = enricher(FakeFetcher::new().route("ipinfo.io", Reply::Fail))
            .lookup("203.0.113.5")
            .await;
        assert_eq!(details, IpDetails::unknown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unknown() {
        let details = enricher(FakeFetcher::new().route("ipinfo.io", Reply::Hang))
            .lookup("203.0.113.5")
            .await;
        assert_eq!(details, IpDetails::unknown());
    }

    #[tokio::test]
    async fn test_disabled_skips_call() {
        let fetcher = Arc::new(FakeFetcher::new());
        let config = EnrichmentConfig {
            enabled: false,
            ..EnrichmentConfig::default()
        };
        let details = Enricher::new(config, fetcher.clone()).lookup("203.0.113.5").await;
        assert_eq!(details, IpDetails::unknown());
        assert!(fetcher.urls().is_empty());
    }
}
