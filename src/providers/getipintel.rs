//! GetIPIntel probability score.

use super::{join_url, random_token, ProviderError, ReputationProvider, ReputationResult};
use crate::config::GetIpIntelConfig;
use crate::http::HttpFetch;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://check.getipintel.net";

/// GetIPIntel probability provider. The service answers with a bare
/// number in `0..=1`, or a negative error code.
pub struct GetIpIntelProvider {
    config: GetIpIntelConfig,
    fetcher: Arc<dyn HttpFetch>,
}

impl GetIpIntelProvider {
    pub fn new(config: GetIpIntelConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { config, fetcher }
    }

    fn url(&self, ip: &str) -> String {
        let base = self.config.common.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let contact = match self.config.contact {
            Some(ref contact) => contact.clone(),
            None => format!("test{}@domain.com", random_token()),
        };
        join_url(base, &format!("check.php?ip={}&contact={}", ip, contact))
    }
}

fn parse_score(body: &str) -> Result<f64, ProviderError> {
    let trimmed = body.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|score| !score.is_nan())
        .ok_or_else(|| ProviderError::InvalidResponse(format!("not a score: {:?}", trimmed)))
}

#[async_trait]
impl ReputationProvider for GetIpIntelProvider {
    async fn check(&self, ip: &str) -> Result<ReputationResult, ProviderError> {
        let body = self.fetcher.get(&self.url(ip)).await?.into_success()?;
        let score = parse_score(&body)?;

        debug!(ip = %ip, score = score, "GetIPIntel lookup complete");

        let result = if score >= self.config.block_score {
            ReputationResult::block(self.name(), &format!("getipintel score: {}", score))
        } else {
            ReputationResult::allow(self.name())
        };
        Ok(result.with_score(score))
    }

    fn name(&self) -> &str {
        "getipintel"
    }

    fn is_enabled(&self) -> bool {
        self.config.common.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetcher;
    use crate::providers::Action;

    fn provider(fetcher: FakeFetcher) -> GetIpIntelProvider {
        GetIpIntelProvider::new(GetIpIntelConfig::default(), Arc::new(fetcher))
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0.5").unwrap(), 0.5);
        assert_eq!(parse_score(" 1\n").unwrap(), 1.0);
        assert_eq!(parse_score("-3").unwrap(), -3.0);
        assert!(parse_score("").is_err());
        assert!(parse_score("NaN").is_err());
        assert!(parse_score("<html>").is_err());
    }

    #[tokio::test]
    async fn test_threshold() {
        for (body, expected) in [
            ("0.99", Action::Block),
            ("1", Action::Block),
            ("0.989", Action::Allow),
            ("0", Action::Allow),
            ("-1", Action::Allow),
        ] {
            let p = provider(FakeFetcher::new().ok("getipintel", body));
            let result = p.check("203.0.113.5").await.unwrap();
            assert_eq!(result.action, expected, "body {}", body);
        }
    }

    #[tokio::test]
    async fn test_score_recorded() {
        let p = provider(FakeFetcher::new().ok("getipintel", "0.995"));
        let result = p.check("203.0.113.5").await.unwrap();
        assert_eq!(result.score, Some(0.995));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let p = provider(FakeFetcher::new().ok("getipintel", "rate limited"));
        assert!(matches!(
            p.check("203.0.113.5").await,
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_contact_in_url() {
        let fetcher = Arc::new(FakeFetcher::new().ok("getipintel", "0"));
        let mut config = GetIpIntelConfig::default();
        config.contact = Some("ops@example.com".to_string());
        let p = GetIpIntelProvider::new(config, fetcher.clone());
        p.check("203.0.113.5").await.unwrap();
        assert_eq!(
            fetcher.urls(),
            vec!["http://check.getipintel.net/check.php?ip=203.0.113.5&contact=ops@example.com"]
        );
    }

    #[tokio::test]
    async fn test_generated_contact() {
        let fetcher = Arc::new(FakeFetcher::new().ok("getipintel", "0"));
        let p = GetIpIntelProvider::new(GetIpIntelConfig::default(), fetcher.clone());
        p.check("203.0.113.5").await.unwrap();
        let url = &fetcher.urls()[0];
        assert!(url.contains("contact=test"));
        assert!(url.ends_with("@domain.com"));
    }
}
