//! Consensus classifier over the reputation providers.

use crate::config::Config;
use crate::http::HttpFetch;
use crate::providers::blackbox::BlackboxProvider;
use crate::providers::getipintel::GetIpIntelProvider;
use crate::providers::iphub::IpHubProvider;
use crate::providers::proxycheck::ProxyCheckProvider;
use crate::providers::teoh::TeohProvider;
use crate::providers::{ReputationProvider, ReputationResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A provider together with how long it may take.
struct ProviderSlot {
    provider: Box<dyn ReputationProvider>,
    timeout: Duration,
}

/// Outcome of classifying one address.
#[derive(Debug, Clone)]
pub struct Verdict {
    /// True if any provider voted BLOCK.
    pub is_automated: bool,

    /// One result per provider, in dispatch order.
    pub results: Vec<ReputationResult>,
}

impl Verdict {
    /// Names of the providers that voted BLOCK.
    pub fn blocked_by(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.action.is_block())
            .map(|r| r.provider.as_str())
            .collect()
    }

    /// Reasons given by blocking providers, joined.
    pub fn reason(&self) -> Option<String> {
        let reasons: Vec<&str> = self
            .results
            .iter()
            .filter(|r| r.action.is_block())
            .filter_map(|r| r.reason.as_deref())
            .collect();

        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        }
    }
}

/// Asks every provider at once and blocks if any of them says so.
pub struct ConsensusClassifier {
    providers: Vec<ProviderSlot>,
    deadline: Duration,
}

impl ConsensusClassifier {
    /// Build the five providers in their fixed dispatch order.
    pub fn from_config(config: &Config, fetcher: Arc<dyn HttpFetch>) -> Self {
        let p = &config.providers;
        let mut classifier =
            Self::new(Duration::from_millis(config.classifier.deadline_ms));

        classifier.push(
            BlackboxProvider::new(p.blackbox.clone(), fetcher.clone()),
            p.blackbox.timeout_ms,
        );
        classifier.push(
            GetIpIntelProvider::new(p.getipintel.clone(), fetcher.clone()),
            p.getipintel.common.timeout_ms,
        );
        classifier.push(
            TeohProvider::new(p.teoh.clone(), fetcher.clone()),
            p.teoh.timeout_ms,
        );
        classifier.push(
            ProxyCheckProvider::new(p.proxycheck.clone(), fetcher.clone()),
            p.proxycheck.timeout_ms,
        );
        classifier.push(IpHubProvider::new(p.iphub.clone(), fetcher), p.iphub.timeout_ms);

        let enabled = classifier
            .providers
            .iter()
            .filter(|slot| slot.provider.is_enabled())
            .count();
        info!(
            providers = classifier.len(),
            enabled = enabled,
            deadline_ms = config.classifier.deadline_ms,
            "Consensus classifier initialized"
        );

        classifier
    }

    /// Empty classifier; providers are added with [`push`](Self::push).
    pub fn new(deadline: Duration) -> Self {
        Self {
            providers: Vec::new(),
            deadline,
        }
    }

    /// Append a provider to the dispatch order.
    pub fn push(&mut self, provider: impl ReputationProvider + 'static, timeout_ms: u64) {
        self.providers.push(ProviderSlot {
            provider: Box::new(provider),
            timeout: Duration::from_millis(timeout_ms),
        });
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Classify an address. Always completes; every failure is an ALLOW.
    pub async fn classify(&self, ip: &str) -> Verdict {
        let checks = self.providers.iter().map(|slot| self.settle(slot, ip));
        let results = join_all(checks).await;
        let is_automated = results.iter().any(|r| r.action.is_block());

        debug!(ip = %ip, is_automated = is_automated, "Consensus reached");

        Verdict {
            is_automated,
            results,
        }
    }

    async fn settle(&self, slot: &ProviderSlot, ip: &str) -> ReputationResult {
        let provider = &slot.provider;
        if !provider.is_enabled() {
            return ReputationResult::allow(provider.name());
        }

        let budget = slot.timeout.min(self.deadline);
        match tokio::time::timeout(budget, provider.check(ip)).await {
            Ok(Ok(result)) => {
                debug!(
                    provider = provider.name(),
                    ip = %ip,
                    action = result.action.as_str(),
                    "Provider answered"
                );
                result
            }
            Ok(Err(e)) => {
                warn!(
                    provider = provider.name(),
                    error = %e,
                    ip = %ip,
                    "Provider lookup failed"
                );
                ReputationResult::allow(provider.name())
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_ms = budget.as_millis() as u64,
                    ip = %ip,
                    "Provider lookup timed out"
                );
                ReputationResult::allow(provider.name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{FakeFetcher, Reply};
    use crate::providers::Action;

    const IP: &str = "203.0.113.5";

    const ALLOW_BODIES: [(&str, &str); 5] = [
        ("blackbox", "N"),
        ("getipintel", "0.12"),
        ("teoh", r#"{"risk":"low"}"#),
        ("proxycheck", r#"{"status":"ok","203.0.113.5":{"proxy":"no"}}"#),
        ("iphub", r#"{"block":0}"#),
    ];

    const BLOCK_BODIES: [(&str, &str); 5] = [
        ("blackbox", "Y"),
        ("getipintel", "0.995"),
        ("teoh", r#"{"risk":"high"}"#),
        ("proxycheck", r#"{"status":"ok","203.0.113.5":{"proxy":"yes","type":"VPN"}}"#),
        ("iphub", r#"{"block":1}"#),
    ];

    fn config() -> Config {
        Config::new("https://allow.example/", "https://block.example/")
    }

    /// All providers answer ALLOW unless an earlier route overrides them.
    fn allowing(fetcher: FakeFetcher) -> FakeFetcher {
        ALLOW_BODIES.iter().fold(fetcher, |f, (key, body)| f.ok(key, body))
    }

    fn classifier(fetcher: FakeFetcher) -> ConsensusClassifier {
        ConsensusClassifier::from_config(&config(), Arc::new(fetcher))
    }

    #[tokio::test]
    async fn test_all_allow() {
        let verdict = classifier(allowing(FakeFetcher::new())).classify(IP).await;
        assert!(!verdict.is_automated);
        assert_eq!(verdict.results.len(), 5);
        assert!(verdict.blocked_by().is_empty());
        assert!(verdict.reason().is_none());
    }

    #[tokio::test]
    async fn test_single_block_is_decisive_at_every_position() {
        for (key, body) in BLOCK_BODIES {
            let fetcher = allowing(FakeFetcher::new().ok(key, body));
            let verdict = classifier(fetcher).classify(IP).await;
            assert!(verdict.is_automated, "{} should block", key);
            assert_eq!(verdict.blocked_by(), vec![key]);
        }
    }

    #[tokio::test]
    async fn test_results_in_dispatch_order() {
        let verdict = classifier(allowing(FakeFetcher::new())).classify(IP).await;
        let names: Vec<&str> = verdict.results.iter().map(|r| r.provider.as_str()).collect();
        assert_eq!(names, vec!["blackbox", "getipintel", "teoh", "proxycheck", "iphub"]);
    }

    #[tokio::test]
    async fn test_multiple_blocks_combine_reasons() {
        let fetcher = allowing(
            FakeFetcher::new()
                .ok("blackbox", "Y")
                .ok("teoh", r#"{"risk":"high"}"#),
        );
        let verdict = classifier(fetcher).classify(IP).await;
        assert!(verdict.is_automated);
        assert_eq!(verdict.blocked_by(), vec!["blackbox", "teoh"]);
        assert_eq!(
            verdict.reason().as_deref(),
            Some("blackbox: proxy; teoh risk: high")
        );
    }

    #[tokio::test]
    async fn test_failures_fail_open() {
        let fetcher = FakeFetcher::new()
            .route("blackbox", Reply::Fail)
            .ok("getipintel", "not a number")
            .route("teoh", Reply::Body(503, r#"{"risk":"high"}"#.into()))
            .ok("proxycheck", "{{{")
            .ok("iphub", "<html>");
        let verdict = classifier(fetcher).classify(IP).await;
        assert!(!verdict.is_automated);
        assert!(verdict.results.iter().all(|r| r.action == Action::Allow));
    }

    #[tokio::test]
    async fn test_unreachable_everything_still_yields_verdict() {
        let verdict = classifier(FakeFetcher::new()).classify(IP).await;
        assert!(!verdict.is_automated);
        assert_eq!(verdict.results.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_times_out_as_allow() {
        let fetcher = allowing(FakeFetcher::new().route("proxycheck", Reply::Hang));
        let verdict = classifier(fetcher).classify(IP).await;
        assert!(!verdict.is_automated);
        assert_eq!(verdict.results[3].provider, "proxycheck");
        assert_eq!(verdict.results[3].action, Action::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_does_not_mask_block() {
        let fetcher = allowing(
            FakeFetcher::new()
                .route("blackbox", Reply::Hang)
                .ok("iphub", r#"{"block":1}"#),
        );
        let verdict = classifier(fetcher).classify(IP).await;
        assert!(verdict.is_automated);
        assert_eq!(verdict.blocked_by(), vec!["iphub"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_caps_provider_timeout() {
        let mut config = config();
        config.classifier.deadline_ms = 100;
        config.providers.teoh.timeout_ms = 60_000;
        let fetcher = allowing(FakeFetcher::new().route("teoh", Reply::Hang));
        let classifier = ConsensusClassifier::from_config(&config, Arc::new(fetcher));

        let started = tokio::time::Instant::now();
        let verdict = classifier.classify(IP).await;
        assert!(!verdict.is_automated);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_disabled_provider_votes_allow() {
        let mut config = config();
        config.providers.blackbox.enabled = false;
        let fetcher = Arc::new(allowing(FakeFetcher::new().ok("blackbox", "Y")));
        let classifier = ConsensusClassifier::from_config(&config, fetcher.clone());

        let verdict = classifier.classify(IP).await;
        assert!(!verdict.is_automated);
        assert_eq!(verdict.results.len(), 5);
        assert_eq!(classifier.len(), 5);
        assert!(fetcher.urls().iter().all(|u| !u.contains("blackbox")));
    }

    #[tokio::test]
    async fn test_empty_classifier_allows() {
        let classifier = ConsensusClassifier::new(Duration::from_secs(1));
        assert!(classifier.is_empty());
        assert!(!classifier.classify(IP).await.is_automated);
    }
}
