//! Reputation providers consulted by the consensus classifier.
//!
//! Each provider owns its request construction and response decoding. A
//! provider only reports what it saw; turning failures into verdicts is
//! the classifier's job.

pub mod blackbox;
pub mod getipintel;
pub mod iphub;
pub mod proxycheck;
pub mod teoh;

use async_trait::async_trait;
use rand::Rng;

/// Result of a reputation check.
#[derive(Debug, Clone)]
pub struct ReputationResult {
    /// Verdict from this provider.
    pub action: Action,

    /// Which provider returned this result.
    pub provider: String,

    /// Reason for this action.
    pub reason: Option<String>,

    /// Raw score, for providers that report one.
    pub score: Option<f64>,
}

impl ReputationResult {
    /// Create a new "allow" result.
    pub fn allow(provider: &str) -> Self {
        Self {
            action: Action::Allow,
            provider: provider.to_string(),
            reason: None,
            score: None,
        }
    }

    /// Create a new "block" result.
    pub fn block(provider: &str, reason: &str) -> Self {
        Self {
            action: Action::Block,
            provider: provider.to_string(),
            reason: Some(reason.to_string()),
            score: None,
        }
    }

    /// Set the score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Verdict of a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Human visitor as far as this provider knows.
    Allow,
    /// Automated, proxied or VPN visitor.
    Block,
}

impl Action {
    pub fn is_block(&self) -> bool {
        matches!(self, Action::Block)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "ALLOW",
            Action::Block => "BLOCK",
        }
    }
}

/// Error from a reputation provider.
#[derive(Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    Http(reqwest::Error),
    /// Timeout.
    Timeout,
    /// Non-2xx response.
    Status(u16),
    /// Invalid response.
    InvalidResponse(String),
    /// Other error.
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Http(e) => write!(f, "HTTP error: {}", e),
            ProviderError::Timeout => write!(f, "Request timed out"),
            ProviderError::Status(code) => write!(f, "Unexpected status: HTTP {}", code),
            ProviderError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ProviderError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(e)
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
    }
}

/// Trait for IP reputation providers.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Check the reputation of an address.
    async fn check(&self, ip: &str) -> Result<ReputationResult, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Whether this provider is enabled.
    fn is_enabled(&self) -> bool;
}

/// Random numeric token for cache busting and throwaway contact addresses.
pub(crate) fn random_token() -> u32 {
    rand::thread_rng().gen_range(0..1_000_000)
}

/// Join a configured base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
