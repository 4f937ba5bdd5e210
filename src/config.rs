//! Configuration types for the visitor gate.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: Settings,

    /// Redirect destinations.
    pub redirect: RedirectConfig,

    /// Client address resolution.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Fan-in settings for the consensus classifier.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Reputation providers.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// ISP/country lookup (informational only).
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Global settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Log redirects of automated visitors.
    #[serde(default = "default_true")]
    pub log_blocked: bool,

    /// Log redirects of human visitors.
    #[serde(default)]
    pub log_allowed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_blocked: true,
            log_allowed: false,
        }
    }
}

/// The two redirect destinations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectConfig {
    /// Where human visitors go.
    pub allow_url: String,

    /// Where automated visitors go.
    pub block_url: String,
}

/// Client address resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Headers to check for the client address, most trusted first.
    #[serde(default = "default_ip_headers")]
    pub headers: Vec<String>,

    /// Identity used when no address can be resolved.
    #[serde(default = "default_fallback_ip")]
    pub fallback_ip: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            headers: default_ip_headers(),
            fallback_ip: default_fallback_ip(),
        }
    }
}

/// Client candidate headers: client-declared first, connection-layer last.
pub fn default_ip_headers() -> Vec<String> {
    [
        "x-client-ip",
        "x-forwarded-for",
        "x-real-ip",
        "cf-connecting-ip",
        "fastly-client-ip",
        "true-client-ip",
        "x-forwarded",
        "x-cluster-client-ip",
        "forwarded-for",
        "forwarded",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect()
}

fn default_fallback_ip() -> String {
    "8.8.8.8".to_string()
}

/// Fan-in settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Upper bound on waiting for any single provider (milliseconds).
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline(),
        }
    }
}

fn default_deadline() -> u64 {
    8000
}

/// Per-provider settings, in dispatch order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub blackbox: ProviderConfig,
    #[serde(default)]
    pub getipintel: GetIpIntelConfig,
    #[serde(default)]
    pub teoh: ProviderConfig,
    #[serde(default)]
    pub proxycheck: ProviderConfig,
    #[serde(default)]
    pub iphub: ProviderConfig,
}

/// Settings shared by every provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Enable this provider. A disabled provider always votes ALLOW.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override the provider's endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            timeout_ms: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    5000
}

/// GetIPIntel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GetIpIntelConfig {
    #[serde(flatten)]
    pub common: ProviderConfig,

    /// Contact address sent with each query. A throwaway address is
    /// generated per request when unset.
    #[serde(default)]
    pub contact: Option<String>,

    /// Block if the probability is >= this value.
    #[serde(default = "default_block_score")]
    pub block_score: f64,
}

impl Default for GetIpIntelConfig {
    fn default() -> Self {
        Self {
            common: ProviderConfig::default(),
            contact: None,
            block_score: default_block_score(),
        }
    }
}

fn default_block_score() -> f64 {
    0.99
}

/// ISP/country lookup settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_enrichment_url")]
    pub base_url: String,

    #[serde(default = "default_enrichment_timeout")]
    pub timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_enrichment_url(),
            timeout_ms: default_enrichment_timeout(),
        }
    }
}

fn default_enrichment_url() -> String {
    "https://ipinfo.io".to_string()
}

fn default_enrichment_timeout() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Config with default settings and the given destinations.
    pub fn new(allow_url: &str, block_url: &str) -> Self {
        Self {
            server: ServerConfig::default(),
            settings: Settings::default(),
            redirect: RedirectConfig {
                allow_url: allow_url.to_string(),
                block_url: block_url.to_string(),
            },
            resolver: ResolverConfig::default(),
            classifier: ClassifierConfig::default(),
            providers: ProvidersConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_url("redirect.allow_url", &self.redirect.allow_url)?;
        validate_url("redirect.block_url", &self.redirect.block_url)?;

        if self.resolver.headers.is_empty() {
            anyhow::bail!("resolver.headers must list at least one header");
        }

        if self.resolver.fallback_ip.parse::<IpAddr>().is_err() {
            anyhow::bail!(
                "resolver.fallback_ip is not an IP address: {}",
                self.resolver.fallback_ip
            );
        }

        if self.classifier.deadline_ms == 0 {
            anyhow::bail!("classifier.deadline_ms must be > 0");
        }

        let providers = [
            ("blackbox", &self.providers.blackbox),
            ("getipintel", &self.providers.getipintel.common),
            ("teoh", &self.providers.teoh),
            ("proxycheck", &self.providers.proxycheck),
            ("iphub", &self.providers.iphub),
        ];
        for (name, provider) in providers {
            if provider.timeout_ms == 0 {
                anyhow::bail!("providers.{}.timeout_ms must be > 0", name);
            }
            if let Some(ref base_url) = provider.base_url {
                validate_url(&format!("providers.{}.base_url", name), base_url)?;
            }
        }

        let score = self.providers.getipintel.block_score;
        if !(0.0..=1.0).contains(&score) {
            anyhow::bail!(
                "providers.getipintel.block_score ({}) must be within 0.0..=1.0",
                score
            );
        }

        if self.enrichment.enabled {
            if self.enrichment.timeout_ms == 0 {
                anyhow::bail!("enrichment.timeout_ms must be > 0");
            }
            validate_url("enrichment.base_url", &self.enrichment.base_url)?;
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# Visitor Gate Configuration

server:
  listen: "0.0.0.0:3000"

settings:
  log_blocked: true
  log_allowed: false

# Exactly two destinations: humans go to allow_url, bots to block_url
redirect:
  allow_url: "${VISITOR_GATE_ALLOW_URL}"
  block_url: "https://www.example.com/"

# Client address resolution, most trusted header first
resolver:
  headers:
    - "x-client-ip"
    - "x-forwarded-for"
    - "x-real-ip"
    - "cf-connecting-ip"
    - "fastly-client-ip"
    - "true-client-ip"
    - "x-forwarded"
    - "x-cluster-client-ip"
    - "forwarded-for"
    - "forwarded"
  fallback_ip: "8.8.8.8"       # Used when nothing resolves

classifier:
  deadline_ms: 8000            # No provider is waited on longer than this

# Any single BLOCK sends the visitor to block_url
providers:
  blackbox:
    enabled: true
    timeout_ms: 5000
  getipintel:
    enabled: true
    timeout_ms: 5000
    block_score: 0.99          # Block if probability >= 0.99
    # contact: "ops@example.com"
  teoh:
    enabled: true
  proxycheck:
    enabled: true
  iphub:
    enabled: true

# ISP/country lookup, logged only
enrichment:
  enabled: true
  base_url: "https://ipinfo.io"
  timeout_ms: 3000
"#
        .to_string()
    }
}

fn validate_url(field: &str, value: &str) -> anyhow::Result<()> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", field, e, value))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("{} must use http or https: {}", field, value);
    }
    Ok(())
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_value = std::env::var(&cap[1]).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
