//! Request handling: resolve, classify, redirect.

use crate::classifier::{ConsensusClassifier, Verdict};
use crate::config::Config;
use crate::enrichment::{Enricher, IpDetails};
use crate::http::{HttpFetch, ReqwestFetcher};
use crate::resolver::resolve_client_ip;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{self, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error, info};

/// Sends human visitors to one URL and automated ones to another.
pub struct VisitorRedirector {
    config: Arc<Config>,
    classifier: ConsensusClassifier,
    enricher: Enricher,
}

/// Everything decided for one request.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Address that was classified.
    pub ip: String,

    /// False when the fallback identity was used.
    pub resolved: bool,

    pub verdict: Verdict,

    pub details: IpDetails,

    /// Redirect destination.
    pub target: String,
}

impl Decision {
    pub fn is_automated(&self) -> bool {
        self.verdict.is_automated
    }
}

impl VisitorRedirector {
    /// Create a redirector that talks to the real providers.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let timeout = Duration::from_millis(config.classifier.deadline_ms);
        let fetcher: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(timeout)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create a redirector on top of the given HTTP capability.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn HttpFetch>) -> Self {
        let classifier = ConsensusClassifier::from_config(&config, fetcher.clone());
        let enricher = Enricher::new(config.enrichment.clone(), fetcher);

        info!(
            headers = config.resolver.headers.len(),
            fallback_ip = %config.resolver.fallback_ip,
            enrichment = config.enrichment.enabled,
            "Visitor redirector initialized"
        );

        Self {
            config: Arc::new(config),
            classifier,
            enricher,
        }
    }

    /// Resolve the client, classify it and pick the destination.
    pub async fn decide(&self, headers: &HashMap<String, String>, peer: Option<&str>) -> Decision {
        let (ip, resolved) = match resolve_client_ip(headers, peer, &self.config.resolver) {
            Some(ip) => (ip, true),
            None => {
                debug!(
                    fallback_ip = %self.config.resolver.fallback_ip,
                    "No client address resolved, using fallback"
                );
                (self.config.resolver.fallback_ip.clone(), false)
            }
        };

        info!(ip = %ip, resolved = resolved, "Resolved client address");

        let (verdict, details) =
            tokio::join!(self.classifier.classify(&ip), self.enricher.lookup(&ip));

        let target = if verdict.is_automated {
            &self.config.redirect.block_url
        } else {
            &self.config.redirect.allow_url
        };

        if verdict.is_automated && self.config.settings.log_blocked {
            info!(
                ip = %ip,
                isp = %details.isp,
                country = %details.country,
                blocked_by = ?verdict.blocked_by(),
                reason = ?verdict.reason(),
                "Redirecting automated visitor"
            );
        } else if !verdict.is_automated && self.config.settings.log_allowed {
            info!(
                ip = %ip,
                isp = %details.isp,
                country = %details.country,
                "Redirecting visitor"
            );
        } else {
            debug!(ip = %ip, is_automated = verdict.is_automated, destination = %target, "Redirecting");
        }

        Decision {
            ip,
            resolved,
            target: target.clone(),
            verdict,
            details,
        }
    }

    /// Router serving every path and method with the redirect handler.
    /// A panic while handling a request becomes a 500, never a dropped
    /// connection.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(handle_visit)
            .with_state(self)
            .layer(CatchPanicLayer::custom(panic_response))
    }
}

async fn handle_visit(
    State(redirector): State<Arc<VisitorRedirector>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let headers = flatten_headers(&headers);
    let peer = peer.map(|ConnectInfo(addr)| addr.ip().to_string());

    let decision = redirector.decide(&headers, peer.as_deref()).await;

    match redirect_to(&decision.target) {
        Ok(response) => response,
        Err(e) => {
            error!(target_url = %decision.target, error = %e, "Failed to build redirect");
            internal_error()
        }
    }
}

/// 302 with the given location.
fn redirect_to(target: &str) -> Result<Response, InvalidHeaderValue> {
    let location = HeaderValue::from_str(target)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal Server Error" })),
    )
        .into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = %message, "Request handler panicked");
    internal_error()
}

/// Flatten headers into lowercase names; repeated lines are joined with ", ".
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flat.entry(name.as_str().to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}
