//! Courier scraping adapters.
//!
//! One adapter per carrier, all built on the same skeleton: a 60-second
//! master deadline, an optional credential-injecting forwarding proxy, a
//! headless browser session with the stealth tweak, and interception of the
//! carrier page's internal JSON API call. The carriers differ in how the
//! call is triggered (search interaction, direct navigation, query
//! parameter) and in their payload schemas, handled by per-carrier mappers.

mod coordinadora;
mod interrapidisimo;
mod servientrega;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use waybill_proxy::{DomainAllowlist, ForwardingProxy, ProxySettings};

use crate::browser::BrowserError;
use crate::tracking::{CourierId, TrackingHistory};

pub use coordinadora::CoordinadoraAdapter;
pub use interrapidisimo::InterrapidisimoAdapter;
pub use servientrega::ServientregaAdapter;

/// Master deadline governing one tracking call end to end.
pub(crate) const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the plain HTTP requests an adapter makes itself.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Desktop User-Agent presented by every browser session and HTTP client.
pub(crate) const STEALTH_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Hides the automation flag before any page script runs.
pub(crate) const STEALTH_INIT_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Errors from the courier adapters.
#[derive(Debug, Error)]
pub enum CourierError {
    /// The pre-navigation reachability probe failed.
    #[error("connectivity check failed: {0}")]
    Connectivity(#[source] reqwest::Error),

    /// Browser launch or protocol failure.
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// The carrier API reported a failure for this waybill.
    #[error("courier error: {0}")]
    Courier(String),

    /// The carrier API answered without any tracking results.
    #[error("no results in response (Code: {code})")]
    NoResults { code: i64 },

    /// The intercepted payload did not match the carrier schema.
    #[error("failed to parse courier response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The 60-second master deadline elapsed.
    #[error("timeout waiting for courier response")]
    Timeout,

    /// Page navigation kept failing after all retry attempts.
    #[error("navigation failed after retries: {0}")]
    Navigation(String),

    /// Forwarding proxy failure.
    #[error(transparent)]
    Proxy(#[from] waybill_proxy::ProxyError),

    /// Outbound HTTP failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured tracking URL template is ambiguous or malformed.
    #[error("invalid tracking URL template: {0}")]
    UrlTemplate(String),
}

/// Port implemented by every courier adapter.
#[async_trait]
pub trait CourierProvider: Send + Sync {
    /// Whether this adapter handles the given courier.
    fn supports(&self, courier: CourierId) -> bool;

    /// Scrapes the tracking history for a waybill.
    async fn track(&self, waybill: &str) -> Result<TrackingHistory, CourierError>;
}

/// Bounds a future by the master deadline, mapping expiry to
/// [`CourierError::Timeout`].
pub(crate) async fn bounded<F: std::future::Future>(
    deadline: Instant,
    future: F,
) -> Result<F::Output, CourierError> {
    tokio::time::timeout_at(deadline, future)
        .await
        .map_err(|_| CourierError::Timeout)
}

/// Proxy routing for one tracking call.
///
/// With credentials configured, the browser cannot authenticate against the
/// upstream proxy itself, so a [`ForwardingProxy`] is started on loopback
/// and torn down when the call finishes. Without credentials the upstream
/// `host:port` is handed to the browser directly; with the proxy disabled
/// the browser connects directly.
pub(crate) struct ProxyRoute {
    forwarder: Option<ForwardingProxy>,
    addr: Option<String>,
}

impl ProxyRoute {
    pub(crate) fn establish(
        settings: &ProxySettings,
        allowed_domains: &[&str],
    ) -> Result<Self, CourierError> {
        if settings.has_proxy() && settings.has_credentials() {
            let upstream = settings
                .full_url()
                .unwrap_or_default();
            let forwarder = ForwardingProxy::new(
                &upstream,
                DomainAllowlist::new(allowed_domains.iter().copied()),
            )?;
            let addr = forwarder.start()?;
            return Ok(Self {
                forwarder: Some(forwarder),
                addr: Some(addr),
            });
        }
        if settings.has_proxy() {
            // Credential-less upstream (IP allowlist mode): the browser can
            // use it directly.
            return Ok(Self {
                forwarder: None,
                addr: settings.host_port(),
            });
        }
        Ok(Self {
            forwarder: None,
            addr: None,
        })
    }

    /// The proxy address to hand to the browser, if any.
    pub(crate) fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    /// HTTP client routed the same way the browser is, so intercepted
    /// replays see the cookies and ACLs the page established.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, CourierError> {
        let mut builder = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(STEALTH_UA);
        if let Some(addr) = &self.addr {
            builder = builder.proxy(reqwest::Proxy::all(addr)?);
        }
        Ok(builder.build()?)
    }

    /// Stops the forwarding proxy, if one was started.
    pub(crate) async fn teardown(self) {
        if let Some(forwarder) = self.forwarder {
            forwarder.stop().await;
        }
    }
}

/// HTTP client routed through the upstream proxy with credentials embedded,
/// bypassing the forwarder. Used for pre-navigation connectivity checks.
pub(crate) fn upstream_client(settings: &ProxySettings) -> Result<reqwest::Client, CourierError> {
    let mut builder = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(STEALTH_UA);
    if let Some(url) = settings.full_url() {
        builder = builder.proxy(reqwest::Proxy::all(&url)?);
    }
    Ok(builder.build()?)
}

/// Tracking page URL template, validated at adapter construction.
///
/// Legacy configs carry three template shapes; each is unambiguous on its
/// own, and anything else errors at startup instead of at request time.
#[derive(Debug, Clone)]
pub(crate) enum TrackingUrl {
    /// Template with a single `%s` placeholder.
    Placeholder(String),
    /// Template ending in `=`; the waybill is appended.
    TrailingParam(String),
    /// Bare base URL; `?guia={waybill}` is appended.
    QueryFallback(String),
}

impl TrackingUrl {
    pub(crate) fn parse(template: &str) -> Result<Self, CourierError> {
        let placeholders = template.matches("%s").count();
        if placeholders > 1 {
            return Err(CourierError::UrlTemplate(format!(
                "multiple placeholders in {template:?}"
            )));
        }
        if placeholders == 1 {
            if template.ends_with('=') {
                return Err(CourierError::UrlTemplate(format!(
                    "placeholder combined with trailing '=' in {template:?}"
                )));
            }
            return Ok(TrackingUrl::Placeholder(template.to_string()));
        }
        if template.ends_with('=') {
            return Ok(TrackingUrl::TrailingParam(template.to_string()));
        }
        if template.contains('?') {
            return Err(CourierError::UrlTemplate(format!(
                "query string without placeholder in {template:?}"
            )));
        }
        Ok(TrackingUrl::QueryFallback(template.to_string()))
    }

    pub(crate) fn render(&self, waybill: &str) -> String {
        match self {
            TrackingUrl::Placeholder(template) => template.replacen("%s", waybill, 1),
            TrackingUrl::TrailingParam(base) => format!("{base}{waybill}"),
            TrackingUrl::QueryFallback(base) => format!("{base}?guia={waybill}"),
        }
    }
}
