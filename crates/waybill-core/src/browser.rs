//! Headless browser session.
//!
//! Thin contract over chromiumoxide for the courier adapters: launch a
//! headless Chromium with a proxy address (never credentials, which stay in
//! the forwarding proxy), drive pages, and intercept the carrier page's own
//! JSON API calls.
//!
//! Interception uses the CDP `Fetch` domain: matching requests pause, the
//! session replays them through a caller-supplied HTTP client (so cookies,
//! geo, and auth traverse the same proxy the page uses), fulfills the page
//! with the fetched body, and hands a copy to the adapter over a channel.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, EventRequestPaused, FailRequestParams, FulfillRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use chromiumoxide::cdp::browser_protocol::network::ResourceType;

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors from the browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Chromium could not be configured or launched.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// DevTools protocol failure.
    #[error("browser protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// Launch options for one scraping session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Chromium binary path.
    pub binary: String,
    /// User-Agent override applied at launch.
    pub user_agent: Option<String>,
    /// Proxy address (`http://host:port`), no credentials.
    pub proxy: Option<String>,
}

/// Pattern for request interception.
#[derive(Debug, Clone)]
pub struct InterceptPattern {
    /// URL glob, e.g. `*/api/ObtenerRastreoGuiasClientePost`.
    pub url_glob: String,
    /// Optional resource-type filter (e.g. XHR only).
    pub resource_type: Option<ResourceType>,
}

/// One headless browser confined to a single tracking call.
///
/// The CDP event loop and any interception handlers run in background tasks
/// owned by the session; [`BrowserSession::close`] tears everything down.
/// Callers bound every await with their request deadline.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    intercept_tasks: Vec<JoinHandle<()>>,
}

impl BrowserSession {
    /// Launches a headless Chromium instance.
    pub async fn launch(options: &SessionOptions) -> Result<Self, BrowserError> {
        let mut config = BrowserConfig::builder()
            .chrome_executable(&options.binary)
            .no_sandbox();
        if let Some(proxy) = &options.proxy {
            config = config.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(user_agent) = &options.user_agent {
            config = config.arg(format!("--user-agent={user_agent}"));
        }

        let (browser, mut handler) = Browser::launch(config.build().map_err(BrowserError::Launch)?)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            intercept_tasks: Vec::new(),
        })
    }

    /// Opens a page at `url` (`about:blank` for a blank page).
    pub async fn page(&self, url: &str) -> Result<Page, BrowserError> {
        Ok(self.browser.new_page(url).await?)
    }

    /// Registers a script evaluated on every new document before the page's
    /// own scripts run. Used for the stealth tweak hiding the automation
    /// flag.
    pub async fn add_init_script(&self, page: &Page, script: &str) -> Result<(), BrowserError> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await?;
        Ok(())
    }

    /// Installs request interception on `page`.
    ///
    /// Requests matching `pattern` are paused, replayed through `client`,
    /// fulfilled with the fetched body, and the body is delivered on the
    /// returned channel. Replay failures fail the in-page request and are
    /// logged; they never panic the session.
    pub async fn intercept(
        &mut self,
        page: &Page,
        pattern: InterceptPattern,
        client: reqwest::Client,
    ) -> Result<mpsc::Receiver<Vec<u8>>, BrowserError> {
        let request_pattern = RequestPattern {
            url_pattern: Some(pattern.url_glob.clone()),
            resource_type: pattern.resource_type,
            request_stage: Some(RequestStage::Request),
        };
        page.execute(fetch::EnableParams {
            patterns: Some(vec![request_pattern]),
            handle_auth_requests: None,
        })
        .await?;

        let mut events = page.event_listener::<EventRequestPaused>().await?;
        let (body_tx, body_rx) = mpsc::channel(1);
        let page = page.clone();
        let glob = pattern.url_glob;

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                debug!(url = %event.request.url, pattern = %glob, "intercepted request");
                match replay_request(&client, &event).await {
                    Ok(body) => {
                        let mut fulfill =
                            FulfillRequestParams::new(event.request_id.clone(), 200);
                        fulfill.body = Some(BASE64.encode(&body).into());
                        if let Err(err) = page.execute(fulfill).await {
                            debug!(error = %err, "failed to fulfill intercepted request");
                        }
                        if body_tx.send(body).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to replay intercepted request");
                        let fail = FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::Failed,
                        );
                        if let Err(err) = page.execute(fail).await {
                            debug!(error = %err, "failed to fail intercepted request");
                        }
                    }
                }
            }
        });
        self.intercept_tasks.push(task);

        Ok(body_rx)
    }

    /// Navigates the page and waits for the load to settle.
    pub async fn navigate(&self, page: &Page, url: &str) -> Result<(), BrowserError> {
        page.goto(url).await?;
        Ok(())
    }

    /// Polls until `selector` resolves on the page. Unbounded by itself; the
    /// caller's deadline cancels it.
    pub async fn wait_for_element(&self, page: &Page, selector: &str) -> Result<(), BrowserError> {
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    /// Clicks the element at `selector` and types `text` into it.
    pub async fn type_into(
        &self,
        page: &Page,
        selector: &str,
        text: &str,
    ) -> Result<(), BrowserError> {
        let element = page.find_element(selector).await?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    /// Clicks the element at `selector`.
    pub async fn click(&self, page: &Page, selector: &str) -> Result<(), BrowserError> {
        page.find_element(selector).await?.click().await?;
        Ok(())
    }

    /// Closes the browser and tears down the background tasks.
    pub async fn close(mut self) {
        for task in self.intercept_tasks.drain(..) {
            task.abort();
        }
        if let Err(err) = self.browser.close().await {
            debug!(error = %err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Backstop for cancelled futures: stop our tasks so nothing keeps
        // polling a dead browser. The child process is reaped by close() on
        // normal paths.
        for task in &self.intercept_tasks {
            task.abort();
        }
        self.handler_task.abort();
    }
}

/// Replays a paused request through the supplied client and returns the
/// response body.
async fn replay_request(
    client: &reqwest::Client,
    event: &EventRequestPaused,
) -> Result<Vec<u8>, reqwest::Error> {
    let method = reqwest::Method::from_bytes(event.request.method.as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut request = client.request(method, &event.request.url);

    if let Ok(serde_json::Value::Object(headers)) = serde_json::to_value(&event.request.headers) {
        for (name, value) in headers {
            if name.starts_with(':')
                || name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            if let Some(value) = value.as_str() {
                request = request.header(&name, value);
            }
        }
    }
    if let Some(post_data) = &event.request.post_data {
        request = request.body(post_data.clone());
    }

    let response = request.send().await?;
    Ok(response.bytes().await?.to_vec())
}
