//! Servientrega tracking adapter.
//!
//! Loading the tracking page with the waybill in the URL triggers the page's
//! internal `ControlRastreovalidaciones` XHR, which is intercepted and
//! mapped. A plain HTTP connectivity probe runs first so an unreachable site
//! fails fast instead of burning the deadline inside a browser.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use waybill_proxy::ProxySettings;

use crate::browser::{BrowserSession, InterceptPattern, ResourceType, SessionOptions};
use crate::tracking::{parse_date_or_zero, CourierId, TrackingEvent, TrackingHistory, TrackingStatus};

use super::{
    bounded, upstream_client, CourierError, CourierProvider, ProxyRoute, FETCH_TIMEOUT,
    STEALTH_INIT_SCRIPT, STEALTH_UA,
};

const INTERCEPT_GLOB: &str = "*/api/ControlRastreovalidaciones";
const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";
const MAX_NAV_ATTEMPTS: u32 = 3;
const NAV_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Movement codes this adapter understands. Unknown codes are logged and
/// passed through.
const KNOWN_CODES: [&str; 9] = ["1", "6", "9", "12", "15", "18", "21", "24", "27"];

/// Tracking adapter for Servientrega.
pub struct ServientregaAdapter {
    base_url: String,
    proxy: ProxySettings,
    browser_bin: String,
}

impl ServientregaAdapter {
    pub fn new(base_url: String, proxy: ProxySettings, browser_bin: String) -> Self {
        Self {
            base_url,
            proxy,
            browser_bin,
        }
    }

    /// Plain GET against the tracking URL through the same proxy the browser
    /// will use. Failure here fast-fails the whole call.
    async fn check_connectivity(&self, url: &str, deadline: Instant) -> Result<(), CourierError> {
        debug!(%url, proxy_enabled = self.proxy.has_proxy(), "checking connectivity");
        let client = upstream_client(&self.proxy)?;
        match bounded(deadline, client.get(url).send()).await? {
            Ok(response) => {
                debug!(status = %response.status(), "connectivity check passed");
                Ok(())
            }
            Err(err) => Err(CourierError::Connectivity(err)),
        }
    }

    async fn track_inner(
        &self,
        url: &str,
        route: &ProxyRoute,
        deadline: Instant,
    ) -> Result<TrackingHistory, CourierError> {
        let options = SessionOptions {
            binary: self.browser_bin.clone(),
            user_agent: Some(STEALTH_UA.to_string()),
            proxy: route.addr().map(str::to_string),
        };
        let mut session = bounded(deadline, BrowserSession::launch(&options)).await??;
        let result = self.drive(&mut session, url, route, deadline).await;
        session.close().await;
        result
    }

    async fn drive(
        &self,
        session: &mut BrowserSession,
        url: &str,
        route: &ProxyRoute,
        deadline: Instant,
    ) -> Result<TrackingHistory, CourierError> {
        let page = bounded(deadline, session.page("about:blank")).await??;
        bounded(deadline, session.add_init_script(&page, STEALTH_INIT_SCRIPT)).await??;

        let pattern = InterceptPattern {
            url_glob: INTERCEPT_GLOB.to_string(),
            resource_type: Some(ResourceType::Xhr),
        };
        let mut bodies = bounded(
            deadline,
            session.intercept(&page, pattern, route.http_client()?),
        )
        .await??;

        // The page intermittently times out behind residential exits;
        // navigation gets a few bounded attempts.
        let mut last_error = None;
        for attempt in 1..=MAX_NAV_ATTEMPTS {
            match bounded(deadline, session.navigate(&page, url)).await? {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(err) => {
                    warn!(attempt, max_attempts = MAX_NAV_ATTEMPTS, error = %err, "navigation failed");
                    last_error = Some(err);
                    if attempt < MAX_NAV_ATTEMPTS {
                        bounded(deadline, tokio::time::sleep(NAV_RETRY_BACKOFF)).await?;
                    }
                }
            }
        }
        if let Some(err) = last_error {
            return Err(CourierError::Navigation(err.to_string()));
        }

        let body = bounded(deadline, bodies.recv())
            .await?
            .ok_or(CourierError::Timeout)?;

        let response: ServientregaResponse = serde_json::from_slice(&body)?;
        map_response(response)
    }
}

#[async_trait]
impl CourierProvider for ServientregaAdapter {
    fn supports(&self, courier: CourierId) -> bool {
        courier == CourierId::Servientrega
    }

    async fn track(&self, waybill: &str) -> Result<TrackingHistory, CourierError> {
        let deadline = Instant::now() + FETCH_TIMEOUT;
        info!(
            tracking_number = %waybill,
            timeout_secs = FETCH_TIMEOUT.as_secs(),
            "starting Servientrega tracking"
        );

        let url = format!("{}{}", self.base_url, waybill);
        self.check_connectivity(&url, deadline).await?;

        let route = ProxyRoute::establish(&self.proxy, &["servientrega.com"])?;
        let result = self.track_inner(&url, &route, deadline).await;
        route.teardown().await;
        result
    }
}

fn map_response(response: ServientregaResponse) -> Result<TrackingHistory, CourierError> {
    let Some(result) = response.results.into_iter().next() else {
        return Err(CourierError::NoResults {
            code: response.code,
        });
    };

    let mut history = TrackingHistory::new();
    history.global_status = map_estado_actual(&result.estado_actual);

    for movement in result.movimientos {
        let mut text = movement.movimiento.clone();
        if !movement.novedad.is_empty() {
            text.push_str(&format!(" - {}", movement.novedad));
        }
        history.history.push(TrackingEvent {
            date: parse_date_or_zero(&movement.fecha, DATE_FORMAT),
            text,
            city: movement.ubicacion,
            code: movement.id_proceso.clone(),
        });

        if !KNOWN_CODES.contains(&movement.id_proceso.as_str()) {
            warn!(
                code = %movement.id_proceso,
                description = %movement.movimiento,
                "unknown Servientrega movement code"
            );
        }
    }

    Ok(history)
}

/// Derives the global status from the carrier's `estadoActual` field by
/// case-insensitive substring.
fn map_estado_actual(estado: &str) -> TrackingStatus {
    let estado = estado.trim().to_uppercase();
    if estado.contains("ENTREGAD") {
        // "ENTREGADO A REMITENTE" is a delivery back to the sender.
        if estado.contains("REMITENTE") {
            return TrackingStatus::Return;
        }
        return TrackingStatus::Completed;
    }
    if estado.contains("DEVOL") || estado.contains("RETURN") {
        return TrackingStatus::Return;
    }
    if estado.contains("NOVEDAD") || estado.contains("INCIDENCIA") {
        return TrackingStatus::Incidence;
    }
    TrackingStatus::Processing
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServientregaResponse {
    #[serde(rename = "Code")]
    code: i64,
    #[serde(rename = "Results")]
    results: Vec<ServientregaResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServientregaResult {
    #[serde(rename = "estadoActual")]
    estado_actual: String,
    #[serde(rename = "movimientos")]
    movimientos: Vec<ServientregaMovement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServientregaMovement {
    #[serde(rename = "fecha")]
    fecha: String,
    #[serde(rename = "movimiento")]
    movimiento: String,
    #[serde(rename = "ubicacion")]
    ubicacion: String,
    #[serde(rename = "Novedad")]
    novedad: String,
    #[serde(rename = "IdProceso")]
    id_proceso: String,
}
