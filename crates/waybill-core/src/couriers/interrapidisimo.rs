//! Interrapidísimo tracking adapter.
//!
//! The tracking page offers a search box; typing the waybill and submitting
//! makes the page call its internal `ObtenerRastreoGuiasClientePost` API,
//! which is intercepted and mapped.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

use waybill_proxy::ProxySettings;

use crate::browser::{BrowserSession, InterceptPattern, SessionOptions};
use crate::tracking::{parse_date_or_zero, CourierId, TrackingEvent, TrackingHistory, TrackingStatus};

use super::{bounded, CourierError, CourierProvider, ProxyRoute, FETCH_TIMEOUT, STEALTH_INIT_SCRIPT, STEALTH_UA};

const INTERCEPT_GLOB: &str = "*/ObtenerRastreoGuiasClientePost";
const SEARCH_INPUT: &str = "#inputGuide";
const SEARCH_BUTTON: &str = ".search-button";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Status codes this adapter understands. Unknown codes are logged and
/// passed through.
const KNOWN_CODES: [i64; 9] = [1, 2, 3, 4, 6, 7, 10, 11, 16];

/// Tracking adapter for Interrapidísimo.
pub struct InterrapidisimoAdapter {
    base_url: String,
    proxy: ProxySettings,
    browser_bin: String,
}

impl InterrapidisimoAdapter {
    pub fn new(base_url: String, proxy: ProxySettings, browser_bin: String) -> Self {
        Self {
            base_url,
            proxy,
            browser_bin,
        }
    }

    async fn track_inner(
        &self,
        waybill: &str,
        route: &ProxyRoute,
        deadline: Instant,
    ) -> Result<TrackingHistory, CourierError> {
        let options = SessionOptions {
            binary: self.browser_bin.clone(),
            user_agent: Some(STEALTH_UA.to_string()),
            proxy: route.addr().map(str::to_string),
        };
        let mut session = bounded(deadline, BrowserSession::launch(&options)).await??;
        let result = self.drive(&mut session, waybill, route, deadline).await;
        session.close().await;
        result
    }

    async fn drive(
        &self,
        session: &mut BrowserSession,
        waybill: &str,
        route: &ProxyRoute,
        deadline: Instant,
    ) -> Result<TrackingHistory, CourierError> {
        let page = bounded(deadline, session.page("about:blank")).await??;
        bounded(deadline, session.add_init_script(&page, STEALTH_INIT_SCRIPT)).await??;

        let pattern = InterceptPattern {
            url_glob: INTERCEPT_GLOB.to_string(),
            resource_type: None,
        };
        let mut bodies = bounded(
            deadline,
            session.intercept(&page, pattern, route.http_client()?),
        )
        .await??;

        bounded(deadline, session.navigate(&page, &self.base_url)).await??;
        bounded(deadline, session.wait_for_element(&page, SEARCH_INPUT)).await??;
        bounded(deadline, session.type_into(&page, SEARCH_INPUT, waybill)).await??;
        bounded(deadline, session.click(&page, SEARCH_BUTTON)).await??;

        let body = bounded(deadline, bodies.recv())
            .await?
            .ok_or(CourierError::Timeout)?;

        let response: InterResponse = serde_json::from_slice(&body)?;
        if !response.success {
            return Err(CourierError::Courier(response.message));
        }
        Ok(map_response(response))
    }
}

#[async_trait]
impl CourierProvider for InterrapidisimoAdapter {
    fn supports(&self, courier: CourierId) -> bool {
        courier == CourierId::Interrapidisimo
    }

    async fn track(&self, waybill: &str) -> Result<TrackingHistory, CourierError> {
        let deadline = Instant::now() + FETCH_TIMEOUT;
        info!(
            tracking_number = %waybill,
            timeout_secs = FETCH_TIMEOUT.as_secs(),
            "starting Interrapidisimo tracking"
        );

        let route = ProxyRoute::establish(&self.proxy, &["interrapidisimo.com"])?;
        let result = self.track_inner(waybill, &route, deadline).await;
        route.teardown().await;
        result
    }
}

fn map_response(response: InterResponse) -> TrackingHistory {
    let mut history = TrackingHistory::new();

    for envelope in response.estados_guia {
        let state = envelope.estado_guia;
        history.history.push(TrackingEvent {
            date: parse_date_or_zero(&state.fecha_grabacion, DATE_FORMAT),
            text: state.descripcion_estado_guia.clone(),
            city: state.ciudad.clone(),
            code: state.id_estado_guia.to_string(),
        });

        let next = match state.id_estado_guia {
            11 => Some(TrackingStatus::Completed),
            10 => Some(TrackingStatus::Return),
            7 => Some(TrackingStatus::Incidence),
            _ => None,
        };
        if let Some(next) = next {
            history.global_status = history.global_status.transition(next);
        }

        if !KNOWN_CODES.contains(&state.id_estado_guia) {
            warn!(
                code = state.id_estado_guia,
                description = %state.descripcion_estado_guia,
                "unknown Interrapidisimo status code"
            );
        }
    }

    history
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InterResponse {
    #[serde(rename = "EstadosGuia")]
    estados_guia: Vec<InterStateEnvelope>,
    #[serde(rename = "Success")]
    success: bool,
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InterStateEnvelope {
    #[serde(rename = "EstadoGuia")]
    estado_guia: InterState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InterState {
    #[serde(rename = "IdEstadoGuia")]
    id_estado_guia: i64,
    #[serde(rename = "DescripcionEstadoGuia")]
    descripcion_estado_guia: String,
    #[serde(rename = "Ciudad")]
    ciudad: String,
    #[serde(rename = "FechaGrabacion")]
    fecha_grabacion: String,
}
