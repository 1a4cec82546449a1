//! Coordinadora tracking adapter.
//!
//! The tracking page takes the waybill as a query parameter and calls a
//! WordPress JSON endpoint (`wp-json/rgc/v1/detail_tracking`) on load, which
//! is intercepted and mapped. The URL template shape is validated when the
//! adapter is built, so a bad legacy config fails at startup.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{info, warn};

use waybill_proxy::ProxySettings;

use crate::browser::{BrowserSession, InterceptPattern, SessionOptions};
use crate::tracking::{parse_date_or_zero, CourierId, TrackingEvent, TrackingHistory, TrackingStatus};

use super::{
    bounded, CourierError, CourierProvider, ProxyRoute, TrackingUrl, FETCH_TIMEOUT,
    STEALTH_INIT_SCRIPT, STEALTH_UA,
};

const INTERCEPT_GLOB: &str = "*/wp-json/rgc/v1/detail_tracking*";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Event codes this adapter understands; any `7…` code is an incidence
/// variation. Unknown codes are logged and passed through.
const KNOWN_CODES: [&str; 7] = ["2", "3", "4", "5", "6", "8", "post_binded"];

/// Tracking adapter for Coordinadora.
pub struct CoordinadoraAdapter {
    tracking_url: TrackingUrl,
    proxy: ProxySettings,
    browser_bin: String,
}

impl CoordinadoraAdapter {
    /// Builds the adapter, validating the URL template. Ambiguous templates
    /// are a startup error, not a request-time one.
    pub fn new(
        base_url: &str,
        proxy: ProxySettings,
        browser_bin: String,
    ) -> Result<Self, CourierError> {
        Ok(Self {
            tracking_url: TrackingUrl::parse(base_url)?,
            proxy,
            browser_bin,
        })
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
            resource_type: None,
        };
        let mut bodies = bounded(
            deadline,
            session.intercept(&page, pattern, route.http_client()?),
        )
        .await??;

        bounded(deadline, session.navigate(&page, url)).await??;

        let body = bounded(deadline, bodies.recv())
            .await?
            .ok_or(CourierError::Timeout)?;

        let response: CoordinadoraResponse = serde_json::from_slice(&body)?;
        Ok(map_response(response))
    }
}

#[async_trait]
impl CourierProvider for CoordinadoraAdapter {
    fn supports(&self, courier: CourierId) -> bool {
        courier == CourierId::Coordinadora
    }

    async fn track(&self, waybill: &str) -> Result<TrackingHistory, CourierError> {
        let deadline = Instant::now() + FETCH_TIMEOUT;
        info!(
            tracking_number = %waybill,
            timeout_secs = FETCH_TIMEOUT.as_secs(),
            "starting Coordinadora tracking"
        );

        let url = self.tracking_url.render(waybill);
        let route = ProxyRoute::establish(&self.proxy, &["coordinadora.com"])?;
        let result = self.track_inner(&url, &route, deadline).await;
        route.teardown().await;
        result
    }
}

fn map_response(response: CoordinadoraResponse) -> TrackingHistory {
    let mut history = TrackingHistory::new();

    for item in response.history {
        history.history.push(TrackingEvent {
            date: parse_date_or_zero(&item.date, DATE_FORMAT),
            text: item.description.clone(),
            // Coordinadora history items carry no location.
            city: String::new(),
            code: item.code.clone(),
        });

        let next = if item.code == "6" {
            Some(TrackingStatus::Completed)
        } else if item.code == "8" {
            Some(TrackingStatus::Return)
        } else if item.code.starts_with('7') {
            Some(TrackingStatus::Incidence)
        } else {
            None
        };
        if let Some(next) = next {
            history.global_status = history.global_status.transition(next);
        }

        let known = KNOWN_CODES.contains(&item.code.as_str()) || item.code.starts_with('7');
        if !known {
            warn!(
                code = %item.code,
                description = %item.description,
                "unknown Coordinadora status code"
            );
        }
    }

    history
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoordinadoraResponse {
    history: Vec<CoordinadoraHistoryItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoordinadoraHistoryItem {
    code: String,
    date: String,
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with_codes(codes: &[&str]) -> CoordinadoraResponse {
        let history: Vec<_> = codes
            .iter()
            .map(|code| {
                json!({
                    "code": code,
                    "date": "2023-12-28 10:50:44",
                    "description": format!("evento {code}")
                })
            })
            .collect();
        serde_json::from_value(json!({
            "tracking_number": "93202303516",
            "history": history
        }))
        .unwrap()
    }

    #[test]
    fn delivered_code_completes_the_shipment() {
        let history = map_response(response_with_codes(&["2", "3", "6"]));
        assert_eq!(history.global_status, TrackingStatus::Completed);
    }

    #[test]
    fn returned_code_marks_return() {
        let history = map_response(response_with_codes(&["2", "8"]));
        assert_eq!(history.global_status, TrackingStatus::Return);
    }

    #[test]
    fn seven_prefixed_codes_are_incidences() {
        for code in ["700", "701", "701_4", "728", "733"] {
            let history = map_response(response_with_codes(&["2", code]));
            assert_eq!(history.global_status, TrackingStatus::Incidence, "code {code}");
        }
    }

    #[test]
    fn delivery_is_terminal_against_later_incidences() {
        let history = map_response(response_with_codes(&["6", "701"]));
        assert_eq!(history.global_status, TrackingStatus::Completed);
    }

    #[test]
    fn transit_codes_stay_processing() {
        let history = map_response(response_with_codes(&["2", "3", "4", "5", "post_binded"]));
        assert_eq!(history.global_status, TrackingStatus::Processing);
    }

    #[test]
    fn events_keep_order_verbatim_codes_and_empty_city() {
        let history = map_response(response_with_codes(&["2", "701_10"]));
        assert_eq!(history.history.len(), 2);
        assert_eq!(history.history[0].code, "2");
        assert_eq!(history.history[1].code, "701_10");
        assert_eq!(history.history[0].city, "");
        assert_eq!(history.history[0].date.to_string(), "2023-12-28 10:50:44");
    }

    #[test]
    fn malformed_date_becomes_zero_instant() {
        let response: CoordinadoraResponse = serde_json::from_value(json!({
            "history": [{"code": "2", "date": "28/12/2023", "description": "x"}]
        }))
        .unwrap();
        let history = map_response(response);
        assert_eq!(history.history[0].date, crate::tracking::zero_instant());
    }

    #[test]
    fn empty_history_is_processing_with_no_events() {
        let history = map_response(response_with_codes(&[]));
        assert_eq!(history.global_status, TrackingStatus::Processing);
        assert!(history.history.is_empty());
    }
}
