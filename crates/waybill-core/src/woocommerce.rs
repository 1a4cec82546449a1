//! WooCommerce order provider.
//!
//! Fetches orders from the upstream store's REST API with HTTP Basic
//! credentials and maps them into the domain model. Tracking references are
//! recovered from four sources in priority order, stopping at the first that
//! yields anything: shipping-line metadata, the Shipment Tracking plugin's
//! order metadata, legacy top-level metadata, and finally a regex over
//! customer order notes (a second API call, made only when everything else
//! came up empty).

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::order::{Order, OrderItem, OrderStatus, TrackingInfo};
use crate::tracking::CourierId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Matches "No de guía: {number} Paquetería: {carrier}" in customer notes.
/// Case-insensitive, tolerant of missing accents and flexible whitespace.
static NOTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)no\s+de\s+gu[ií]a:\s*(\S+).*?paqueter[ií]a:\s*(\S+)")
        .expect("note pattern is valid")
});

const TRACKING_NUMBER_KEYS: [&str; 3] = ["Tracking Number", "tracking_number", "_tracking_number"];
const TRACKING_PROVIDER_KEYS: [&str; 4] = [
    "Tracking Company",
    "tracking_company",
    "_tracking_company",
    "tracking_provider",
];
const LEGACY_NUMBER_KEYS: [&str; 3] = [
    "tracking_number",
    "_tracking_number",
    "wc_shipment_tracking_number",
];
const LEGACY_PROVIDER_KEYS: [&str; 3] =
    ["tracking_company", "_tracking_company", "tracking_provider"];

/// Errors from the order provider.
#[derive(Debug, Error)]
pub enum OrderProviderError {
    /// The order does not exist upstream.
    #[error("order not found: {0}")]
    NotFound(String),

    /// The upstream API answered with an unexpected status.
    #[error("woocommerce API returned status: {0}")]
    Status(u16),

    /// Transport failure or undecodable payload.
    #[error("woocommerce request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Port for fetching orders from an upstream e-commerce platform.
#[async_trait]
pub trait OrderProvider: Send + Sync {
    /// Fetches the order with the given upstream identifier.
    async fn order(&self, order_id: &str) -> Result<Order, OrderProviderError>;

    /// Verifies the upstream API is reachable and the credentials are valid.
    async fn health_check(&self) -> Result<(), OrderProviderError>;
}

/// WooCommerce connection settings.
#[derive(Debug, Clone)]
pub struct WooCommerceConfig {
    /// Store base URL, e.g. `https://shop.example.com`.
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Whether the customer-note fallback may issue the extra notes call.
    pub notes_fallback: bool,
}

/// [`OrderProvider`] backed by the WooCommerce REST API.
pub struct WooCommerceClient {
    client: reqwest::Client,
    config: WooCommerceConfig,
}

impl WooCommerceClient {
    pub fn new(config: WooCommerceConfig) -> Result<Self, OrderProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, OrderProviderError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OrderProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(OrderProviderError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Fetches order notes and scans customer-visible ones for a tracking
    /// reference. Failures here degrade to "no tracking", never to a request
    /// failure.
    async fn tracking_from_notes(&self, order_id: &str) -> Vec<TrackingInfo> {
        let url = format!(
            "{}/wp-json/wc/v3/orders/{}/notes",
            self.config.base_url, order_id
        );
        let notes: Vec<WcOrderNote> = match self.get_json(&url).await {
            Ok(notes) => notes,
            Err(err) => {
                warn!(%order_id, error = %err, "failed to fetch order notes");
                return Vec::new();
            }
        };

        notes
            .iter()
            .filter(|note| note.customer_note && !note.note.is_empty())
            .find_map(|note| tracking_from_note(&note.note))
            .map(|info| vec![info])
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderProvider for WooCommerceClient {
    async fn order(&self, order_id: &str) -> Result<Order, OrderProviderError> {
        let url = format!("{}/wp-json/wc/v3/orders/{}", self.config.base_url, order_id);
        let wc_order: WcOrder = self.get_json(&url).await.map_err(|err| match err {
            OrderProviderError::NotFound(_) => OrderProviderError::NotFound(order_id.to_string()),
            other => other,
        })?;

        let mut tracking = extract_tracking(&wc_order);
        if tracking.is_empty() && self.config.notes_fallback {
            tracking = self.tracking_from_notes(order_id).await;
        }

        Ok(map_order(wc_order, tracking))
    }

    async fn health_check(&self) -> Result<(), OrderProviderError> {
        let url = format!("{}/wp-json/wc/v3/orders?per_page=1", self.config.base_url);
        let _: serde_json::Value = self.get_json(&url).await?;
        Ok(())
    }
}

/// Builds the domain order from the raw payload and the extracted tracking.
fn map_order(wc: WcOrder, tracking: Vec<TrackingInfo>) -> Order {
    let status = map_status(&wc.status, &tracking);
    Order {
        id: wc.id.to_string(),
        status,
        first_name: wc.billing.first_name,
        last_name: wc.billing.last_name,
        address: wc.shipping.address_1,
        city: wc.shipping.city,
        state: wc.shipping.state,
        email: wc.billing.email,
        payment_method: wc.payment_method_title,
        tracking,
        created_at: parse_wc_date(&wc.date_created),
        items: map_items(wc.line_items, wc.fee_lines),
    }
}

/// Upstream status string to domain status. Any extracted tracking forces
/// SHIPPED regardless of what the store says.
fn map_status(status: &str, tracking: &[TrackingInfo]) -> OrderStatus {
    if !tracking.is_empty() {
        return OrderStatus::Shipped;
    }
    match status.to_lowercase().as_str() {
        "completed" => OrderStatus::Shipped,
        "cancelled" | "refunded" | "failed" => OrderStatus::Cancelled,
        "pending" | "processing" | "on-hold" => OrderStatus::Created,
        _ => OrderStatus::Pending,
    }
}

fn map_items(line_items: Vec<WcLineItem>, fee_lines: Vec<WcFeeLine>) -> Vec<OrderItem> {
    let mut items = Vec::with_capacity(line_items.len() + fee_lines.len());
    for item in line_items {
        items.push(OrderItem {
            quantity: item.quantity,
            sku: item.sku,
            name: item.name,
            picture: item.image.src,
        });
    }
    for fee in fee_lines {
        items.push(OrderItem {
            quantity: 1,
            sku: String::new(),
            name: fee.name,
            picture: String::new(),
        });
    }
    items
}

/// WooCommerce dates are usually zone-less ISO8601 (`2018-12-19T14:48:25`);
/// some installs emit a full offset-bearing form. Anything else becomes the
/// zero instant rather than failing the order.
fn parse_wc_date(raw: &str) -> DateTime<Utc> {
    if raw.is_empty() || raw == "null" {
        return DateTime::UNIX_EPOCH;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_utc();
    }
    if let Ok(with_zone) = DateTime::parse_from_rfc3339(raw) {
        return with_zone.with_timezone(&Utc);
    }
    warn!(date = %raw, "failed to parse order date");
    DateTime::UNIX_EPOCH
}

/// Scans the order payload for tracking references, in priority order.
fn extract_tracking(order: &WcOrder) -> Vec<TrackingInfo> {
    let from_shipping_lines = tracking_from_shipping_lines(order);
    if !from_shipping_lines.is_empty() {
        return from_shipping_lines;
    }

    let from_plugin = tracking_from_plugin_meta(order);
    if !from_plugin.is_empty() {
        return from_plugin;
    }

    tracking_from_legacy_meta(order)
}

fn meta_string<'a>(meta: &'a [WcMetaData], keys: &[&str]) -> Option<&'a str> {
    meta.iter()
        .filter(|m| keys.contains(&m.key.as_str()))
        .filter_map(|m| m.value.as_str())
        .find(|v| !v.is_empty())
}

fn tracking_from_shipping_lines(order: &WcOrder) -> Vec<TrackingInfo> {
    let mut tracking = Vec::new();
    for line in &order.shipping_lines {
        let number = meta_string(&line.meta_data, &TRACKING_NUMBER_KEYS);
        let provider = meta_string(&line.meta_data, &TRACKING_PROVIDER_KEYS);
        if number.is_some() || provider.is_some() {
            tracking.push(TrackingInfo {
                tracking_provider: provider.unwrap_or_default().to_string(),
                tracking_number: number.unwrap_or_default().to_string(),
                date_shipped: None,
            });
        }
    }
    tracking
}

fn tracking_from_plugin_meta(order: &WcOrder) -> Vec<TrackingInfo> {
    for meta in &order.meta_data {
        if meta.key != "_wc_shipment_tracking_items" {
            continue;
        }
        let Ok(items) = serde_json::from_value::<Vec<WcTrackingItem>>(meta.value.clone()) else {
            continue;
        };
        let tracking: Vec<TrackingInfo> = items
            .into_iter()
            .filter(|item| !item.tracking_provider.is_empty() || !item.tracking_number.is_empty())
            .map(|item| TrackingInfo {
                tracking_provider: item.tracking_provider,
                tracking_number: item.tracking_number,
                date_shipped: NaiveDate::parse_from_str(&item.date_shipped, "%Y-%m-%d").ok(),
            })
            .collect();
        if !tracking.is_empty() {
            return tracking;
        }
    }
    Vec::new()
}

fn tracking_from_legacy_meta(order: &WcOrder) -> Vec<TrackingInfo> {
    let number = meta_string(&order.meta_data, &LEGACY_NUMBER_KEYS);
    let provider = meta_string(&order.meta_data, &LEGACY_PROVIDER_KEYS);
    if number.is_none() && provider.is_none() {
        return Vec::new();
    }
    vec![TrackingInfo {
        tracking_provider: provider.unwrap_or_default().to_string(),
        tracking_number: number.unwrap_or_default().to_string(),
        date_shipped: None,
    }]
}

/// Parses a customer note like
/// `"No de guía: 2259176774 Paquetería: servientrega"`.
fn tracking_from_note(note: &str) -> Option<TrackingInfo> {
    let captures = NOTE_PATTERN.captures(note)?;
    let number = captures.get(1)?.as_str().trim();
    let carrier = normalize_carrier_name(captures.get(2)?.as_str().trim());
    if number.is_empty() || carrier.is_empty() {
        return None;
    }
    Some(TrackingInfo {
        tracking_provider: carrier,
        tracking_number: number.to_string(),
        date_shipped: None,
    })
}

/// Normalizes free-form carrier names from notes into provider tags:
/// substring match against the known carriers, `_co` suffix otherwise.
fn normalize_carrier_name(carrier: &str) -> String {
    let carrier = carrier.trim().to_lowercase();
    for id in CourierId::ALL {
        let bare = id.as_str().trim_end_matches("_co");
        if carrier.contains(bare) || (id == CourierId::Interrapidisimo && carrier.contains("inter"))
        {
            return id.as_str().to_string();
        }
    }
    if carrier.ends_with("_co") {
        carrier
    } else {
        format!("{carrier}_co")
    }
}

// --- Upstream payload DTOs. Every field defaults: the store omits most of
// --- them depending on plugins and API version.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcOrder {
    id: i64,
    status: String,
    date_created: String,
    payment_method_title: String,
    billing: WcBilling,
    shipping: WcShipping,
    line_items: Vec<WcLineItem>,
    fee_lines: Vec<WcFeeLine>,
    shipping_lines: Vec<WcShippingLine>,
    meta_data: Vec<WcMetaData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcBilling {
    first_name: String,
    last_name: String,
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcShipping {
    address_1: String,
    city: String,
    state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcLineItem {
    name: String,
    sku: String,
    quantity: u32,
    image: WcImage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcImage {
    src: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcFeeLine {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcShippingLine {
    meta_data: Vec<WcMetaData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcMetaData {
    key: String,
    value: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcTrackingItem {
    tracking_provider: String,
    tracking_number: String,
    date_shipped: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WcOrderNote {
    note: String,
    customer_note: bool,
}
