//! Order domain model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Current state of an order.
///
/// Derived from the upstream status and the extracted tracking entries,
/// never accepted from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Placed but not yet handed to a carrier.
    Created,
    /// Handed to a carrier (any tracking entry implies this).
    Shipped,
    /// Delivered and finalized.
    Completed,
    /// Cancelled, refunded, or failed upstream.
    Cancelled,
    /// Upstream status did not map to a known state.
    Pending,
}

/// Shipment tracking reference attached to an order.
///
/// Both fields blank is never emitted; one of the two may be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
    /// Carrier tag, e.g. `coordinadora_co`.
    pub tracking_provider: String,
    /// Waybill assigned by the carrier.
    pub tracking_number: String,
    /// Dispatch date when the source metadata carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_shipped: Option<NaiveDate>,
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Upstream order identifier.
    #[serde(rename = "order_id")]
    pub id: String,
    pub status: OrderStatus,
    #[serde(rename = "name")]
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    /// Customer contact email; the case-insensitive match key for lookups.
    pub email: String,
    pub payment_method: String,
    /// Tracking references; multiple entries for partial shipments.
    pub tracking: Vec<TrackingInfo>,
    #[serde(rename = "create_date")]
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// An individual line within an order. Fee lines are represented as items
/// with quantity 1 and empty SKU/picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub quantity: u32,
    pub sku: String,
    pub name: String,
    pub picture: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_serializes_with_wire_field_names() {
        let order = Order {
            id: "123".to_string(),
            status: OrderStatus::Shipped,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            address: "Calle 1 # 2-3".to_string(),
            city: "Bogota".to_string(),
            state: "Cundinamarca".to_string(),
            email: "john@example.com".to_string(),
            payment_method: "Credit card".to_string(),
            tracking: vec![TrackingInfo {
                tracking_provider: "coordinadora_co".to_string(),
                tracking_number: "93202303516".to_string(),
                date_shipped: None,
            }],
            created_at: DateTime::UNIX_EPOCH,
            items: vec![],
        };

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["order_id"], "123");
        assert_eq!(json["status"], "SHIPPED");
        assert_eq!(json["name"], "John");
        assert_eq!(json["create_date"], "1970-01-01T00:00:00Z");
        assert_eq!(json["tracking"][0]["tracking_number"], "93202303516");
        assert!(json["tracking"][0].get("date_shipped").is_none());
    }
}
