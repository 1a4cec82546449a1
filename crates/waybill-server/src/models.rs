//! API request and response models.

use serde::{Deserialize, Serialize};

/// Error response body. Every error carries the request's ray id so a
/// support ticket can be matched to the server logs.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub ray_id: String,
}

/// Query parameters for GET /orders/{id}.
#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub email: Option<String>,
}

/// Query parameters for GET /tracking/{waybill}.
#[derive(Debug, Deserialize)]
pub struct TrackingQuery {
    pub courier: Option<String>,
}

/// Request body for POST /banner.
#[derive(Debug, Deserialize)]
pub struct SetBannerRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Lifetime in seconds; zero means permanent.
    #[serde(default)]
    pub duration: u64,
}

/// Confirmation body for banner mutations.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
