//! API route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::error;

use waybill_core::banner::{Banner, BannerError, BannerKind};
use waybill_core::{Order, OrderError, TrackingError, TrackingHistory};

use crate::error::{ApiError, Result};
use crate::models::{MessageResponse, OrderQuery, SetBannerRequest, TrackingQuery};
use crate::ray_id::RayId;
use crate::state::AppState;

/// GET /orders/{id} - Fetch an order by id, gated on the customer email.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Query(query): Query<OrderQuery>,
    RayId(ray_id): RayId,
) -> Result<Json<Order>> {
    if order_id.is_empty() {
        return Err(ApiError::bad_request("Order ID is required", ray_id));
    }
    let email = match query.email.as_deref() {
        Some(email) if !email.is_empty() => email,
        _ => return Err(ApiError::bad_request("Email is required", ray_id)),
    };

    match state.orders.order(&order_id, email).await {
        Ok(order) => Ok(Json(order)),
        Err(err) => {
            error!(%order_id, %ray_id, error = %err, "failed to fetch order");
            Err(match err {
                OrderError::NotFound => ApiError::not_found("Order not found", ray_id),
                OrderError::EmailMismatch => ApiError::unauthorized("Email mismatch", ray_id),
                OrderError::Provider(_) => {
                    ApiError::internal(&err, state.expose_errors, ray_id)
                }
            })
        }
    }
}

/// GET /tracking/{waybill} - Fetch the tracking history for a waybill.
pub async fn get_tracking_history(
    State(state): State<AppState>,
    Path(waybill): Path<String>,
    Query(query): Query<TrackingQuery>,
    RayId(ray_id): RayId,
) -> Result<Json<TrackingHistory>> {
    if waybill.is_empty() {
        return Err(ApiError::bad_request("tracking number is required", ray_id));
    }
    let courier = match query.courier.as_deref() {
        Some(courier) if !courier.is_empty() => courier,
        _ => {
            return Err(ApiError::bad_request(
                "courier query parameter is required",
                ray_id,
            ))
        }
    };

    match state.tracking.tracking_history(&waybill, courier).await {
        Ok(history) => Ok(Json(history)),
        Err(err) => {
            error!(%waybill, %courier, %ray_id, error = %err, "failed to fetch tracking history");
            Err(match err {
                TrackingError::CourierNotSupported => {
                    ApiError::not_found("courier not supported", ray_id)
                }
                TrackingError::Provider(_) => {
                    ApiError::internal(&err, state.expose_errors, ray_id)
                }
            })
        }
    }
}

/// POST /banner - Create or replace the site banner.
pub async fn set_banner(
    State(state): State<AppState>,
    RayId(ray_id): RayId,
    Json(request): Json<SetBannerRequest>,
) -> Result<Json<MessageResponse>> {
    let kind: BannerKind = request.kind.parse().map_err(|_| {
        ApiError::bad_request(
            "Invalid banner type. Must be INFO, WARNING, or DANGER",
            ray_id.clone(),
        )
    })?;

    state
        .banners
        .set_banner(request.title, request.subtitle, kind, request.duration)
        .await
        .map_err(|err| {
            error!(%ray_id, error = %err, "failed to set banner");
            ApiError::internal(&err, state.expose_errors, ray_id.clone())
        })?;

    Ok(Json(MessageResponse {
        message: "Banner set successfully".to_string(),
    }))
}

/// GET /banner - Fetch the active site banner.
pub async fn get_banner(
    State(state): State<AppState>,
    RayId(ray_id): RayId,
) -> Result<Json<Banner>> {
    let banner = state.banners.banner().await.map_err(|err: BannerError| {
        error!(%ray_id, error = %err, "failed to get banner");
        ApiError::internal(&err, state.expose_errors, ray_id.clone())
    })?;

    match banner {
        Some(banner) => Ok(Json(banner)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "No active banner",
            ray_id,
        )),
    }
}

/// DELETE /banner - Remove the active site banner.
pub async fn remove_banner(
    State(state): State<AppState>,
    RayId(ray_id): RayId,
) -> Result<Json<MessageResponse>> {
    state.banners.remove_banner().await.map_err(|err| {
        error!(%ray_id, error = %err, "failed to remove banner");
        ApiError::internal(&err, state.expose_errors, ray_id.clone())
    })?;

    Ok(Json(MessageResponse {
        message: "Banner removed successfully".to_string(),
    }))
}
