//! Application state for the API server.

use std::sync::Arc;

use waybill_core::banner::BannerService;
use waybill_core::{OrderService, TrackingService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Order lookup service.
    pub orders: Arc<OrderService>,
    /// Tracking dispatcher.
    pub tracking: Arc<TrackingService>,
    /// Site banner service.
    pub banners: Arc<BannerService>,
    /// Whether 500 bodies carry the wrapped cause (development) or a
    /// generic message (production).
    pub expose_errors: bool,
}

impl AppState {
    pub fn new(
        orders: OrderService,
        tracking: TrackingService,
        banners: BannerService,
        expose_errors: bool,
    ) -> Self {
        Self {
            orders: Arc::new(orders),
            tracking: Arc::new(tracking),
            banners: Arc::new(banners),
            expose_errors,
        }
    }
}
