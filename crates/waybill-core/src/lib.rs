//! Waybill Core - order lookup and tracking acquisition pipeline.
//!
//! This crate holds the domain model and the services behind the public API:
//!
//! - [`order`] - order domain model (status, items, tracking references)
//! - [`tracking`] - tracking history domain model and courier identifiers
//! - [`order_service`] - cache-aside order lookup with the email privacy gate
//! - [`tracking_service`] - dispatcher routing waybills to courier adapters
//! - [`woocommerce`] - upstream order provider (WooCommerce REST API)
//! - [`couriers`] - per-carrier scraping adapters (headless browser + JSON
//!   interception)
//! - [`browser`] - the headless browser session contract shared by adapters
//! - [`banner`] - site-wide banner alerts stored in the cache

pub mod banner;
pub mod browser;
pub mod couriers;
pub mod order;
pub mod order_service;
pub mod tracking;
pub mod tracking_service;
pub mod woocommerce;

pub use order::{Order, OrderItem, OrderStatus, TrackingInfo};
pub use order_service::{OrderError, OrderService};
pub use tracking::{CourierId, TrackingEvent, TrackingHistory, TrackingStatus};
pub use tracking_service::{TrackingError, TrackingService};
