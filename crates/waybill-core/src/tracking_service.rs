//! Tracking dispatcher.
//!
//! Routes a `(waybill, courier)` pair to the first adapter claiming the
//! courier, with a cache-aside layer in front. Results from different
//! providers are never blended.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use waybill_cache::Cache;

use crate::couriers::{CourierError, CourierProvider};
use crate::tracking::{CourierId, TrackingHistory};

/// Errors surfaced by the tracking dispatcher.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// No registered adapter supports the requested courier.
    #[error("courier not supported")]
    CourierNotSupported,

    /// The selected adapter failed.
    #[error("failed to get tracking from provider: {0}")]
    Provider(#[from] CourierError),
}

/// Orchestrates tracking requests across the courier adapters.
pub struct TrackingService {
    providers: Vec<Arc<dyn CourierProvider>>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl TrackingService {
    pub fn new(
        providers: Vec<Arc<dyn CourierProvider>>,
        cache: Arc<dyn Cache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            providers,
            cache,
            cache_ttl,
        }
    }

    /// Returns the tracking history for a waybill.
    ///
    /// Cache key: `ts_{courier}_{waybill}`. A hit that decodes cleanly is
    /// returned as-is; any miss, read failure, or decode failure falls
    /// through to the adapter. Cache writes are best-effort and never fail
    /// the request.
    pub async fn tracking_history(
        &self,
        waybill: &str,
        courier_tag: &str,
    ) -> Result<TrackingHistory, TrackingError> {
        let cache_key = format!("ts_{courier_tag}_{waybill}");

        match self.cache.get(&cache_key).await {
            Ok(payload) => match serde_json::from_slice::<TrackingHistory>(&payload) {
                Ok(history) => return Ok(history),
                Err(err) => {
                    warn!(key = %cache_key, error = %err, "cached tracking entry failed to decode");
                }
            },
            Err(err) if !err.is_not_found() => {
                warn!(key = %cache_key, error = %err, "tracking cache read failed");
            }
            Err(_) => {}
        }

        let courier: CourierId = courier_tag
            .parse()
            .map_err(|_| TrackingError::CourierNotSupported)?;
        let provider = self
            .providers
            .iter()
            .find(|p| p.supports(courier))
            .ok_or(TrackingError::CourierNotSupported)?;

        let history = provider.track(waybill).await?;

        match serde_json::to_vec(&history) {
            Ok(payload) => {
                if let Err(err) = self.cache.set(&cache_key, &payload, self.cache_ttl).await {
                    warn!(key = %cache_key, error = %err, "tracking cache write failed");
                }
            }
            Err(err) => {
                warn!(key = %cache_key, error = %err, "tracking history failed to serialize");
            }
        }

        Ok(history)
    }
}
