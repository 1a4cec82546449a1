//! Order lookup service.
//!
//! Cache-aside order retrieval with the email privacy gate: the cache key
//! binds the email, and mismatches are never cached, so a wrong-email
//! request always reaches the provider path and its check.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use waybill_cache::Cache;

use crate::order::Order;
use crate::woocommerce::{OrderProvider, OrderProviderError};

/// Errors surfaced by the order service.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order does not exist upstream.
    #[error("order not found")]
    NotFound,

    /// The provided email does not match the order's email.
    #[error("email does not match order record")]
    EmailMismatch,

    /// The upstream provider failed.
    #[error("order provider failed: {0}")]
    Provider(#[source] OrderProviderError),
}

/// Retrieves and validates orders.
pub struct OrderService {
    provider: Arc<dyn OrderProvider>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl OrderService {
    pub fn new(provider: Arc<dyn OrderProvider>, cache: Arc<dyn Cache>, cache_ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            cache_ttl,
        }
    }

    /// Returns the order identified by `order_id`, gated on `email`.
    ///
    /// Cache key: `order_{id}_{email}`. The email comparison is
    /// case-insensitive and runs on every non-cached path; cache hits imply
    /// it because the key encodes the email.
    pub async fn order(&self, order_id: &str, email: &str) -> Result<Order, OrderError> {
        let cache_key = format!("order_{order_id}_{email}");

        match self.cache.get(&cache_key).await {
            Ok(payload) => match serde_json::from_slice::<Order>(&payload) {
                Ok(order) => return Ok(order),
                Err(err) => {
                    warn!(key = %cache_key, error = %err, "cached order failed to decode");
                }
            },
            Err(err) if !err.is_not_found() => {
                warn!(key = %cache_key, error = %err, "order cache read failed");
            }
            Err(_) => {}
        }

        let order = self.provider.order(order_id).await.map_err(|err| match err {
            OrderProviderError::NotFound(_) => OrderError::NotFound,
            other => OrderError::Provider(other),
        })?;

        // Privacy gate: validate before caching, and never cache a mismatch.
        if !order.email.eq_ignore_ascii_case(email) {
            return Err(OrderError::EmailMismatch);
        }

        match serde_json::to_vec(&order) {
            Ok(payload) => {
                if let Err(err) = self.cache.set(&cache_key, &payload, self.cache_ttl).await {
                    warn!(key = %cache_key, error = %err, "order cache write failed");
                }
            }
            Err(err) => {
                warn!(key = %cache_key, error = %err, "order failed to serialize");
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;

    use waybill_cache::MemoryCache;

    use crate::order::{OrderStatus, TrackingInfo};

    struct MockOrderProvider {
        order: Option<Order>,
        calls: AtomicUsize,
    }

    impl MockOrderProvider {
        fn new(order: Option<Order>) -> Self {
            Self {
                order,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderProvider for MockOrderProvider {
        async fn order(&self, order_id: &str) -> Result<Order, OrderProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order
                .clone()
                .ok_or_else(|| OrderProviderError::NotFound(order_id.to_string()))
        }

        async fn health_check(&self) -> Result<(), OrderProviderError> {
            Ok(())
        }
    }

    fn sample_order() -> Order {
        Order {
            id: "123".to_string(),
            status: OrderStatus::Shipped,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            email: "john@example.com".to_string(),
            payment_method: String::new(),
            tracking: vec![TrackingInfo {
                tracking_provider: "coordinadora_co".to_string(),
                tracking_number: "93202303516".to_string(),
                date_shipped: None,
            }],
            created_at: DateTime::UNIX_EPOCH,
            items: vec![],
        }
    }

    fn service_with(
        provider: Arc<MockOrderProvider>,
        cache: Arc<MemoryCache>,
    ) -> OrderService {
        OrderService::new(provider, cache, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn email_match_is_case_insensitive() {
        let provider = Arc::new(MockOrderProvider::new(Some(sample_order())));
        let cache = Arc::new(MemoryCache::new());
        let svc = service_with(provider, cache.clone());

        let order = svc.order("123", "JOHN@EXAMPLE.COM").await.unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert!(cache.get("order_123_JOHN@EXAMPLE.COM").await.is_ok());
    }

    #[tokio::test]
    async fn email_mismatch_is_rejected_and_never_cached() {
        let provider = Arc::new(MockOrderProvider::new(Some(sample_order())));
        let cache = Arc::new(MemoryCache::new());
        let svc = service_with(provider, cache.clone());

        let err = svc.order("123", "other@example.com").await.unwrap_err();
        assert!(matches!(err, OrderError::EmailMismatch));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn mismatch_still_fails_after_correct_email_was_cached() {
        let provider = Arc::new(MockOrderProvider::new(Some(sample_order())));
        let cache = Arc::new(MemoryCache::new());
        let svc = service_with(provider.clone(), cache);

        svc.order("123", "john@example.com").await.unwrap();
        let err = svc.order("123", "other@example.com").await.unwrap_err();
        assert!(matches!(err, OrderError::EmailMismatch));
    }

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let provider = Arc::new(MockOrderProvider::new(Some(sample_order())));
        let svc = service_with(provider.clone(), Arc::new(MemoryCache::new()));

        svc.order("123", "john@example.com").await.unwrap();
        svc.order("123", "john@example.com").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_order_maps_to_not_found() {
        let provider = Arc::new(MockOrderProvider::new(None));
        let svc = service_with(provider, Arc::new(MemoryCache::new()));

        let err = svc.order("999", "john@example.com").await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }
}
