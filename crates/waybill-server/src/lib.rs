//! Waybill Server - HTTP API surface.
//!
//! This crate fronts the core services with two primary endpoints plus the
//! banner CRUD:
//!
//! - `GET /orders/{id}?email=…` - order lookup gated on the customer email
//! - `GET /tracking/{waybill}?courier=…` - normalized tracking history
//! - `GET|POST|DELETE /banner` - site-wide banner alert
//!
//! Every request is stamped with an `x-ray-id` correlation header, which is
//! propagated to the response and embedded in every error body.

pub mod error;
mod handlers;
pub mod models;
pub mod ray_id;
pub mod state;

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, Result};
pub use ray_id::{MakeRayId, RayId, RAY_ID_HEADER};
pub use state::AppState;

/// Default public HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the address.
    #[error("failed to bind to {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server for the given state.
    pub fn new(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        let router = Router::new()
            .route("/orders/{id}", get(handlers::get_order))
            .route("/tracking/{waybill}", get(handlers::get_tracking_history))
            .route(
                "/banner",
                get(handlers::get_banner)
                    .post(handlers::set_banner)
                    .delete(handlers::remove_banner),
            )
            .layer(PropagateRequestIdLayer::new(RAY_ID_HEADER))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(RAY_ID_HEADER, MakeRayId))
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {e}")))?;

        Ok(Self { router, addr })
    }

    /// Returns the address the server will bind to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("starting API server on {}", self.addr);

        // SO_REUSEADDR so restarts are not blocked by lingering sockets.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::DateTime;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use waybill_cache::MemoryCache;
    use waybill_core::banner::BannerService;
    use waybill_core::couriers::{CourierError, CourierProvider};
    use waybill_core::tracking::zero_instant;
    use waybill_core::woocommerce::{OrderProvider, OrderProviderError};
    use waybill_core::{
        CourierId, Order, OrderService, OrderStatus, TrackingEvent, TrackingHistory, TrackingInfo,
        TrackingService, TrackingStatus,
    };

    struct MockOrderProvider {
        order: Option<Order>,
    }

    #[async_trait]
    impl OrderProvider for MockOrderProvider {
        async fn order(&self, order_id: &str) -> std::result::Result<Order, OrderProviderError> {
            self.order
                .clone()
                .ok_or_else(|| OrderProviderError::NotFound(order_id.to_string()))
        }

        async fn health_check(&self) -> std::result::Result<(), OrderProviderError> {
            Ok(())
        }
    }

    struct MockCourierProvider {
        courier: CourierId,
        history: TrackingHistory,
    }

    #[async_trait]
    impl CourierProvider for MockCourierProvider {
        fn supports(&self, courier: CourierId) -> bool {
            courier == self.courier
        }

        async fn track(
            &self,
            _waybill: &str,
        ) -> std::result::Result<TrackingHistory, CourierError> {
            Ok(self.history.clone())
        }
    }

    fn sample_order() -> Order {
        Order {
            id: "123".to_string(),
            status: OrderStatus::Shipped,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            address: "Calle 1".to_string(),
            city: "Bogota".to_string(),
            state: "Cundinamarca".to_string(),
            email: "john@example.com".to_string(),
            payment_method: "Card".to_string(),
            tracking: vec![TrackingInfo {
                tracking_provider: "coordinadora_co".to_string(),
                tracking_number: "93202303516".to_string(),
                date_shipped: None,
            }],
            created_at: DateTime::UNIX_EPOCH,
            items: vec![],
        }
    }

    fn sample_history() -> TrackingHistory {
        TrackingHistory {
            global_status: TrackingStatus::Processing,
            history: vec![TrackingEvent {
                date: zero_instant(),
                text: "Guia generada".to_string(),
                city: "Bogota (Cundinamarca)".to_string(),
                code: "1".to_string(),
            }],
        }
    }

    fn test_router() -> Router {
        let cache = Arc::new(MemoryCache::new());
        let orders = OrderService::new(
            Arc::new(MockOrderProvider {
                order: Some(sample_order()),
            }),
            cache.clone(),
            Duration::from_secs(60),
        );
        let tracking = TrackingService::new(
            vec![Arc::new(MockCourierProvider {
                courier: CourierId::Servientrega,
                history: sample_history(),
            })],
            cache.clone(),
            Duration::from_secs(60),
        );
        let banners = BannerService::new(cache);
        let state = AppState::new(orders, tracking, banners, true);

        Server::new(ServerConfig::default(), state).unwrap().router()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn order_happy_path_returns_shipped_order() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/orders/123?email=JOHN@EXAMPLE.COM")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["order_id"], "123");
        assert_eq!(json["status"], "SHIPPED");
        assert_eq!(json["tracking"][0]["tracking_provider"], "coordinadora_co");
        assert_eq!(json["tracking"][0]["tracking_number"], "93202303516");
    }

    #[tokio::test]
    async fn missing_email_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/orders/123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Email is required");
        assert!(json["ray_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn email_mismatch_reveals_nothing_but_the_mismatch() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/orders/123?email=other@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Email mismatch");
        assert!(json.get("order_id").is_none());
        assert!(json.get("tracking").is_none());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let cache = Arc::new(MemoryCache::new());
        let orders = OrderService::new(
            Arc::new(MockOrderProvider { order: None }),
            cache.clone(),
            Duration::from_secs(60),
        );
        let tracking = TrackingService::new(vec![], cache.clone(), Duration::from_secs(60));
        let state = AppState::new(orders, tracking, BannerService::new(cache), true);
        let router = Server::new(ServerConfig::default(), state).unwrap().router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/orders/999?email=a@b.co")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Order not found");
    }

    #[tokio::test]
    async fn tracking_happy_path_returns_history() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/tracking/2259200365?courier=servientrega_co")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["global_status"], "PROCESSING");
        assert_eq!(json["history"][0]["text"], "Guia generada");
        assert_eq!(json["history"][0]["code"], "1");
    }

    #[tokio::test]
    async fn tracking_responses_are_byte_identical_within_the_ttl() {
        let router = test_router();

        let first = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/tracking/2259200365?courier=servientrega_co")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let second = router
            .oneshot(
                Request::builder()
                    .uri("/tracking/2259200365?courier=servientrega_co")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let first = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let second = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_courier_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/tracking/2259200365")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "courier query parameter is required"
        );
    }

    #[tokio::test]
    async fn unknown_courier_is_not_found_with_ray_id() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/tracking/X?courier=unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["message"], "courier not supported");
        assert!(json["ray_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn ray_id_header_is_propagated_to_the_response() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/tracking/X?courier=unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().contains_key("x-ray-id"));
    }

    #[tokio::test]
    async fn banner_crud_round_trip() {
        let router = test_router();

        let set = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/banner")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "title": "Maintenance",
                            "subtitle": "Back at noon",
                            "type": "WARNING",
                            "duration": 0
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(set.status(), StatusCode::OK);

        let get = router
            .clone()
            .oneshot(Request::builder().uri("/banner").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::OK);
        let json = body_json(get).await;
        assert_eq!(json["title"], "Maintenance");
        assert_eq!(json["type"], "WARNING");

        let delete = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/banner")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::OK);

        let get_after = router
            .oneshot(Request::builder().uri("/banner").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(get_after.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_banner_type_is_rejected() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/banner")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"title": "x", "subtitle": "y", "type": "URGENT"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Invalid banner type. Must be INFO, WARNING, or DANGER"
        );
    }

    #[tokio::test]
    async fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.with_port(9000).port, 9000);
    }
}
