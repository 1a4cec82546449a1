//! Waybill - unified shipment-tracking API.
//!
//! Boot order: configuration, logging, upstream health checks (WooCommerce
//! and Redis, both fatal), service wiring, HTTP server. Any startup failure
//! exits non-zero.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use waybill_cache::{Cache, RedisCache};
use waybill_core::banner::BannerService;
use waybill_core::couriers::{
    CoordinadoraAdapter, CourierProvider, InterrapidisimoAdapter, ServientregaAdapter,
};
use waybill_core::woocommerce::{OrderProvider, WooCommerceClient, WooCommerceConfig};
use waybill_core::{CourierId, OrderService, TrackingService};
use waybill_server::{AppState, Server, ServerConfig};

use config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    init_logging(&config);

    info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "application starting"
    );

    // Order provider, verified before serving traffic.
    let woocommerce = Arc::new(
        WooCommerceClient::new(WooCommerceConfig {
            base_url: config.woocommerce.url.clone(),
            consumer_key: config.woocommerce.consumer_key.clone(),
            consumer_secret: config.woocommerce.consumer_secret.clone(),
            notes_fallback: config.woocommerce.notes_fallback,
        })
        .context("failed to build WooCommerce client")?,
    );
    woocommerce
        .health_check()
        .await
        .context("WooCommerce health check failed")?;
    info!("WooCommerce connection verified");

    // Cache, verified before serving traffic.
    let cache: Arc<dyn Cache> = Arc::new(
        RedisCache::connect(&config.cache.redis_url)
            .await
            .context("failed to initialize Redis")?,
    );
    cache.ping().await.context("Redis health check failed")?;
    info!("Redis connection verified");

    let orders = OrderService::new(
        woocommerce,
        cache.clone(),
        Duration::from_secs(config.cache.order_ttl),
    );

    let providers: Vec<Arc<dyn CourierProvider>> = vec![
        Arc::new(InterrapidisimoAdapter::new(
            config.couriers.interrapidisimo.clone(),
            config.proxy_settings(CourierId::Interrapidisimo),
            config.browser_bin.clone(),
        )),
        Arc::new(ServientregaAdapter::new(
            config.couriers.servientrega.clone(),
            config.proxy_settings(CourierId::Servientrega),
            config.browser_bin.clone(),
        )),
        Arc::new(
            CoordinadoraAdapter::new(
                &config.couriers.coordinadora,
                config.proxy_settings(CourierId::Coordinadora),
                config.browser_bin.clone(),
            )
            .context("invalid Coordinadora tracking URL template")?,
        ),
    ];
    let tracking = TrackingService::new(
        providers,
        cache.clone(),
        Duration::from_secs(config.cache.tracking_ttl),
    );

    let banners = BannerService::new(cache);

    let state = AppState::new(orders, tracking, banners, config.is_development());
    let server = Server::new(
        ServerConfig::default().with_port(config.server_port),
        state,
    )
    .context("failed to build server")?;

    server.run().await.context("server failed")?;
    Ok(())
}

/// Development gets human-readable logs; production gets JSON. `LOG_LEVEL`
/// feeds the filter, with `RUST_LOG` taking precedence when set.
fn init_logging(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.is_development() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}
