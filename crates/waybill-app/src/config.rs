//! Application configuration.
//!
//! Everything comes from environment variables; a `.env` file in the working
//! directory is read when present, with the process environment taking
//! precedence. Required variables fail the boot with the offending key in
//! the message.

use thiserror::Error;

use waybill_core::CourierId;
use waybill_proxy::ProxySettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Runtime environment (`development` or `production`).
    pub environment: String,
    /// Logging verbosity (`debug|info|warn|error`).
    pub log_level: String,
    /// Public HTTP port.
    pub server_port: u16,
    pub woocommerce: WooCommerceSettings,
    pub couriers: CourierUrls,
    pub cache: CacheSettings,
    proxy: UpstreamProxySettings,
    /// Chromium binary used by the scraping adapters.
    pub browser_bin: String,
}

/// WooCommerce store connection.
#[derive(Debug, Clone)]
pub struct WooCommerceSettings {
    pub url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Whether the customer-note fallback may issue the extra notes call.
    pub notes_fallback: bool,
}

/// Per-carrier tracking page URLs.
#[derive(Debug, Clone)]
pub struct CourierUrls {
    pub interrapidisimo: String,
    pub servientrega: String,
    pub coordinadora: String,
}

/// Redis cache connection and TTLs (seconds).
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub redis_url: String,
    pub order_ttl: u64,
    pub tracking_ttl: u64,
}

/// Upstream residential proxy, shared across carriers; each carrier opts in
/// with its own flag.
#[derive(Debug, Clone, Default)]
struct UpstreamProxySettings {
    hostname: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    enabled_interrapidisimo: bool,
    enabled_servientrega: bool,
    enabled_coordinadora: bool,
}

impl AppConfig {
    /// Loads configuration from `.env` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an explicit lookup, for tests.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            environment: or_default(&lookup, "APP_ENV", "development"),
            log_level: or_default(&lookup, "LOG_LEVEL", "info"),
            server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            woocommerce: WooCommerceSettings {
                url: required(&lookup, "WC_URL")?,
                consumer_key: required(&lookup, "WC_CONSUMER_KEY")?,
                consumer_secret: required(&lookup, "WC_CONSUMER_SECRET")?,
                notes_fallback: flag_or(&lookup, "WC_NOTES_FALLBACK", true)?,
            },
            couriers: CourierUrls {
                interrapidisimo: required(&lookup, "COURIER_INTERRAPIDISIMO_CO")?,
                servientrega: required(&lookup, "COURIER_SERVIENTREGA_CO")?,
                coordinadora: required(&lookup, "COURIER_COORDINADORA_CO")?,
            },
            cache: CacheSettings {
                redis_url: required(&lookup, "CACHE_REDIS_URL")?,
                order_ttl: parse_or(&lookup, "CACHE_ORDER_TTL", 3600)?,
                tracking_ttl: parse_or(&lookup, "CACHE_TRACKING_TTL", 1800)?,
            },
            proxy: UpstreamProxySettings {
                hostname: or_default(&lookup, "PROXY_HOSTNAME", ""),
                port: parse_or(&lookup, "PROXY_PORT", 0)?,
                username: lookup("PROXY_USERNAME").filter(|v| !v.is_empty()),
                password: lookup("PROXY_PASSWORD").filter(|v| !v.is_empty()),
                enabled_interrapidisimo: flag_or(&lookup, "PROXY_INTERRAPIDISIMO_CO", false)?,
                enabled_servientrega: flag_or(&lookup, "PROXY_SERVIENTREGA_CO", false)?,
                enabled_coordinadora: flag_or(&lookup, "PROXY_COORDINADORA_CO", false)?,
            },
            browser_bin: or_default(&lookup, "BROWSER_BIN", "/usr/bin/chromium"),
        })
    }

    /// True unless running in production; controls error detail exposure
    /// and the log format.
    pub fn is_development(&self) -> bool {
        self.environment != "production"
    }

    /// Proxy settings for one carrier: the shared upstream endpoint plus
    /// the carrier's enable flag.
    pub fn proxy_settings(&self, courier: CourierId) -> ProxySettings {
        let enabled = match courier {
            CourierId::Interrapidisimo => self.proxy.enabled_interrapidisimo,
            CourierId::Servientrega => self.proxy.enabled_servientrega,
            CourierId::Coordinadora => self.proxy.enabled_coordinadora,
        };
        ProxySettings {
            enabled,
            hostname: self.proxy.hostname.clone(),
            port: self.proxy.port,
            username: self.proxy.username.clone(),
            password: self.proxy.password.clone(),
        }
    }
}

fn or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn flag_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(value) => match value.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("WC_URL", "https://shop.example.com"),
            ("WC_CONSUMER_KEY", "ck_test"),
            ("WC_CONSUMER_SECRET", "cs_test"),
            ("COURIER_INTERRAPIDISIMO_CO", "https://inter.example/track"),
            ("COURIER_SERVIENTREGA_CO", "https://servi.example/track/"),
            ("COURIER_COORDINADORA_CO", "https://coord.example/track?guia="),
            ("CACHE_REDIS_URL", "redis://localhost:6379/0"),
        ])
    }

    fn load(env: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.environment, "development");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.cache.order_ttl, 3600);
        assert_eq!(config.cache.tracking_ttl, 1800);
        assert_eq!(config.browser_bin, "/usr/bin/chromium");
        assert!(config.woocommerce.notes_fallback);
        assert!(config.is_development());
    }

    #[test]
    fn missing_required_var_names_the_key() {
        let mut env = base_env();
        env.remove("WC_CONSUMER_SECRET");
        let err = load(&env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required configuration: WC_CONSUMER_SECRET"
        );
    }

    #[test]
    fn proxy_settings_honor_the_per_carrier_flag() {
        let mut env = base_env();
        env.insert("PROXY_HOSTNAME", "geo.example.net");
        env.insert("PROXY_PORT", "12321");
        env.insert("PROXY_USERNAME", "user");
        env.insert("PROXY_PASSWORD", "secret");
        env.insert("PROXY_SERVIENTREGA_CO", "true");

        let config = load(&env).unwrap();

        let servientrega = config.proxy_settings(CourierId::Servientrega);
        assert!(servientrega.has_proxy());
        assert!(servientrega.has_credentials());

        let coordinadora = config.proxy_settings(CourierId::Coordinadora);
        assert!(!coordinadora.has_proxy());
    }

    #[test]
    fn invalid_numeric_value_is_rejected() {
        let mut env = base_env();
        env.insert("SERVER_PORT", "eighty");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn production_disables_error_exposure() {
        let mut env = base_env();
        env.insert("APP_ENV", "production");
        assert!(!load(&env).unwrap().is_development());
    }

    #[test]
    fn notes_fallback_can_be_disabled() {
        let mut env = base_env();
        env.insert("WC_NOTES_FALLBACK", "false");
        assert!(!load(&env).unwrap().woocommerce.notes_fallback);
    }
}
