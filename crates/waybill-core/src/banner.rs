//! Site-wide banner alerts.
//!
//! A single optional banner lives in the cache under the `site_banner` key;
//! its TTL is the banner's own duration (zero = permanent).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use waybill_cache::Cache;

const BANNER_CACHE_KEY: &str = "site_banner";

/// Severity of a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BannerKind {
    Info,
    Warning,
    Danger,
}

/// Errors from banner operations.
#[derive(Debug, Error)]
pub enum BannerError {
    /// The requested type is not INFO, WARNING, or DANGER.
    #[error("invalid banner type")]
    InvalidKind,

    /// Cache read/write failure.
    #[error("banner storage failed: {0}")]
    Storage(#[from] waybill_cache::CacheError),
}

impl FromStr for BannerKind {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(BannerKind::Info),
            "WARNING" => Ok(BannerKind::Warning),
            "DANGER" => Ok(BannerKind::Danger),
            _ => Err(BannerError::InvalidKind),
        }
    }
}

/// A site-wide alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub title: String,
    pub subtitle: String,
    #[serde(rename = "type")]
    pub kind: BannerKind,
    /// Lifetime in seconds. Zero means permanent (until deleted).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: u64,
    pub created_at: DateTime<Utc>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Cache-backed banner CRUD.
pub struct BannerService {
    cache: Arc<dyn Cache>,
}

impl BannerService {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Creates or replaces the banner. The cache entry expires with the
    /// banner's duration.
    pub async fn set_banner(
        &self,
        title: String,
        subtitle: String,
        kind: BannerKind,
        duration: u64,
    ) -> Result<(), BannerError> {
        let banner = Banner {
            title,
            subtitle,
            kind,
            duration,
            created_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&banner).expect("banner serialization cannot fail");
        self.cache
            .set(BANNER_CACHE_KEY, &payload, Duration::from_secs(duration))
            .await?;
        Ok(())
    }

    /// Returns the active banner, or `None` when there is none.
    pub async fn banner(&self) -> Result<Option<Banner>, BannerError> {
        let payload = match self.cache.get(BANNER_CACHE_KEY).await {
            Ok(payload) => payload,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&payload) {
            Ok(banner) => Ok(Some(banner)),
            Err(err) => {
                warn!(error = %err, "stored banner failed to decode");
                Ok(None)
            }
        }
    }

    /// Removes the banner. Removing a missing banner is not an error.
    pub async fn remove_banner(&self) -> Result<(), BannerError> {
        self.cache.delete(BANNER_CACHE_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waybill_cache::MemoryCache;

    fn service() -> BannerService {
        BannerService::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn banner_round_trips_through_the_cache() {
        let svc = service();
        svc.set_banner(
            "Maintenance".to_string(),
            "Back at noon".to_string(),
            BannerKind::Warning,
            0,
        )
        .await
        .unwrap();

        let banner = svc.banner().await.unwrap().unwrap();
        assert_eq!(banner.title, "Maintenance");
        assert_eq!(banner.kind, BannerKind::Warning);
    }

    #[tokio::test]
    async fn missing_banner_is_none() {
        assert_eq!(service().banner().await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_clears_the_banner() {
        let svc = service();
        svc.set_banner("t".into(), "s".into(), BannerKind::Info, 0)
            .await
            .unwrap();
        svc.remove_banner().await.unwrap();
        assert_eq!(svc.banner().await.unwrap(), None);
    }

    #[test]
    fn kind_parses_only_known_values() {
        assert_eq!("INFO".parse::<BannerKind>().unwrap(), BannerKind::Info);
        assert!("info".parse::<BannerKind>().is_err());
        assert!("URGENT".parse::<BannerKind>().is_err());
    }

    #[test]
    fn kind_serializes_as_type_field() {
        let banner = Banner {
            title: String::new(),
            subtitle: String::new(),
            kind: BannerKind::Danger,
            duration: 0,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&banner).unwrap();
        assert_eq!(json["type"], "DANGER");
        assert!(json.get("duration").is_none());
    }
}
