use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ocasino_cache::{Cache, RateLimiter};
use ocasino_common::ids::{ApiKeyId, PartnerId};
use ocasino_common::permission::any_permission_matches;
use ocasino_common::{PlatformError, Result};
use ocasino_crypto::lookup_hash;
use ocasino_store::model::{ApiKey, PartnerStatus};
use ocasino_store::repo::{ApiKeyRepo, PartnerRepo};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ip_allowlist::ip_allowed;

/// Cached projection of an `ApiKey`, serialized into the cache layer so the hot
/// path doesn't need a store round-trip on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedApiKey {
    id: ApiKeyId,
    partner_id: PartnerId,
    permissions: Vec<String>,
    active: bool,
    expires_at: Option<chrono::DateTime<Utc>>,
}

impl From<&ApiKey> for CachedApiKey {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            partner_id: key.partner_id,
            permissions: key.permissions.clone(),
            active: key.active,
            expires_at: key.expires_at,
        }
    }
}

impl CachedApiKey {
    fn is_usable(&self, now: chrono::DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Attached to the request-scoped context after a successful `authenticate`
/// call, so downstream handlers never repeat the API-key lookup.
#[derive(Debug, Clone)]
pub struct PartnerContext {
    pub partner_id: PartnerId,
    pub api_key_id: ApiKeyId,
    pub permissions: Vec<String>,
}

const API_KEY_CACHE_TTL: Duration = Duration::from_secs(60);
const LAST_USED_THROTTLE: chrono::Duration = chrono::Duration::hours(1);

/// The authentication and authorization gate every wallet call flows through.
/// One instance is constructed once at startup and shared (`Arc`)
/// across requests.
pub struct AuthPipeline {
    api_keys: Arc<dyn ApiKeyRepo>,
    partners: Arc<dyn PartnerRepo>,
    cache: Cache,
    rate_limiter: RateLimiter,
    exclude_paths: Vec<String>,
    ip_enforcement: bool,
}

impl AuthPipeline {
    pub fn new(
        api_keys: Arc<dyn ApiKeyRepo>,
        partners: Arc<dyn PartnerRepo>,
        cache: Cache,
        rate_limiter: RateLimiter,
        exclude_paths: Vec<String>,
        ip_enforcement: bool,
    ) -> Self {
        Self { api_keys, partners, cache, rate_limiter, exclude_paths, ip_enforcement }
    }

    /// Paths on the exclusion list (health checks, OpenAPI
    /// document) never reach `authenticate` at all.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Runs the full pipeline and, on success, fires the throttled
    /// `last-used-at` bump off the critical path.
    pub async fn authenticate(
        &self,
        raw_api_key: Option<&str>,
        caller_ip: IpAddr,
        endpoint_class: &str,
        required_permission: &str,
    ) -> Result<PartnerContext> {
        let raw_api_key = raw_api_key.ok_or_else(|| PlatformError::unauthenticated("missing X-API-Key header"))?;
        let hash = lookup_hash(raw_api_key);
        let now = Utc::now();

        let cached = self.lookup_api_key(&hash).await?;
        if !cached.is_usable(now) {
            return Err(PlatformError::unauthenticated("api key inactive or expired"));
        }

        let partner = self
            .partners
            .get_by_id(cached.partner_id)
            .await?
            .ok_or_else(|| PlatformError::unauthenticated("owning partner not found"))?;
        if !matches!(partner.status, PartnerStatus::Active) {
            return Err(PlatformError::unauthenticated("partner is not active"));
        }

        if self.ip_enforcement && !partner.permitted_ips.is_empty() && !ip_allowed(&partner.permitted_ips, caller_ip) {
            return Err(PlatformError::ip_not_allowed(format!("{caller_ip} is not in the partner's allowlist")));
        }

        if !any_permission_matches(&cached.permissions, required_permission) {
            return Err(PlatformError::permission_denied(format!(
                "api key lacks permission '{required_permission}'"
            )));
        }

        if !self.rate_limiter.check(&cached.partner_id.to_string(), endpoint_class).await {
            return Err(PlatformError::rate_limited(format!("rate limit exceeded for {endpoint_class}")));
        }

        self.maybe_touch_last_used(cached.id).await;

        Ok(PartnerContext {
            partner_id: cached.partner_id,
            api_key_id: cached.id,
            permissions: cached.permissions,
        })
    }

    async fn lookup_api_key(&self, hash: &str) -> Result<CachedApiKey> {
        let cache_key = format!("apikey:{hash}");
        if let Some(bytes) = self.cache.get(&cache_key).await {
            if let Ok(cached) = serde_json::from_slice::<CachedApiKey>(&bytes) {
                return Ok(cached);
            }
        }

        let key = self
            .api_keys
            .find_by_hash(hash)
            .await?
            .ok_or_else(|| PlatformError::unauthenticated("unknown api key"))?;
        let cached = CachedApiKey::from(&key);
        if let Ok(bytes) = serde_json::to_vec(&cached) {
            self.cache.set(&cache_key, bytes, API_KEY_CACHE_TTL).await;
        }
        Ok(cached)
    }

    /// Bumping `last-used-at` on every call would be write
    /// amplification, so a cache marker throttles it to at most once per hour
    /// per key. The store write itself runs off the request's critical path.
    async fn maybe_touch_last_used(&self, api_key_id: ApiKeyId) {
        let marker_key = format!("apikey:lastused:{api_key_id}");
        if self.cache.get(&marker_key).await.is_some() {
            return;
        }
        self.cache.set(&marker_key, b"1".to_vec(), LAST_USED_THROTTLE.to_std().unwrap_or(Duration::from_secs(3600))).await;

        let api_keys = Arc::clone(&self.api_keys);
        tokio::spawn(async move {
            if let Err(e) = api_keys.touch_last_used(api_key_id, Utc::now()).await {
                warn!(error = %e, %api_key_id, "failed to bump api key last-used-at");
            } else {
                info!(%api_key_id, "bumped api key last-used-at");
            }
        });
    }
}
