use std::sync::Arc;

use ocasino_aml::AmlAnalyzer;
use ocasino_auth::AuthPipeline;
use ocasino_cache::{Cache, RateLimiter};
use ocasino_common::{PlatformError, Result};
use ocasino_crypto::AmountCipher;
use ocasino_events::{EventBus, EventHandler};
use ocasino_store::memory::MemoryStore;
use ocasino_store::repo::{DeadLetterRepo, TransactionRepo, WalletRepo};
use ocasino_wallet::WalletEngine;

use crate::config::PlatformConfig;

/// The fully wired platform: one instance built at startup and threaded
/// explicitly through whatever consumes it. Every field
/// is the same `Arc<...>` handed to the auth/wallet/AML crates individually —
/// this struct exists only to give `main` one object to hold and pass around,
/// not a new layer of indirection.
pub struct AppContext {
    pub store: Arc<MemoryStore>,
    pub cipher: Arc<AmountCipher>,
    pub cache: Cache,
    pub events: Arc<EventBus>,
    pub auth: Arc<AuthPipeline>,
    pub wallet: Arc<WalletEngine>,
    pub aml: Arc<AmlAnalyzer>,
    pub api: Arc<ocasino_api::ApiContext>,
}

impl AppContext {
    pub async fn build(config: &PlatformConfig) -> Result<Arc<Self>> {
        let cipher = Arc::new(
            AmountCipher::from_base64(&config.encryption_key)
                .map_err(|e| PlatformError::internal(format!("invalid encryption-key: {e}")))?,
        );

        let store = MemoryStore::new();

        let cache = Cache::from_config(config.cache_url.as_deref())
            .map_err(|e| PlatformError::dependency_unavailable(format!("cache backend unavailable: {e}")))?;
        let rate_limiter = RateLimiter::new(cache.clone(), config.default_rate_limit);

        let dead_letters: Arc<dyn DeadLetterRepo> = store.clone();
        let events = EventBus::new(config.event_worker_count, config.event_queue_capacity, dead_letters);

        let partners = store.clone();
        let api_keys = store.clone();
        let auth = Arc::new(AuthPipeline::new(
            api_keys,
            partners,
            cache.clone(),
            rate_limiter,
            config.auth_exclude_paths.clone(),
            config.allowed_ip_enforcement,
        ));

        let wallet = Arc::new(WalletEngine::new(store.clone(), Arc::clone(&cipher), Arc::clone(&events), config.operation_deadline()));

        let transactions: Arc<dyn TransactionRepo> = store.clone();
        let profiles = store.clone();
        let aml_dead_letters: Arc<dyn DeadLetterRepo> = store.clone();
        let aml = Arc::new(AmlAnalyzer::new(
            transactions,
            profiles,
            aml_dead_letters,
            Arc::clone(&cipher),
            Arc::clone(&events),
            config.aml_thresholds(),
        ));
        let handler: Arc<dyn EventHandler> = Arc::clone(&aml) as Arc<dyn EventHandler>;
        events.subscribe(handler).await;

        let wallet_repo: Arc<dyn WalletRepo> = store.clone();
        let tx_repo: Arc<dyn TransactionRepo> = store.clone();
        let api = Arc::new(ocasino_api::ApiContext::new(Arc::clone(&auth), Arc::clone(&wallet), wallet_repo, tx_repo));

        Ok(Arc::new(Self { store, cipher, cache, events, auth, wallet, aml, api }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PlatformConfig {
        PlatformConfig {
            encryption_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            allowed_ip_enforcement: true,
            default_rate_limit: 100,
            auth_exclude_paths: vec!["/health".to_string()],
            aml_large_value_thresholds: None,
            event_queue_capacity: 256,
            event_worker_count: 2,
            operation_deadline_ms: 5_000,
            cache_url: None,
            rust_log: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn builds_a_fully_wired_context() {
        let app = AppContext::build(&test_config()).await.unwrap();
        assert!(app.auth.is_excluded("/health/live"));
    }

    #[tokio::test]
    async fn rejects_a_malformed_encryption_key() {
        let mut config = test_config();
        config.encryption_key = "not-base64!!".to_string();
        assert!(AppContext::build(&config).await.is_err());
    }
}
