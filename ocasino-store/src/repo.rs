use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocasino_common::ids::{AlertId, ApiKeyId, PartnerId, PlayerId, ReferenceId, TransactionId, WalletId};
use ocasino_common::Result;

use crate::model::{AMLAlert, AMLRiskProfile, ApiKey, DeadLetterEntry, Partner, Transaction, TransactionStatus, Wallet};

/// The minimal wallet-lookup surface the wallet engine needs outside of an open
/// transactional scope. Row-level locking for mutation is obtained
/// separately via `MemoryStore::begin_wallet_transaction` — this trait only
/// covers reads and the handful of writes that don't need the lock.
#[async_trait]
pub trait WalletRepo: Send + Sync {
    async fn get_by_id(&self, id: WalletId) -> Result<Option<Wallet>>;
    async fn find(&self, player: &PlayerId, partner: PartnerId, currency_code: &str) -> Result<Option<Wallet>>;
}

#[async_trait]
pub trait TransactionRepo: Send + Sync {
    async fn find_by_reference(&self, partner: PartnerId, reference_id: &ReferenceId) -> Result<Option<Transaction>>;
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>>;
    /// The AML analyzer's primary read path — the player's transactions
    /// since a cutoff, newest first, bounded by `limit`.
    async fn list_by_player(&self, player: &PlayerId, partner: PartnerId, since: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>>;
    async fn list_by_wallet(&self, wallet_id: WalletId, limit: usize) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait PartnerRepo: Send + Sync {
    async fn get_by_id(&self, id: PartnerId) -> Result<Option<Partner>>;
}

#[async_trait]
pub trait ApiKeyRepo: Send + Sync {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;
    /// Throttled to at most once per hour by the caller, not here.
    async fn touch_last_used(&self, id: ApiKeyId, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait AmlRepo: Send + Sync {
    async fn get_or_create_profile(&self, player: &PlayerId, partner: PartnerId) -> Result<AMLRiskProfile>;
    async fn update_profile(&self, profile: AMLRiskProfile) -> Result<()>;
    async fn insert_alert(&self, alert: AMLAlert) -> Result<AMLAlert>;
}

#[async_trait]
pub trait DeadLetterRepo: Send + Sync {
    async fn insert(&self, entry: DeadLetterEntry) -> Result<()>;
    async fn list(&self) -> Result<Vec<DeadLetterEntry>>;
}

/// Internal helper shared by `WalletTxGuard::stage_status_update` callers; kept
/// here rather than inlined so the guard module doesn't need to know about
/// `TransactionStatus`'s terminal-state rule.
pub(crate) fn assert_transition_allowed(from: TransactionStatus, to: TransactionStatus) -> bool {
    match (from, to) {
        (TransactionStatus::Pending, TransactionStatus::Completed | TransactionStatus::Failed) => true,
        (TransactionStatus::Completed, TransactionStatus::Canceled) => true,
        _ => false,
    }
}
