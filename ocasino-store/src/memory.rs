use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocasino_common::ids::{AlertId, ApiKeyId, PartnerId, PlayerId, ReferenceId, TransactionId, WalletId};
use ocasino_common::money::{Amount, Currency};
use ocasino_common::{PlatformError, Result};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::warn;

use crate::model::{
    AMLAlert, AMLRiskProfile, ApiKey, DeadLetterEntry, Partner, Transaction, TransactionStatus, Wallet,
};
use crate::repo::{AmlRepo, ApiKeyRepo, DeadLetterRepo, PartnerRepo, TransactionRepo, WalletRepo};

/// The in-process reference store backing every repository trait. Every
/// table is an `Arc<RwLock<HashMap<...>>>`, built
/// the way the mempool's local backend is built: async methods that never
/// actually suspend on I/O, kept async for interface parity with a future real
/// backend.
///
/// Row-level locking for wallet mutation is a *second*, finer-grained mechanism
/// layered on top: `wallet_locks` holds one `tokio::sync::Mutex<()>` per wallet,
/// acquired by `begin_wallet_transaction` and held for the lifetime of the
/// returned guard. Unrelated wallets never contend.
pub struct MemoryStore {
    partners: RwLock<HashMap<PartnerId, Partner>>,
    api_keys: RwLock<HashMap<ApiKeyId, ApiKey>>,
    api_keys_by_hash: RwLock<HashMap<String, ApiKeyId>>,
    wallets: RwLock<HashMap<WalletId, Wallet>>,
    wallet_index: RwLock<HashMap<(PlayerId, PartnerId, String), WalletId>>,
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
    tx_by_reference: RwLock<HashMap<(PartnerId, String), TransactionId>>,
    aml_profiles: RwLock<HashMap<(PlayerId, PartnerId), AMLRiskProfile>>,
    alerts: RwLock<HashMap<AlertId, AMLAlert>>,
    dead_letters: RwLock<Vec<DeadLetterEntry>>,
    wallet_locks: Mutex<HashMap<WalletId, Arc<Mutex<()>>>>,
    wallet_creation_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            partners: RwLock::new(HashMap::new()),
            api_keys: RwLock::new(HashMap::new()),
            api_keys_by_hash: RwLock::new(HashMap::new()),
            wallets: RwLock::new(HashMap::new()),
            wallet_index: RwLock::new(HashMap::new()),
            transactions: RwLock::new(HashMap::new()),
            tx_by_reference: RwLock::new(HashMap::new()),
            aml_profiles: RwLock::new(HashMap::new()),
            alerts: RwLock::new(HashMap::new()),
            dead_letters: RwLock::new(Vec::new()),
            wallet_locks: Mutex::new(HashMap::new()),
            wallet_creation_lock: Mutex::new(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_partner(&self, partner: Partner) {
        self.partners.write().await.insert(partner.id, partner);
    }

    pub async fn insert_api_key(&self, key: ApiKey) {
        self.api_keys_by_hash.write().await.insert(key.key_hash.clone(), key.id);
        self.api_keys.write().await.insert(key.id, key);
    }

    /// Returns the existing wallet for (player, partner, currency), or creates
    /// one with a zero balance — wallets are created on first sight and never
    /// deleted. The uniqueness check and the insert happen under
    /// `wallet_creation_lock` so two concurrent first-sight requests can't both
    /// pass the check and create duplicate rows.
    pub async fn get_or_create_wallet(&self, player: &PlayerId, partner: PartnerId, currency: &Currency) -> Result<Wallet> {
        if let Some(wallet) = self.find_wallet(player, partner, currency.code()).await? {
            return Ok(wallet);
        }
        let _guard = self.wallet_creation_lock.lock().await;
        if let Some(wallet) = self.find_wallet(player, partner, currency.code()).await? {
            return Ok(wallet);
        }
        let wallet = Wallet {
            id: WalletId::new(),
            player_id: player.clone(),
            partner_id: partner,
            currency: currency.clone(),
            balance: Amount::from_minor_units(0),
            active: true,
            locked: false,
            created_at: Utc::now(),
        };
        self.wallet_index
            .write()
            .await
            .insert((player.clone(), partner, currency.code().to_string()), wallet.id);
        self.wallets.write().await.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn find_wallet(&self, player: &PlayerId, partner: PartnerId, currency_code: &str) -> Result<Option<Wallet>> {
        let id = self
            .wallet_index
            .read()
            .await
            .get(&(player.clone(), partner, currency_code.to_string()))
            .copied();
        match id {
            Some(id) => Ok(self.wallets.read().await.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn wallet_lock(&self, wallet_id: WalletId) -> Arc<Mutex<()>> {
        let mut locks = self.wallet_locks.lock().await;
        locks.entry(wallet_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Opens the single logical transaction a wallet mutation runs
    /// inside. Holds the wallet's row lock until the returned guard is either
    /// committed or dropped. Two concurrent operations on the same wallet
    /// serialize here; different wallets never contend.
    pub async fn begin_wallet_transaction(self: &Arc<Self>, wallet_id: WalletId) -> WalletTxGuard {
        let lock = self.wallet_lock(wallet_id).await;
        let permit = lock.lock_owned().await;
        WalletTxGuard {
            store: Arc::clone(self),
            wallet_id,
            _permit: permit,
            pending_balance: None,
            pending_inserts: Vec::new(),
            pending_status_updates: Vec::new(),
            committed: false,
        }
    }

    async fn read_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.wallets.read().await.get(&wallet_id).cloned())
    }

    /// Applies a guard's staged writes atomically: reference-id uniqueness is
    /// rechecked here (the engine already checked before opening the
    /// transaction, but the index is the source of truth for the unique
    /// constraint on (partner-id, reference-id)), then the transaction rows,
    /// status updates, and the wallet balance are all written before releasing
    /// any lock.
    async fn apply_wallet_tx(
        &self,
        wallet_id: WalletId,
        new_balance: Option<Amount>,
        inserts: Vec<Transaction>,
        status_updates: Vec<(TransactionId, TransactionStatus)>,
    ) -> Result<()> {
        {
            let by_ref = self.tx_by_reference.read().await;
            for tx in &inserts {
                let key = (tx.partner_id, tx.reference_id.0.clone());
                if let Some(existing) = by_ref.get(&key) {
                    if *existing != tx.id {
                        return Err(PlatformError::idempotency_conflict(format!(
                            "reference-id '{}' already recorded for partner {}",
                            tx.reference_id, tx.partner_id
                        )));
                    }
                }
            }
        }

        let mut by_ref = self.tx_by_reference.write().await;
        let mut transactions = self.transactions.write().await;
        for tx in inserts {
            by_ref.insert((tx.partner_id, tx.reference_id.0.clone()), tx.id);
            transactions.insert(tx.id, tx);
        }
        for (id, status) in status_updates {
            if let Some(existing) = transactions.get_mut(&id) {
                if crate::repo::assert_transition_allowed(existing.status, status) {
                    existing.status = status;
                    existing.updated_at = Utc::now();
                } else {
                    warn!(transaction_id = %id, from = ?existing.status, to = ?status, "rejected illegal transaction status transition");
                }
            }
        }
        drop(by_ref);
        drop(transactions);

        if let Some(balance) = new_balance {
            if let Some(wallet) = self.wallets.write().await.get_mut(&wallet_id) {
                wallet.balance = balance;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WalletRepo for MemoryStore {
    async fn get_by_id(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.read_wallet(id).await
    }

    async fn find(&self, player: &PlayerId, partner: PartnerId, currency_code: &str) -> Result<Option<Wallet>> {
        self.find_wallet(player, partner, currency_code).await
    }
}

#[async_trait]
impl TransactionRepo for MemoryStore {
    async fn find_by_reference(&self, partner: PartnerId, reference_id: &ReferenceId) -> Result<Option<Transaction>> {
        let id = self.tx_by_reference.read().await.get(&(partner, reference_id.0.clone())).copied();
        match id {
            Some(id) => Ok(self.transactions.read().await.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn list_by_player(&self, player: &PlayerId, partner: PartnerId, since: DateTime<Utc>, limit: usize) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matches: Vec<Transaction> = transactions
            .values()
            .filter(|tx| &tx.player_id == player && tx.partner_id == partner && tx.created_at >= since)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn list_by_wallet(&self, wallet_id: WalletId, limit: usize) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matches: Vec<Transaction> = transactions.values().filter(|tx| tx.wallet_id == wallet_id).cloned().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit);
        Ok(matches)
    }
}

#[async_trait]
impl PartnerRepo for MemoryStore {
    async fn get_by_id(&self, id: PartnerId) -> Result<Option<Partner>> {
        Ok(self.partners.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl ApiKeyRepo for MemoryStore {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let id = self.api_keys_by_hash.read().await.get(key_hash).copied();
        match id {
            Some(id) => Ok(self.api_keys.read().await.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn touch_last_used(&self, id: ApiKeyId, at: DateTime<Utc>) -> Result<()> {
        if let Some(key) = self.api_keys.write().await.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl AmlRepo for MemoryStore {
    async fn get_or_create_profile(&self, player: &PlayerId, partner: PartnerId) -> Result<AMLRiskProfile> {
        if let Some(profile) = self.aml_profiles.read().await.get(&(player.clone(), partner)) {
            return Ok(profile.clone());
        }
        let profile = AMLRiskProfile::new(player.clone(), partner, Utc::now());
        self.aml_profiles.write().await.insert((player.clone(), partner), profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, profile: AMLRiskProfile) -> Result<()> {
        self.aml_profiles.write().await.insert((profile.player_id.clone(), profile.partner_id), profile);
        Ok(())
    }

    async fn insert_alert(&self, alert: AMLAlert) -> Result<AMLAlert> {
        self.alerts.write().await.insert(alert.id, alert.clone());
        Ok(alert)
    }
}

#[async_trait]
impl DeadLetterRepo for MemoryStore {
    async fn insert(&self, entry: DeadLetterEntry) -> Result<()> {
        self.dead_letters.write().await.push(entry);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetterEntry>> {
        Ok(self.dead_letters.read().await.clone())
    }
}

/// The handle returned by `MemoryStore::begin_wallet_transaction`. Staged
/// writes (`stage_*`) are journaled here and only reach the store's tables when
/// `commit` is called; dropping the guard without committing discards them —
/// this is how a deadline expiring before commit rolls back without burning
/// the idempotency key: the caller simply lets the guard drop inside a
/// `tokio::time::timeout`.
pub struct WalletTxGuard {
    store: Arc<MemoryStore>,
    wallet_id: WalletId,
    _permit: OwnedMutexGuard<()>,
    pending_balance: Option<Amount>,
    pending_inserts: Vec<Transaction>,
    pending_status_updates: Vec<(TransactionId, TransactionStatus)>,
    committed: bool,
}

impl WalletTxGuard {
    pub fn wallet_id(&self) -> WalletId {
        self.wallet_id
    }

    /// Reads the wallet as of transaction start (nothing else can be mutating
    /// it: we hold the row lock).
    pub async fn read_wallet(&self) -> Result<Option<Wallet>> {
        self.store.read_wallet(self.wallet_id).await
    }

    pub async fn find_by_reference(&self, partner: PartnerId, reference_id: &ReferenceId) -> Result<Option<Transaction>> {
        TransactionRepo::find_by_reference(self.store.as_ref(), partner, reference_id).await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        TransactionRepo::get_by_id(self.store.as_ref(), id).await
    }

    pub fn stage_balance_update(&mut self, new_balance: Amount) {
        self.pending_balance = Some(new_balance);
    }

    pub fn stage_transaction_insert(&mut self, tx: Transaction) {
        self.pending_inserts.push(tx);
    }

    pub fn stage_status_update(&mut self, id: TransactionId, status: TransactionStatus) {
        self.pending_status_updates.push((id, status));
    }

    /// Writes every staged change and releases the wallet lock. Consumes the
    /// guard so a second `commit` is a compile error, not a runtime one.
    pub async fn commit(mut self) -> Result<()> {
        self.store
            .apply_wallet_tx(
                self.wallet_id,
                self.pending_balance.take(),
                std::mem::take(&mut self.pending_inserts),
                std::mem::take(&mut self.pending_status_updates),
            )
            .await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for WalletTxGuard {
    fn drop(&mut self) {
        if !self.committed && (self.pending_balance.is_some() || !self.pending_inserts.is_empty()) {
            warn!(wallet_id = %self.wallet_id, "wallet transaction dropped without commit; staged writes discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocasino_common::ids::ReferenceId;

    fn currency() -> Currency {
        Currency::new("USD").unwrap()
    }

    #[tokio::test]
    async fn get_or_create_wallet_is_idempotent() {
        let store = MemoryStore::new();
        let player = PlayerId("p1".into());
        let partner = PartnerId::new();
        let w1 = store.get_or_create_wallet(&player, partner, &currency()).await.unwrap();
        let w2 = store.get_or_create_wallet(&player, partner, &currency()).await.unwrap();
        assert_eq!(w1.id, w2.id);
    }

    #[tokio::test]
    async fn dropped_guard_discards_staged_writes() {
        let store = MemoryStore::new();
        let player = PlayerId("p1".into());
        let partner = PartnerId::new();
        let wallet = store.get_or_create_wallet(&player, partner, &currency()).await.unwrap();

        {
            let mut guard = store.begin_wallet_transaction(wallet.id).await;
            guard.stage_balance_update(Amount::from_minor_units(5000));
        }

        let reloaded = store.read_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance.minor_units(), 0);
    }

    #[tokio::test]
    async fn committed_guard_applies_balance_and_transaction() {
        let store = MemoryStore::new();
        let player = PlayerId("p1".into());
        let partner = PartnerId::new();
        let wallet = store.get_or_create_wallet(&player, partner, &currency()).await.unwrap();

        let mut guard = store.begin_wallet_transaction(wallet.id).await;
        let tx = Transaction {
            id: TransactionId::new(),
            reference_id: ReferenceId("ref-1".into()),
            wallet_id: wallet.id,
            player_id: player.clone(),
            partner_id: partner,
            tx_type: crate::model::TransactionType::Deposit,
            encrypted_amount: "blob".into(),
            currency: currency(),
            status: TransactionStatus::Completed,
            original_balance: Amount::from_minor_units(0),
            updated_balance: Amount::from_minor_units(1000),
            original_transaction_id: None,
            game_id: None,
            game_session_id: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        guard.stage_transaction_insert(tx);
        guard.stage_balance_update(Amount::from_minor_units(1000));
        guard.commit().await.unwrap();

        let reloaded = store.read_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance.minor_units(), 1000);
        let found = store
            .find_by_reference(partner, &ReferenceId("ref-1".into()))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn conflicting_reference_id_is_rejected_on_commit() {
        let store = MemoryStore::new();
        let player = PlayerId("p1".into());
        let partner = PartnerId::new();
        let wallet = store.get_or_create_wallet(&player, partner, &currency()).await.unwrap();

        let make_tx = |id: TransactionId| Transaction {
            id,
            reference_id: ReferenceId("dup".into()),
            wallet_id: wallet.id,
            player_id: player.clone(),
            partner_id: partner,
            tx_type: crate::model::TransactionType::Deposit,
            encrypted_amount: "blob".into(),
            currency: currency(),
            status: TransactionStatus::Completed,
            original_balance: Amount::from_minor_units(0),
            updated_balance: Amount::from_minor_units(1000),
            original_transaction_id: None,
            game_id: None,
            game_session_id: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut guard = store.begin_wallet_transaction(wallet.id).await;
        guard.stage_transaction_insert(make_tx(TransactionId::new()));
        guard.commit().await.unwrap();

        let mut guard2 = store.begin_wallet_transaction(wallet.id).await;
        guard2.stage_transaction_insert(make_tx(TransactionId::new()));
        let result = guard2.commit().await;
        assert!(result.is_err());
    }
}
