use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ocasino_common::ids::{TransactionId, WalletId};
use ocasino_common::money::Amount;
use ocasino_common::{PlatformError, Result};
use ocasino_crypto::AmountCipher;
use ocasino_events::{DomainEvent, EventBus, WalletTransactionCreatedEvent};
use ocasino_store::memory::{MemoryStore, WalletTxGuard};
use ocasino_store::model::{Transaction, TransactionStatus, TransactionType, Wallet};
use ocasino_store::repo::TransactionRepo;
use tracing::{info, instrument, warn};

use crate::request::{AdjustmentDirection, WalletOp, WalletOpRequest, WalletOpResult};

struct RuleOutcome {
    updated_balance: Amount,
    original_link: Option<OriginalLink>,
}

#[derive(Clone, Copy)]
struct OriginalLink {
    transaction_id: Option<TransactionId>,
    cancel_original: bool,
}

/// The balance state machine. Holds everything a mutating operation
/// needs: the store (for locking/persistence), the amount cipher (amounts are
/// encrypted at rest), and the event bus.
pub struct WalletEngine {
    store: Arc<MemoryStore>,
    cipher: Arc<AmountCipher>,
    events: Arc<EventBus>,
    operation_deadline: Duration,
}

impl WalletEngine {
    pub fn new(store: Arc<MemoryStore>, cipher: Arc<AmountCipher>, events: Arc<EventBus>, operation_deadline: Duration) -> Self {
        Self { store, cipher, events, operation_deadline }
    }

    pub async fn deposit(&self, req: WalletOpRequest) -> Result<WalletOpResult> {
        self.execute(WalletOp::Deposit, req).await
    }

    pub async fn withdraw(&self, req: WalletOpRequest) -> Result<WalletOpResult> {
        self.execute(WalletOp::Withdraw, req).await
    }

    pub async fn bet(&self, req: WalletOpRequest) -> Result<WalletOpResult> {
        if req.game_id.is_none() {
            return Err(PlatformError::invalid_amount("bet requires a game-id"));
        }
        self.execute(WalletOp::Bet, req).await
    }

    pub async fn win(&self, req: WalletOpRequest) -> Result<WalletOpResult> {
        if req.game_id.is_none() {
            return Err(PlatformError::invalid_amount("win requires a game-id"));
        }
        self.execute(WalletOp::Win, req).await
    }

    pub async fn rollback(&self, req: WalletOpRequest) -> Result<WalletOpResult> {
        if req.original_reference_id.is_none() {
            return Err(PlatformError::invalid_amount("rollback requires an original-reference-id"));
        }
        self.execute(WalletOp::Rollback, req).await
    }

    /// Entry point for the four operator-initiated types.
    /// Callers (the HTTP layer) are responsible for having already checked the
    /// `wallet:admin` permission — the engine does not re-check permissions.
    pub async fn record_adjustment(&self, op: WalletOp, req: WalletOpRequest) -> Result<WalletOpResult> {
        debug_assert!(op.requires_admin_permission());
        self.execute(op, req).await
    }

    #[instrument(skip(self, req), fields(partner_id = %req.partner_id, player_id = %req.player_id, reference_id = %req.reference_id))]
    async fn execute(&self, op: WalletOp, req: WalletOpRequest) -> Result<WalletOpResult> {
        if req.amount.is_zero_or_negative() {
            return Err(PlatformError::invalid_amount("amount must be strictly positive"));
        }

        if let Some(existing) = TransactionRepo::find_by_reference(self.store.as_ref(), req.partner_id, &req.reference_id).await? {
            return self.replay_or_conflict(&existing, op, &req).await;
        }

        let wallet = self.store.get_or_create_wallet(&req.player_id, req.partner_id, &req.currency).await?;
        if wallet.currency != req.currency {
            return Err(PlatformError::currency_mismatch(format!(
                "wallet currency {} does not match request currency {}",
                wallet.currency, req.currency
            )));
        }
        if op.respects_wallet_lock() && wallet.locked {
            return Err(PlatformError::wallet_locked(format!("wallet {} is locked", wallet.id)));
        }

        match tokio::time::timeout(self.operation_deadline, self.execute_locked(op, &req, wallet.id)).await {
            Ok(result) => {
                let result = result?;
                self.publish_event(&result, &req, wallet.id).await;
                Ok(result)
            }
            Err(_elapsed) => {
                warn!("wallet operation exceeded deadline; transaction rolled back, reference-id not burned");
                Err(PlatformError::deadline_exceeded(format!(
                    "operation did not commit within {:?}",
                    self.operation_deadline
                )))
            }
        }
    }

    /// The guarded section of a wallet operation: open the transaction, re-check
    /// idempotency under the wallet lock, apply the operation's rule, stage the
    /// writes, and commit. Everything here runs while the wallet's row lock is
    /// held; dropping the guard without `commit()` (e.g. because the caller's
    /// timeout fired) discards all staged writes.
    async fn execute_locked(&self, op: WalletOp, req: &WalletOpRequest, wallet_id: WalletId) -> Result<WalletOpResult> {
        let mut guard = self.store.begin_wallet_transaction(wallet_id).await;

        if let Some(existing) = guard.find_by_reference(req.partner_id, &req.reference_id).await? {
            return self.replay_or_conflict(&existing, op, req).await;
        }

        let wallet = guard
            .read_wallet()
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("wallet {wallet_id} not found")))?;

        let RuleOutcome { updated_balance, original_link } = self.apply_rule(op, &wallet, req, &mut guard).await?;

        // The transaction's own amount is the magnitude of its balance delta,
        // not the request's amount field — the two coincide for every
        // operation except rollback, where the request carries a placeholder
        // and the real amount comes from reversing the original transaction.
        let amount_minor = (updated_balance.minor_units() - wallet.balance.minor_units()).abs();
        let amount = Amount::from_minor_units(amount_minor);
        let encrypted_amount = self
            .cipher
            .encrypt_amount(amount_minor)
            .map_err(|_| PlatformError::internal("amount encryption failed"))?;

        let now = Utc::now();
        let tx_id = TransactionId::new();
        let transaction = Transaction {
            id: tx_id,
            reference_id: req.reference_id.clone(),
            wallet_id,
            player_id: req.player_id.clone(),
            partner_id: req.partner_id,
            tx_type: op.transaction_type(),
            encrypted_amount,
            currency: req.currency.clone(),
            status: TransactionStatus::Completed,
            original_balance: wallet.balance,
            updated_balance,
            original_transaction_id: original_link.and_then(|link| link.transaction_id),
            game_id: req.game_id.clone(),
            game_session_id: req.game_session_id.clone(),
            metadata: req.metadata.clone(),
            created_at: now,
            updated_at: now,
        };

        guard.stage_transaction_insert(transaction.clone());
        guard.stage_balance_update(updated_balance);
        if let Some(link) = original_link {
            if link.cancel_original {
                if let Some(original_id) = link.transaction_id {
                    guard.stage_status_update(original_id, TransactionStatus::Canceled);
                }
            }
        }

        guard.commit().await?;
        info!(transaction_id = %tx_id, tx_type = ?transaction.tx_type, "wallet transaction committed");

        Ok(WalletOpResult {
            transaction_id: tx_id,
            tx_type: transaction.tx_type,
            status: transaction.status,
            amount,
            updated_balance,
            currency: transaction.currency,
            created_at: now,
        })
    }

    /// Computes the new balance for `op` and, when the operation references an
    /// earlier transaction, whether that original should transition to
    /// `Canceled` (rollback) or stay untouched (refund only records the link
    /// for audit purposes).
    async fn apply_rule(
        &self,
        op: WalletOp,
        wallet: &Wallet,
        req: &WalletOpRequest,
        guard: &mut WalletTxGuard,
    ) -> Result<RuleOutcome> {
        match op {
            WalletOp::Deposit | WalletOp::Win | WalletOp::Commission | WalletOp::Bonus => {
                let new_balance = wallet
                    .balance
                    .checked_add(req.amount)
                    .ok_or_else(|| PlatformError::internal("balance overflow"))?;
                Ok(RuleOutcome { updated_balance: new_balance, original_link: None })
            }
            WalletOp::Withdraw | WalletOp::Bet => {
                if wallet.balance.minor_units() < req.amount.minor_units() {
                    return Err(PlatformError::insufficient_funds(format!(
                        "wallet {} balance is insufficient for this operation",
                        wallet.id
                    )));
                }
                let new_balance = wallet
                    .balance
                    .checked_sub(req.amount)
                    .ok_or_else(|| PlatformError::internal("balance underflow"))?;
                Ok(RuleOutcome { updated_balance: new_balance, original_link: None })
            }
            WalletOp::Rollback => {
                let original_ref = req
                    .original_reference_id
                    .as_ref()
                    .ok_or_else(|| PlatformError::invalid_amount("rollback requires an original-reference-id"))?;
                let original = guard
                    .find_by_reference(req.partner_id, original_ref)
                    .await?
                    .ok_or_else(|| PlatformError::not_found("original transaction not found"))?;
                if original.currency != req.currency {
                    return Err(PlatformError::currency_mismatch(format!(
                        "original transaction currency {} does not match rollback request currency {}",
                        original.currency, req.currency
                    )));
                }
                if original.wallet_id != wallet.id {
                    return Err(PlatformError::not_found("original transaction belongs to a different wallet"));
                }
                if original.status == TransactionStatus::Canceled {
                    return Err(PlatformError::already_rolled_back(format!(
                        "transaction {} was already rolled back",
                        original.id
                    )));
                }
                if original.status != TransactionStatus::Completed
                    || !matches!(original.tx_type, TransactionType::Bet | TransactionType::Win | TransactionType::Withdrawal)
                {
                    return Err(PlatformError::not_found(
                        "rollback target must be a completed bet, win, or withdrawal",
                    ));
                }
                let delta = original.updated_balance.minor_units() - original.original_balance.minor_units();
                let new_balance = Amount::from_minor_units(wallet.balance.minor_units() - delta);
                Ok(RuleOutcome {
                    updated_balance: new_balance,
                    original_link: Some(OriginalLink { transaction_id: Some(original.id), cancel_original: true }),
                })
            }
            WalletOp::Refund => {
                let original_id = match &req.original_reference_id {
                    Some(original_ref) => guard.find_by_reference(req.partner_id, original_ref).await?.map(|tx| tx.id),
                    None => None,
                };
                let new_balance = wallet
                    .balance
                    .checked_add(req.amount)
                    .ok_or_else(|| PlatformError::internal("balance overflow"))?;
                Ok(RuleOutcome {
                    updated_balance: new_balance,
                    original_link: Some(OriginalLink { transaction_id: original_id, cancel_original: false }),
                })
            }
            WalletOp::Adjustment(direction) => {
                let new_balance = match direction {
                    AdjustmentDirection::Credit => wallet
                        .balance
                        .checked_add(req.amount)
                        .ok_or_else(|| PlatformError::internal("balance overflow"))?,
                    AdjustmentDirection::Debit => {
                        if wallet.balance.minor_units() < req.amount.minor_units() {
                            return Err(PlatformError::insufficient_funds("adjustment debit exceeds balance"));
                        }
                        wallet
                            .balance
                            .checked_sub(req.amount)
                            .ok_or_else(|| PlatformError::internal("balance underflow"))?
                    }
                };
                Ok(RuleOutcome { updated_balance: new_balance, original_link: None })
            }
        }
    }

    /// Rollback's request amount is a placeholder the engine ignores (the
    /// real amount is recomputed from the original transaction), so its
    /// idempotency match compares the original-reference-id rather than a
    /// stored amount that was never derived from the request in the first
    /// place.
    async fn replay_or_conflict(&self, existing: &Transaction, op: WalletOp, req: &WalletOpRequest) -> Result<WalletOpResult> {
        let base_matches =
            existing.tx_type == op.transaction_type() && existing.currency == req.currency && existing.player_id == req.player_id;

        let matches_request = if base_matches && op == WalletOp::Rollback {
            match &req.original_reference_id {
                Some(original_ref) => match TransactionRepo::find_by_reference(self.store.as_ref(), req.partner_id, original_ref).await? {
                    Some(original) => existing.original_transaction_id == Some(original.id),
                    None => false,
                },
                None => false,
            }
        } else {
            base_matches
                && self
                    .cipher
                    .decrypt_amount(&existing.encrypted_amount)
                    .map(|stored| stored == req.amount.minor_units())
                    .unwrap_or(false)
        };

        if !matches_request {
            return Err(PlatformError::idempotency_conflict(format!(
                "reference-id '{}' was already used with different parameters",
                req.reference_id
            )));
        }

        let amount = self
            .cipher
            .decrypt_amount(&existing.encrypted_amount)
            .map(Amount::from_minor_units)
            .unwrap_or(existing.updated_balance);

        Ok(WalletOpResult {
            transaction_id: existing.id,
            tx_type: existing.tx_type,
            status: existing.status,
            amount,
            updated_balance: existing.updated_balance,
            currency: existing.currency.clone(),
            created_at: existing.created_at,
        })
    }

    async fn publish_event(&self, result: &WalletOpResult, req: &WalletOpRequest, wallet_id: WalletId) {
        let event = DomainEvent::WalletTransactionCreated(WalletTransactionCreatedEvent {
            transaction_id: result.transaction_id,
            wallet_id,
            player_id: req.player_id.clone(),
            partner_id: req.partner_id,
            tx_type: result.tx_type,
            currency: result.currency.clone(),
            amount: result.amount,
            updated_balance: result.updated_balance,
            game_id: req.game_id.clone(),
            game_session_id: req.game_session_id.clone(),
            created_at: result.created_at,
        });
        self.events.publish(event).await;
    }
}
